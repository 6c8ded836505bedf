use std::net::SocketAddr;

use distributed_kv::node::NodeConfig;
use distributed_kv::server::RendezvousServer;
use distributed_kv::store::KvStore;

const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5555";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        usage(&args[0]);
        std::process::exit(1);
    }

    match args[1].as_str() {
        "server" => run_server(&args).await,
        "node" => run_node(&args).await,
        other => {
            eprintln!("Unknown command `{other}`");
            usage(&args[0]);
            std::process::exit(1);
        }
    }
}

fn usage(prog: &str) {
    eprintln!("Usage: {prog} server --nodes <count> [--bind <addr:port>]");
    eprintln!("       {prog} node --bind <addr:port> [--server <addr:port>]");
    eprintln!("Example: {prog} server --nodes 3");
    eprintln!("Example: {prog} node --bind 127.0.0.1:5001");
}

async fn run_server(args: &[String]) -> anyhow::Result<()> {
    let mut num_nodes: Option<usize> = None;
    let mut bind_addr: SocketAddr = DEFAULT_SERVER_ADDR.parse()?;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--nodes" => {
                num_nodes = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--bind" => {
                bind_addr = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }
    let num_nodes = num_nodes.expect("--nodes is required");

    let server = RendezvousServer::bind(num_nodes, bind_addr).await?;
    tracing::info!("Rendezvous server listening on {}", server.local_addr()?);
    server.run().await
}

async fn run_node(args: &[String]) -> anyhow::Result<()> {
    let mut bind_addr: Option<SocketAddr> = None;
    let mut server_addr: SocketAddr = DEFAULT_SERVER_ADDR.parse()?;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--server" => {
                server_addr = args[i + 1].parse()?;
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }
    let bind_addr = bind_addr.expect("--bind is required");

    let cfg = NodeConfig {
        bind_addr,
        server_addr,
    };
    let store: KvStore<serde_json::Value> = KvStore::connect(&cfg).await?;
    tracing::info!(
        "Node {} of {} up with {} peers",
        store.index(),
        store.num_nodes(),
        store.peer_count()
    );
    tracing::info!("Press Ctrl+C to shut the whole cluster down");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C, requesting cluster shutdown");
            store.teardown().await?;
        }
        _ = store.wait_closed() => {}
    }
    store.wait_closed().await;
    tracing::info!("Node closed");
    Ok(())
}
