//! Transport Module Tests
//!
//! Validates framing over real loopback sockets: partial reads, multiple
//! frames per read, buffered delivery, and EOF handling.

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;
    use tokio::net::{TcpListener, TcpStream};

    use crate::protocol::{Message, Payload};
    use crate::transport::Connection;

    /// One connected socket pair on loopback.
    async fn socket_pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(Connection::connect(addr), listener.accept());
        (client.unwrap(), accepted.unwrap().0)
    }

    #[tokio::test]
    async fn test_send_recv_one_message() {
        let (mut conn, raw) = socket_pair().await;
        let mut remote = Connection::new(raw);

        remote.send(&Message::text(0, 1, "hello")).await.unwrap();
        let msg = conn.recv().await.unwrap().unwrap();
        assert_eq!(msg.payload, Payload::Text { text: "hello".into() });
    }

    #[tokio::test]
    async fn test_frame_split_across_writes() {
        let (mut conn, mut raw) = socket_pair().await;

        let frame = Message::text(0, 1, "split in two").serialize().into_bytes();
        let writer = tokio::spawn(async move {
            raw.write_all(&frame[..7]).await.unwrap();
            raw.flush().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            raw.write_all(&frame[7..]).await.unwrap();
        });

        let msg = conn.recv().await.unwrap().unwrap();
        assert_eq!(msg.payload, Payload::Text { text: "split in two".into() });
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_two_frames_in_one_write() {
        let (mut conn, mut raw) = socket_pair().await;

        let mut bytes = Message::text(0, 1, "first").serialize();
        bytes.push_str(&Message::text(0, 1, "second").serialize());
        raw.write_all(bytes.as_bytes()).await.unwrap();

        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(first.payload, Payload::Text { text: "first".into() });

        // The second frame is already buffered; recv must not touch the
        // socket again even though the remote sends nothing further.
        assert!(conn.has_buffered());
        let second = conn.recv().await.unwrap().unwrap();
        assert_eq!(second.payload, Payload::Text { text: "second".into() });
        assert!(!conn.has_buffered());
    }

    #[tokio::test]
    async fn test_escaped_terminator_is_not_a_frame_boundary() {
        let (mut conn, raw) = socket_pair().await;
        let mut remote = Connection::new(raw);

        remote.send(&Message::text(0, 1, "line1\nline2")).await.unwrap();
        let msg = conn.recv().await.unwrap().unwrap();
        assert_eq!(msg.payload, Payload::Text { text: "line1\nline2".into() });
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        let (mut conn, raw) = socket_pair().await;
        drop(raw);
        assert!(conn.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mid_frame_eof_is_an_error() {
        let (mut conn, mut raw) = socket_pair().await;
        raw.write_all(b"Text 0 1 {trunc").await.unwrap();
        drop(raw);
        assert!(conn.recv().await.is_err());
    }

    #[tokio::test]
    async fn test_split_halves_keep_buffered_frames() {
        let (mut conn, mut raw) = socket_pair().await;

        let mut bytes = Message::text(0, 1, "before split").serialize();
        bytes.push_str(&Message::kill(0, 1).serialize());
        raw.write_all(bytes.as_bytes()).await.unwrap();

        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(first.payload, Payload::Text { text: "before split".into() });

        let (mut reader, _writer) = conn.split();
        assert!(reader.has_buffered());
        let second = reader.recv().await.unwrap().unwrap();
        assert_eq!(second.payload, Payload::Kill);
    }
}
