//! Store Module Tests
//!
//! Validates the open-addressing map mechanics and the local store's
//! blocking-read and purge behavior.
//!
//! ## Test Scopes
//! - **Key**: Equality and the table hash.
//! - **LocalMap**: Put/get/overwrite, tombstone removal and reuse, growth.
//! - **LocalStore**: wait_for wakeups and one-shot purge.
//!
//! *Note: The `KvStore` façade needs a live mesh and is covered by the
//! node module's cluster tests.*

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::store::key::Key;
    use crate::store::local::LocalStore;
    use crate::store::map::LocalMap;

    // ============================================================
    // KEY
    // ============================================================

    #[test]
    fn test_key_equality_covers_both_fields() {
        assert_eq!(Key::new("a", 1), Key::new("a", 1));
        assert_ne!(Key::new("a", 1), Key::new("a", 2));
        assert_ne!(Key::new("a", 1), Key::new("b", 1));
    }

    #[test]
    fn test_table_hash_is_byte_sum_plus_owner() {
        // 'a' + 'b' + 3 = 97 + 98 + 3
        assert_eq!(Key::new("ab", 3).table_hash(), 198);
        assert_eq!(Key::new("", 7).table_hash(), 7);
    }

    // ============================================================
    // LOCAL MAP
    // ============================================================

    #[test]
    fn test_map_put_get() {
        let mut map = LocalMap::new();
        assert!(map.is_empty());

        map.put(Key::new("color", 0), "red".to_string());
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&Key::new("color", 0)), Some("red"));
        assert_eq!(map.get(&Key::new("color", 1)), None);
    }

    #[test]
    fn test_map_overwrite_returns_previous_value() {
        let mut map = LocalMap::new();
        let key = Key::new("color", 0);

        assert_eq!(map.put(key.clone(), "red".to_string()), None);
        assert_eq!(map.put(key.clone(), "blue".to_string()), Some("red".to_string()));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&key), Some("blue"));
    }

    #[test]
    fn test_map_remove_then_absent() {
        let mut map = LocalMap::new();
        let key = Key::new("color", 0);

        map.put(key.clone(), "red".to_string());
        assert_eq!(map.remove(&key), Some("red".to_string()));
        assert_eq!(map.len(), 0);
        assert!(!map.contains(&key));
        assert_eq!(map.remove(&key), None);
    }

    #[test]
    fn test_map_tombstoned_slot_is_reused() {
        let mut map = LocalMap::new();
        // Two keys with the same probe start so the second lands one past
        // the first.
        let a = Key::new("ab", 0); // hash 195
        let b = Key::new("ba", 0); // hash 195

        map.put(a.clone(), "1".to_string());
        map.put(b.clone(), "2".to_string());
        map.remove(&a);
        map.put(Key::new("c", 0), "3".to_string());

        assert_eq!(map.capacity(), 4);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&b), Some("2"));
        assert_eq!(map.get(&Key::new("c", 0)), Some("3"));
    }

    #[test]
    fn test_map_grows_before_half_full() {
        let mut map = LocalMap::new();
        assert_eq!(map.capacity(), 4);

        map.put(Key::new("k1", 0), "1".to_string());
        map.put(Key::new("k2", 0), "2".to_string());
        assert_eq!(map.capacity(), 4);

        // Third insert would pass load factor 1/2, so capacity doubles.
        map.put(Key::new("k3", 0), "3".to_string());
        assert_eq!(map.capacity(), 8);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn test_map_growth_keeps_all_entries() {
        let mut map = LocalMap::new();
        for i in 0..50 {
            map.put(Key::new(format!("key-{i}"), 0), format!("value-{i}"));
        }
        assert_eq!(map.len(), 50);
        for i in 0..50 {
            assert_eq!(
                map.get(&Key::new(format!("key-{i}"), 0)),
                Some(format!("value-{i}").as_str()),
                "key-{i} should survive growth"
            );
        }
    }

    #[test]
    fn test_map_clear() {
        let mut map = LocalMap::new();
        map.put(Key::new("a", 0), "1".to_string());
        map.put(Key::new("b", 0), "2".to_string());
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.get(&Key::new("a", 0)), None);
    }

    // ============================================================
    // LOCAL STORE
    // ============================================================

    #[tokio::test]
    async fn test_wait_for_returns_existing_value_immediately() {
        let store = LocalStore::new();
        store.put(Key::new("ready", 0), "now".to_string());

        let value = timeout(Duration::from_secs(1), store.wait_for(&Key::new("ready", 0)))
            .await
            .expect("should not block")
            .unwrap();
        assert_eq!(value, "now");
    }

    #[tokio::test]
    async fn test_wait_for_wakes_on_put() {
        let store = Arc::new(LocalStore::new());
        let key = Key::new("later", 0);

        let waiter = {
            let store = Arc::clone(&store);
            let key = key.clone();
            tokio::spawn(async move { store.wait_for(&key).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "wait_for must block until the put");

        // An unrelated put wakes the waiter, which re-checks and keeps
        // waiting.
        store.put(Key::new("other", 0), "x".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        store.put(key, "arrived".to_string());
        let value = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish after the put")
            .unwrap()
            .unwrap();
        assert_eq!(value, "arrived");
    }

    #[tokio::test]
    async fn test_purge_clears_once() {
        let store = LocalStore::new();
        store.put(Key::new("a", 0), "1".to_string());
        store.put(Key::new("b", 0), "2".to_string());
        assert_eq!(store.len(), 2);

        store.purge();
        assert!(store.purged());
        assert_eq!(store.len(), 0);

        // Later puts land normally; a second purge does not clear again.
        store.put(Key::new("c", 0), "3".to_string());
        store.purge();
        assert_eq!(store.len(), 1);
    }
}
