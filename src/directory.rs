//! Shared peer directory
//!
//! A key-value table gossiped between peers when a connection is
//! established. Entries only ever accumulate: a merge takes the union of
//! local and remote, with incoming values winning on conflicting keys.

use std::collections::HashMap;
use std::sync::RwLock;

/// Concurrent key -> value table
pub struct DirectoryTable {
    entries: RwLock<HashMap<String, String>>,
}

impl DirectoryTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Set or overwrite an entry
    pub fn put(&self, key: &str, value: &str) {
        {
            let mut entries = self.entries.write().unwrap();
            entries.insert(key.to_string(), value.to_string());
        }
        log::debug!("Directory updated: {} -> {}", key, value);
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.read().unwrap().get(key).cloned()
    }

    /// Independent copy of the full table, safe to serialize or hand to
    /// another thread
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().unwrap().clone()
    }

    /// Union a remote snapshot into the table; incoming values win.
    ///
    /// Merging the same snapshot again is a no-op.
    pub fn merge(&self, remote: HashMap<String, String>) {
        let count = remote.len();
        {
            let mut entries = self.entries.write().unwrap();
            entries.extend(remote);
        }
        log::debug!("Directory merged {} entries from peer", count);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DirectoryTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_put_get_overwrite() {
        let table = DirectoryTable::new();
        assert!(table.get("a").is_none());

        table.put("a", "1");
        assert_eq!(table.get("a").as_deref(), Some("1"));

        table.put("a", "2");
        assert_eq!(table.get("a").as_deref(), Some("2"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let table = DirectoryTable::new();
        table.put("a", "1");

        let snapshot = table.snapshot();
        table.put("a", "changed");
        table.put("b", "2");

        // The snapshot is a point-in-time copy, unaffected by later writes
        assert_eq!(snapshot.get("a").map(String::as_str), Some("1"));
        assert!(!snapshot.contains_key("b"));
    }

    #[test]
    fn test_merge_remote_wins() {
        let table = DirectoryTable::new();
        table.put("a", "1");

        let mut remote = HashMap::new();
        remote.insert("a".to_string(), "2".to_string());
        remote.insert("b".to_string(), "3".to_string());
        table.merge(remote);

        assert_eq!(table.get("a").as_deref(), Some("2"));
        assert_eq!(table.get("b").as_deref(), Some("3"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let table = DirectoryTable::new();
        table.put("local", "x");

        let mut remote = HashMap::new();
        remote.insert("a".to_string(), "1".to_string());
        remote.insert("b".to_string(), "2".to_string());

        table.merge(remote.clone());
        let once = table.snapshot();
        table.merge(remote);
        assert_eq!(table.snapshot(), once);
    }

    #[test]
    fn test_concurrent_writers_lose_nothing() {
        let table = Arc::new(DirectoryTable::new());
        let mut handles = Vec::new();

        // Four writers on disjoint keys
        for w in 0..4 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    table.put(&format!("w{}-{}", w, i), &format!("v{}", i));
                }
            }));
        }

        // Two mergers racing on a shared key set
        for m in 0..2 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                let mut remote = HashMap::new();
                for i in 0..50 {
                    remote.insert(format!("shared-{}", i), format!("m{}", m));
                }
                table.merge(remote);
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        // Every written key is present, shared keys hold one merger's value
        for w in 0..4 {
            for i in 0..50 {
                assert_eq!(
                    table.get(&format!("w{}-{}", w, i)).as_deref(),
                    Some(format!("v{}", i).as_str())
                );
            }
        }
        for i in 0..50 {
            let value = table.get(&format!("shared-{}", i)).unwrap();
            assert!(value == "m0" || value == "m1");
        }
    }
}
