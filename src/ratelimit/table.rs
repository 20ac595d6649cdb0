//! Per-client state storage.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

/// Lazily populated map from client identifier to a per-client record.
///
/// Lookups of existing clients take a shared shard lock and then lock only
/// the client's own record, so calls for different clients never wait on
/// each other's read-modify-write. Only inserting a new client takes the
/// shard's exclusive lock.
#[derive(Debug)]
pub(crate) struct ClientTable<T> {
    records: DashMap<String, Mutex<T>>,
}

impl<T> ClientTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Run `update` on the client's record, creating it with `init` first if
    /// the client has not been seen.
    ///
    /// `update` runs while the record is locked, so check-then-consume inside
    /// it is atomic for that client.
    pub(crate) fn update<R>(
        &self,
        client_id: &str,
        init: impl FnOnce() -> T,
        update: impl FnOnce(&mut T) -> R,
    ) -> R {
        if let Some(record) = self.records.get(client_id) {
            let mut state = record.lock();
            return update(&mut state);
        }

        let record = self.records.entry(client_id.to_owned()).or_insert_with(|| {
            debug!(client = %client_id, "Creating new client record");
            Mutex::new(init())
        });
        let mut state = record.lock();
        update(&mut state)
    }

    /// Read the client's record without creating it.
    pub(crate) fn inspect<R>(&self, client_id: &str, read: impl FnOnce(&T) -> R) -> Option<R> {
        let record = self.records.get(client_id)?;
        let state = record.lock();
        Some(read(&state))
    }

    /// Number of clients with a record.
    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Drop every record.
    pub(crate) fn clear(&self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_creates_record_once() {
        let table: ClientTable<u32> = ClientTable::new();

        let first = table.update("a", || 10, |v| {
            *v += 1;
            *v
        });
        let second = table.update("a", || panic!("record already exists"), |v| {
            *v += 1;
            *v
        });

        assert_eq!(first, 11);
        assert_eq!(second, 12);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_inspect_does_not_create() {
        let table: ClientTable<u32> = ClientTable::new();

        assert_eq!(table.inspect("missing", |v| *v), None);
        assert_eq!(table.len(), 0);

        table.update("present", || 7, |_| ());
        assert_eq!(table.inspect("present", |v| *v), Some(7));
    }

    #[test]
    fn test_keys_are_exact_matches() {
        let table: ClientTable<u32> = ClientTable::new();

        table.update("client", || 1, |_| ());
        table.update("Client", || 2, |_| ());
        table.update("client ", || 3, |_| ());

        assert_eq!(table.len(), 3);
        assert_eq!(table.inspect("Client", |v| *v), Some(2));
    }

    #[test]
    fn test_clear() {
        let table: ClientTable<u32> = ClientTable::new();
        table.update("a", || 1, |_| ());
        table.update("b", || 1, |_| ());

        table.clear();
        assert_eq!(table.len(), 0);
    }
}
