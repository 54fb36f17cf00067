use async_trait::async_trait;
use tokio::sync::RwLock;

use super::StateStore;
use super::StoreError;
use crate::relay::StateRecord;

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<StateRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn append(&self, record: StateRecord) -> Result<(), StoreError> {
        self.records.write().await.push(record);
        Ok(())
    }

    async fn latest(&self) -> Result<Option<StateRecord>, StoreError> {
        let records = self.records.read().await;
        // max_by_key returns the last maximum, which is the later insertion on ties
        Ok(records.iter().max_by_key(|r| r.timestamp).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use chrono::Utc;

    use super::*;
    use crate::relay::RelayState;

    #[tokio::test]
    async fn test_empty_store_has_no_latest() {
        let store = MemoryStore::new();
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_latest_follows_insertion_sequence() {
        let store = MemoryStore::new();
        let start = Utc::now();
        for (i, state) in [RelayState::On, RelayState::Off, RelayState::On]
            .into_iter()
            .enumerate()
        {
            let ts = start + Duration::milliseconds(i as i64);
            store.append(StateRecord::at(state, ts)).await.unwrap();
        }

        assert_eq!(store.latest().await.unwrap().unwrap().state, RelayState::On);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_latest_uses_timestamp_not_insertion() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .append(StateRecord::at(RelayState::On, now))
            .await
            .unwrap();
        store
            .append(StateRecord::at(RelayState::Off, now - Duration::seconds(5)))
            .await
            .unwrap();

        assert_eq!(store.latest().await.unwrap().unwrap().state, RelayState::On);
    }

    #[tokio::test]
    async fn test_timestamp_tie_goes_to_last_insert() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .append(StateRecord::at(RelayState::On, now))
            .await
            .unwrap();
        store
            .append(StateRecord::at(RelayState::Off, now))
            .await
            .unwrap();

        assert_eq!(store.latest().await.unwrap().unwrap().state, RelayState::Off);
    }
}
