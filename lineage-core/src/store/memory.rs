//! In-process record store used by tests and ephemeral runs

use super::{sort_history, IntelligenceStore, RecordKey};
use crate::error::StoreError;
use crate::model::FunctionIntelligence;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, FunctionIntelligence>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl IntelligenceStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<FunctionIntelligence>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn put(&self, record: &FunctionIntelligence) -> Result<(), StoreError> {
        let key = RecordKey::for_function(&record.function);
        self.records.write().await.insert(key, record.clone());
        Ok(())
    }

    async fn history(
        &self,
        repository_id: &str,
        function_name: &str,
    ) -> Result<Vec<FunctionIntelligence>, StoreError> {
        let mut records: Vec<FunctionIntelligence> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| {
                r.function.repository_id == repository_id
                    && r.function.function_name == function_name
            })
            .cloned()
            .collect();
        sort_history(&mut records);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::{at, sample_record};

    #[tokio::test]
    async fn test_round_trip_and_overwrite() {
        let store = MemoryStore::new();
        let record = sample_record("app/orders.py", "validate", "abc", at(0));
        store.put(&record).await.unwrap();

        let key = RecordKey::for_function(&record.function);
        assert_eq!(store.get(&key).await.unwrap(), Some(record.clone()));

        let mut newer = record.clone();
        newer.created_at = at(60);
        store.put(&newer).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&key).await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn test_history_spans_fingerprints_and_files() {
        let store = MemoryStore::new();
        store
            .put(&sample_record("b.py", "validate", "v2", at(20)))
            .await
            .unwrap();
        store
            .put(&sample_record("a.py", "validate", "v1", at(10)))
            .await
            .unwrap();
        store
            .put(&sample_record("a.py", "other", "v1", at(5)))
            .await
            .unwrap();

        let history = store
            .history("repo-0123456789ab", "validate")
            .await
            .unwrap();
        let fingerprints: Vec<&str> = history.iter().map(|r| r.fingerprint()).collect();
        assert_eq!(fingerprints, vec!["v1", "v2"]);
    }
}
