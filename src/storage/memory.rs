//! In-memory storage implementation
//!
//! Backs dry runs and tests. Duplicate handling matches the SQLite adapter.

use crate::extract::ProductRecord;
use crate::storage::traits::{
    DuplicateSkuPolicy, ProductStore, SaveOutcome, StorageError, StorageResult,
};
use crate::storage::SessionRecord;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Mutex-guarded product list
#[derive(Default)]
pub struct MemoryProductStore {
    products: Mutex<Vec<(String, ProductRecord)>>,
    sessions: Mutex<Vec<SessionRecord>>,
    save_calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail with [`StorageError::Unavailable`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `save_product` calls, including failed and duplicate ones
    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    /// Every stored record across all stores
    pub fn all_products(&self) -> Vec<ProductRecord> {
        match self.products.lock() {
            Ok(products) => products.iter().map(|(_, record)| record.clone()).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Recorded session summaries, oldest first
    pub fn sessions(&self) -> Vec<SessionRecord> {
        match self.sessions.lock() {
            Ok(sessions) => sessions.clone(),
            Err(_) => Vec::new(),
        }
    }

    fn lock_products(&self) -> StorageResult<MutexGuard<'_, Vec<(String, ProductRecord)>>> {
        self.products
            .lock()
            .map_err(|_| StorageError::Unavailable("product list lock poisoned".to_string()))
    }
}

impl ProductStore for MemoryProductStore {
    fn save_product(
        &self,
        store_id: &str,
        record: ProductRecord,
        policy: DuplicateSkuPolicy,
    ) -> StorageResult<SaveOutcome> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory store set to fail".to_string()));
        }

        let mut products = self.lock_products()?;
        let existing = products.iter().position(|(store, stored)| {
            store == store_id
                && match (&record.sku, &stored.sku) {
                    (Some(sku), Some(stored_sku)) => sku == stored_sku,
                    (None, None) => record.source_url == stored.source_url,
                    _ => false,
                }
        });

        match (existing, policy) {
            (Some(_), DuplicateSkuPolicy::Ignore) => Ok(SaveOutcome::DuplicateSku { replaced: false }),
            (Some(index), DuplicateSkuPolicy::Replace) => {
                products[index].1 = record;
                Ok(SaveOutcome::DuplicateSku { replaced: true })
            }
            (None, _) => {
                products.push((store_id.to_string(), record));
                Ok(SaveOutcome::Saved)
            }
        }
    }

    fn load_products(&self, store_id: &str) -> StorageResult<Vec<ProductRecord>> {
        let products = self.lock_products()?;
        Ok(products
            .iter()
            .filter(|(store, _)| store == store_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    fn record_session(&self, session: &SessionRecord) -> StorageResult<()> {
        self.sessions
            .lock()
            .map_err(|_| StorageError::Unavailable("session list lock poisoned".to_string()))?
            .push(session.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(url: &str, sku: Option<&str>, price: &str) -> ProductRecord {
        ProductRecord {
            source_url: url.to_string(),
            name: "Plate".to_string(),
            raw_price: price.to_string(),
            currency: "EUR".to_string(),
            description: None,
            image_urls: Vec::new(),
            category: None,
            sku: sku.map(str::to_string),
            extracted_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let store = MemoryProductStore::new();
        let outcome = store
            .save_product("s", record("https://x.example/1", Some("P1"), "3"), DuplicateSkuPolicy::Replace)
            .unwrap();

        assert_eq!(outcome, SaveOutcome::Saved);
        assert_eq!(store.load_products("s").unwrap().len(), 1);
        assert!(store.load_products("t").unwrap().is_empty());
        assert_eq!(store.save_calls(), 1);
    }

    #[test]
    fn test_duplicate_policies() {
        let store = MemoryProductStore::new();
        store
            .save_product("s", record("https://x.example/1", Some("P1"), "3"), DuplicateSkuPolicy::Replace)
            .unwrap();

        let ignored = store
            .save_product("s", record("https://x.example/2", Some("P1"), "4"), DuplicateSkuPolicy::Ignore)
            .unwrap();
        assert_eq!(ignored, SaveOutcome::DuplicateSku { replaced: false });
        assert_eq!(store.load_products("s").unwrap()[0].raw_price, "3");

        let replaced = store
            .save_product("s", record("https://x.example/2", Some("P1"), "4"), DuplicateSkuPolicy::Replace)
            .unwrap();
        assert_eq!(replaced, SaveOutcome::DuplicateSku { replaced: true });
        assert_eq!(store.load_products("s").unwrap()[0].raw_price, "4");
    }

    #[test]
    fn test_failure_injection() {
        let store = MemoryProductStore::new();
        store.set_failing(true);

        let result = store.save_product(
            "s",
            record("https://x.example/1", None, "1"),
            DuplicateSkuPolicy::Replace,
        );

        assert!(matches!(result, Err(StorageError::Unavailable(_))));
        assert_eq!(store.save_calls(), 1);
        assert!(store.all_products().is_empty());
    }
}
