//! In-memory store for development and tests.

use crate::error::Result;
use crate::model::{Certificate, PaymentSignatureRecord, Test, TestResult, UserStats};
use crate::storage::Store;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Non-durable [`Store`] backed by in-process maps.
///
/// Each collection sits behind its own lock; the signature insert and the
/// stats read-modify-write each run entirely under a single write lock, so
/// the trait's atomicity guarantees hold without a real database.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tests: RwLock<HashMap<String, Test>>,
    results: RwLock<HashMap<String, TestResult>>,
    certificates: RwLock<HashMap<String, Certificate>>,
    stats: RwLock<HashMap<String, UserStats>>,
    signatures: RwLock<HashMap<String, PaymentSignatureRecord>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_test(&self, test: &Test) -> Result<()> {
        self.tests.write().insert(test.id.clone(), test.clone());
        Ok(())
    }

    async fn get_test(&self, id: &str) -> Result<Option<Test>> {
        Ok(self.tests.read().get(id).cloned())
    }

    async fn put_test_result(&self, result: &TestResult) -> Result<()> {
        self.results
            .write()
            .insert(result.test_id.clone(), result.clone());
        Ok(())
    }

    async fn get_test_result(&self, test_id: &str) -> Result<Option<TestResult>> {
        Ok(self.results.read().get(test_id).cloned())
    }

    async fn put_certificate(&self, certificate: &Certificate) -> Result<()> {
        self.certificates
            .write()
            .insert(certificate.id.clone(), certificate.clone());
        Ok(())
    }

    async fn certificates_for_wallet(&self, wallet: &str) -> Result<Vec<Certificate>> {
        let mut certificates: Vec<Certificate> = self
            .certificates
            .read()
            .values()
            .filter(|c| c.wallet_address == wallet)
            .cloned()
            .collect();
        certificates.sort_by(|a, b| a.earned_at.cmp(&b.earned_at));
        Ok(certificates)
    }

    async fn get_user_stats(&self, wallet: &str) -> Result<Option<UserStats>> {
        Ok(self.stats.read().get(wallet).cloned())
    }

    async fn all_user_stats(&self) -> Result<Vec<UserStats>> {
        let mut all: Vec<UserStats> = self.stats.read().values().cloned().collect();
        all.sort_by(|a, b| a.wallet_address.cmp(&b.wallet_address));
        Ok(all)
    }

    async fn record_settlement(
        &self,
        wallet: &str,
        passed: bool,
        reward_millisol: u64,
    ) -> Result<UserStats> {
        let mut stats = self.stats.write();
        let entry = stats
            .entry(wallet.to_string())
            .or_insert_with(|| UserStats::zeroed(wallet));
        entry.apply_settlement(passed, reward_millisol);
        Ok(entry.clone())
    }

    async fn is_signature_used(&self, signature: &str) -> Result<bool> {
        Ok(self.signatures.read().contains_key(signature))
    }

    async fn record_payment_signature(&self, record: &PaymentSignatureRecord) -> Result<bool> {
        let mut signatures = self.signatures.write();
        if signatures.contains_key(&record.signature) {
            return Ok(false);
        }
        signatures.insert(record.signature.clone(), record.clone());
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::model::{CategoryPath, Level};
    use chrono::Utc;

    fn sample_test() -> Test {
        Test::new(
            "Abc123",
            CategoryPath {
                main_category: "Programming".into(),
                narrow_category: "Rust".into(),
                specific_category: "Async".into(),
            },
            vec![],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryStore::new();
        let test = sample_test();

        store.put_test(&test).await.expect("put");
        let loaded = store.get_test(&test.id).await.expect("get");
        assert_eq!(loaded, Some(test));

        let missing = store.get_test("unknown").await.expect("get");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn signature_insert_is_single_use() {
        let store = MemoryStore::new();
        let record = PaymentSignatureRecord {
            signature: "sig-1".to_string(),
            wallet_address: "Abc123".to_string(),
            lamports: 150_000_000,
        };

        assert!(!store.is_signature_used("sig-1").await.unwrap());
        assert!(store.record_payment_signature(&record).await.unwrap());
        assert!(store.is_signature_used("sig-1").await.unwrap());

        // Second insert loses, even with a different wallet.
        let duplicate = PaymentSignatureRecord {
            wallet_address: "Other".to_string(),
            ..record
        };
        assert!(!store.record_payment_signature(&duplicate).await.unwrap());
    }

    #[tokio::test]
    async fn record_settlement_creates_then_accumulates() {
        let store = MemoryStore::new();

        let stats = store.record_settlement("Abc123", true, 150).await.unwrap();
        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.total_certificates, 1);
        assert_eq!(stats.success_rate, 100);

        let stats = store.record_settlement("Abc123", false, 0).await.unwrap();
        assert_eq!(stats.total_tests, 2);
        assert_eq!(stats.total_certificates, 1);
        assert_eq!(stats.success_rate, 50);
        assert_eq!(stats.total_earned_millisol, 150);
    }

    #[tokio::test]
    async fn concurrent_settlements_never_lose_updates() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.record_settlement("Abc123", true, 100).await
            }));
        }
        for handle in handles {
            handle.await.expect("join").expect("settle");
        }

        let stats = store.get_user_stats("Abc123").await.unwrap().unwrap();
        assert_eq!(stats.total_tests, 20);
        assert_eq!(stats.total_certificates, 20);
        assert_eq!(stats.total_earned_millisol, 2_000);
    }

    #[tokio::test]
    async fn certificates_filtered_by_wallet() {
        let store = MemoryStore::new();
        for (id, wallet) in [("c1", "Abc123"), ("c2", "Abc123"), ("c3", "Other")] {
            let certificate = Certificate {
                id: id.to_string(),
                wallet_address: wallet.to_string(),
                topic: "t".to_string(),
                level: Level::Junior,
                score: 70,
                token_id: "tok".to_string(),
                metadata_uri: "uri".to_string(),
                earned_at: Utc::now(),
            };
            store.put_certificate(&certificate).await.unwrap();
        }

        let certs = store.certificates_for_wallet("Abc123").await.unwrap();
        assert_eq!(certs.len(), 2);
        assert!(certs.iter().all(|c| c.wallet_address == "Abc123"));
    }
}
