//! Durable storage for tests, results, certificates, stats, and used
//! payment signatures.
//!
//! The service talks to storage through the [`Store`] trait only; the
//! orchestrator never assumes a particular backend. Two invariants are the
//! store's responsibility, not the caller's:
//!
//! - [`Store::record_payment_signature`] is insert-if-absent on the
//!   signature key, so of two concurrent requests presenting the same
//!   signature exactly one wins;
//! - [`Store::record_settlement`] performs the stats read-modify-write under
//!   the store's own serialization, so concurrent settlements for one wallet
//!   never lose updates.

mod disk;
mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::model::{Certificate, PaymentSignatureRecord, Test, TestResult, UserStats};
use async_trait::async_trait;

/// CRUD-style persistence for the service's five keyed collections.
#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a newly created test.
    async fn put_test(&self, test: &Test) -> Result<()>;

    /// Fetch a test by identifier.
    async fn get_test(&self, id: &str) -> Result<Option<Test>>;

    /// Persist a graded result, keyed by test identifier.
    async fn put_test_result(&self, result: &TestResult) -> Result<()>;

    /// Fetch the result recorded for a test, if any.
    async fn get_test_result(&self, test_id: &str) -> Result<Option<TestResult>>;

    /// Persist an issued certificate.
    async fn put_certificate(&self, certificate: &Certificate) -> Result<()>;

    /// All certificates earned by a wallet.
    async fn certificates_for_wallet(&self, wallet: &str) -> Result<Vec<Certificate>>;

    /// Aggregate counters for a wallet, if the wallet has been observed.
    async fn get_user_stats(&self, wallet: &str) -> Result<Option<UserStats>>;

    /// Aggregate counters for every observed wallet.
    async fn all_user_stats(&self) -> Result<Vec<UserStats>>;

    /// Fold a settled result into the wallet's counters and return the
    /// updated row, creating a zeroed row on first observation.
    ///
    /// Implementations must read the current row immediately before writing
    /// and serialize updates per wallet.
    async fn record_settlement(
        &self,
        wallet: &str,
        passed: bool,
        reward_millisol: u64,
    ) -> Result<UserStats>;

    /// Whether a payment signature has already funded a test.
    async fn is_signature_used(&self, signature: &str) -> Result<bool>;

    /// Record a payment signature as used.
    ///
    /// Returns `false` without writing when the signature is already
    /// present; the insert is atomic on the signature key.
    async fn record_payment_signature(&self, record: &PaymentSignatureRecord) -> Result<bool>;
}
