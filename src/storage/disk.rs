//! JSON-file store with atomic writes.
//!
//! Layout, one directory per collection:
//!
//! ```text
//! {root}/tests/{id}.json
//! {root}/results/{test_id}.json
//! {root}/certificates/{wallet}/{id}.json
//! {root}/stats/{wallet}.json
//! {root}/signatures/{signature}.json
//! ```
//!
//! Keys are base58 addresses, base58 signatures, or uuid-derived identifiers,
//! all filesystem-safe. Regular writes go through a temp file plus rename for
//! crash safety; the signature record is created with `create_new` so the
//! filesystem itself enforces single use.

use crate::error::{Error, Result};
use crate::model::{Certificate, PaymentSignatureRecord, Test, TestResult, UserStats};
use crate::storage::Store;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const TESTS_DIR: &str = "tests";
const RESULTS_DIR: &str = "results";
const CERTIFICATES_DIR: &str = "certificates";
const STATS_DIR: &str = "stats";
const SIGNATURES_DIR: &str = "signatures";

/// Durable [`Store`] backed by JSON files.
pub struct DiskStore {
    root: PathBuf,
    /// Serializes stats read-modify-write cycles.
    stats_lock: Mutex<()>,
}

impl DiskStore {
    /// Open a store rooted at `root`, creating the collection directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [
            TESTS_DIR,
            RESULTS_DIR,
            CERTIFICATES_DIR,
            STATS_DIR,
            SIGNATURES_DIR,
        ] {
            fs::create_dir_all(root.join(dir))
                .await
                .map_err(|e| Error::Storage(format!("failed to create {dir} directory: {e}")))?;
        }

        debug!("Opened disk store at {:?}", root);

        Ok(Self {
            root,
            stats_lock: Mutex::new(()),
        })
    }

    /// Reject keys that could escape the collection directory.
    fn checked_key(key: &str) -> Result<&str> {
        if key.is_empty()
            || key.contains(['/', '\\'])
            || key.contains("..")
            || key.starts_with('.')
        {
            return Err(Error::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(key)
    }

    fn entry_path(&self, collection: &str, key: &str) -> Result<PathBuf> {
        Ok(self
            .root
            .join(collection)
            .join(format!("{}.json", Self::checked_key(key)?)))
    }

    /// Atomic write: temp file plus rename.
    async fn write_entry<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let content =
            serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Storage(format!("failed to create directory: {e}")))?;
        }

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| Error::Storage(format!("failed to create temp file: {e}")))?;
        file.write_all(&content)
            .await
            .map_err(|e| Error::Storage(format!("failed to write entry: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("failed to flush entry: {e}")))?;

        fs::rename(&temp_path, path)
            .await
            .map_err(|e| Error::Storage(format!("failed to commit entry: {e}")))?;

        Ok(())
    }

    async fn read_entry<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(content) => serde_json::from_slice(&content)
                .map(Some)
                .map_err(|e| Error::Serialization(format!("corrupt entry {path:?}: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Storage(format!("failed to read {path:?}: {e}"))),
        }
    }

    async fn read_dir_entries<T: DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>> {
        let mut entries = Vec::new();
        let mut reader = match fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(Error::Storage(format!("failed to list {dir:?}: {e}"))),
        };

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Error::Storage(format!("failed to list {dir:?}: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(value) = self.read_entry(&path).await? {
                entries.push(value);
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Store for DiskStore {
    async fn put_test(&self, test: &Test) -> Result<()> {
        let path = self.entry_path(TESTS_DIR, &test.id)?;
        self.write_entry(&path, test).await
    }

    async fn get_test(&self, id: &str) -> Result<Option<Test>> {
        let path = self.entry_path(TESTS_DIR, id)?;
        self.read_entry(&path).await
    }

    async fn put_test_result(&self, result: &TestResult) -> Result<()> {
        let path = self.entry_path(RESULTS_DIR, &result.test_id)?;
        self.write_entry(&path, result).await
    }

    async fn get_test_result(&self, test_id: &str) -> Result<Option<TestResult>> {
        let path = self.entry_path(RESULTS_DIR, test_id)?;
        self.read_entry(&path).await
    }

    async fn put_certificate(&self, certificate: &Certificate) -> Result<()> {
        let wallet = Self::checked_key(&certificate.wallet_address)?;
        let key = Self::checked_key(&certificate.id)?;
        let path = self
            .root
            .join(CERTIFICATES_DIR)
            .join(wallet)
            .join(format!("{key}.json"));
        self.write_entry(&path, certificate).await
    }

    async fn certificates_for_wallet(&self, wallet: &str) -> Result<Vec<Certificate>> {
        let dir = self
            .root
            .join(CERTIFICATES_DIR)
            .join(Self::checked_key(wallet)?);
        let mut certificates: Vec<Certificate> = self.read_dir_entries(&dir).await?;
        certificates.sort_by(|a, b| a.earned_at.cmp(&b.earned_at));
        Ok(certificates)
    }

    async fn get_user_stats(&self, wallet: &str) -> Result<Option<UserStats>> {
        let path = self.entry_path(STATS_DIR, wallet)?;
        self.read_entry(&path).await
    }

    async fn all_user_stats(&self) -> Result<Vec<UserStats>> {
        let mut all: Vec<UserStats> = self.read_dir_entries(&self.root.join(STATS_DIR)).await?;
        all.sort_by(|a, b| a.wallet_address.cmp(&b.wallet_address));
        Ok(all)
    }

    async fn record_settlement(
        &self,
        wallet: &str,
        passed: bool,
        reward_millisol: u64,
    ) -> Result<UserStats> {
        let path = self.entry_path(STATS_DIR, wallet)?;

        // Fresh read immediately before the write, with the lock held
        // across both.
        let _guard = self.stats_lock.lock().await;
        let mut stats: UserStats = self
            .read_entry(&path)
            .await?
            .unwrap_or_else(|| UserStats::zeroed(wallet));
        stats.apply_settlement(passed, reward_millisol);
        self.write_entry(&path, &stats).await?;
        Ok(stats)
    }

    async fn is_signature_used(&self, signature: &str) -> Result<bool> {
        let path = self.entry_path(SIGNATURES_DIR, signature)?;
        Ok(fs::try_exists(&path)
            .await
            .map_err(|e| Error::Storage(format!("failed to check signature: {e}")))?)
    }

    async fn record_payment_signature(&self, record: &PaymentSignatureRecord) -> Result<bool> {
        let path = self.entry_path(SIGNATURES_DIR, &record.signature)?;
        let content =
            serde_json::to_vec_pretty(record).map_err(|e| Error::Serialization(e.to_string()))?;

        // create_new makes the filesystem the arbiter of the race: the
        // second writer gets AlreadyExists, never a silent overwrite.
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "failed to record payment signature: {e}"
                )))
            }
        };

        file.write_all(&content)
            .await
            .map_err(|e| Error::Storage(format!("failed to write signature record: {e}")))?;
        file.flush()
            .await
            .map_err(|e| Error::Storage(format!("failed to flush signature record: {e}")))?;
        Ok(true)
    }
}
