//! Configuration for skillcert-node.

use crate::scoring::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Durable JSON files under `root_dir`.
    #[default]
    Disk,
    /// In-memory only; state is lost on restart. Development and tests.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Root directory for the disk backend.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            root_dir: default_root_dir(),
        }
    }
}

/// Chain RPC configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Commitment level for transaction lookups.
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Request timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: default_commitment(),
            request_timeout_secs: default_rpc_timeout(),
        }
    }
}

/// Payment acceptance configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Treasury address that must receive the test fee.
    #[serde(default = "default_treasury")]
    pub treasury_address: String,

    /// Test price in millisol.
    #[serde(default = "default_test_price")]
    pub test_price_millisol: u64,

    /// Percentage of the price the treasury must receive; the gap absorbs
    /// network fee variance.
    #[serde(default = "default_tolerance")]
    pub tolerance_percent: u8,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            treasury_address: default_treasury(),
            test_price_millisol: default_test_price(),
            tolerance_percent: default_tolerance(),
        }
    }
}

/// Question source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    /// HTTP question-source endpoint. When absent, a built-in fixed source
    /// is used (development only).
    #[serde(default)]
    pub source_url: Option<String>,

    /// Questions per test.
    #[serde(default = "default_question_count")]
    pub count: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_collaborator_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for QuestionConfig {
    fn default() -> Self {
        Self {
            source_url: None,
            count: default_question_count(),
            request_timeout_secs: default_collaborator_timeout(),
        }
    }
}

/// Credential minting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MintingConfig {
    /// Minting service endpoint. When absent, placeholders are issued
    /// directly.
    #[serde(default)]
    pub service_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_collaborator_timeout")]
    pub request_timeout_secs: u64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Request body limit in KiB.
    #[serde(default = "default_body_limit_kb")]
    pub body_limit_kb: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
            body_limit_kb: default_body_limit_kb(),
        }
    }
}

/// Display-layer revenue split percentages reported by the pool statistics
/// view. These never feed settlement; the scoring table is the single source
/// of truth for rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueSplits {
    /// Share attributed to failed test fees.
    pub failed_tests: u8,
    /// Share attributed to advertising.
    pub ads: u8,
    /// Share attributed to partnerships.
    pub partnerships: u8,
    /// Remainder.
    pub other: u8,
}

impl Default for RevenueSplits {
    fn default() -> Self {
        Self {
            failed_tests: 45,
            ads: 30,
            partnerships: 15,
            other: 10,
        }
    }
}

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Chain RPC settings.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Payment acceptance settings.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Question source settings.
    #[serde(default)]
    pub questions: QuestionConfig,

    /// Credential minting settings.
    #[serde(default)]
    pub minting: MintingConfig,

    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Leveling table used for settlement.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Reporting-only revenue split percentages.
    #[serde(default)]
    pub revenue_splits: RevenueSplits,

    /// Base58 public key of the service authority, loaded once at startup
    /// and passed to the components that need it. Appears as the validator
    /// label on derived profile views.
    #[serde(default)]
    pub authority_pubkey: Option<String>,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig::default(),
            chain: ChainConfig::default(),
            payment: PaymentConfig::default(),
            questions: QuestionConfig::default(),
            minting: MintingConfig::default(),
            storage: StorageConfig::default(),
            scoring: ScoringConfig::default(),
            revenue_splits: RevenueSplits::default(),
            authority_pubkey: None,
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Devnet preset: in-memory storage and the public devnet RPC.
    #[must_use]
    pub fn devnet() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid treasury or authority
    /// address, a zero price, an out-of-range tolerance, or a bad scoring
    /// table.
    pub fn validate(&self) -> crate::Result<()> {
        if bs58::decode(&self.payment.treasury_address)
            .into_vec()
            .is_err()
        {
            return Err(crate::Error::Config(format!(
                "treasury address is not valid base58: {}",
                self.payment.treasury_address
            )));
        }
        if let Some(ref authority) = self.authority_pubkey {
            if bs58::decode(authority).into_vec().is_err() {
                return Err(crate::Error::Config(
                    "authority pubkey is not valid base58".to_string(),
                ));
            }
        }
        if self.payment.test_price_millisol == 0 {
            return Err(crate::Error::Config(
                "test price must be non-zero".to_string(),
            ));
        }
        if self.payment.tolerance_percent == 0 || self.payment.tolerance_percent > 100 {
            return Err(crate::Error::Config(format!(
                "payment tolerance must be in 1..=100, got {}",
                self.payment.tolerance_percent
            )));
        }
        if self.questions.count == 0 {
            return Err(crate::Error::Config(
                "question count must be non-zero".to_string(),
            ));
        }
        self.scoring.validate()
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "skillcert").map_or_else(
        || PathBuf::from(".skillcert"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

const fn default_rpc_timeout() -> u64 {
    30
}

fn default_treasury() -> String {
    "9B5XszUGdMaxCZ7uSQhPzdks5ZQSmWxrmzCSvtJ6Ns6g".to_string()
}

const fn default_test_price() -> u64 {
    150 // 0.15 SOL
}

const fn default_tolerance() -> u8 {
    95
}

const fn default_question_count() -> usize {
    10
}

const fn default_collaborator_timeout() -> u64 {
    60
}

fn default_listen_addr() -> SocketAddr {
    use std::net::{Ipv4Addr, SocketAddrV4};
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080))
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_body_limit_kb() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}
