//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use skillcert_node::config::{ServiceConfig, StorageBackend};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Settlement service for paid skill-certification tests on Solana.
#[derive(Parser, Debug)]
#[command(name = "skillcert-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Listen address for the HTTP API.
    #[arg(long, env = "SKILLCERT_LISTEN_ADDR")]
    pub listen_addr: Option<SocketAddr>,

    /// Chain JSON-RPC endpoint.
    #[arg(long, env = "SKILLCERT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Treasury address that must receive test fees.
    #[arg(long, env = "SKILLCERT_TREASURY")]
    pub treasury: Option<String>,

    /// Storage backend.
    #[arg(long, value_enum, env = "SKILLCERT_STORAGE")]
    pub storage: Option<CliStorageBackend>,

    /// Root directory for disk storage.
    #[arg(long, env = "SKILLCERT_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// Question source endpoint. When unset, a built-in placeholder source
    /// is used.
    #[arg(long, env = "SKILLCERT_QUESTION_SOURCE_URL")]
    pub question_source_url: Option<String>,

    /// Minting service endpoint. When unset, placeholder tokens are issued.
    #[arg(long, env = "SKILLCERT_MINTING_SERVICE_URL")]
    pub minting_service_url: Option<String>,

    /// Service authority public key (base58).
    #[arg(long, env = "SKILLCERT_AUTHORITY_PUBKEY")]
    pub authority_pubkey: Option<String>,

    /// Log level.
    #[arg(long, value_enum, default_value = "info", env = "RUST_LOG")]
    pub log_level: CliLogLevel,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Storage backend CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliStorageBackend {
    /// Durable JSON files.
    Disk,
    /// In-memory only.
    Memory,
}

/// Log level CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum CliLogLevel {
    /// Error messages only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Informational messages (default).
    #[default]
    Info,
    /// Debug messages.
    Debug,
    /// Trace messages (verbose).
    Trace,
}

impl Cli {
    /// Convert CLI arguments into a `ServiceConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServiceConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServiceConfig::from_file(path)?
        } else {
            ServiceConfig::default()
        };

        // Override with CLI arguments
        if let Some(listen_addr) = self.listen_addr {
            config.http.listen_addr = listen_addr;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.chain.rpc_url = rpc_url;
        }
        if let Some(treasury) = self.treasury {
            config.payment.treasury_address = treasury;
        }
        if let Some(storage) = self.storage {
            config.storage.backend = storage.into();
        }
        if let Some(root_dir) = self.root_dir {
            config.storage.root_dir = root_dir;
        }
        if let Some(url) = self.question_source_url {
            config.questions.source_url = Some(url);
        }
        if let Some(url) = self.minting_service_url {
            config.minting.service_url = Some(url);
        }
        if let Some(authority) = self.authority_pubkey {
            config.authority_pubkey = Some(authority);
        }
        config.log_level = self.log_level.into();

        Ok(config)
    }
}

impl From<CliStorageBackend> for StorageBackend {
    fn from(backend: CliStorageBackend) -> Self {
        match backend {
            CliStorageBackend::Disk => Self::Disk,
            CliStorageBackend::Memory => Self::Memory,
        }
    }
}

impl From<CliLogLevel> for String {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => "error".to_string(),
            CliLogLevel::Warn => "warn".to_string(),
            CliLogLevel::Info => "info".to_string(),
            CliLogLevel::Debug => "debug".to_string(),
            CliLogLevel::Trace => "trace".to_string(),
        }
    }
}
