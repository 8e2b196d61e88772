//! # skillcert-node
//!
//! Settlement service for paid skill-certification tests on Solana.
//!
//! A participant pays a fixed fee on-chain, receives a generated test, and
//! submits answers; the service converts that payment into a graded outcome,
//! an optional credential, and durable per-wallet statistics.
//!
//! ## Architecture
//!
//! The pipeline is coordinated by [`SettlementEngine`]:
//! - [`PaymentVerifier`] validates a claimed payment against the chain and
//!   consumes its signature exactly once
//! - [`ScoringEngine`] grades answers deterministically against a
//!   configurable leveling table
//! - credential minting and question generation are capability interfaces
//!   with remote and local implementations
//! - [`ProfileAdapter`] serves on-chain profile views with a database
//!   fallback while the canonical account layout is unavailable
//!
//! Storage is pluggable behind the [`Store`] trait, with JSON-file and
//! in-memory backends.
//!
//! ## Example
//!
//! ```rust,no_run
//! use skillcert_node::{ServiceConfig, build_state, api};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::devnet();
//!     let state = build_state(&config).await?;
//!     let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//!     api::run_server(&config.http, state, shutdown_rx).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod minting;
pub mod model;
pub mod payment;
pub mod questions;
pub mod scoring;
pub mod settlement;
pub mod storage;

pub use api::ApiState;
pub use chain::{ChainClient, ProfileAdapter, RpcChainClient};
pub use config::{ServiceConfig, StorageBackend};
pub use error::{Error, Result};
pub use minting::{CertificateMinter, HttpMinter, MintPolicy, PlaceholderMinter};
pub use model::{Certificate, Level, Test, TestResult, UserStats};
pub use payment::{PaymentRejection, PaymentVerifier, PaymentVerifierConfig};
pub use questions::{FixedQuestionSource, HttpQuestionSource, QuestionSource};
pub use scoring::{ScoringConfig, ScoringEngine};
pub use settlement::SettlementEngine;
pub use storage::{DiskStore, MemoryStore, Store};

use std::sync::Arc;

/// Assemble the full service state from configuration.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or a backend fails to
/// initialize.
pub async fn build_state(config: &ServiceConfig) -> Result<ApiState> {
    config.validate()?;

    let store: Arc<dyn Store> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Disk => Arc::new(DiskStore::open(config.storage.root_dir.clone()).await?),
    };

    let chain: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(&config.chain)?);

    let verifier = PaymentVerifier::new(
        Arc::clone(&chain),
        Arc::clone(&store),
        PaymentVerifierConfig::from(&config.payment),
    );

    let questions: Arc<dyn QuestionSource> = match config.questions.source_url {
        Some(ref url) => Arc::new(HttpQuestionSource::new(url.clone(), &config.questions)?),
        None => Arc::new(FixedQuestionSource),
    };

    let minting = match config.minting.service_url {
        Some(ref url) => MintPolicy::with_primary(Arc::new(HttpMinter::new(
            url.clone(),
            &config.minting,
        )?)),
        None => MintPolicy::placeholder_only(),
    };

    let engine = SettlementEngine::new(
        Arc::clone(&store),
        verifier,
        ScoringEngine::new(config.scoring.clone()),
        questions,
        minting,
        config.questions.count,
    );

    let profiles = ProfileAdapter::new(
        chain,
        Arc::clone(&store),
        config.authority_pubkey.clone(),
        config.payment.treasury_address.clone(),
    );

    Ok(ApiState {
        engine: Arc::new(engine),
        profiles: Arc::new(profiles),
        store,
        price_millisol: config.payment.test_price_millisol,
        revenue_splits: config.revenue_splits,
        scoring: config.scoring.clone(),
    })
}
