//! Replay-protected verification of on-chain test payments.

use crate::chain::ChainClient;
use crate::config::PaymentConfig;
use crate::error::{Error, Result};
use crate::model::{millisol_to_lamports, PaymentSignatureRecord};
use crate::storage::Store;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a claimed payment was not accepted. Every variant is user-actionable
/// and distinguishable from a generic server failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentRejection {
    /// The signature already funded a test.
    #[error("payment signature has already been used")]
    SignatureReused,

    /// The cluster does not know the signature.
    #[error("payment transaction not found on-chain")]
    TransactionNotFound,

    /// The transaction executed but failed.
    #[error("payment transaction failed on-chain")]
    TransactionFailed,

    /// The fee payer is not the wallet the test is being created for.
    #[error("payment was sent by a different wallet")]
    PayerMismatch,

    /// The treasury received less than the tolerated minimum.
    #[error("payment amount too low: required at least {required} lamports, got {observed}")]
    InsufficientAmount {
        /// Minimum lamports the treasury must have received.
        required: u64,
        /// Lamports actually received.
        observed: u64,
    },
}

/// Configuration for payment verification.
#[derive(Debug, Clone)]
pub struct PaymentVerifierConfig {
    /// Treasury address that must receive the fee.
    pub treasury_address: String,
    /// Full test price in lamports.
    pub price_lamports: u64,
    /// Percentage of the price that must reach the treasury; the remainder
    /// absorbs network fee variance.
    pub tolerance_percent: u8,
}

impl From<&PaymentConfig> for PaymentVerifierConfig {
    fn from(config: &PaymentConfig) -> Self {
        Self {
            treasury_address: config.treasury_address.clone(),
            price_lamports: millisol_to_lamports(config.test_price_millisol),
            tolerance_percent: config.tolerance_percent,
        }
    }
}

impl PaymentVerifierConfig {
    /// Minimum lamports the treasury must have received.
    #[must_use]
    pub fn required_lamports(&self) -> u64 {
        self.price_lamports / 100 * u64::from(self.tolerance_percent)
    }
}

/// A payment that passed every check and has been recorded as used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// The consumed signature.
    pub signature: String,
    /// The paying wallet.
    pub payer: String,
    /// Lamports received by the treasury.
    pub lamports_received: u64,
}

/// Validates a claimed payment and consumes its signature.
pub struct PaymentVerifier {
    chain: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    config: PaymentVerifierConfig,
}

impl PaymentVerifier {
    /// Create a verifier over a chain oracle and a store.
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        config: PaymentVerifierConfig,
    ) -> Self {
        info!(
            "payment verifier initialized (treasury={}, price={} lamports, tolerance={}%)",
            config.treasury_address, config.price_lamports, config.tolerance_percent
        );
        Self {
            chain,
            store,
            config,
        }
    }

    /// Verify that `signature` is an unused, confirmed transfer of the test
    /// fee from `expected_payer` to the treasury, and consume it.
    ///
    /// Checks run in order; nothing is written until all of them pass, so a
    /// rejection never burns a legitimate signature. The final durable
    /// record is the point of no return: once written, the signature can
    /// never authorize another test. The storage insert is atomic on the
    /// signature key, so of two racing requests exactly one wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PaymentRejected`] with the specific reason, or
    /// [`Error::Chain`]/[`Error::Storage`] on oracle or persistence failure.
    pub async fn verify(&self, signature: &str, expected_payer: &str) -> Result<VerifiedPayment> {
        // Replay check first; absence only means not-yet-used.
        if self.store.is_signature_used(signature).await? {
            warn!("payment signature already used: {signature}");
            return Err(PaymentRejection::SignatureReused.into());
        }

        let transaction = self
            .chain
            .get_transaction(signature)
            .await?
            .ok_or_else(|| {
                warn!("payment transaction not found: {signature}");
                Error::from(PaymentRejection::TransactionNotFound)
            })?;

        if transaction.failed {
            warn!("payment transaction failed on-chain: {signature}");
            return Err(PaymentRejection::TransactionFailed.into());
        }

        match transaction.payer() {
            Some(payer) if payer == expected_payer => {}
            payer => {
                warn!(
                    "payment sender mismatch: expected {expected_payer}, got {:?}",
                    payer
                );
                return Err(PaymentRejection::PayerMismatch.into());
            }
        }

        let received = transaction
            .balance_change(&self.config.treasury_address)
            .unwrap_or(0)
            .max(0);
        let received = u64::try_from(received).unwrap_or(0);
        let required = self.config.required_lamports();
        if received < required {
            warn!(
                "insufficient payment for {signature}: required {required}, got {received}"
            );
            return Err(PaymentRejection::InsufficientAmount {
                required,
                observed: received,
            }
            .into());
        }

        // Point of no return. A concurrent request holding the same
        // signature loses here with a definitive rejection.
        let record = PaymentSignatureRecord {
            signature: signature.to_string(),
            wallet_address: expected_payer.to_string(),
            lamports: received,
        };
        if !self.store.record_payment_signature(&record).await? {
            warn!("lost signature race for {signature}");
            return Err(PaymentRejection::SignatureReused.into());
        }

        debug!(
            "payment verified: signature={signature} payer={expected_payer} lamports={received}"
        );

        Ok(VerifiedPayment {
            signature: signature.to_string(),
            payer: expected_payer.to_string(),
            lamports_received: received,
        })
    }
}
