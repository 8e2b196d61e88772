//! Settlement pipeline: payment to test, submission to durable outcome.
//!
//! Test creation and submission each coordinate several independent remote
//! calls (chain lookup, question generation, minting, persistence) that must
//! behave as one logical transaction without a rollback mechanism. The
//! ordering rules here are what make that safe:
//!
//! - payment is verified, and its signature consumed, before the question
//!   generation cost is incurred;
//! - a result is durable before a certificate is attempted, and both before
//!   the wallet counters move, so a crash mid-sequence never inflates
//!   counters for work that was not recorded;
//! - a minting outage degrades to a placeholder token instead of failing
//!   the submission, because a lost mint is reconcilable and a lost pass
//!   is not.

use crate::error::{Error, Result};
use crate::minting::MintPolicy;
use crate::model::{CategoryPath, Certificate, Test, TestResult};
use crate::payment::PaymentVerifier;
use crate::questions::QuestionSource;
use crate::scoring::ScoringEngine;
use crate::storage::Store;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Coordinates payment verification, grading, credential issuance, and
/// aggregate updates.
pub struct SettlementEngine {
    store: Arc<dyn Store>,
    verifier: PaymentVerifier,
    scoring: ScoringEngine,
    questions: Arc<dyn QuestionSource>,
    minting: MintPolicy,
    question_count: usize,
}

impl SettlementEngine {
    /// Wire the pipeline over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        verifier: PaymentVerifier,
        scoring: ScoringEngine,
        questions: Arc<dyn QuestionSource>,
        minting: MintPolicy,
        question_count: usize,
    ) -> Self {
        Self {
            store,
            verifier,
            scoring,
            questions,
            minting,
            question_count,
        }
    }

    /// Create a test for a paid attempt.
    ///
    /// Payment is verified first and exactly once; its signature is consumed
    /// before question generation runs, so an unpaid request never reaches
    /// the generator and a paid one can never fund a second test.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed wallet,
    /// [`Error::PaymentRejected`] when verification fails, and dependency or
    /// storage errors from the downstream steps.
    pub async fn create_test(
        &self,
        wallet: &str,
        categories: CategoryPath,
        payment_signature: &str,
    ) -> Result<Test> {
        if bs58::decode(wallet).into_vec().is_err() {
            return Err(Error::Validation(format!(
                "wallet is not valid base58: {wallet}"
            )));
        }

        let payment = self.verifier.verify(payment_signature, wallet).await?;

        let questions = self
            .questions
            .generate(&categories, self.question_count)
            .await?;

        let test = Test::new(wallet, categories, questions, Utc::now());
        self.store.put_test(&test).await?;

        info!(
            "test {} created for {wallet} ({} lamports received)",
            test.id, payment.lamports_received
        );

        Ok(test)
    }

    /// Grade a submission and settle its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown test,
    /// [`Error::AlreadySettled`] when the test already has a recorded
    /// result, and a storage error when the result itself cannot be
    /// persisted. Certificate and stats persistence failures after the
    /// result is durable are logged, not returned.
    pub async fn submit(
        &self,
        test_id: &str,
        wallet: &str,
        answers: &[usize],
    ) -> Result<TestResult> {
        let test = self
            .store
            .get_test(test_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("test {test_id}")))?;

        if self.store.get_test_result(test_id).await?.is_some() {
            return Err(Error::AlreadySettled(test_id.to_string()));
        }

        let grade = self.scoring.grade(&test, answers);
        let result = grade.into_result(&test, wallet, Utc::now());

        // The result write is the settlement's commit point; reward and
        // certificate are never derived from an unpersisted result.
        self.store.put_test_result(&result).await?;

        if result.passed {
            let outcome = self
                .minting
                .mint(wallet, &test.topic, result.level, result.score)
                .await;
            if outcome.degraded {
                warn!(
                    "certificate for test {test_id} carries a placeholder token; \
                     reconcile once the minting service recovers"
                );
            }

            let certificate = Certificate {
                id: Uuid::new_v4().to_string(),
                wallet_address: wallet.to_string(),
                topic: test.topic.clone(),
                level: result.level,
                score: result.score,
                token_id: outcome.token.token_id,
                metadata_uri: outcome.token.metadata_uri,
                earned_at: result.completed_at,
            };
            if let Err(e) = self.store.put_certificate(&certificate).await {
                warn!(
                    "result for test {test_id} is recorded but its certificate was not: {e}; \
                     needs out-of-band reconciliation"
                );
            }
        }

        match self
            .store
            .record_settlement(wallet, result.passed, result.reward_millisol)
            .await
        {
            Ok(stats) => info!(
                "settled test {test_id} for {wallet}: score={} level={} passed={} \
                 (tests={}, certificates={}, rate={}%)",
                result.score,
                result.level,
                result.passed,
                stats.total_tests,
                stats.total_certificates,
                stats.success_rate
            ),
            Err(e) => warn!(
                "result for test {test_id} is recorded but stats were not updated: {e}; \
                 needs out-of-band reconciliation"
            ),
        }

        Ok(result)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::chain::{AccountInfo, ChainClient, TransactionInfo};
    use crate::minting::{CertificateMinter, MintedToken};
    use crate::model::Level;
    use crate::payment::{PaymentRejection, PaymentVerifierConfig};
    use crate::questions::FixedQuestionSource;
    use crate::scoring::ScoringConfig;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;

    // Valid base58 strings.
    const WALLET: &str = "Abc123";
    const TREASURY: &str = "Treasury111";
    const PRICE: u64 = 150_000_000;

    struct StubChain {
        transactions: HashMap<String, TransactionInfo>,
    }

    #[async_trait]
    impl ChainClient for StubChain {
        async fn get_transaction(&self, signature: &str) -> Result<Option<TransactionInfo>> {
            Ok(self.transactions.get(signature).cloned())
        }

        async fn get_account(&self, _address: &str) -> Result<Option<AccountInfo>> {
            Ok(None)
        }
    }

    struct FailingMinter;

    #[async_trait]
    impl CertificateMinter for FailingMinter {
        async fn mint(
            &self,
            _wallet: &str,
            _topic: &str,
            _level: Level,
            _score: u32,
        ) -> Result<MintedToken> {
            Err(Error::Dependency("mint service down".to_string()))
        }
    }

    fn paid_transfer() -> TransactionInfo {
        TransactionInfo {
            account_keys: vec![WALLET.to_string(), TREASURY.to_string()],
            pre_balances: vec![PRICE * 2, 0],
            post_balances: vec![PRICE, PRICE],
            failed: false,
        }
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        signatures: Vec<&str>,
        minting: MintPolicy,
    ) -> SettlementEngine {
        let chain = Arc::new(StubChain {
            transactions: signatures
                .into_iter()
                .map(|s| (s.to_string(), paid_transfer()))
                .collect(),
        });
        let verifier = PaymentVerifier::new(
            chain,
            Arc::clone(&store) as Arc<dyn Store>,
            PaymentVerifierConfig {
                treasury_address: TREASURY.to_string(),
                price_lamports: PRICE,
                tolerance_percent: 95,
            },
        );
        SettlementEngine::new(
            store,
            verifier,
            ScoringEngine::new(ScoringConfig::default()),
            Arc::new(FixedQuestionSource),
            minting,
            10,
        )
    }

    fn categories() -> CategoryPath {
        CategoryPath {
            main_category: "Programming".into(),
            narrow_category: "Rust".into(),
            specific_category: "Async".into(),
        }
    }

    fn all_correct(test: &Test) -> Vec<usize> {
        test.questions.iter().map(|q| q.correct_answer).collect()
    }

    #[tokio::test]
    async fn create_test_verifies_payment_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1"],
            MintPolicy::placeholder_only(),
        );

        let test = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .expect("created");

        assert_eq!(test.questions.len(), 10);
        assert!(store.get_test(&test.id).await.unwrap().is_some());
        assert!(store.is_signature_used("sig-1").await.unwrap());
    }

    #[tokio::test]
    async fn create_test_rejects_unpaid_request_before_generation() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(Arc::clone(&store), vec![], MintPolicy::placeholder_only());

        let result = engine.create_test(WALLET, categories(), "sig-x").await;
        assert!(matches!(
            result,
            Err(Error::PaymentRejected(PaymentRejection::TransactionNotFound))
        ));
    }

    #[tokio::test]
    async fn create_test_rejects_malformed_wallet() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store, vec!["sig-1"], MintPolicy::placeholder_only());

        let result = engine
            .create_test("not base58 0OIl", categories(), "sig-1")
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn same_signature_cannot_fund_two_tests() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store, vec!["sig-1"], MintPolicy::placeholder_only());

        engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .expect("first");
        let second = engine.create_test(WALLET, categories(), "sig-1").await;
        assert!(matches!(
            second,
            Err(Error::PaymentRejected(PaymentRejection::SignatureReused))
        ));
    }

    #[tokio::test]
    async fn passing_submission_settles_result_certificate_and_stats() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1"],
            MintPolicy::placeholder_only(),
        );

        let test = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        let result = engine
            .submit(&test.id, WALLET, &all_correct(&test))
            .await
            .expect("settled");

        assert_eq!(result.score, 100);
        assert_eq!(result.level, Level::Senior);
        assert!(result.passed);
        assert_eq!(result.reward_millisol, 150);

        let stored = store.get_test_result(&test.id).await.unwrap().unwrap();
        assert_eq!(stored, result);

        let certificates = store.certificates_for_wallet(WALLET).await.unwrap();
        assert_eq!(certificates.len(), 1);
        assert_eq!(certificates[0].level, Level::Senior);
        assert_eq!(certificates[0].score, 100);

        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.total_certificates, 1);
        assert_eq!(stats.success_rate, 100);
        assert_eq!(stats.total_earned_millisol, 150);
    }

    #[tokio::test]
    async fn failing_submission_settles_without_certificate() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1"],
            MintPolicy::placeholder_only(),
        );

        let test = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        let result = engine.submit(&test.id, WALLET, &[]).await.expect("settled");

        assert_eq!(result.score, 0);
        assert_eq!(result.level, Level::Failed);
        assert!(!result.passed);
        assert_eq!(result.reward_millisol, 0);

        assert!(store
            .certificates_for_wallet(WALLET)
            .await
            .unwrap()
            .is_empty());

        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.total_certificates, 0);
        assert_eq!(stats.success_rate, 0);
        assert_eq!(stats.total_earned_millisol, 0);
    }

    #[tokio::test]
    async fn unknown_test_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store, vec![], MintPolicy::placeholder_only());

        let result = engine.submit("missing", WALLET, &[]).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn resubmission_is_rejected_as_already_settled() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1"],
            MintPolicy::placeholder_only(),
        );

        let test = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        engine
            .submit(&test.id, WALLET, &all_correct(&test))
            .await
            .unwrap();

        let again = engine.submit(&test.id, WALLET, &all_correct(&test)).await;
        assert!(matches!(again, Err(Error::AlreadySettled(_))));

        // Aggregates were not double-counted.
        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.total_certificates, 1);
    }

    #[tokio::test]
    async fn minting_outage_never_loses_a_pass() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1"],
            MintPolicy::with_primary(Arc::new(FailingMinter)),
        );

        let test = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        let result = engine
            .submit(&test.id, WALLET, &all_correct(&test))
            .await
            .expect("settled despite minting outage");

        assert!(result.passed);
        let certificates = store.certificates_for_wallet(WALLET).await.unwrap();
        assert_eq!(certificates.len(), 1);
        assert!(certificates[0].token_id.starts_with("MOCK-"));

        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!(stats.total_certificates, 1);
        assert_eq!(stats.total_earned_millisol, 150);
    }

    #[tokio::test]
    async fn stats_accumulate_across_settlements() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1", "sig-2", "sig-3"],
            MintPolicy::placeholder_only(),
        );

        // Two prior settlements: one pass, one fail.
        let first = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        engine
            .submit(&first.id, WALLET, &all_correct(&first))
            .await
            .unwrap();
        let second = engine
            .create_test(WALLET, categories(), "sig-2")
            .await
            .unwrap();
        engine.submit(&second.id, WALLET, &[]).await.unwrap();

        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!((stats.total_tests, stats.total_certificates), (2, 1));
        assert_eq!(stats.success_rate, 50);

        // A third, passing settlement: 2 certificates over 3 tests is 67%.
        let third = engine
            .create_test(WALLET, categories(), "sig-3")
            .await
            .unwrap();
        engine
            .submit(&third.id, WALLET, &all_correct(&third))
            .await
            .unwrap();

        let stats = store.get_user_stats(WALLET).await.unwrap().unwrap();
        assert_eq!((stats.total_tests, stats.total_certificates), (3, 2));
        assert_eq!(stats.success_rate, 67);
    }

    #[tokio::test]
    async fn certificate_exists_iff_result_passed() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(
            Arc::clone(&store),
            vec!["sig-1", "sig-2"],
            MintPolicy::placeholder_only(),
        );

        let pass = engine
            .create_test(WALLET, categories(), "sig-1")
            .await
            .unwrap();
        let pass_result = engine
            .submit(&pass.id, WALLET, &all_correct(&pass))
            .await
            .unwrap();

        let fail = engine
            .create_test(WALLET, categories(), "sig-2")
            .await
            .unwrap();
        let fail_result = engine.submit(&fail.id, WALLET, &[]).await.unwrap();

        let certificates = store.certificates_for_wallet(WALLET).await.unwrap();
        assert_eq!(certificates.len(), 1);
        let certificate = &certificates[0];
        assert_eq!(certificate.wallet_address, pass_result.wallet_address);
        assert_eq!(certificate.topic, pass_result.topic);
        assert_eq!(certificate.level, pass_result.level);
        assert_eq!(certificate.score, pass_result.score);
        assert!(!fail_result.passed);
    }
}
