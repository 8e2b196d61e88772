//! Domain types for the certification service.
//!
//! SOL amounts are carried internally as **millisol** (thousandths of a SOL,
//! `u64`) and converted to decimal only at the HTTP boundary. This keeps
//! aggregate accumulation exact; floating point never touches persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lamports per SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Lamports per millisol (one thousandth of a SOL).
pub const LAMPORTS_PER_MILLISOL: u64 = LAMPORTS_PER_SOL / 1_000;

/// Convert an internal millisol amount to a decimal SOL value for display.
#[must_use]
pub fn millisol_to_sol(millisol: u64) -> f64 {
    millisol as f64 / 1_000.0
}

/// Convert an internal millisol amount to lamports.
#[must_use]
pub fn millisol_to_lamports(millisol: u64) -> u64 {
    millisol * LAMPORTS_PER_MILLISOL
}

/// Tiered outcome classification derived from a test score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    /// Passing tier, score 70-79.
    Junior,
    /// Passing tier, score 80-89.
    Middle,
    /// Passing tier, score 90 and above.
    Senior,
    /// Below the lowest passing threshold.
    Failed,
}

impl Level {
    /// Whether this level represents a passing outcome.
    #[must_use]
    pub fn passed(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Junior => "Junior",
            Self::Middle => "Middle",
            Self::Senior => "Senior",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Three ordered category labels narrowing a test topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPath {
    /// Broad subject area.
    pub main_category: String,
    /// Narrower area within the main category.
    pub narrow_category: String,
    /// Specific topic the questions target.
    pub specific_category: String,
}

impl CategoryPath {
    /// The joined topic label used on results and certificates.
    #[must_use]
    pub fn topic(&self) -> String {
        format!(
            "{} > {} > {}",
            self.main_category, self.narrow_category, self.specific_category
        )
    }
}

/// A single multiple-choice question.
///
/// `correct_answer` is the index into `options` and must never reach the
/// question-reading client; use [`Test::sanitized`] for outbound views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Opaque question identifier.
    pub id: String,
    /// Prompt text.
    pub question: String,
    /// Ordered answer options.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_answer: usize,
    /// Points awarded for a correct answer.
    pub points: u32,
}

/// An immutable question set generated for one paid attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    /// Globally unique identifier; prefixed with the paying wallet for
    /// traceability.
    pub id: String,
    /// Wallet that paid for this attempt.
    pub wallet_address: String,
    /// Joined topic label.
    pub topic: String,
    /// Category labels the questions were generated from.
    #[serde(flatten)]
    pub categories: CategoryPath,
    /// Ordered question sequence.
    pub questions: Vec<Question>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Test {
    /// Build a new test for a paid attempt.
    #[must_use]
    pub fn new(
        wallet_address: &str,
        categories: CategoryPath,
        questions: Vec<Question>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{wallet_address}-{}", Uuid::new_v4()),
            wallet_address: wallet_address.to_string(),
            topic: categories.topic(),
            categories,
            questions,
            created_at,
        }
    }

    /// Maximum attainable score for this test.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    /// Client-facing view with correct answers stripped.
    #[must_use]
    pub fn sanitized(&self) -> SanitizedTest {
        SanitizedTest {
            id: self.id.clone(),
            wallet_address: self.wallet_address.clone(),
            topic: self.topic.clone(),
            categories: self.categories.clone(),
            questions: self
                .questions
                .iter()
                .map(|q| SanitizedQuestion {
                    id: q.id.clone(),
                    question: q.question.clone(),
                    options: q.options.clone(),
                })
                .collect(),
            created_at: self.created_at,
        }
    }
}

/// A question with the correct-answer index removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedQuestion {
    /// Opaque question identifier.
    pub id: String,
    /// Prompt text.
    pub question: String,
    /// Ordered answer options.
    pub options: Vec<String>,
}

/// A test with all correct-answer fields removed, safe to return to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedTest {
    /// Test identifier.
    pub id: String,
    /// Wallet that paid for this attempt.
    pub wallet_address: String,
    /// Joined topic label.
    pub topic: String,
    /// Category labels.
    #[serde(flatten)]
    pub categories: CategoryPath,
    /// Questions without answers.
    pub questions: Vec<SanitizedQuestion>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// The graded outcome of exactly one test submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// The graded test.
    pub test_id: String,
    /// Wallet the submission was made for.
    pub wallet_address: String,
    /// Joined topic label copied from the test.
    pub topic: String,
    /// Total score, 0-100.
    pub score: u32,
    /// Tier derived from the score.
    pub level: Level,
    /// Number of correctly answered questions.
    pub correct_answers: u32,
    /// Number of questions in the test.
    pub total_questions: u32,
    /// Maximum attainable score.
    pub total_points: u32,
    /// Reward in millisol; zero unless passed.
    pub reward_millisol: u64,
    /// Whether the score reached a passing tier.
    pub passed: bool,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
}

/// A credential issued for a passing test result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    /// Certificate identifier.
    pub id: String,
    /// Wallet the credential belongs to.
    pub wallet_address: String,
    /// Joined topic label.
    pub topic: String,
    /// Tier earned.
    pub level: Level,
    /// Score earned.
    pub score: u32,
    /// External token identifier, or a locally generated placeholder when the
    /// minting service was unavailable at settlement time.
    pub token_id: String,
    /// External metadata location.
    pub metadata_uri: String,
    /// Issuance timestamp.
    pub earned_at: DateTime<Utc>,
}

/// Durable aggregate counters for one wallet.
///
/// `success_rate` is always recomputed from the two counters and never
/// mutated independently of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Wallet address (key).
    pub wallet_address: String,
    /// Total tests attempted.
    pub total_tests: u64,
    /// Total certificates earned.
    pub total_certificates: u64,
    /// Derived `round(100 * certificates / tests)`, in percent.
    pub success_rate: u64,
    /// Total rewards earned, in millisol.
    pub total_earned_millisol: u64,
}

impl UserStats {
    /// Zeroed stats for a wallet not yet observed.
    #[must_use]
    pub fn zeroed(wallet_address: &str) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            total_tests: 0,
            total_certificates: 0,
            success_rate: 0,
            total_earned_millisol: 0,
        }
    }

    /// Fold one settled result into the counters.
    ///
    /// Counters only ever increase; the success rate is recomputed from the
    /// updated counters.
    pub fn apply_settlement(&mut self, passed: bool, reward_millisol: u64) {
        self.total_tests += 1;
        if passed {
            self.total_certificates += 1;
            self.total_earned_millisol += reward_millisol;
        }
        self.success_rate = success_rate(self.total_certificates, self.total_tests);
    }
}

/// `round(100 * certificates / tests)`, with zero tests mapping to zero.
#[must_use]
pub fn success_rate(certificates: u64, tests: u64) -> u64 {
    if tests == 0 {
        0
    } else {
        (100 * certificates + tests / 2) / tests
    }
}

/// A used-once marker binding a payment signature to the wallet and amount
/// it paid. Presence is definitive proof the payment already funded a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSignatureRecord {
    /// Transaction signature (key).
    pub signature: String,
    /// Paying wallet.
    pub wallet_address: String,
    /// Lamports observed at the treasury.
    pub lamports: u64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_categories() -> CategoryPath {
        CategoryPath {
            main_category: "Programming".to_string(),
            narrow_category: "Rust".to_string(),
            specific_category: "Ownership".to_string(),
        }
    }

    #[test]
    fn topic_joins_categories_in_order() {
        assert_eq!(sample_categories().topic(), "Programming > Rust > Ownership");
    }

    #[test]
    fn test_id_encodes_wallet() {
        let test = Test::new("Abc123", sample_categories(), vec![], Utc::now());
        assert!(test.id.starts_with("Abc123-"));
    }

    #[test]
    fn sanitized_view_strips_answers() {
        let questions = vec![Question {
            id: "q1".to_string(),
            question: "2 + 2?".to_string(),
            options: vec!["3".to_string(), "4".to_string()],
            correct_answer: 1,
            points: 10,
        }];
        let test = Test::new("Abc123", sample_categories(), questions, Utc::now());

        let json = serde_json::to_value(test.sanitized()).unwrap();
        let question = &json["questions"][0];
        assert!(question.get("correctAnswer").is_none());
        assert!(question.get("points").is_none());
        assert_eq!(question["options"][1], "4");
    }

    #[test]
    fn success_rate_rounds_to_nearest_percent() {
        assert_eq!(success_rate(0, 0), 0);
        assert_eq!(success_rate(1, 2), 50);
        assert_eq!(success_rate(1, 3), 33);
        assert_eq!(success_rate(2, 3), 67);
        assert_eq!(success_rate(1, 8), 13);
        assert_eq!(success_rate(3, 3), 100);
    }

    #[test]
    fn apply_settlement_updates_all_counters() {
        let mut stats = UserStats::zeroed("Abc123");
        stats.total_tests = 2;
        stats.total_certificates = 1;
        stats.success_rate = 50;
        stats.total_earned_millisol = 100;

        stats.apply_settlement(true, 150);

        assert_eq!(stats.total_tests, 3);
        assert_eq!(stats.total_certificates, 2);
        assert_eq!(stats.success_rate, 67);
        assert_eq!(stats.total_earned_millisol, 250);
    }

    #[test]
    fn failed_settlement_only_counts_the_attempt() {
        let mut stats = UserStats::zeroed("Abc123");
        stats.apply_settlement(false, 0);

        assert_eq!(stats.total_tests, 1);
        assert_eq!(stats.total_certificates, 0);
        assert_eq!(stats.success_rate, 0);
        assert_eq!(stats.total_earned_millisol, 0);
    }

    #[test]
    fn millisol_conversions() {
        assert_eq!(millisol_to_lamports(150), 150_000_000);
        assert!((millisol_to_sol(150) - 0.15).abs() < f64::EPSILON);
        assert!((millisol_to_sol(0) - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn level_passed() {
        assert!(Level::Junior.passed());
        assert!(Level::Middle.passed());
        assert!(Level::Senior.passed());
        assert!(!Level::Failed.passed());
    }
}
