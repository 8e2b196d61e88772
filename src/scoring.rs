//! Deterministic grading and leveling of submitted answers.
//!
//! Grading is a pure function of the test and the submitted indices: no I/O,
//! no randomness, no clock. The level/reward thresholds are configuration,
//! not control flow, so deployments can retune tiers without touching the
//! grader.

use crate::error::{Error, Result};
use crate::model::{Level, Test, TestResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the leveling table: scores at or above `min_score` earn
/// `level` and `reward_millisol`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBand {
    /// Inclusive lower score bound for this band.
    pub min_score: u32,
    /// Level earned within this band.
    pub level: Level,
    /// Reward in millisol for this band.
    pub reward_millisol: u64,
}

/// Leveling table, ordered descending by threshold. Scores below the lowest
/// threshold fall through to `Failed` with no reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Bands evaluated from highest threshold to lowest.
    pub bands: Vec<ScoreBand>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                ScoreBand {
                    min_score: 90,
                    level: Level::Senior,
                    reward_millisol: 150,
                },
                ScoreBand {
                    min_score: 80,
                    level: Level::Middle,
                    reward_millisol: 120,
                },
                ScoreBand {
                    min_score: 70,
                    level: Level::Junior,
                    reward_millisol: 100,
                },
            ],
        }
    }
}

impl ScoringConfig {
    /// Validate that thresholds are strictly descending and no band is the
    /// `Failed` catch-all (which is implicit).
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first violation.
    pub fn validate(&self) -> Result<()> {
        for window in self.bands.windows(2) {
            if window[0].min_score <= window[1].min_score {
                return Err(Error::Config(format!(
                    "scoring bands must be strictly descending: {} then {}",
                    window[0].min_score, window[1].min_score
                )));
            }
        }
        if self.bands.iter().any(|b| b.level == Level::Failed) {
            return Err(Error::Config(
                "Failed is the implicit catch-all and cannot appear as a band".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of grading one submission, before it is stamped and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grade {
    /// Total score.
    pub score: u32,
    /// Number of correct answers.
    pub correct_answers: u32,
    /// Number of questions graded.
    pub total_questions: u32,
    /// Maximum attainable score.
    pub total_points: u32,
    /// Level earned.
    pub level: Level,
    /// Reward earned, in millisol.
    pub reward_millisol: u64,
    /// Whether the level is a passing one.
    pub passed: bool,
}

/// Grades submissions against a leveling table.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
}

impl ScoringEngine {
    /// Create an engine over a validated leveling table.
    #[must_use]
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Grade submitted answer indices against a test.
    ///
    /// Question `i` earns its point value when `answers[i]` equals the stored
    /// correct index; a wrong, missing, or out-of-range index earns zero.
    /// There is no partial credit.
    #[must_use]
    pub fn grade(&self, test: &Test, answers: &[usize]) -> Grade {
        let mut score = 0u32;
        let mut correct_answers = 0u32;

        for (index, question) in test.questions.iter().enumerate() {
            if answers.get(index) == Some(&question.correct_answer) {
                score += question.points;
                correct_answers += 1;
            }
        }

        let (level, reward_millisol) = self.classify(score);
        Grade {
            score,
            correct_answers,
            total_questions: test.questions.len() as u32,
            total_points: test.total_points(),
            level,
            reward_millisol,
            passed: level.passed(),
        }
    }

    /// Map a score to its level and reward using the band table.
    #[must_use]
    pub fn classify(&self, score: u32) -> (Level, u64) {
        self.config
            .bands
            .iter()
            .find(|band| score >= band.min_score)
            .map_or((Level::Failed, 0), |band| {
                (band.level, band.reward_millisol)
            })
    }
}

impl Grade {
    /// Stamp this grade into a persistable result.
    #[must_use]
    pub fn into_result(
        self,
        test: &Test,
        wallet_address: &str,
        completed_at: DateTime<Utc>,
    ) -> TestResult {
        TestResult {
            test_id: test.id.clone(),
            wallet_address: wallet_address.to_string(),
            topic: test.topic.clone(),
            score: self.score,
            level: self.level,
            correct_answers: self.correct_answers,
            total_questions: self.total_questions,
            total_points: self.total_points,
            reward_millisol: self.reward_millisol,
            passed: self.passed,
            completed_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{CategoryPath, Question};

    fn engine() -> ScoringEngine {
        ScoringEngine::new(ScoringConfig::default())
    }

    fn test_with_answers(correct: &[usize]) -> Test {
        let questions = correct
            .iter()
            .enumerate()
            .map(|(i, &answer)| Question {
                id: format!("q{i}"),
                question: format!("question {i}"),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer: answer,
                points: 10,
            })
            .collect();
        Test::new(
            "Abc123",
            CategoryPath {
                main_category: "Programming".into(),
                narrow_category: "Rust".into(),
                specific_category: "Ownership".into(),
            },
            questions,
            Utc::now(),
        )
    }

    #[test]
    fn classify_matches_table_at_every_boundary() {
        let engine = engine();
        assert_eq!(engine.classify(69), (Level::Failed, 0));
        assert_eq!(engine.classify(70), (Level::Junior, 100));
        assert_eq!(engine.classify(79), (Level::Junior, 100));
        assert_eq!(engine.classify(80), (Level::Middle, 120));
        assert_eq!(engine.classify(89), (Level::Middle, 120));
        assert_eq!(engine.classify(90), (Level::Senior, 150));
        assert_eq!(engine.classify(100), (Level::Senior, 150));
        assert_eq!(engine.classify(0), (Level::Failed, 0));
    }

    #[test]
    fn nine_of_ten_correct_scores_ninety_senior() {
        let test = test_with_answers(&[0, 1, 2, 3, 0, 1, 2, 3, 1, 1]);
        let grade = engine().grade(&test, &[0, 1, 2, 3, 0, 1, 2, 3, 0, 1]);

        assert_eq!(grade.correct_answers, 9);
        assert_eq!(grade.score, 90);
        assert_eq!(grade.level, Level::Senior);
        assert!(grade.passed);
        assert_eq!(grade.reward_millisol, 150);
    }

    #[test]
    fn grading_is_index_exact() {
        let test = test_with_answers(&[0, 1, 2]);

        // A correct index scores regardless of the other questions.
        let grade = engine().grade(&test, &[0, 0, 0]);
        assert_eq!(grade.correct_answers, 1);
        assert_eq!(grade.score, 10);

        // Missing trailing answers score zero.
        let grade = engine().grade(&test, &[0]);
        assert_eq!(grade.correct_answers, 1);

        // Out-of-range indices score zero rather than wrapping.
        let grade = engine().grade(&test, &[0, 1, 99]);
        assert_eq!(grade.correct_answers, 2);
        assert_eq!(grade.score, 20);
    }

    #[test]
    fn empty_submission_fails() {
        let test = test_with_answers(&[0, 1, 2, 3, 0, 1, 2, 3, 1, 1]);
        let grade = engine().grade(&test, &[]);

        assert_eq!(grade.score, 0);
        assert_eq!(grade.level, Level::Failed);
        assert!(!grade.passed);
        assert_eq!(grade.reward_millisol, 0);
        assert_eq!(grade.total_points, 100);
        assert_eq!(grade.total_questions, 10);
    }

    #[test]
    fn grading_is_deterministic() {
        let test = test_with_answers(&[3, 2, 1, 0]);
        let answers = [3, 2, 0, 0];
        let first = engine().grade(&test, &answers);
        let second = engine().grade(&test, &answers);
        assert_eq!(first, second);
    }

    #[test]
    fn config_rejects_non_descending_bands() {
        let config = ScoringConfig {
            bands: vec![
                ScoreBand {
                    min_score: 70,
                    level: Level::Junior,
                    reward_millisol: 100,
                },
                ScoreBand {
                    min_score: 90,
                    level: Level::Senior,
                    reward_millisol: 150,
                },
            ],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_rejects_explicit_failed_band() {
        let config = ScoringConfig {
            bands: vec![ScoreBand {
                min_score: 0,
                level: Level::Failed,
                reward_millisol: 0,
            }],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(ScoringConfig::default().validate().is_ok());
    }
}
