//! HTTP/JSON surface.
//!
//! Thin boundary over the settlement engine and profile adapter: request
//! validation, error-to-status mapping, and millisol-to-decimal conversion
//! happen here and nowhere else.

use crate::chain::{ProfileAdapter, ProfileSource, RegistryView, SkillRecord, PROGRAM_ID};
use crate::config::{HttpConfig, RevenueSplits};
use crate::error::Error;
use crate::model::{
    millisol_to_sol, Certificate, SanitizedTest, TestResult, UserStats,
};
use crate::scoring::ScoringConfig;
use crate::settlement::SettlementEngine;
use crate::storage::Store;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    /// Settlement pipeline.
    pub engine: Arc<SettlementEngine>,
    /// Profile and registry reads.
    pub profiles: Arc<ProfileAdapter>,
    /// Direct store access for read endpoints.
    pub store: Arc<dyn Store>,
    /// Test price in millisol, for responses and pool statistics.
    pub price_millisol: u64,
    /// Reporting-only revenue splits.
    pub revenue_splits: RevenueSplits,
    /// Leveling table, for reporting reward tiers.
    pub scoring: ScoringConfig,
}

/// Error shape returned to clients, mapped onto HTTP statuses.
enum AppError {
    BadRequest(String),
    PaymentRequired(String),
    NotFound(String),
    Conflict(String),
    Internal(Error),
}

impl From<Error> for AppError {
    fn from(error: Error) -> Self {
        match error {
            Error::Validation(msg) => Self::BadRequest(msg),
            Error::PaymentRejected(rejection) => {
                Self::PaymentRequired(format!("Payment verification failed: {rejection}."))
            }
            Error::NotFound(msg) => Self::NotFound(msg),
            Error::AlreadySettled(msg) => Self::Conflict(format!("test already settled: {msg}")),
            other => Self::Internal(other),
        }
    }
}

/// A 402 with enough context for the caller to act on.
fn payment_required(rejection: &crate::payment::PaymentRejection, price_millisol: u64) -> AppError {
    AppError::PaymentRequired(format!(
        "Payment verification failed: {rejection}. Please complete the {} SOL payment to the treasury and retry with the transaction signature.",
        millisol_to_sol(price_millisol)
    ))
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            Self::PaymentRequired(msg) => (StatusCode::PAYMENT_REQUIRED, "PAYMENT_REQUIRED", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "ALREADY_SETTLED", msg),
            Self::Internal(error) => {
                error!("internal error: {error}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "internal server error".to_string(),
                )
            }
        };
        (
            status,
            Json(serde_json::json!({ "error": { "code": code, "message": message } })),
        )
            .into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTestRequest {
    wallet_address: String,
    main_category: String,
    narrow_category: String,
    specific_category: String,
    payment_signature: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTestResponse {
    test: SanitizedTest,
    payment_required: bool,
    amount: f64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest {
    wallet_address: String,
    answers: Vec<usize>,
}

/// A test result with the reward rendered as decimal SOL.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TestResultView {
    test_id: String,
    wallet_address: String,
    topic: String,
    score: u32,
    level: crate::model::Level,
    correct_answers: u32,
    total_questions: u32,
    total_points: u32,
    sol_reward: f64,
    passed: bool,
    completed_at: DateTime<Utc>,
}

impl From<TestResult> for TestResultView {
    fn from(result: TestResult) -> Self {
        Self {
            test_id: result.test_id,
            wallet_address: result.wallet_address,
            topic: result.topic,
            score: result.score,
            level: result.level,
            correct_answers: result.correct_answers,
            total_questions: result.total_questions,
            total_points: result.total_points,
            sol_reward: millisol_to_sol(result.reward_millisol),
            passed: result.passed,
            completed_at: result.completed_at,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserStatsView {
    wallet_address: String,
    total_tests: u64,
    total_certificates: u64,
    success_rate: u64,
    total_sol_earned: f64,
    certificates: Vec<Certificate>,
}

impl UserStatsView {
    fn new(stats: UserStats, certificates: Vec<Certificate>) -> Self {
        Self {
            wallet_address: stats.wallet_address,
            total_tests: stats.total_tests,
            total_certificates: stats.total_certificates,
            success_rate: stats.success_rate,
            total_sol_earned: millisol_to_sol(stats.total_earned_millisol),
            certificates,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileView {
    owner: String,
    skill_score: u64,
    total_tests: u64,
    total_certificates: u64,
    total_sol_earned: f64,
    success_rate: u64,
    skills: Vec<SkillRecord>,
    source: ProfileSource,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    exists: bool,
    pda: String,
    profile: ProfileView,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegistryResponse {
    pda: String,
    registry: RegistryView,
    program_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifySkillRequest {
    wallet_address: Option<String>,
    skill_id: Option<String>,
    min_score: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifySkillResponse {
    verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    skill: Option<SkillRecord>,
    message: String,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now(),
    }))
}

async fn create_test(
    State(state): State<ApiState>,
    Json(request): Json<CreateTestRequest>,
) -> Result<impl IntoResponse, AppError> {
    let categories = crate::model::CategoryPath {
        main_category: request.main_category,
        narrow_category: request.narrow_category,
        specific_category: request.specific_category,
    };

    let test = state
        .engine
        .create_test(
            &request.wallet_address,
            categories,
            &request.payment_signature,
        )
        .await
        .map_err(|e| match e {
            Error::PaymentRejected(rejection) => payment_required(&rejection, state.price_millisol),
            other => AppError::from(other),
        })?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTestResponse {
            test: test.sanitized(),
            payment_required: true,
            amount: millisol_to_sol(state.price_millisol),
        }),
    ))
}

async fn get_test(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<SanitizedTest>, AppError> {
    let test = state
        .store
        .get_test(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("test {id}")))?;
    Ok(Json(test.sanitized()))
}

async fn submit_test(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<SubmitRequest>,
) -> Result<Json<TestResultView>, AppError> {
    let result = state
        .engine
        .submit(&id, &request.wallet_address, &request.answers)
        .await?;
    Ok(Json(result.into()))
}

async fn user_stats(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
) -> Result<Json<UserStatsView>, AppError> {
    let stats = state
        .store
        .get_user_stats(&wallet)
        .await?
        .unwrap_or_else(|| UserStats::zeroed(&wallet));
    let certificates = state.store.certificates_for_wallet(&wallet).await?;
    Ok(Json(UserStatsView::new(stats, certificates)))
}

async fn chain_profile(
    State(state): State<ApiState>,
    Path(wallet): Path<String>,
) -> Result<Json<ProfileResponse>, AppError> {
    let pda = state.profiles.profile_address(&wallet)?;
    let exists = state.profiles.profile_exists(&wallet).await?;
    let profile = state.profiles.get_profile(&wallet).await?;

    let message = match profile.source {
        ProfileSource::OnChainUndecodable => {
            "On-chain profile found; account layout not yet decodable".to_string()
        }
        ProfileSource::Derived if exists => "Profile derived from recorded results".to_string(),
        ProfileSource::Derived => "No on-chain profile yet".to_string(),
    };

    Ok(Json(ProfileResponse {
        exists,
        pda,
        profile: ProfileView {
            owner: profile.owner,
            skill_score: profile.skill_score,
            total_tests: profile.total_tests,
            total_certificates: profile.total_certificates,
            total_sol_earned: millisol_to_sol(profile.total_earned_millisol),
            success_rate: profile.success_rate,
            skills: profile.skills,
            source: profile.source,
        },
        message,
    }))
}

async fn chain_registry(
    State(state): State<ApiState>,
) -> Result<Json<RegistryResponse>, AppError> {
    let registry = state.profiles.get_registry().await?;
    Ok(Json(RegistryResponse {
        pda: state.profiles.registry_address(),
        registry,
        program_id: PROGRAM_ID.to_string(),
    }))
}

async fn verify_skill(
    State(state): State<ApiState>,
    Json(request): Json<VerifySkillRequest>,
) -> Result<Json<VerifySkillResponse>, AppError> {
    let wallet = request
        .wallet_address
        .ok_or_else(|| Error::Validation("walletAddress is required".to_string()))?;
    let skill_id = request
        .skill_id
        .ok_or_else(|| Error::Validation("skillId is required".to_string()))?;

    let profile = state.profiles.get_profile(&wallet).await?;
    let Some(skill) = profile.skills.into_iter().find(|s| s.skill_id == skill_id) else {
        return Ok(Json(VerifySkillResponse {
            verified: false,
            skill: None,
            message: "wallet does not hold this skill".to_string(),
        }));
    };

    let (verified, message) = match request.min_score {
        Some(min) if skill.score < min => (
            false,
            format!("skill score {} is below required {min}", skill.score),
        ),
        _ => (true, "skill verified".to_string()),
    };

    Ok(Json(VerifySkillResponse {
        verified,
        skill: Some(skill),
        message,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolStatsResponse {
    pool_balance_sol: f64,
    revenue: RevenueBreakdown,
    rewards_paid_sol: f64,
    users: PoolUsers,
    revenue_percentages: RevenueSplits,
    reward_tiers_sol: Vec<RewardTier>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RevenueBreakdown {
    total_sol: f64,
    failed_tests_sol: f64,
    ads_sol: f64,
    partnerships_sol: f64,
    other_sol: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PoolUsers {
    active: u64,
    total_tests: u64,
    total_certificates: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RewardTier {
    level: crate::model::Level,
    min_score: u32,
    reward_sol: f64,
}

async fn pool_stats(State(state): State<ApiState>) -> Result<Json<PoolStatsResponse>, AppError> {
    let all_stats = state.store.all_user_stats().await?;

    let mut total_tests = 0u64;
    let mut total_certificates = 0u64;
    let mut rewards_paid_millisol = 0u64;
    let mut active = 0u64;
    for stats in &all_stats {
        total_tests += stats.total_tests;
        total_certificates += stats.total_certificates;
        rewards_paid_millisol += stats.total_earned_millisol;
        if stats.total_tests > 0 {
            active += 1;
        }
    }

    // Failed-test fees are the one stream observable from settlement data;
    // the remaining streams are estimated from the configured split ratios.
    let splits = state.revenue_splits;
    let failed_tests = total_tests.saturating_sub(total_certificates);
    let failed_revenue_sol =
        failed_tests as f64 * millisol_to_sol(state.price_millisol);
    let per_point = if splits.failed_tests == 0 {
        0.0
    } else {
        failed_revenue_sol / f64::from(splits.failed_tests)
    };
    let ads_sol = per_point * f64::from(splits.ads);
    let partnerships_sol = per_point * f64::from(splits.partnerships);
    let other_sol = per_point * f64::from(splits.other);
    let total_sol = failed_revenue_sol + ads_sol + partnerships_sol + other_sol;
    let rewards_paid_sol = millisol_to_sol(rewards_paid_millisol);

    let reward_tiers_sol = state
        .scoring
        .bands
        .iter()
        .map(|band| RewardTier {
            level: band.level,
            min_score: band.min_score,
            reward_sol: millisol_to_sol(band.reward_millisol),
        })
        .collect();

    Ok(Json(PoolStatsResponse {
        pool_balance_sol: total_sol - rewards_paid_sol,
        revenue: RevenueBreakdown {
            total_sol,
            failed_tests_sol: failed_revenue_sol,
            ads_sol,
            partnerships_sol,
            other_sol,
        },
        rewards_paid_sol,
        users: PoolUsers {
            active,
            total_tests,
            total_certificates,
        },
        revenue_percentages: splits,
        reward_tiers_sol,
    }))
}

/// Build the service router.
#[must_use]
pub fn router(state: ApiState, config: &HttpConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tests", post(create_test))
        .route("/tests/{id}", get(get_test))
        .route("/tests/{id}/submit", post(submit_test))
        .route("/users/{wallet}/stats", get(user_stats))
        .route("/chain/profile/{wallet}", get(chain_profile))
        .route("/chain/registry", get(chain_registry))
        .route("/chain/verify-skill", post(verify_skill))
        .route("/pool/stats", get(pool_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.request_timeout_secs,
        )))
        .layer(RequestBodyLimitLayer::new(config.body_limit_kb * 1024))
}

/// Serve the API until the shutdown signal flips.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run_server(
    config: &HttpConfig,
    state: ApiState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> crate::Result<()> {
    let app = router(state, config);

    let addr: SocketAddr = config.listen_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.changed().await.ok();
            info!("shutting down gracefully");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Level;

    #[test]
    fn error_mapping_is_distinguishable() {
        let cases = [
            (
                Error::Validation("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                Error::PaymentRejected(crate::payment::PaymentRejection::SignatureReused),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                Error::NotFound("test x".to_string()),
                StatusCode::NOT_FOUND,
            ),
            (
                Error::AlreadySettled("test x".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                Error::Storage("disk gone".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Chain("rpc down".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = AppError::from(error).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn payment_required_message_is_actionable() {
        let app_error = payment_required(
            &crate::payment::PaymentRejection::TransactionNotFound,
            150,
        );
        let AppError::PaymentRequired(message) = app_error else {
            panic!("expected PaymentRequired");
        };
        assert!(message.contains("0.15 SOL"));
        assert!(message.contains("not found"));
    }

    #[test]
    fn result_view_renders_decimal_sol() {
        let result = TestResult {
            test_id: "t".to_string(),
            wallet_address: "Abc123".to_string(),
            topic: "topic".to_string(),
            score: 90,
            level: Level::Senior,
            correct_answers: 9,
            total_questions: 10,
            total_points: 100,
            reward_millisol: 150,
            passed: true,
            completed_at: Utc::now(),
        };
        let view = TestResultView::from(result);
        assert!((view.sol_reward - 0.15).abs() < f64::EPSILON);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("solReward").is_some());
        assert!(json.get("rewardMillisol").is_none());
    }
}
