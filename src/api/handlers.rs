use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{self, PerformanceAnalysis};
use crate::buddy::{self, BuddyCandidate};
use crate::coaching;
use crate::context::AppContext;
use crate::error::{CoachingError, CoachingResult};
use crate::models::{
    AlertStatus, BuddyPair, CoachingAlert, CoachingPlan, Message, PairStatus, Scenario,
    Simulation,
};
use crate::store::AlertFilter;
use crate::{alerts, simulation};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct CreatePairRequest {
    user_a: Uuid,
    user_b: Uuid,
    shared_goal: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EndPairRequest {
    status: Option<PairStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    supervisor_id: Option<Uuid>,
    user_id: Option<Uuid>,
    status: Option<AlertStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StartSimulationRequest {
    user_id: Uuid,
    scenario_id: Uuid,
    #[serde(default)]
    practice: bool,
}

#[derive(Debug, Serialize)]
pub struct StartSimulationResponse {
    simulation: Simulation,
    opening: Message,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    content: String,
}

type ApiResult<T> = CoachingResult<Json<T>>;

// ============================================================================
// Handlers
// ============================================================================

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn list_scenarios(State(ctx): State<AppContext>) -> ApiResult<Vec<Scenario>> {
    Ok(Json(ctx.store.list_scenarios().await?))
}

pub async fn get_analysis(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<PerformanceAnalysis> {
    ctx.store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("user", user_id))?;
    let analysis = analysis::analyze_agent_performance(ctx.store.as_ref(), user_id).await?;
    Ok(Json(analysis))
}

pub async fn generate_coaching_plan(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<CoachingPlan> {
    let plan =
        coaching::generate_coaching_plan(ctx.store.as_ref(), ctx.llm.as_ref(), user_id).await?;
    Ok(Json(plan))
}

pub async fn get_coaching_plan(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<CoachingPlan> {
    coaching::active_plan(ctx.store.as_ref(), user_id)
        .await?
        .map(Json)
        .ok_or_else(|| CoachingError::NotFound(format!("active coaching plan for user {user_id}")))
}

pub async fn buddy_candidates(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<BuddyCandidate>> {
    Ok(Json(
        buddy::find_buddy_candidates(ctx.store.as_ref(), user_id).await?,
    ))
}

pub async fn get_buddy_pair(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<BuddyPair> {
    buddy::active_pair_for(ctx.store.as_ref(), user_id)
        .await?
        .map(Json)
        .ok_or_else(|| CoachingError::NotFound(format!("active buddy pair for user {user_id}")))
}

pub async fn create_buddy_pair(
    State(ctx): State<AppContext>,
    Json(request): Json<CreatePairRequest>,
) -> ApiResult<BuddyPair> {
    let pair = buddy::create_buddy_pair(
        ctx.store.as_ref(),
        request.user_a,
        request.user_b,
        request.shared_goal,
    )
    .await?;
    Ok(Json(pair))
}

pub async fn end_buddy_pair(
    State(ctx): State<AppContext>,
    Path(pair_id): Path<Uuid>,
    request: Option<Json<EndPairRequest>>,
) -> ApiResult<BuddyPair> {
    let status = request
        .and_then(|Json(request)| request.status)
        .unwrap_or(PairStatus::Completed);
    Ok(Json(
        buddy::end_buddy_pair(ctx.store.as_ref(), pair_id, status).await?,
    ))
}

pub async fn check_alerts(
    State(ctx): State<AppContext>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Vec<CoachingAlert>> {
    Ok(Json(alerts::check_alerts(ctx.store.as_ref(), user_id).await?))
}

pub async fn list_alerts(
    State(ctx): State<AppContext>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Vec<CoachingAlert>> {
    let filter = AlertFilter {
        supervisor_id: query.supervisor_id,
        user_id: query.user_id,
        status: query.status,
    };
    Ok(Json(alerts::list_alerts(ctx.store.as_ref(), &filter).await?))
}

pub async fn acknowledge_alert(
    State(ctx): State<AppContext>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<CoachingAlert> {
    Ok(Json(
        alerts::acknowledge_alert(ctx.store.as_ref(), alert_id).await?,
    ))
}

pub async fn resolve_alert(
    State(ctx): State<AppContext>,
    Path(alert_id): Path<Uuid>,
) -> ApiResult<CoachingAlert> {
    Ok(Json(alerts::resolve_alert(ctx.store.as_ref(), alert_id).await?))
}

pub async fn start_simulation(
    State(ctx): State<AppContext>,
    Json(request): Json<StartSimulationRequest>,
) -> ApiResult<StartSimulationResponse> {
    let (simulation, opening) =
        simulation::start_simulation(&ctx, request.user_id, request.scenario_id, request.practice)
            .await?;
    Ok(Json(StartSimulationResponse {
        simulation,
        opening,
    }))
}

pub async fn list_messages(
    State(ctx): State<AppContext>,
    Path(simulation_id): Path<Uuid>,
) -> ApiResult<Vec<Message>> {
    Ok(Json(simulation::transcript(&ctx, simulation_id).await?))
}

pub async fn send_message(
    State(ctx): State<AppContext>,
    Path(simulation_id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Message> {
    Ok(Json(
        simulation::send_message(&ctx, simulation_id, &request.content).await?,
    ))
}

/// Responds once scores are stored; alert checks keep running detached.
pub async fn complete_simulation(
    State(ctx): State<AppContext>,
    Path(simulation_id): Path<Uuid>,
) -> ApiResult<Simulation> {
    let completed = simulation::complete_simulation(&ctx, simulation_id).await?;
    Ok(Json(completed.simulation))
}
