use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::{analyze_agent_performance, PerformanceAnalysis};
use crate::error::{CoachingError, CoachingResult};
use crate::models::{BuddyPair, PairStatus, Role};
use crate::store::CoachingStore;

pub const MAX_CANDIDATES: usize = 5;
pub const MIN_COMPLETED_FOR_MATCHING: i64 = 3;
pub const STRENGTH_MATCH_POINTS: u32 = 30;
pub const WEAKNESS_MATCH_POINTS: u32 = 20;
pub const MULTI_MATCH_BONUS: u32 = 20;
pub const BASELINE_SCORE: u32 = 50;

const DEFAULT_SHARED_GOAL: &str = "Practice together weekly and trade feedback after each session.";

#[derive(Debug, Clone, Serialize)]
pub struct BuddyCandidate {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: String,
    pub compatibility_score: u32,
    pub reasons: Vec<String>,
}

fn label(category: &str) -> String {
    category.replace('_', " ")
}

/// Points for every place where one side's strength covers the other's weakness.
pub fn score_compatibility(
    user: &PerformanceAnalysis,
    candidate: &PerformanceAnalysis,
) -> (u32, Vec<String>) {
    let mut score = 0;
    let mut matches = 0;
    let mut reasons = Vec::new();

    for strength in &candidate.strengths {
        if user.has_weakness(&strength.category) {
            score += STRENGTH_MATCH_POINTS;
            matches += 1;
            reasons.push(format!(
                "Strong in {} ({:.0}), where you need support",
                label(&strength.category),
                strength.average
            ));
        }
    }

    for weakness in &candidate.weaknesses {
        if user.has_strength(&weakness.category) {
            score += WEAKNESS_MATCH_POINTS;
            matches += 1;
            reasons.push(format!(
                "You can help them with {}",
                label(&weakness.category)
            ));
        }
    }

    if matches >= 2 {
        score += MULTI_MATCH_BONUS;
    }

    (score, reasons)
}

pub fn baseline_reasons(candidate: &PerformanceAnalysis) -> Vec<String> {
    candidate
        .strengths
        .iter()
        .take(2)
        .map(|strength| {
            format!(
                "Strong in {} ({:.0})",
                label(&strength.category),
                strength.average
            )
        })
        .collect()
}

pub fn shared_goal_for(a: Option<&PerformanceAnalysis>, b: Option<&PerformanceAnalysis>) -> String {
    let (Some(a), Some(b)) = (a, b) else {
        return DEFAULT_SHARED_GOAL.to_string();
    };

    let mut categories: Vec<String> = Vec::new();
    for (learner, mentor) in [(a, b), (b, a)] {
        for strength in &mentor.strengths {
            if learner.has_weakness(&strength.category) && !categories.contains(&strength.category)
            {
                categories.push(strength.category.clone());
            }
        }
    }

    match categories.as_slice() {
        [] => DEFAULT_SHARED_GOAL.to_string(),
        [only] => format!("Help each other lift {} above 70.", label(only)),
        [init @ .., last] => format!(
            "Help each other lift {} and {} above 70.",
            init.iter().map(|c| label(c)).collect::<Vec<_>>().join(", "),
            label(last)
        ),
    }
}

async fn optional_analysis(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Option<PerformanceAnalysis>> {
    match analyze_agent_performance(store, user_id).await {
        Ok(analysis) => Ok(Some(analysis)),
        Err(err) if err.is_insufficient_data() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Top matches among unpaired agents with enough completed sessions.
pub async fn find_buddy_candidates(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Vec<BuddyCandidate>> {
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("user", user_id))?;

    let own = optional_analysis(store, user_id).await?;
    let agents = store
        .agents_with_completed_sessions(user_id, MIN_COMPLETED_FOR_MATCHING)
        .await?;

    let mut candidates = Vec::new();
    for agent in agents {
        if store.active_pair_for(agent.id).await?.is_some() {
            continue;
        }
        let Some(analysis) = optional_analysis(store, agent.id).await? else {
            debug!(candidate = %agent.id, "skipping candidate without scored history");
            continue;
        };

        let (compatibility_score, reasons) = match &own {
            Some(own) => score_compatibility(own, &analysis),
            None => (BASELINE_SCORE, baseline_reasons(&analysis)),
        };

        candidates.push(BuddyCandidate {
            user_id: agent.id,
            full_name: agent.full_name,
            email: agent.email,
            compatibility_score,
            reasons,
        });
    }

    candidates.sort_by(|a, b| {
        b.compatibility_score
            .cmp(&a.compatibility_score)
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    candidates.truncate(MAX_CANDIDATES);

    debug!(%user_id, found = candidates.len(), baseline = own.is_none(), "buddy candidates ranked");
    Ok(candidates)
}

pub async fn create_buddy_pair(
    store: &dyn CoachingStore,
    user_a: Uuid,
    user_b: Uuid,
    shared_goal: Option<String>,
) -> CoachingResult<BuddyPair> {
    if user_a == user_b {
        return Err(CoachingError::BadRequest(
            "a user cannot be paired with themself".to_string(),
        ));
    }

    for user_id in [user_a, user_b] {
        let user = store
            .get_user(user_id)
            .await?
            .ok_or_else(|| CoachingError::not_found("user", user_id))?;
        if user.role != Role::Agent {
            return Err(CoachingError::Forbidden(format!(
                "{} is not an agent and cannot join a buddy pair",
                user.full_name
            )));
        }
        if store.active_pair_for(user_id).await?.is_some() {
            return Err(CoachingError::AlreadyPaired(user_id));
        }
    }

    let shared_goal = match shared_goal.filter(|goal| !goal.trim().is_empty()) {
        Some(goal) => goal,
        None => {
            let a = optional_analysis(store, user_a).await?;
            let b = optional_analysis(store, user_b).await?;
            shared_goal_for(a.as_ref(), b.as_ref())
        }
    };

    let pair = BuddyPair {
        id: Uuid::new_v4(),
        user_a,
        user_b,
        status: PairStatus::Active,
        shared_goal,
        created_at: Utc::now(),
        ended_at: None,
    };
    store.insert_buddy_pair(&pair).await?;

    info!(pair_id = %pair.id, %user_a, %user_b, "buddy pair created");
    Ok(pair)
}

pub async fn end_buddy_pair(
    store: &dyn CoachingStore,
    pair_id: Uuid,
    status: PairStatus,
) -> CoachingResult<BuddyPair> {
    if status == PairStatus::Active {
        return Err(CoachingError::BadRequest(
            "a buddy pair can only end as completed or cancelled".to_string(),
        ));
    }

    let mut pair = store
        .get_buddy_pair(pair_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("buddy pair", pair_id))?;

    if pair.status != PairStatus::Active {
        return Err(CoachingError::InvalidTransition {
            entity: "buddy pair",
            from: pair.status.to_string(),
            to: status.to_string(),
        });
    }

    let ended_at = Utc::now();
    if !store.end_buddy_pair(pair_id, status, ended_at).await? {
        return Err(CoachingError::InvalidTransition {
            entity: "buddy pair",
            from: pair.status.to_string(),
            to: status.to_string(),
        });
    }
    info!(%pair_id, status = %status, "buddy pair ended");

    pair.status = status;
    pair.ended_at = Some(ended_at);
    Ok(pair)
}

pub async fn active_pair_for(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Option<BuddyPair>> {
    store.active_pair_for(user_id).await
}
