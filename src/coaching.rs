use std::collections::HashSet;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::{analyze_agent_performance, PerformanceAnalysis, Weakness};
use crate::error::{CoachingError, CoachingResult};
use crate::llm::{parse_json_reply, ChatMessage, ChatRequest, LanguageModel};
use crate::models::{CoachingPlan, PlanStatus, Scenario, User};
use crate::store::CoachingStore;

pub const MAX_RECOMMENDED_SCENARIOS: usize = 5;
pub const MAX_SCENARIOS_PER_WEAKNESS: usize = 2;

const PLAN_SYSTEM_PROMPT: &str = "You are a contact-center coach. Given an agent's recent \
performance analysis, write a short, motivating weekly goal and list the skill areas to \
prioritize. Reply with a JSON object: {\"weekly_goal\": string, \"priority_areas\": [string]}.";

#[derive(Debug, Deserialize)]
struct PlanNarrative {
    weekly_goal: String,
    #[serde(default)]
    priority_areas: Vec<String>,
}

/// Picks practice scenarios for the weaknesses, most urgent first, easier
/// scenarios first within a category.
pub fn recommend_scenarios(weaknesses: &[Weakness], scenarios: &[Scenario]) -> Vec<Uuid> {
    let mut picked = Vec::new();

    for weakness in weaknesses {
        let mut matching: Vec<&Scenario> = scenarios
            .iter()
            .filter(|scenario| scenario.category == weakness.category)
            .collect();
        matching.sort_by(|a, b| {
            a.difficulty
                .rank()
                .cmp(&b.difficulty.rank())
                .then_with(|| a.title.cmp(&b.title))
        });

        for scenario in matching.into_iter().take(MAX_SCENARIOS_PER_WEAKNESS) {
            if picked.len() == MAX_RECOMMENDED_SCENARIOS {
                return picked;
            }
            picked.push(scenario.id);
        }
    }

    picked
}

pub fn fallback_goal(analysis: &PerformanceAnalysis, recommended: usize) -> String {
    match analysis.weaknesses.first() {
        Some(weakness) if recommended > 0 => format!(
            "Raise {} from {:.0} toward 70 by completing {} targeted scenarios this week.",
            weakness.category.replace('_', " "),
            weakness.average,
            recommended
        ),
        Some(weakness) => format!(
            "Raise {} from {:.0} toward 70 with focused practice this week.",
            weakness.category.replace('_', " "),
            weakness.average
        ),
        None => format!(
            "Hold your {:.0} average and keep every category above 70 this week.",
            analysis.overall_average
        ),
    }
}

/// Weakness categories, or the two lowest-scoring categories when there are none.
pub fn fallback_priority_areas(analysis: &PerformanceAnalysis) -> Vec<String> {
    if !analysis.weaknesses.is_empty() {
        return analysis
            .weaknesses
            .iter()
            .map(|w| w.category.clone())
            .collect();
    }

    let mut categories: Vec<_> = analysis.categories.iter().collect();
    categories.sort_by(|a, b| {
        a.average
            .partial_cmp(&b.average)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    categories
        .into_iter()
        .take(2)
        .map(|stats| stats.category.clone())
        .collect()
}

fn plan_request(user: &User, analysis: &PerformanceAnalysis, recommended: &[&Scenario]) -> ChatRequest {
    let mut prompt = format!(
        "Agent: {}\nSessions analyzed: {}\nOverall average: {:.1} ({:?})\n\nCategories:\n",
        user.full_name, analysis.sessions_analyzed, analysis.overall_average, analysis.overall_trend
    );
    for stats in &analysis.categories {
        prompt.push_str(&format!(
            "- {}: average {:.1}, trend {:?}, consistency {:.0}\n",
            stats.category, stats.average, stats.trend, stats.consistency
        ));
    }
    prompt.push_str("\nWeaknesses:\n");
    for weakness in &analysis.weaknesses {
        prompt.push_str(&format!(
            "- {} ({:?} priority, {:.1} below target)\n",
            weakness.category, weakness.priority, weakness.gap
        ));
    }
    prompt.push_str("\nStrengths:\n");
    for strength in &analysis.strengths {
        prompt.push_str(&format!("- {} ({:.1})\n", strength.category, strength.average));
    }
    prompt.push_str("\nRecommended scenarios:\n");
    for scenario in recommended {
        prompt.push_str(&format!("- {} ({})\n", scenario.title, scenario.difficulty));
    }

    ChatRequest::new(
        vec![ChatMessage::system(PLAN_SYSTEM_PROMPT), ChatMessage::user(prompt)],
        0.7,
    )
    .json()
    .max_tokens(500)
}

/// Builds a fresh plan from the latest analysis and swaps it in for any active one.
pub async fn generate_coaching_plan(
    store: &dyn CoachingStore,
    llm: &dyn LanguageModel,
    user_id: Uuid,
) -> CoachingResult<CoachingPlan> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("user", user_id))?;

    let analysis = analyze_agent_performance(store, user_id).await?;
    let scenarios = store.list_scenarios().await?;
    let recommended_ids = recommend_scenarios(&analysis.weaknesses, &scenarios);
    let recommended: Vec<&Scenario> = recommended_ids
        .iter()
        .filter_map(|id| scenarios.iter().find(|s| s.id == *id))
        .collect();

    let request = plan_request(&user, &analysis, &recommended);
    let narrative = match llm.complete(&request).await {
        Ok(reply) => match parse_json_reply::<PlanNarrative>(&reply) {
            Ok(narrative) if !narrative.weekly_goal.trim().is_empty() => Some(narrative),
            Ok(_) => {
                warn!(%user_id, "coaching narrative had an empty goal, using fallback");
                None
            }
            Err(err) => {
                warn!(%user_id, error = %err, "unparseable coaching narrative, using fallback");
                None
            }
        },
        Err(err) => {
            warn!(%user_id, error = %err, "coaching narrative unavailable, using fallback");
            None
        }
    };

    let (weekly_goal, priority_areas) = match narrative {
        Some(narrative) if !narrative.priority_areas.is_empty() => {
            (narrative.weekly_goal, narrative.priority_areas)
        }
        Some(narrative) => (narrative.weekly_goal, fallback_priority_areas(&analysis)),
        None => (
            fallback_goal(&analysis, recommended_ids.len()),
            fallback_priority_areas(&analysis),
        ),
    };

    let plan = CoachingPlan {
        id: Uuid::new_v4(),
        user_id,
        weaknesses: analysis.weaknesses,
        strengths: analysis.strengths,
        recommended_scenario_ids: recommended_ids,
        weekly_goal,
        priority_areas,
        progress: 0,
        status: PlanStatus::Active,
        created_at: Utc::now(),
    };
    let cancelled = store.replace_active_plan(&plan).await?;

    info!(
        %user_id,
        plan_id = %plan.id,
        cancelled,
        scenarios = plan.recommended_scenario_ids.len(),
        "coaching plan generated"
    );
    Ok(plan)
}

pub async fn active_plan(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Option<CoachingPlan>> {
    store.active_plan(user_id).await
}

pub fn progress_percent(done: usize, total: usize) -> i32 {
    if total == 0 {
        return 0;
    }
    ((done.min(total) as f64 / total as f64) * 100.0).round() as i32
}

/// Recomputes progress from completed recommended scenarios; a plan at 100%
/// becomes completed.
pub async fn update_plan_progress(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Option<CoachingPlan>> {
    let Some(mut plan) = store.active_plan(user_id).await? else {
        return Ok(None);
    };
    if plan.recommended_scenario_ids.is_empty() {
        return Ok(Some(plan));
    }

    let completed: HashSet<Uuid> = store
        .completed_scenarios_since(user_id, plan.created_at)
        .await?
        .into_iter()
        .collect();
    let done = plan
        .recommended_scenario_ids
        .iter()
        .filter(|id| completed.contains(id))
        .count();

    let progress = progress_percent(done, plan.recommended_scenario_ids.len());
    let status = if progress >= 100 {
        PlanStatus::Completed
    } else {
        PlanStatus::Active
    };

    if progress != plan.progress || status != plan.status {
        store.update_plan_progress(plan.id, progress, status).await?;
        info!(%user_id, plan_id = %plan.id, progress, status = %status, "coaching plan progress updated");
        plan.progress = progress;
        plan.status = status;
    }

    Ok(Some(plan))
}
