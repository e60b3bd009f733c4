use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::analysis::mean;
use crate::error::{CoachingError, CoachingResult};
use crate::models::{AlertSeverity, AlertStatus, AlertType, CoachingAlert, ScoreCard};
use crate::store::{AlertFilter, CoachingStore};

pub const LOW_PERFORMANCE_WINDOW: usize = 3;
pub const LOW_PERFORMANCE_THRESHOLD: f64 = 60.0;
pub const CRITICAL_AVERAGE: f64 = 50.0;
pub const STAGNATION_WINDOW: usize = 7;
pub const STAGNATION_DELTA: f64 = 3.0;
pub const IMPROVEMENT_BASELINE: usize = 5;
pub const IMPROVEMENT_DELTA: f64 = 15.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AlertDraft {
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
}

/// Last three overall scores all below 60.
pub fn low_performance_rule(newest_first: &[&ScoreCard]) -> Option<AlertDraft> {
    if newest_first.len() < LOW_PERFORMANCE_WINDOW {
        return None;
    }

    let recent: Vec<f64> = newest_first[..LOW_PERFORMANCE_WINDOW]
        .iter()
        .map(|card| card.overall)
        .collect();
    if recent.iter().any(|score| *score >= LOW_PERFORMANCE_THRESHOLD) {
        return None;
    }

    let average = mean(&recent);
    let severity = if average < CRITICAL_AVERAGE {
        AlertSeverity::Critical
    } else {
        AlertSeverity::High
    };

    Some(AlertDraft {
        alert_type: AlertType::LowPerformance,
        severity,
        title: "Consistently low scores".to_string(),
        message: format!(
            "The last {LOW_PERFORMANCE_WINDOW} sessions all scored below {LOW_PERFORMANCE_THRESHOLD:.0} \
             (average {average:.1})."
        ),
    })
}

/// Sessions 1-3 back against sessions 5-7 back moved less than 3 points.
pub fn stagnation_rule(newest_first: &[&ScoreCard]) -> Option<AlertDraft> {
    if newest_first.len() < STAGNATION_WINDOW {
        return None;
    }

    let overall = |cards: &[&ScoreCard]| -> Vec<f64> { cards.iter().map(|c| c.overall).collect() };
    let recent = mean(&overall(&newest_first[0..3]));
    let earlier = mean(&overall(&newest_first[4..7]));
    let delta = recent - earlier;

    if delta.abs() >= STAGNATION_DELTA {
        return None;
    }

    Some(AlertDraft {
        alert_type: AlertType::Stagnation,
        severity: AlertSeverity::Medium,
        title: "Progress has stalled".to_string(),
        message: format!(
            "Average score moved {delta:+.1} points ({earlier:.1} to {recent:.1}) \
             across the last {STAGNATION_WINDOW} sessions."
        ),
    })
}

/// Newest session beat the prior five-session mean by 15+ in any category.
pub fn improvement_rule(newest_first: &[&ScoreCard]) -> Option<AlertDraft> {
    if newest_first.len() < IMPROVEMENT_BASELINE + 1 {
        return None;
    }

    let latest = newest_first[0];
    let prior = &newest_first[1..=IMPROVEMENT_BASELINE];
    let mut improved = Vec::new();

    for (category, score) in &latest.categories {
        let history: Vec<f64> = prior
            .iter()
            .filter_map(|card| card.categories.get(category).copied())
            .collect();
        if history.is_empty() {
            continue;
        }
        let gain = score - mean(&history);
        if gain >= IMPROVEMENT_DELTA {
            improved.push(format!("{category} (+{gain:.1})"));
        }
    }

    if improved.is_empty() {
        return None;
    }

    Some(AlertDraft {
        alert_type: AlertType::Improvement,
        severity: AlertSeverity::Low,
        title: "Significant improvement".to_string(),
        message: format!(
            "Latest session improved on the previous {IMPROVEMENT_BASELINE}-session average in: {}.",
            improved.join(", ")
        ),
    })
}

pub fn evaluate_rules(newest_first: &[&ScoreCard]) -> Vec<AlertDraft> {
    [
        low_performance_rule(newest_first),
        stagnation_rule(newest_first),
        improvement_rule(newest_first),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Runs every rule against the user's recent history and stores one alert per match.
pub async fn check_alerts(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<Vec<CoachingAlert>> {
    let user = store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("user", user_id))?;

    let simulations = store
        .recent_completed_simulations(user_id, STAGNATION_WINDOW)
        .await?;
    let cards: Vec<&ScoreCard> = simulations
        .iter()
        .filter_map(|simulation| simulation.scores.as_ref())
        .collect();

    let mut created = Vec::new();
    for draft in evaluate_rules(&cards) {
        let alert = CoachingAlert {
            id: Uuid::new_v4(),
            user_id,
            supervisor_id: user.supervisor_id,
            alert_type: draft.alert_type,
            severity: draft.severity,
            title: format!("{}: {}", user.full_name, draft.title),
            message: draft.message,
            status: AlertStatus::Pending,
            created_at: Utc::now(),
            acknowledged_at: None,
            resolved_at: None,
        };
        store.insert_alert(&alert).await?;
        info!(
            %user_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "coaching alert raised"
        );
        created.push(alert);
    }

    Ok(created)
}

pub async fn list_alerts(
    store: &dyn CoachingStore,
    filter: &AlertFilter,
) -> CoachingResult<Vec<CoachingAlert>> {
    store.list_alerts(filter).await
}

pub async fn acknowledge_alert(
    store: &dyn CoachingStore,
    alert_id: Uuid,
) -> CoachingResult<CoachingAlert> {
    transition(store, alert_id, AlertStatus::Acknowledged).await
}

pub async fn resolve_alert(
    store: &dyn CoachingStore,
    alert_id: Uuid,
) -> CoachingResult<CoachingAlert> {
    transition(store, alert_id, AlertStatus::Resolved).await
}

async fn transition(
    store: &dyn CoachingStore,
    alert_id: Uuid,
    next: AlertStatus,
) -> CoachingResult<CoachingAlert> {
    let alert = store
        .get_alert(alert_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("alert", alert_id))?;

    if !alert.status.can_transition_to(next) {
        return Err(CoachingError::InvalidTransition {
            entity: "alert",
            from: alert.status.to_string(),
            to: next.to_string(),
        });
    }

    let moved = store
        .update_alert_status(alert_id, alert.status, next, Utc::now())
        .await?;
    if !moved {
        // someone else moved the alert after it was read
        let current = store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| CoachingError::not_found("alert", alert_id))?;
        return Err(CoachingError::InvalidTransition {
            entity: "alert",
            from: current.status.to_string(),
            to: next.to_string(),
        });
    }
    info!(%alert_id, status = %next, "alert status changed");

    store
        .get_alert(alert_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("alert", alert_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::testing::{agent, completed_simulation, supervisor};

    fn card(overall: f64, categories: &[(&str, f64)]) -> ScoreCard {
        ScoreCard {
            overall,
            categories: categories
                .iter()
                .map(|(c, v)| (c.to_string(), *v))
                .collect(),
        }
    }

    fn refs(cards: &[ScoreCard]) -> Vec<&ScoreCard> {
        cards.iter().collect()
    }

    #[test]
    fn low_performance_needs_three_scores_below_sixty() {
        let cards = [card(55.0, &[]), card(58.0, &[]), card(52.0, &[])];
        let draft = low_performance_rule(&refs(&cards)).unwrap();
        assert_eq!(draft.alert_type, AlertType::LowPerformance);
        assert_eq!(draft.severity, AlertSeverity::High);

        let cards = [card(45.0, &[]), card(48.0, &[]), card(52.0, &[])];
        let draft = low_performance_rule(&refs(&cards)).unwrap();
        assert_eq!(draft.severity, AlertSeverity::Critical);

        let cards = [card(45.0, &[]), card(60.0, &[]), card(52.0, &[])];
        assert!(low_performance_rule(&refs(&cards)).is_none());

        let cards = [card(45.0, &[]), card(48.0, &[])];
        assert!(low_performance_rule(&refs(&cards)).is_none());
    }

    #[test]
    fn stagnation_compares_recent_and_earlier_blocks() {
        // newest first; index 3 is ignored by the rule
        let flat = [71.0, 70.0, 72.0, 10.0, 70.0, 71.0, 70.0]
            .map(|overall| card(overall, &[]));
        let draft = stagnation_rule(&refs(&flat)).unwrap();
        assert_eq!(draft.alert_type, AlertType::Stagnation);
        assert_eq!(draft.severity, AlertSeverity::Medium);

        let rising = [80.0, 78.0, 79.0, 70.0, 70.0, 71.0, 70.0].map(|overall| card(overall, &[]));
        assert!(stagnation_rule(&refs(&rising)).is_none());

        assert!(stagnation_rule(&refs(&flat[..6])).is_none());
    }

    #[test]
    fn improvement_flags_categories_fifteen_points_up() {
        let mut cards = vec![card(80.0, &[("empathy", 85.0), ("professionalism", 72.0)])];
        for _ in 0..IMPROVEMENT_BASELINE {
            cards.push(card(65.0, &[("empathy", 68.0), ("professionalism", 70.0)]));
        }

        let draft = improvement_rule(&refs(&cards)).unwrap();
        assert_eq!(draft.alert_type, AlertType::Improvement);
        assert_eq!(draft.severity, AlertSeverity::Low);
        assert!(draft.message.contains("empathy"));
        assert!(!draft.message.contains("professionalism"));

        cards[0] = card(80.0, &[("empathy", 82.9)]);
        assert!(improvement_rule(&refs(&cards)).is_none());
    }

    #[tokio::test]
    async fn three_low_sessions_insert_exactly_one_alert() {
        let store = MemoryStore::new();
        let boss = supervisor("Dana Cruz");
        let user = agent("Avery Lee", Some(boss.id));
        let user_id = user.id;
        store.add_user(boss.clone());
        store.add_user(user);
        for (minutes_ago, overall) in [(1, 45.0), (2, 48.0), (3, 52.0)] {
            store.add_simulation(completed_simulation(
                user_id,
                Uuid::new_v4(),
                minutes_ago,
                overall,
                &[],
            ));
        }

        let created = check_alerts(&store, user_id).await.unwrap();
        assert_eq!(created.len(), 1);

        let stored = store.alerts();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].alert_type, AlertType::LowPerformance);
        assert_eq!(stored[0].severity, AlertSeverity::Critical);
        assert_eq!(stored[0].supervisor_id, Some(boss.id));
        assert_eq!(stored[0].status, AlertStatus::Pending);
    }

    #[tokio::test]
    async fn practice_sessions_do_not_trigger_alerts() {
        let store = MemoryStore::new();
        let user = agent("Jules Moreno", None);
        let user_id = user.id;
        store.add_user(user);
        for minutes_ago in 1..=3 {
            let mut sim = completed_simulation(user_id, Uuid::new_v4(), minutes_ago, 40.0, &[]);
            sim.is_practice = true;
            store.add_simulation(sim);
        }

        assert!(check_alerts(&store, user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn alerts_move_strictly_forward() {
        let store = MemoryStore::new();
        let user = agent("Kiara Patel", None);
        let user_id = user.id;
        store.add_user(user);
        for minutes_ago in 1..=3 {
            store.add_simulation(completed_simulation(
                user_id,
                Uuid::new_v4(),
                minutes_ago,
                55.0,
                &[],
            ));
        }
        let alert = check_alerts(&store, user_id).await.unwrap().remove(0);

        let err = resolve_alert(&store, alert.id).await.unwrap_err();
        assert!(matches!(err, CoachingError::InvalidTransition { .. }));

        let acknowledged = acknowledge_alert(&store, alert.id).await.unwrap();
        assert_eq!(acknowledged.status, AlertStatus::Acknowledged);
        assert!(acknowledged.acknowledged_at.is_some());

        let err = acknowledge_alert(&store, alert.id).await.unwrap_err();
        assert!(matches!(err, CoachingError::InvalidTransition { .. }));

        let resolved = resolve_alert(&store, alert.id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);

        let pending = list_alerts(
            &store,
            &AlertFilter {
                status: Some(AlertStatus::Pending),
                ..AlertFilter::default()
            },
        )
        .await
        .unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn stale_status_write_is_ignored() {
        let store = MemoryStore::new();
        let user = agent("Noor Haddad", None);
        let user_id = user.id;
        store.add_user(user);
        for minutes_ago in 1..=3 {
            store.add_simulation(completed_simulation(
                user_id,
                Uuid::new_v4(),
                minutes_ago,
                50.0,
                &[],
            ));
        }
        let alert = check_alerts(&store, user_id).await.unwrap().remove(0);
        acknowledge_alert(&store, alert.id).await.unwrap();
        let resolved = resolve_alert(&store, alert.id).await.unwrap();

        // a writer that still believes the alert is pending
        let moved = store
            .update_alert_status(
                alert.id,
                AlertStatus::Pending,
                AlertStatus::Acknowledged,
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(!moved);

        let stored = store.get_alert(alert.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AlertStatus::Resolved);
        assert_eq!(stored.acknowledged_at, resolved.acknowledged_at);
    }
}
