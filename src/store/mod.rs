//! Persistence seam shared by every service.
//!
//! Services only talk to [`CoachingStore`]; [`postgres::PgStore`] backs it in
//! production and an in-memory store backs it under test.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::CoachingResult;
use crate::models::{
    AlertStatus, BuddyPair, CoachingAlert, CoachingPlan, Message, PairStatus, PlanStatus,
    Scenario, ScoreCard, Simulation, User,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub supervisor_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub status: Option<AlertStatus>,
}

#[async_trait]
pub trait CoachingStore: Send + Sync {
    async fn get_user(&self, id: Uuid) -> CoachingResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> CoachingResult<Option<User>>;

    /// Agents other than `exclude` with at least `min_completed` completed simulations.
    async fn agents_with_completed_sessions(
        &self,
        exclude: Uuid,
        min_completed: i64,
    ) -> CoachingResult<Vec<User>>;

    async fn get_scenario(&self, id: Uuid) -> CoachingResult<Option<Scenario>>;

    async fn list_scenarios(&self) -> CoachingResult<Vec<Scenario>>;

    /// Completed, non-practice simulations, newest first.
    async fn recent_completed_simulations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> CoachingResult<Vec<Simulation>>;

    async fn get_simulation(&self, id: Uuid) -> CoachingResult<Option<Simulation>>;

    async fn insert_simulation(&self, simulation: &Simulation) -> CoachingResult<()>;

    /// Only moves an `in_progress` simulation; returns false when it was already completed.
    async fn mark_simulation_completed(
        &self,
        id: Uuid,
        scores: &ScoreCard,
        feedback: &str,
        completed_at: DateTime<Utc>,
    ) -> CoachingResult<bool>;

    /// Distinct scenarios the user completed (practice included) at or after `since`.
    async fn completed_scenarios_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> CoachingResult<Vec<Uuid>>;

    async fn insert_message(&self, message: &Message) -> CoachingResult<()>;

    /// Transcript in chronological order.
    async fn list_messages(&self, simulation_id: Uuid) -> CoachingResult<Vec<Message>>;

    async fn active_plan(&self, user_id: Uuid) -> CoachingResult<Option<CoachingPlan>>;

    /// Cancels the user's active plans and inserts `plan` atomically; returns
    /// how many plans were cancelled.
    async fn replace_active_plan(&self, plan: &CoachingPlan) -> CoachingResult<u64>;

    async fn update_plan_progress(
        &self,
        plan_id: Uuid,
        progress: i32,
        status: PlanStatus,
    ) -> CoachingResult<()>;

    async fn active_pair_for(&self, user_id: Uuid) -> CoachingResult<Option<BuddyPair>>;

    async fn get_buddy_pair(&self, id: Uuid) -> CoachingResult<Option<BuddyPair>>;

    /// Fails with `AlreadyPaired` when either user already has an active pair.
    async fn insert_buddy_pair(&self, pair: &BuddyPair) -> CoachingResult<()>;

    /// Only ends an active pair; returns false when it had already ended.
    async fn end_buddy_pair(
        &self,
        id: Uuid,
        status: PairStatus,
        ended_at: DateTime<Utc>,
    ) -> CoachingResult<bool>;

    async fn insert_alert(&self, alert: &CoachingAlert) -> CoachingResult<()>;

    async fn get_alert(&self, id: Uuid) -> CoachingResult<Option<CoachingAlert>>;

    /// Newest first.
    async fn list_alerts(&self, filter: &AlertFilter) -> CoachingResult<Vec<CoachingAlert>>;

    /// Writes `to` only while the alert is still in `from`; returns whether it did.
    async fn update_alert_status(
        &self,
        id: Uuid,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> CoachingResult<bool>;
}
