use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AlertFilter, CoachingStore};
use crate::error::{CoachingError, CoachingResult};
use crate::models::{
    AlertStatus, BuddyPair, CoachingAlert, CoachingPlan, Message, PairStatus, PlanStatus, Role,
    Scenario, ScoreCard, Simulation, SimulationStatus, User,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    scenarios: Vec<Scenario>,
    simulations: Vec<Simulation>,
    messages: Vec<Message>,
    plans: Vec<CoachingPlan>,
    pairs: Vec<BuddyPair>,
    alerts: Vec<CoachingAlert>,
}

/// Vec-backed store for service tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, user: User) {
        self.tables.lock().unwrap().users.push(user);
    }

    pub fn add_scenario(&self, scenario: Scenario) {
        self.tables.lock().unwrap().scenarios.push(scenario);
    }

    pub fn add_simulation(&self, simulation: Simulation) {
        self.tables.lock().unwrap().simulations.push(simulation);
    }

    pub fn add_pair(&self, pair: BuddyPair) {
        self.tables.lock().unwrap().pairs.push(pair);
    }

    pub fn alerts(&self) -> Vec<CoachingAlert> {
        self.tables.lock().unwrap().alerts.clone()
    }

    pub fn plans(&self) -> Vec<CoachingPlan> {
        self.tables.lock().unwrap().plans.clone()
    }
}

#[async_trait]
impl CoachingStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> CoachingResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> CoachingResult<Option<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn agents_with_completed_sessions(
        &self,
        exclude: Uuid,
        min_completed: i64,
    ) -> CoachingResult<Vec<User>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .filter(|u| u.role == Role::Agent && u.id != exclude)
            .filter(|u| {
                let completed = tables
                    .simulations
                    .iter()
                    .filter(|s| s.user_id == u.id && s.status == SimulationStatus::Completed)
                    .count();
                completed as i64 >= min_completed
            })
            .cloned()
            .collect())
    }

    async fn get_scenario(&self, id: Uuid) -> CoachingResult<Option<Scenario>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.scenarios.iter().find(|s| s.id == id).cloned())
    }

    async fn list_scenarios(&self) -> CoachingResult<Vec<Scenario>> {
        Ok(self.tables.lock().unwrap().scenarios.clone())
    }

    async fn recent_completed_simulations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> CoachingResult<Vec<Simulation>> {
        let tables = self.tables.lock().unwrap();
        let mut sims: Vec<Simulation> = tables
            .simulations
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.status == SimulationStatus::Completed
                    && !s.is_practice
                    && s.scores.is_some()
            })
            .cloned()
            .collect();
        sims.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        sims.truncate(limit);
        Ok(sims)
    }

    async fn get_simulation(&self, id: Uuid) -> CoachingResult<Option<Simulation>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.simulations.iter().find(|s| s.id == id).cloned())
    }

    async fn insert_simulation(&self, simulation: &Simulation) -> CoachingResult<()> {
        self.add_simulation(simulation.clone());
        Ok(())
    }

    async fn mark_simulation_completed(
        &self,
        id: Uuid,
        scores: &ScoreCard,
        feedback: &str,
        completed_at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let Some(sim) = tables
            .simulations
            .iter_mut()
            .find(|s| s.id == id && s.status == SimulationStatus::InProgress)
        else {
            return Ok(false);
        };
        sim.status = SimulationStatus::Completed;
        sim.scores = Some(scores.clone());
        sim.feedback = Some(feedback.to_string());
        sim.completed_at = Some(completed_at);
        Ok(true)
    }

    async fn completed_scenarios_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> CoachingResult<Vec<Uuid>> {
        let tables = self.tables.lock().unwrap();
        let ids: BTreeSet<Uuid> = tables
            .simulations
            .iter()
            .filter(|s| {
                s.user_id == user_id
                    && s.status == SimulationStatus::Completed
                    && s.completed_at.is_some_and(|at| at >= since)
            })
            .map(|s| s.scenario_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn insert_message(&self, message: &Message) -> CoachingResult<()> {
        self.tables.lock().unwrap().messages.push(message.clone());
        Ok(())
    }

    async fn list_messages(&self, simulation_id: Uuid) -> CoachingResult<Vec<Message>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.simulation_id == simulation_id)
            .cloned()
            .collect())
    }

    async fn active_plan(&self, user_id: Uuid) -> CoachingResult<Option<CoachingPlan>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .plans
            .iter()
            .rev()
            .find(|p| p.user_id == user_id && p.status == PlanStatus::Active)
            .cloned())
    }

    async fn replace_active_plan(&self, plan: &CoachingPlan) -> CoachingResult<u64> {
        let mut tables = self.tables.lock().unwrap();
        let mut cancelled = 0;
        for existing in tables
            .plans
            .iter_mut()
            .filter(|p| p.user_id == plan.user_id && p.status == PlanStatus::Active)
        {
            existing.status = PlanStatus::Cancelled;
            cancelled += 1;
        }
        tables.plans.push(plan.clone());
        Ok(cancelled)
    }

    async fn update_plan_progress(
        &self,
        plan_id: Uuid,
        progress: i32,
        status: PlanStatus,
    ) -> CoachingResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(plan) = tables.plans.iter_mut().find(|p| p.id == plan_id) {
            plan.progress = progress;
            plan.status = status;
        }
        Ok(())
    }

    async fn active_pair_for(&self, user_id: Uuid) -> CoachingResult<Option<BuddyPair>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .pairs
            .iter()
            .find(|p| (p.user_a == user_id || p.user_b == user_id) && p.status == PairStatus::Active)
            .cloned())
    }

    async fn get_buddy_pair(&self, id: Uuid) -> CoachingResult<Option<BuddyPair>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.pairs.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_buddy_pair(&self, pair: &BuddyPair) -> CoachingResult<()> {
        let mut tables = self.tables.lock().unwrap();
        for user in [pair.user_a, pair.user_b] {
            let taken = tables.pairs.iter().any(|p| {
                (p.user_a == user || p.user_b == user) && p.status == PairStatus::Active
            });
            if taken {
                return Err(CoachingError::AlreadyPaired(user));
            }
        }
        tables.pairs.push(pair.clone());
        Ok(())
    }

    async fn end_buddy_pair(
        &self,
        id: Uuid,
        status: PairStatus,
        ended_at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let Some(pair) = tables
            .pairs
            .iter_mut()
            .find(|p| p.id == id && p.status == PairStatus::Active)
        else {
            return Ok(false);
        };
        pair.status = status;
        pair.ended_at = Some(ended_at);
        Ok(true)
    }

    async fn insert_alert(&self, alert: &CoachingAlert) -> CoachingResult<()> {
        self.tables.lock().unwrap().alerts.push(alert.clone());
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> CoachingResult<Option<CoachingAlert>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> CoachingResult<Vec<CoachingAlert>> {
        let tables = self.tables.lock().unwrap();
        let mut alerts: Vec<CoachingAlert> = tables
            .alerts
            .iter()
            .filter(|a| filter.supervisor_id.map_or(true, |id| a.supervisor_id == Some(id)))
            .filter(|a| filter.user_id.map_or(true, |id| a.user_id == id))
            .filter(|a| filter.status.map_or(true, |status| a.status == status))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(alerts)
    }

    async fn update_alert_status(
        &self,
        id: Uuid,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let mut tables = self.tables.lock().unwrap();
        let Some(alert) = tables
            .alerts
            .iter_mut()
            .find(|a| a.id == id && a.status == from)
        else {
            return Ok(false);
        };
        alert.status = to;
        match to {
            AlertStatus::Acknowledged => alert.acknowledged_at = Some(at),
            AlertStatus::Resolved => alert.resolved_at = Some(at),
            AlertStatus::Pending => {}
        }
        Ok(true)
    }
}
