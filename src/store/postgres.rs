use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{AlertFilter, CoachingStore};
use crate::analysis::{Strength, Weakness};
use crate::error::{CoachingError, CoachingResult};
use crate::models::{
    AlertStatus, BuddyPair, CoachingAlert, CoachingPlan, Message, PairStatus, PlanStatus,
    Scenario, ScoreCard, Simulation, User,
};

const SIMULATION_COLUMNS: &str = "id, user_id, scenario_id, status, is_practice, scores, \
     feedback, started_at, completed_at";

const ALERT_COLUMNS: &str = "id, user_id, supervisor_id, alert_type, severity, title, \
     message, status, created_at, acknowledged_at, resolved_at";

const PLAN_COLUMNS: &str = "id, user_id, weaknesses, strengths, recommended_scenario_ids, \
     weekly_goal, priority_areas, progress, status, created_at";

const PAIR_COLUMNS: &str = "id, user_a, user_b, status, shared_goal, created_at, ended_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn user_from_row(row: &PgRow) -> CoachingResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        supervisor_id: row.try_get("supervisor_id")?,
    })
}

fn scenario_from_row(row: &PgRow) -> CoachingResult<Scenario> {
    Ok(Scenario {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        category: row.try_get("category")?,
        difficulty: row.try_get::<String, _>("difficulty")?.parse()?,
        description: row.try_get("description")?,
        client_persona: row.try_get("client_persona")?,
    })
}

fn simulation_from_row(row: &PgRow) -> CoachingResult<Simulation> {
    let scores: Option<Json<ScoreCard>> = row.try_get("scores")?;
    Ok(Simulation {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        scenario_id: row.try_get("scenario_id")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        is_practice: row.try_get("is_practice")?,
        scores: scores.map(|Json(card)| card),
        feedback: row.try_get("feedback")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn message_from_row(row: &PgRow) -> CoachingResult<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        simulation_id: row.try_get("simulation_id")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn plan_from_row(row: &PgRow) -> CoachingResult<CoachingPlan> {
    let Json(weaknesses): Json<Vec<Weakness>> = row.try_get("weaknesses")?;
    let Json(strengths): Json<Vec<Strength>> = row.try_get("strengths")?;
    let Json(priority_areas): Json<Vec<String>> = row.try_get("priority_areas")?;
    Ok(CoachingPlan {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        weaknesses,
        strengths,
        recommended_scenario_ids: row.try_get("recommended_scenario_ids")?,
        weekly_goal: row.try_get("weekly_goal")?,
        priority_areas,
        progress: row.try_get("progress")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
    })
}

fn pair_from_row(row: &PgRow) -> CoachingResult<BuddyPair> {
    Ok(BuddyPair {
        id: row.try_get("id")?,
        user_a: row.try_get("user_a")?,
        user_b: row.try_get("user_b")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        shared_goal: row.try_get("shared_goal")?,
        created_at: row.try_get("created_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> CoachingResult<CoachingAlert> {
    Ok(CoachingAlert {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        supervisor_id: row.try_get("supervisor_id")?,
        alert_type: row.try_get::<String, _>("alert_type")?.parse()?,
        severity: row.try_get::<String, _>("severity")?.parse()?,
        title: row.try_get("title")?,
        message: row.try_get("message")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: row.try_get("created_at")?,
        acknowledged_at: row.try_get("acknowledged_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

#[async_trait]
impl CoachingStore for PgStore {
    async fn get_user(&self, id: Uuid) -> CoachingResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role, supervisor_id FROM agent_coaching.users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> CoachingResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role, supervisor_id FROM agent_coaching.users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn agents_with_completed_sessions(
        &self,
        exclude: Uuid,
        min_completed: i64,
    ) -> CoachingResult<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.full_name, u.email, u.role, u.supervisor_id
            FROM agent_coaching.users u
            JOIN agent_coaching.simulations s ON s.user_id = u.id AND s.status = 'completed'
            WHERE u.role = 'agent' AND u.id <> $1
            GROUP BY u.id
            HAVING COUNT(s.id) >= $2
            ORDER BY u.full_name
            "#,
        )
        .bind(exclude)
        .bind(min_completed)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn get_scenario(&self, id: Uuid) -> CoachingResult<Option<Scenario>> {
        let row = sqlx::query(
            "SELECT id, title, category, difficulty, description, client_persona \
             FROM agent_coaching.scenarios WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(scenario_from_row).transpose()
    }

    async fn list_scenarios(&self) -> CoachingResult<Vec<Scenario>> {
        let rows = sqlx::query(
            "SELECT id, title, category, difficulty, description, client_persona \
             FROM agent_coaching.scenarios ORDER BY title",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(scenario_from_row).collect()
    }

    async fn recent_completed_simulations(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> CoachingResult<Vec<Simulation>> {
        let query = format!(
            "SELECT {SIMULATION_COLUMNS} FROM agent_coaching.simulations \
             WHERE user_id = $1 AND status = 'completed' AND is_practice = FALSE \
             AND scores IS NOT NULL \
             ORDER BY completed_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(simulation_from_row).collect()
    }

    async fn get_simulation(&self, id: Uuid) -> CoachingResult<Option<Simulation>> {
        let query =
            format!("SELECT {SIMULATION_COLUMNS} FROM agent_coaching.simulations WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(simulation_from_row).transpose()
    }

    async fn insert_simulation(&self, simulation: &Simulation) -> CoachingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_coaching.simulations
            (id, user_id, scenario_id, status, is_practice, scores, feedback, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(simulation.id)
        .bind(simulation.user_id)
        .bind(simulation.scenario_id)
        .bind(simulation.status.as_str())
        .bind(simulation.is_practice)
        .bind(simulation.scores.as_ref().map(Json))
        .bind(simulation.feedback.as_deref())
        .bind(simulation.started_at)
        .bind(simulation.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_simulation_completed(
        &self,
        id: Uuid,
        scores: &ScoreCard,
        feedback: &str,
        completed_at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE agent_coaching.simulations
            SET status = 'completed', scores = $2, feedback = $3, completed_at = $4
            WHERE id = $1 AND status = 'in_progress'
            "#,
        )
        .bind(id)
        .bind(Json(scores))
        .bind(feedback)
        .bind(completed_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn completed_scenarios_since(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> CoachingResult<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT scenario_id FROM agent_coaching.simulations
            WHERE user_id = $1 AND status = 'completed' AND completed_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            ids.push(row.try_get::<Uuid, _>("scenario_id")?);
        }
        Ok(ids)
    }

    async fn insert_message(&self, message: &Message) -> CoachingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_coaching.messages (id, simulation_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id)
        .bind(message.simulation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_messages(&self, simulation_id: Uuid) -> CoachingResult<Vec<Message>> {
        let rows = sqlx::query(
            r#"
            SELECT id, simulation_id, role, content, created_at
            FROM agent_coaching.messages
            WHERE simulation_id = $1
            ORDER BY created_at, id
            "#,
        )
        .bind(simulation_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn active_plan(&self, user_id: Uuid) -> CoachingResult<Option<CoachingPlan>> {
        let query = format!(
            "SELECT {PLAN_COLUMNS} FROM agent_coaching.coaching_plans \
             WHERE user_id = $1 AND status = 'active' \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(plan_from_row).transpose()
    }

    async fn replace_active_plan(&self, plan: &CoachingPlan) -> CoachingResult<u64> {
        let mut tx = self.pool.begin().await?;

        // serializes regenerations for the same user
        sqlx::query("SELECT id FROM agent_coaching.users WHERE id = $1 FOR UPDATE")
            .bind(plan.user_id)
            .execute(&mut *tx)
            .await?;

        let cancelled = sqlx::query(
            "UPDATE agent_coaching.coaching_plans SET status = 'cancelled' \
             WHERE user_id = $1 AND status = 'active'",
        )
        .bind(plan.user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query(
            r#"
            INSERT INTO agent_coaching.coaching_plans
            (id, user_id, weaknesses, strengths, recommended_scenario_ids, weekly_goal,
             priority_areas, progress, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(plan.id)
        .bind(plan.user_id)
        .bind(Json(&plan.weaknesses))
        .bind(Json(&plan.strengths))
        .bind(&plan.recommended_scenario_ids)
        .bind(&plan.weekly_goal)
        .bind(Json(&plan.priority_areas))
        .bind(plan.progress)
        .bind(plan.status.as_str())
        .bind(plan.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn update_plan_progress(
        &self,
        plan_id: Uuid,
        progress: i32,
        status: PlanStatus,
    ) -> CoachingResult<()> {
        sqlx::query(
            "UPDATE agent_coaching.coaching_plans SET progress = $2, status = $3 WHERE id = $1",
        )
        .bind(plan_id)
        .bind(progress)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn active_pair_for(&self, user_id: Uuid) -> CoachingResult<Option<BuddyPair>> {
        let query = format!(
            "SELECT {PAIR_COLUMNS} FROM agent_coaching.buddy_pairs \
             WHERE (user_a = $1 OR user_b = $1) AND status = 'active' \
             ORDER BY created_at DESC LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn get_buddy_pair(&self, id: Uuid) -> CoachingResult<Option<BuddyPair>> {
        let query = format!("SELECT {PAIR_COLUMNS} FROM agent_coaching.buddy_pairs WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pair_from_row).transpose()
    }

    async fn insert_buddy_pair(&self, pair: &BuddyPair) -> CoachingResult<()> {
        let mut tx = self.pool.begin().await?;

        // both user rows stay locked until commit, so a competing pair waits
        sqlx::query(
            "SELECT id FROM agent_coaching.users WHERE id IN ($1, $2) ORDER BY id FOR UPDATE",
        )
        .bind(pair.user_a)
        .bind(pair.user_b)
        .execute(&mut *tx)
        .await?;

        let existing = sqlx::query(
            r#"
            SELECT user_a, user_b FROM agent_coaching.buddy_pairs
            WHERE status = 'active'
              AND (user_a IN ($1, $2) OR user_b IN ($1, $2))
            LIMIT 1
            "#,
        )
        .bind(pair.user_a)
        .bind(pair.user_b)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(row) = existing {
            let user_a: Uuid = row.try_get("user_a")?;
            let user_b: Uuid = row.try_get("user_b")?;
            let taken = if user_a == pair.user_a || user_b == pair.user_a {
                pair.user_a
            } else {
                pair.user_b
            };
            return Err(CoachingError::AlreadyPaired(taken));
        }

        sqlx::query(
            r#"
            INSERT INTO agent_coaching.buddy_pairs
            (id, user_a, user_b, status, shared_goal, created_at, ended_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(pair.id)
        .bind(pair.user_a)
        .bind(pair.user_b)
        .bind(pair.status.as_str())
        .bind(&pair.shared_goal)
        .bind(pair.created_at)
        .bind(pair.ended_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn end_buddy_pair(
        &self,
        id: Uuid,
        status: PairStatus,
        ended_at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let result = sqlx::query(
            "UPDATE agent_coaching.buddy_pairs SET status = $2, ended_at = $3 \
             WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(ended_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_alert(&self, alert: &CoachingAlert) -> CoachingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agent_coaching.coaching_alerts
            (id, user_id, supervisor_id, alert_type, severity, title, message, status,
             created_at, acknowledged_at, resolved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(alert.id)
        .bind(alert.user_id)
        .bind(alert.supervisor_id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .bind(alert.acknowledged_at)
        .bind(alert.resolved_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_alert(&self, id: Uuid) -> CoachingResult<Option<CoachingAlert>> {
        let query =
            format!("SELECT {ALERT_COLUMNS} FROM agent_coaching.coaching_alerts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(alert_from_row).transpose()
    }

    async fn list_alerts(&self, filter: &AlertFilter) -> CoachingResult<Vec<CoachingAlert>> {
        let mut query = format!(
            "SELECT {ALERT_COLUMNS} FROM agent_coaching.coaching_alerts WHERE TRUE"
        );
        let mut position = 0;

        if filter.supervisor_id.is_some() {
            position += 1;
            query.push_str(&format!(" AND supervisor_id = ${position}"));
        }
        if filter.user_id.is_some() {
            position += 1;
            query.push_str(&format!(" AND user_id = ${position}"));
        }
        if filter.status.is_some() {
            position += 1;
            query.push_str(&format!(" AND status = ${position}"));
        }
        query.push_str(" ORDER BY created_at DESC");

        let mut rows = sqlx::query(&query);
        if let Some(value) = filter.supervisor_id {
            rows = rows.bind(value);
        }
        if let Some(value) = filter.user_id {
            rows = rows.bind(value);
        }
        if let Some(value) = filter.status {
            rows = rows.bind(value.as_str());
        }

        let records = rows.fetch_all(&self.pool).await?;
        records.iter().map(alert_from_row).collect()
    }

    async fn update_alert_status(
        &self,
        id: Uuid,
        from: AlertStatus,
        to: AlertStatus,
        at: DateTime<Utc>,
    ) -> CoachingResult<bool> {
        let column = match to {
            AlertStatus::Acknowledged => "acknowledged_at",
            AlertStatus::Resolved => "resolved_at",
            AlertStatus::Pending => "created_at",
        };
        let query = format!(
            "UPDATE agent_coaching.coaching_alerts SET status = $2, {column} = $3 \
             WHERE id = $1 AND status = $4"
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(to.as_str())
            .bind(at)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
