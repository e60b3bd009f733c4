//! Fixtures shared by the service tests.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::models::{
    Difficulty, Role, Scenario, ScoreCard, Simulation, SimulationStatus, User,
};

pub fn agent(name: &str, supervisor_id: Option<Uuid>) -> User {
    User {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        role: Role::Agent,
        supervisor_id,
    }
}

pub fn supervisor(name: &str) -> User {
    User {
        role: Role::Supervisor,
        ..agent(name, None)
    }
}

pub fn scenario(title: &str, category: &str, difficulty: Difficulty) -> Scenario {
    Scenario {
        id: Uuid::new_v4(),
        title: title.to_string(),
        category: category.to_string(),
        difficulty,
        description: format!("{title} practice call"),
        client_persona: "An impatient customer who wants a quick answer.".to_string(),
    }
}

/// A completed, non-practice simulation finished `minutes_ago` minutes in the past.
pub fn completed_simulation(
    user_id: Uuid,
    scenario_id: Uuid,
    minutes_ago: i64,
    overall: f64,
    categories: &[(&str, f64)],
) -> Simulation {
    let completed_at = Utc::now() - Duration::minutes(minutes_ago);
    Simulation {
        id: Uuid::new_v4(),
        user_id,
        scenario_id,
        status: SimulationStatus::Completed,
        is_practice: false,
        scores: Some(ScoreCard {
            overall,
            categories: categories
                .iter()
                .map(|(category, value)| (category.to_string(), *value))
                .collect(),
        }),
        feedback: None,
        started_at: completed_at - Duration::minutes(15),
        completed_at: Some(completed_at),
    }
}
