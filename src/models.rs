use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{Strength, Weakness};
use crate::error::CoachingError;

/// Categories an evaluation scores, besides the overall score.
pub const SCORE_CATEGORIES: [&str; 5] = [
    "empathy",
    "active_listening",
    "problem_resolution",
    "communication_clarity",
    "professionalism",
];

/// Text-backed enum stored as a lowercase column value.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoachingError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoachingError::BadRequest(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

text_enum!(Role {
    Agent => "agent",
    Supervisor => "supervisor",
});

text_enum!(Difficulty {
    Beginner => "beginner",
    Intermediate => "intermediate",
    Advanced => "advanced",
});

text_enum!(SimulationStatus {
    InProgress => "in_progress",
    Completed => "completed",
});

text_enum!(MessageRole {
    Agent => "agent",
    Client => "client",
});

text_enum!(PlanStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(PairStatus {
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_enum!(AlertType {
    LowPerformance => "low_performance",
    Stagnation => "stagnation",
    Improvement => "improvement",
});

text_enum!(AlertSeverity {
    Low => "low",
    Medium => "medium",
    High => "high",
    Critical => "critical",
});

text_enum!(AlertStatus {
    Pending => "pending",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
});

impl Difficulty {
    pub fn rank(&self) -> u8 {
        match self {
            Difficulty::Beginner => 0,
            Difficulty::Intermediate => 1,
            Difficulty::Advanced => 2,
        }
    }
}

impl AlertStatus {
    /// Alerts only ever move forward one step: pending, acknowledged, resolved.
    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        matches!(
            (self, next),
            (AlertStatus::Pending, AlertStatus::Acknowledged)
                | (AlertStatus::Acknowledged, AlertStatus::Resolved)
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub role: Role,
    pub supervisor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Scenario {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub difficulty: Difficulty,
    pub description: String,
    pub client_persona: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub overall: f64,
    pub categories: BTreeMap<String, f64>,
}

impl ScoreCard {
    /// Every category and the overall score set to the same value.
    pub fn uniform(value: f64) -> Self {
        ScoreCard {
            overall: value,
            categories: SCORE_CATEGORIES
                .iter()
                .map(|category| (category.to_string(), value))
                .collect(),
        }
    }

    pub fn clamped(mut self) -> Self {
        self.overall = self.overall.clamp(0.0, 100.0);
        for value in self.categories.values_mut() {
            *value = value.clamp(0.0, 100.0);
        }
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub scenario_id: Uuid,
    pub status: SimulationStatus,
    pub is_practice: bool,
    pub scores: Option<ScoreCard>,
    pub feedback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub simulation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachingPlan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weaknesses: Vec<Weakness>,
    pub strengths: Vec<Strength>,
    pub recommended_scenario_ids: Vec<Uuid>,
    pub weekly_goal: String,
    pub priority_areas: Vec<String>,
    pub progress: i32,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuddyPair {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub status: PairStatus,
    pub shared_goal: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoachingAlert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub supervisor_id: Option<Uuid>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}
