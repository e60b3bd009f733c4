use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CoachingError {
    #[error("insufficient data: need at least {required} completed sessions, found {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("{0} not found")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("user {0} is already in an active buddy pair")]
    AlreadyPaired(Uuid),

    #[error("cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("language model error: {0}")]
    Llm(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoachingError {
    pub fn not_found(kind: &str, id: Uuid) -> Self {
        CoachingError::NotFound(format!("{kind} {id}"))
    }

    pub fn is_insufficient_data(&self) -> bool {
        matches!(self, CoachingError::InsufficientData { .. })
    }
}

pub type CoachingResult<T> = std::result::Result<T, CoachingError>;
