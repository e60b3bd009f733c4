use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::llm::{DisabledModel, LanguageModel, OpenAiClient};

#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// OpenAI API key; without it every model call uses its fallback
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Chat model used for the virtual client, scoring and coaching plans
    #[arg(long, env = "OPENAI_MODEL", default_value = "gpt-4o-mini")]
    pub openai_model: String,

    #[arg(long, env = "COACHING_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl Config {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .context("failed to connect to Postgres")
    }

    pub fn language_model(&self) -> anyhow::Result<Arc<dyn LanguageModel>> {
        match self.openai_api_key.as_deref().filter(|key| !key.trim().is_empty()) {
            Some(key) => {
                info!(model = %self.openai_model, "using OpenAI chat model");
                let client = OpenAiClient::new(key, &self.openai_model)?;
                Ok(Arc::new(client))
            }
            None => {
                warn!("OPENAI_API_KEY not set; model calls will use fallbacks");
                Ok(Arc::new(DisabledModel))
            }
        }
    }
}
