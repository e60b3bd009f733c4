use std::sync::Arc;

use crate::llm::LanguageModel;
use crate::store::CoachingStore;

/// Handles shared by the CLI, the HTTP handlers and detached post-processing.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn CoachingStore>,
    pub llm: Arc<dyn LanguageModel>,
}

impl AppContext {
    pub fn new(store: Arc<dyn CoachingStore>, llm: Arc<dyn LanguageModel>) -> Self {
        Self { store, llm }
    }
}
