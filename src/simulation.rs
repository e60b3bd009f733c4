//! Practice conversations against the virtual client, and their scoring.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::check_alerts;
use crate::coaching::update_plan_progress;
use crate::context::AppContext;
use crate::error::{CoachingError, CoachingResult};
use crate::llm::{parse_json_reply, ChatMessage, ChatRequest};
use crate::models::{
    Message, MessageRole, Scenario, ScoreCard, Simulation, SimulationStatus, SCORE_CATEGORIES,
};
use crate::store::CoachingStore;

/// Applied to every category when the evaluation cannot be produced.
pub const DEFAULT_SCORE: f64 = 70.0;

const HOLDING_REPLY: &str =
    "Sorry, could you repeat that? I just want to make sure this finally gets sorted out.";
const DEFAULT_FEEDBACK: &str =
    "Automatic evaluation was unavailable; default scores were recorded for this session.";

#[derive(Debug)]
pub struct CompletedSimulation {
    pub simulation: Simulation,
    /// Alert checks and plan progress. Dropping the handle leaves it running.
    pub post_processing: JoinHandle<()>,
}

#[derive(Debug, Deserialize)]
struct Evaluation {
    overall: f64,
    #[serde(default)]
    categories: BTreeMap<String, f64>,
    #[serde(default)]
    feedback: String,
}

fn client_system_prompt(scenario: &Scenario) -> String {
    format!(
        "You are role-playing a customer calling a contact center. Stay in character and \
         never reveal you are an AI.\nScenario: {}\n{}\nPersona: {}\nReply with one short \
         conversational turn.",
        scenario.title, scenario.description, scenario.client_persona
    )
}

/// The model plays the customer, so client turns are its own (assistant) turns.
pub fn client_request(scenario: &Scenario, transcript: &[Message]) -> ChatRequest {
    let mut messages = vec![ChatMessage::system(client_system_prompt(scenario))];
    if transcript.is_empty() {
        messages.push(ChatMessage::user(
            "The agent has just answered the call. Open the conversation.",
        ));
    }
    for message in transcript {
        messages.push(match message.role {
            MessageRole::Client => ChatMessage::assistant(message.content.clone()),
            MessageRole::Agent => ChatMessage::user(message.content.clone()),
        });
    }
    ChatRequest::new(messages, 0.8).max_tokens(300)
}

pub fn scoring_request(scenario: &Scenario, transcript: &[Message]) -> ChatRequest {
    let mut conversation = String::new();
    for message in transcript {
        let speaker = match message.role {
            MessageRole::Agent => "Agent",
            MessageRole::Client => "Customer",
        };
        conversation.push_str(&format!("{speaker}: {}\n", message.content));
    }

    let system = format!(
        "You evaluate contact-center agents. Score the agent from 0 to 100 overall and in \
         each category: {}. Reply with a JSON object: {{\"overall\": number, \
         \"categories\": {{category: number}}, \"feedback\": string}}.",
        SCORE_CATEGORIES.join(", ")
    );
    let user = format!(
        "Scenario: {} ({})\n{}\n\nTranscript:\n{}",
        scenario.title, scenario.difficulty, scenario.description, conversation
    );

    ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)], 0.2)
        .json()
        .max_tokens(800)
}

/// Keeps known categories only and clamps everything to 0-100.
pub fn evaluation_from_reply(reply: &str) -> CoachingResult<(ScoreCard, String)> {
    let evaluation: Evaluation = parse_json_reply(reply)?;
    let categories: BTreeMap<String, f64> = evaluation
        .categories
        .into_iter()
        .filter(|(category, _)| SCORE_CATEGORIES.contains(&category.as_str()))
        .collect();

    if categories.is_empty() {
        return Err(CoachingError::Llm(
            "evaluation did not score any known category".to_string(),
        ));
    }

    let card = ScoreCard {
        overall: evaluation.overall,
        categories,
    }
    .clamped();
    Ok((card, evaluation.feedback))
}

async fn load_simulation(store: &dyn CoachingStore, id: Uuid) -> CoachingResult<Simulation> {
    store
        .get_simulation(id)
        .await?
        .ok_or_else(|| CoachingError::not_found("simulation", id))
}

async fn load_scenario(store: &dyn CoachingStore, id: Uuid) -> CoachingResult<Scenario> {
    store
        .get_scenario(id)
        .await?
        .ok_or_else(|| CoachingError::not_found("scenario", id))
}

fn require_in_progress(simulation: &Simulation) -> CoachingResult<()> {
    if simulation.status != SimulationStatus::InProgress {
        return Err(CoachingError::InvalidTransition {
            entity: "simulation",
            from: simulation.status.to_string(),
            to: SimulationStatus::Completed.to_string(),
        });
    }
    Ok(())
}

async fn store_message(
    store: &dyn CoachingStore,
    simulation_id: Uuid,
    role: MessageRole,
    content: String,
) -> CoachingResult<Message> {
    let message = Message {
        id: Uuid::new_v4(),
        simulation_id,
        role,
        content,
        created_at: Utc::now(),
    };
    store.insert_message(&message).await?;
    Ok(message)
}

/// Opens a simulation and records the customer's first line.
pub async fn start_simulation(
    ctx: &AppContext,
    user_id: Uuid,
    scenario_id: Uuid,
    is_practice: bool,
) -> CoachingResult<(Simulation, Message)> {
    let store = ctx.store.as_ref();
    store
        .get_user(user_id)
        .await?
        .ok_or_else(|| CoachingError::not_found("user", user_id))?;
    let scenario = load_scenario(store, scenario_id).await?;

    let simulation = Simulation {
        id: Uuid::new_v4(),
        user_id,
        scenario_id,
        status: SimulationStatus::InProgress,
        is_practice,
        scores: None,
        feedback: None,
        started_at: Utc::now(),
        completed_at: None,
    };
    store.insert_simulation(&simulation).await?;

    let opening = match ctx.llm.complete(&client_request(&scenario, &[])).await {
        Ok(reply) => reply.trim().to_string(),
        Err(err) => {
            warn!(simulation_id = %simulation.id, error = %err, "opening line unavailable, using scenario description");
            scenario.description.clone()
        }
    };
    let opening = store_message(store, simulation.id, MessageRole::Client, opening).await?;

    info!(
        simulation_id = %simulation.id,
        %user_id,
        scenario = %scenario.title,
        is_practice,
        "simulation started"
    );
    Ok((simulation, opening))
}

/// Records the agent's turn and returns the customer's reply.
pub async fn send_message(
    ctx: &AppContext,
    simulation_id: Uuid,
    content: &str,
) -> CoachingResult<Message> {
    let content = content.trim();
    if content.is_empty() {
        return Err(CoachingError::BadRequest("message content is empty".to_string()));
    }

    let store = ctx.store.as_ref();
    let simulation = load_simulation(store, simulation_id).await?;
    require_in_progress(&simulation)?;
    let scenario = load_scenario(store, simulation.scenario_id).await?;

    store_message(store, simulation_id, MessageRole::Agent, content.to_string()).await?;
    let transcript = store.list_messages(simulation_id).await?;

    let reply = match ctx.llm.complete(&client_request(&scenario, &transcript)).await {
        Ok(reply) => reply.trim().to_string(),
        Err(err) => {
            warn!(%simulation_id, error = %err, "client reply unavailable, using holding reply");
            HOLDING_REPLY.to_string()
        }
    };
    store_message(store, simulation_id, MessageRole::Client, reply).await
}

/// Scores the transcript, marks the simulation completed and spawns the
/// post-processing task without waiting for it.
pub async fn complete_simulation(
    ctx: &AppContext,
    simulation_id: Uuid,
) -> CoachingResult<CompletedSimulation> {
    let store = ctx.store.as_ref();
    let mut simulation = load_simulation(store, simulation_id).await?;
    require_in_progress(&simulation)?;
    let scenario = load_scenario(store, simulation.scenario_id).await?;

    let transcript = store.list_messages(simulation_id).await?;
    if !transcript.iter().any(|m| m.role == MessageRole::Agent) {
        return Err(CoachingError::BadRequest(
            "the agent has not said anything yet".to_string(),
        ));
    }

    let (scores, feedback) = match ctx
        .llm
        .complete(&scoring_request(&scenario, &transcript))
        .await
        .and_then(|reply| evaluation_from_reply(&reply))
    {
        Ok(evaluation) => evaluation,
        Err(err) => {
            warn!(%simulation_id, error = %err, "evaluation failed, recording default scores");
            (ScoreCard::uniform(DEFAULT_SCORE), DEFAULT_FEEDBACK.to_string())
        }
    };

    let completed_at = Utc::now();
    let marked = store
        .mark_simulation_completed(simulation_id, &scores, &feedback, completed_at)
        .await?;
    if !marked {
        // another completion won the race while the evaluation was running
        return Err(CoachingError::InvalidTransition {
            entity: "simulation",
            from: SimulationStatus::Completed.to_string(),
            to: SimulationStatus::Completed.to_string(),
        });
    }
    info!(%simulation_id, overall = scores.overall, "simulation completed");

    simulation.status = SimulationStatus::Completed;
    simulation.scores = Some(scores);
    simulation.feedback = Some(feedback);
    simulation.completed_at = Some(completed_at);

    let post_processing = spawn_post_processing(
        Arc::clone(&ctx.store),
        simulation.user_id,
        simulation.is_practice,
    );

    Ok(CompletedSimulation {
        simulation,
        post_processing,
    })
}

fn spawn_post_processing(
    store: Arc<dyn CoachingStore>,
    user_id: Uuid,
    is_practice: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if !is_practice {
            if let Err(err) = check_alerts(store.as_ref(), user_id).await {
                warn!(%user_id, error = %err, "alert check failed");
            }
        }
        if let Err(err) = update_plan_progress(store.as_ref(), user_id).await {
            warn!(%user_id, error = %err, "coaching progress update failed");
        }
    })
}

pub async fn transcript(ctx: &AppContext, simulation_id: Uuid) -> CoachingResult<Vec<Message>> {
    load_simulation(ctx.store.as_ref(), simulation_id).await?;
    ctx.store.list_messages(simulation_id).await
}
