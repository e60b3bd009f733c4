use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod alerts;
mod analysis;
mod api;
mod buddy;
mod coaching;
mod config;
mod context;
mod db;
mod error;
mod llm;
mod models;
mod report;
mod simulation;
mod store;
#[cfg(test)]
mod testing;

use config::Config;
use context::AppContext;
use models::{AlertStatus, PairStatus, User};
use store::{AlertFilter, CoachingStore, PgStore};

#[derive(Parser)]
#[command(name = "agent-coaching")]
#[command(about = "Practice simulations, coaching plans and supervisor alerts for contact-center agents", long_about = None)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import completed simulations from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List practice scenarios
    Scenarios,
    /// Analyze an agent's recent performance
    Analyze {
        #[arg(long)]
        email: String,
    },
    /// Generate or show coaching plans
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    /// Find, create and end buddy pairs
    Buddies {
        #[command(subcommand)]
        command: BuddyCommand,
    },
    /// Run and manage supervisor alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommand,
    },
    /// Hold a practice conversation with the virtual client
    Simulate {
        #[command(subcommand)]
        command: SimulateCommand,
    },
    /// Generate a markdown coaching report for an agent
    Report {
        #[arg(long)]
        email: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Serve the JSON API
    Serve {
        #[arg(long, env = "COACHING_ADDR", default_value = "127.0.0.1:8080")]
        addr: SocketAddr,
    },
}

#[derive(Subcommand)]
enum PlanCommand {
    /// Build a new plan, cancelling the active one
    Generate {
        #[arg(long)]
        email: String,
    },
    /// Show the active plan
    Show {
        #[arg(long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum BuddyCommand {
    /// Rank compatible peers
    Find {
        #[arg(long)]
        email: String,
    },
    /// Pair two agents
    Pair {
        #[arg(long)]
        email: String,
        #[arg(long)]
        with: String,
        #[arg(long)]
        goal: Option<String>,
    },
    /// End an active pair
    End {
        #[arg(long)]
        pair_id: Uuid,
        /// Mark the pair cancelled instead of completed
        #[arg(long)]
        cancel: bool,
    },
}

#[derive(Subcommand)]
enum AlertCommand {
    /// Run the alert rules for an agent now
    Check {
        #[arg(long)]
        email: String,
    },
    /// List alerts, newest first
    List {
        #[arg(long)]
        supervisor: Option<String>,
        #[arg(long)]
        status: Option<String>,
    },
    Ack {
        #[arg(long)]
        id: Uuid,
    },
    Resolve {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum SimulateCommand {
    /// Open a conversation
    Start {
        #[arg(long)]
        email: String,
        #[arg(long)]
        scenario: Uuid,
        #[arg(long)]
        practice: bool,
    },
    /// Send the agent's next line
    Say {
        #[arg(long)]
        simulation: Uuid,
        message: String,
    },
    /// Score the conversation
    Complete {
        #[arg(long)]
        simulation: Uuid,
    },
}

async fn user_by_email(store: &dyn CoachingStore, email: &str) -> anyhow::Result<User> {
    store
        .find_user_by_email(email)
        .await?
        .with_context(|| format!("no user with email {email}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agent_coaching=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let pool = cli.config.connect().await?;
    let pg_store = PgStore::new(pool);
    let ctx = AppContext::new(Arc::new(pg_store.clone()), cli.config.language_model()?);
    let store = ctx.store.as_ref();

    match cli.command {
        Commands::InitDb => {
            db::init_db(pg_store.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(pg_store.pool()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(pg_store.pool(), &csv).await?;
            println!("Inserted {inserted} simulations from {}.", csv.display());
        }
        Commands::Scenarios => {
            for scenario in store.list_scenarios().await? {
                println!(
                    "- {} {} [{}, {}]",
                    scenario.id, scenario.title, scenario.category, scenario.difficulty
                );
            }
        }
        Commands::Analyze { email } => {
            let user = user_by_email(store, &email).await?;
            let analysis = analysis::analyze_agent_performance(store, user.id).await?;
            println!(
                "{}: overall {:.1} across {} sessions ({:?})",
                user.full_name,
                analysis.overall_average,
                analysis.sessions_analyzed,
                analysis.overall_trend
            );
            for stats in &analysis.categories {
                println!(
                    "- {} average {:.1}, trend {:?}, consistency {:.0}",
                    stats.category, stats.average, stats.trend, stats.consistency
                );
            }
            for weakness in &analysis.weaknesses {
                println!(
                    "Weakness: {} ({:?} priority, gap {:.1})",
                    weakness.category, weakness.priority, weakness.gap
                );
            }
            for strength in &analysis.strengths {
                println!("Strength: {} ({:.1})", strength.category, strength.average);
            }
        }
        Commands::Plan { command } => match command {
            PlanCommand::Generate { email } => {
                let user = user_by_email(store, &email).await?;
                let plan =
                    coaching::generate_coaching_plan(store, ctx.llm.as_ref(), user.id).await?;
                println!("New plan {} for {}.", plan.id, user.full_name);
                println!("Weekly goal: {}", plan.weekly_goal);
                println!("Priority areas: {}", plan.priority_areas.join(", "));
                println!("Recommended scenarios: {}", plan.recommended_scenario_ids.len());
            }
            PlanCommand::Show { email } => {
                let user = user_by_email(store, &email).await?;
                match coaching::active_plan(store, user.id).await? {
                    Some(plan) => {
                        println!("Plan {} ({}% complete)", plan.id, plan.progress);
                        println!("Weekly goal: {}", plan.weekly_goal);
                        println!("Priority areas: {}", plan.priority_areas.join(", "));
                    }
                    None => println!("{} has no active plan.", user.full_name),
                }
            }
        },
        Commands::Buddies { command } => match command {
            BuddyCommand::Find { email } => {
                let user = user_by_email(store, &email).await?;
                let candidates = buddy::find_buddy_candidates(store, user.id).await?;
                if candidates.is_empty() {
                    println!("No buddy candidates available.");
                }
                for candidate in candidates {
                    println!(
                        "- {} ({}) compatibility {}",
                        candidate.full_name, candidate.email, candidate.compatibility_score
                    );
                    for reason in candidate.reasons {
                        println!("    {reason}");
                    }
                }
            }
            BuddyCommand::Pair { email, with, goal } => {
                let a = user_by_email(store, &email).await?;
                let b = user_by_email(store, &with).await?;
                let pair = buddy::create_buddy_pair(store, a.id, b.id, goal).await?;
                println!(
                    "Paired {} with {} ({}): {}",
                    a.full_name, b.full_name, pair.id, pair.shared_goal
                );
            }
            BuddyCommand::End { pair_id, cancel } => {
                let status = if cancel {
                    PairStatus::Cancelled
                } else {
                    PairStatus::Completed
                };
                let pair = buddy::end_buddy_pair(store, pair_id, status).await?;
                println!("Buddy pair {} is now {}.", pair.id, pair.status);
            }
        },
        Commands::Alerts { command } => match command {
            AlertCommand::Check { email } => {
                let user = user_by_email(store, &email).await?;
                let created = alerts::check_alerts(store, user.id).await?;
                println!("{} alerts raised for {}.", created.len(), user.full_name);
                for alert in created {
                    println!("- [{}] {}: {}", alert.severity, alert.title, alert.message);
                }
            }
            AlertCommand::List { supervisor, status } => {
                let supervisor_id = match supervisor {
                    Some(email) => Some(user_by_email(store, &email).await?.id),
                    None => None,
                };
                let status = status
                    .map(|value| value.parse::<AlertStatus>())
                    .transpose()?;
                let filter = AlertFilter {
                    supervisor_id,
                    user_id: None,
                    status,
                };
                let listed = alerts::list_alerts(store, &filter).await?;
                if listed.is_empty() {
                    println!("No alerts found.");
                }
                for alert in listed {
                    println!(
                        "- {} [{}] {} ({}) {}",
                        alert.id, alert.severity, alert.title, alert.status, alert.message
                    );
                }
            }
            AlertCommand::Ack { id } => {
                let alert = alerts::acknowledge_alert(store, id).await?;
                println!("Alert {} acknowledged.", alert.id);
            }
            AlertCommand::Resolve { id } => {
                let alert = alerts::resolve_alert(store, id).await?;
                println!("Alert {} resolved.", alert.id);
            }
        },
        Commands::Simulate { command } => match command {
            SimulateCommand::Start {
                email,
                scenario,
                practice,
            } => {
                let user = user_by_email(store, &email).await?;
                let (sim, opening) =
                    simulation::start_simulation(&ctx, user.id, scenario, practice).await?;
                println!("Simulation {} started.", sim.id);
                println!("Customer: {}", opening.content);
            }
            SimulateCommand::Say {
                simulation: simulation_id,
                message,
            } => {
                let reply = simulation::send_message(&ctx, simulation_id, &message).await?;
                println!("Customer: {}", reply.content);
            }
            SimulateCommand::Complete {
                simulation: simulation_id,
            } => {
                let completed = simulation::complete_simulation(&ctx, simulation_id).await?;
                // the process exits after this command, so wait for alert checks here
                completed
                    .post_processing
                    .await
                    .context("post-processing task panicked")?;
                if let Some(scores) = &completed.simulation.scores {
                    println!("Overall score {:.0}", scores.overall);
                    for (category, value) in &scores.categories {
                        println!("- {category}: {value:.0}");
                    }
                }
                if let Some(feedback) = &completed.simulation.feedback {
                    println!("{feedback}");
                }
            }
        },
        Commands::Report { email, out } => {
            let user = user_by_email(store, &email).await?;
            let analysis = match analysis::analyze_agent_performance(store, user.id).await {
                Ok(analysis) => Some(analysis),
                Err(err) if err.is_insufficient_data() => None,
                Err(err) => return Err(err.into()),
            };
            let plan = coaching::active_plan(store, user.id).await?;
            let open_alerts: Vec<_> = alerts::list_alerts(
                store,
                &AlertFilter {
                    user_id: Some(user.id),
                    ..AlertFilter::default()
                },
            )
            .await?
            .into_iter()
            .filter(|alert| alert.status != AlertStatus::Resolved)
            .collect();
            let recent = store
                .recent_completed_simulations(user.id, analysis::ANALYSIS_WINDOW)
                .await?;
            let scenarios = store.list_scenarios().await?;

            let report = report::build_report(
                &user,
                analysis.as_ref(),
                plan.as_ref(),
                &open_alerts,
                &recent,
                &scenarios,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Serve { addr } => {
            api::serve(ctx.clone(), addr).await?;
        }
    }

    Ok(())
}
