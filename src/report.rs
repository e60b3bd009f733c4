use std::fmt::Write;

use chrono::Utc;

use crate::analysis::PerformanceAnalysis;
use crate::models::{CoachingAlert, CoachingPlan, Scenario, Simulation, User};

fn scenario_title(scenarios: &[Scenario], id: uuid::Uuid) -> String {
    scenarios
        .iter()
        .find(|scenario| scenario.id == id)
        .map(|scenario| scenario.title.clone())
        .unwrap_or_else(|| id.to_string())
}

pub fn build_report(
    user: &User,
    analysis: Option<&PerformanceAnalysis>,
    plan: Option<&CoachingPlan>,
    alerts: &[CoachingAlert],
    recent: &[Simulation],
    scenarios: &[Scenario],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Coaching Report: {}", user.full_name);
    let _ = writeln!(
        output,
        "Generated for {} on {}",
        user.email,
        Utc::now().date_naive()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Performance");

    match analysis {
        None => {
            let _ = writeln!(
                output,
                "Not enough completed sessions to analyze yet (at least 3 are needed)."
            );
        }
        Some(analysis) => {
            let _ = writeln!(
                output,
                "Overall average {:.1} across {} sessions ({:?}).",
                analysis.overall_average, analysis.sessions_analyzed, analysis.overall_trend
            );
            let _ = writeln!(output);
            let _ = writeln!(output, "| Category | Average | Trend | Consistency |");
            let _ = writeln!(output, "| --- | --- | --- | --- |");
            for stats in &analysis.categories {
                let _ = writeln!(
                    output,
                    "| {} | {:.1} | {:?} | {:.0} |",
                    stats.category, stats.average, stats.trend, stats.consistency
                );
            }

            let _ = writeln!(output);
            let _ = writeln!(output, "### Weaknesses");
            if analysis.weaknesses.is_empty() {
                let _ = writeln!(output, "None below 70.");
            }
            for weakness in &analysis.weaknesses {
                let _ = writeln!(
                    output,
                    "- {} at {:.1} ({:?} priority, {:.1} below target)",
                    weakness.category, weakness.average, weakness.priority, weakness.gap
                );
            }

            let _ = writeln!(output);
            let _ = writeln!(output, "### Strengths");
            if analysis.strengths.is_empty() {
                let _ = writeln!(output, "None at 75 or above yet.");
            }
            for strength in &analysis.strengths {
                let _ = writeln!(output, "- {} at {:.1}", strength.category, strength.average);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Coaching Plan");
    match plan {
        None => {
            let _ = writeln!(output, "No active plan.");
        }
        Some(plan) => {
            let _ = writeln!(output, "Weekly goal: {}", plan.weekly_goal);
            let _ = writeln!(output, "Progress: {}%", plan.progress);
            let _ = writeln!(output, "Priority areas: {}", plan.priority_areas.join(", "));
            for id in &plan.recommended_scenario_ids {
                let _ = writeln!(output, "- {}", scenario_title(scenarios, *id));
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Open Alerts");
    if alerts.is_empty() {
        let _ = writeln!(output, "No open alerts.");
    } else {
        for alert in alerts {
            let _ = writeln!(
                output,
                "- [{}] {} ({}): {}",
                alert.severity, alert.title, alert.status, alert.message
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Sessions");
    if recent.is_empty() {
        let _ = writeln!(output, "No completed sessions yet.");
    } else {
        for simulation in recent.iter().take(5) {
            let overall = simulation
                .scores
                .as_ref()
                .map(|card| format!("{:.0}", card.overall))
                .unwrap_or_else(|| "unscored".to_string());
            let completed = simulation
                .completed_at
                .map(|at| at.date_naive().to_string())
                .unwrap_or_default();
            let _ = writeln!(
                output,
                "- {} on {}: {}",
                scenario_title(scenarios, simulation.scenario_id),
                completed,
                overall
            );
        }
    }

    output
}
