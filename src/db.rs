use std::collections::{BTreeMap, HashSet};

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{ScoreCard, SCORE_CATEGORIES};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_user(
    pool: &PgPool,
    full_name: &str,
    email: &str,
    role: &str,
    supervisor_id: Option<Uuid>,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO agent_coaching.users (id, full_name, email, role, supervisor_id)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE
        SET full_name = EXCLUDED.full_name,
            supervisor_id = COALESCE(EXCLUDED.supervisor_id, agent_coaching.users.supervisor_id)
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(full_name)
    .bind(email)
    .bind(role)
    .bind(supervisor_id)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

async fn upsert_scenario(
    pool: &PgPool,
    title: &str,
    category: &str,
    difficulty: &str,
    description: &str,
    client_persona: &str,
) -> anyhow::Result<Uuid> {
    let id = sqlx::query(
        r#"
        INSERT INTO agent_coaching.scenarios
        (id, title, category, difficulty, description, client_persona)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (title) DO UPDATE
        SET title = EXCLUDED.title
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(title)
    .bind(category)
    .bind(difficulty)
    .bind(description)
    .bind(client_persona)
    .fetch_one(pool)
    .await?
    .try_get("id")?;
    Ok(id)
}

/// Inserts a completed simulation once per `source_key`; returns whether a row was written.
async fn insert_completed_simulation(
    pool: &PgPool,
    user_id: Uuid,
    scenario_id: Uuid,
    scores: &ScoreCard,
    is_practice: bool,
    completed_at: DateTime<Utc>,
    source_key: &str,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO agent_coaching.simulations
        (id, user_id, scenario_id, status, is_practice, scores, feedback, started_at,
         completed_at, source_key)
        VALUES ($1, $2, $3, 'completed', $4, $5, NULL, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(scenario_id)
    .bind(is_practice)
    .bind(Json(scores))
    .bind(completed_at - Duration::minutes(15))
    .bind(completed_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let supervisor_id = upsert_user(
        pool,
        "Dana Cruz",
        "dana.cruz@example.com",
        "supervisor",
        None,
    )
    .await?;

    let scenarios = vec![
        (
            "Delayed refund",
            "empathy",
            "beginner",
            "A customer has waited three weeks for a refund and is frustrated.",
            "Polite but tired; has called twice already and wants to feel heard.",
        ),
        (
            "Cancelled flight rebooking",
            "empathy",
            "advanced",
            "A traveler's flight was cancelled hours before a wedding.",
            "Anxious and emotional; interrupts when rushed.",
        ),
        (
            "Router keeps dropping",
            "problem_resolution",
            "intermediate",
            "Home internet disconnects every evening.",
            "Technically curious; has already rebooted twice.",
        ),
        (
            "Billing code confusion",
            "communication_clarity",
            "beginner",
            "A customer does not understand new line items on their bill.",
            "Confused and slightly suspicious of hidden fees.",
        ),
        (
            "Escalation demand",
            "professionalism",
            "advanced",
            "A customer insists on speaking to a manager immediately.",
            "Curt and demanding; tests the agent's patience.",
        ),
        (
            "Rambling warranty claim",
            "active_listening",
            "intermediate",
            "A long-time customer describes a broken appliance with many side stories.",
            "Friendly and talkative; buries key details mid-story.",
        ),
    ];

    let mut scenario_ids = Vec::new();
    for (title, category, difficulty, description, persona) in scenarios {
        scenario_ids.push(
            upsert_scenario(pool, title, category, difficulty, description, persona).await?,
        );
    }

    // category scores in SCORE_CATEGORIES order, oldest session first
    let agents: Vec<(&str, &str, Vec<(f64, [f64; 5])>)> = vec![
        (
            "Avery Lee",
            "avery.lee@example.com",
            vec![
                (66.0, [62.0, 70.0, 68.0, 72.0, 80.0]),
                (58.0, [52.0, 64.0, 60.0, 66.0, 78.0]),
                (55.0, [50.0, 60.0, 58.0, 62.0, 76.0]),
                (57.0, [54.0, 62.0, 59.0, 63.0, 79.0]),
            ],
        ),
        (
            "Jules Moreno",
            "jules.moreno@example.com",
            vec![
                (78.0, [86.0, 80.0, 70.0, 74.0, 79.0]),
                (80.0, [88.0, 82.0, 71.0, 76.0, 81.0]),
                (79.0, [90.0, 81.0, 69.0, 75.0, 80.0]),
            ],
        ),
        (
            "Kiara Patel",
            "kiara.patel@example.com",
            vec![
                (70.0, [68.0, 72.0, 84.0, 66.0, 74.0]),
                (72.0, [66.0, 74.0, 86.0, 68.0, 76.0]),
                (74.0, [64.0, 76.0, 88.0, 71.0, 77.0]),
            ],
        ),
    ];

    let now = Utc::now();
    for (name, email, sessions) in agents {
        let user_id = upsert_user(pool, name, email, "agent", Some(supervisor_id)).await?;
        let count = sessions.len();
        for (index, (overall, categories)) in sessions.into_iter().enumerate() {
            let scores = ScoreCard {
                overall,
                categories: SCORE_CATEGORIES
                    .iter()
                    .zip(categories)
                    .map(|(category, value)| (category.to_string(), value))
                    .collect(),
            };
            let days_ago = (count - index) as i64;
            let scenario_id = scenario_ids[index % scenario_ids.len()];
            insert_completed_simulation(
                pool,
                user_id,
                scenario_id,
                &scores,
                false,
                now - Duration::days(days_ago),
                &format!("seed-{email}-{index}"),
            )
            .await?;
        }
    }

    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    full_name: String,
    email: String,
    scenario_title: String,
    category: String,
    overall: f64,
    empathy: Option<f64>,
    active_listening: Option<f64>,
    problem_resolution: Option<f64>,
    communication_clarity: Option<f64>,
    professionalism: Option<f64>,
    completed_at: DateTime<Utc>,
    practice: Option<bool>,
    source_key: Option<String>,
}

/// Empty category cells are skipped; NaN or infinite scores reject the row.
fn scores_from_row(row: &CsvRow, line: usize) -> anyhow::Result<ScoreCard> {
    if !row.overall.is_finite() {
        anyhow::bail!("row {line}: overall score {} is not a finite number", row.overall);
    }
    let mut categories = BTreeMap::new();
    for (category, value) in [
        ("empathy", row.empathy),
        ("active_listening", row.active_listening),
        ("problem_resolution", row.problem_resolution),
        ("communication_clarity", row.communication_clarity),
        ("professionalism", row.professionalism),
    ] {
        let Some(value) = value else { continue };
        if !value.is_finite() {
            anyhow::bail!("row {line}: {category} score {value} is not a finite number");
        }
        categories.insert(category.to_string(), value);
    }
    Ok(ScoreCard {
        overall: row.overall,
        categories,
    }
    .clamped())
}

/// Parses every row up front so a bad line aborts before anything is written.
/// A `source_key` repeated within the file keeps its first row.
fn parse_import<R: std::io::Read>(
    mut reader: csv::Reader<R>,
) -> anyhow::Result<Vec<(CsvRow, ScoreCard)>> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        let row = result.with_context(|| format!("row {line} is malformed"))?;
        if let Some(key) = &row.source_key {
            if !seen.insert(key.clone()) {
                tracing::warn!(line, source_key = %key, "duplicate source_key in file, skipping");
                continue;
            }
        }
        let scores = scores_from_row(&row, line)?;
        rows.push((row, scores));
    }
    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let rows = parse_import(reader)?;
    let mut inserted = 0usize;

    for (row, scores) in rows {
        let user_id = upsert_user(pool, &row.full_name, &row.email, "agent", None).await?;
        let scenario_id = upsert_scenario(
            pool,
            &row.scenario_title,
            &row.category,
            "intermediate",
            &row.scenario_title,
            "A typical customer for this scenario.",
        )
        .await?;

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        // rows already imported by an earlier run hit the source_key conflict and are skipped
        if insert_completed_simulation(
            pool,
            user_id,
            scenario_id,
            &scores,
            row.practice.unwrap_or(false),
            row.completed_at,
            &source_key,
        )
        .await?
        {
            inserted += 1;
        }
    }

    Ok(inserted)
}
