use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoachingError, CoachingResult};
use crate::models::{ScoreCard, Simulation};
use crate::store::CoachingStore;

pub const ANALYSIS_WINDOW: usize = 10;
pub const MIN_SESSIONS: usize = 3;
pub const TREND_DELTA: f64 = 3.0;
pub const WEAKNESS_CEILING: f64 = 70.0;
pub const MEDIUM_PRIORITY_CEILING: f64 = 65.0;
pub const HIGH_PRIORITY_CEILING: f64 = 60.0;
pub const STRENGTH_FLOOR: f64 = 75.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Declared most urgent first so sorting ascending puts `High` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryStats {
    pub category: String,
    pub average: f64,
    pub trend: Trend,
    pub consistency: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weakness {
    pub category: String,
    pub average: f64,
    pub gap: f64,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strength {
    pub category: String,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceAnalysis {
    pub user_id: Uuid,
    pub sessions_analyzed: usize,
    pub overall_average: f64,
    pub overall_trend: Trend,
    pub categories: Vec<CategoryStats>,
    pub weaknesses: Vec<Weakness>,
    pub strengths: Vec<Strength>,
}

impl PerformanceAnalysis {
    pub fn has_weakness(&self, category: &str) -> bool {
        self.weaknesses.iter().any(|w| w.category == category)
    }

    pub fn has_strength(&self, category: &str) -> bool {
        self.strengths.iter().any(|s| s.category == category)
    }
}

/// Analyzes the most recent completed, non-practice sessions of a user.
pub async fn analyze_agent_performance(
    store: &dyn CoachingStore,
    user_id: Uuid,
) -> CoachingResult<PerformanceAnalysis> {
    let simulations = store
        .recent_completed_simulations(user_id, ANALYSIS_WINDOW)
        .await?;
    let analysis = analyze_simulations(user_id, &simulations)?;
    debug!(
        %user_id,
        sessions = analysis.sessions_analyzed,
        weaknesses = analysis.weaknesses.len(),
        strengths = analysis.strengths.len(),
        "performance analyzed"
    );
    Ok(analysis)
}

/// `simulations` must be ordered newest first.
pub fn analyze_simulations(
    user_id: Uuid,
    simulations: &[Simulation],
) -> CoachingResult<PerformanceAnalysis> {
    let cards: Vec<&ScoreCard> = simulations
        .iter()
        .filter_map(|simulation| simulation.scores.as_ref())
        .take(ANALYSIS_WINDOW)
        .collect();

    if cards.len() < MIN_SESSIONS {
        return Err(CoachingError::InsufficientData {
            required: MIN_SESSIONS,
            found: cards.len(),
        });
    }

    let mut series: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut overall = Vec::with_capacity(cards.len());

    for card in cards.iter().rev() {
        overall.push(card.overall);
        for (category, value) in &card.categories {
            series.entry(category.as_str()).or_default().push(*value);
        }
    }

    let categories: Vec<CategoryStats> = series
        .into_iter()
        .map(|(category, values)| CategoryStats {
            category: category.to_string(),
            average: mean(&values),
            trend: trend_of(&values),
            consistency: consistency(&values),
            samples: values.len(),
        })
        .collect();

    Ok(PerformanceAnalysis {
        user_id,
        sessions_analyzed: cards.len(),
        overall_average: mean(&overall),
        overall_trend: trend_of(&overall),
        weaknesses: classify_weaknesses(&categories),
        strengths: classify_strengths(&categories),
        categories,
    })
}

pub fn classify_weaknesses(categories: &[CategoryStats]) -> Vec<Weakness> {
    let mut weaknesses: Vec<Weakness> = categories
        .iter()
        .filter_map(|stats| {
            weakness_priority(stats.average).map(|priority| Weakness {
                category: stats.category.clone(),
                average: stats.average,
                gap: WEAKNESS_CEILING - stats.average,
                priority,
            })
        })
        .collect();

    weaknesses.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.gap.partial_cmp(&a.gap).unwrap_or(Ordering::Equal))
    });
    weaknesses
}

/// Averages between the weakness ceiling and the strength floor are neutral.
pub fn classify_strengths(categories: &[CategoryStats]) -> Vec<Strength> {
    let mut strengths: Vec<Strength> = categories
        .iter()
        .filter(|stats| stats.average >= STRENGTH_FLOOR)
        .map(|stats| Strength {
            category: stats.category.clone(),
            average: stats.average,
        })
        .collect();

    strengths.sort_by(|a, b| b.average.partial_cmp(&a.average).unwrap_or(Ordering::Equal));
    strengths
}

pub fn weakness_priority(average: f64) -> Option<Priority> {
    if average < HIGH_PRIORITY_CEILING {
        Some(Priority::High)
    } else if average < MEDIUM_PRIORITY_CEILING {
        Some(Priority::Medium)
    } else if average < WEAKNESS_CEILING {
        Some(Priority::Low)
    } else {
        None
    }
}

/// Compares the older half of a chronological series with the newer half.
pub fn trend_of(values: &[f64]) -> Trend {
    if values.len() < 2 {
        return Trend::Stable;
    }

    let half = values.len() / 2;
    let delta = mean(&values[half..]) - mean(&values[..half]);

    if delta >= TREND_DELTA {
        Trend::Improving
    } else if delta <= -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

pub fn consistency(values: &[f64]) -> f64 {
    (100.0 - 2.0 * std_dev(values)).max(0.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Population standard deviation.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::completed_simulation;

    fn history(user_id: Uuid, newest_first: &[(f64, &[(&str, f64)])]) -> Vec<Simulation> {
        newest_first
            .iter()
            .enumerate()
            .map(|(index, (overall, categories))| {
                completed_simulation(user_id, Uuid::new_v4(), index as i64, *overall, categories)
            })
            .collect()
    }

    #[test]
    fn fewer_than_three_sessions_is_insufficient() {
        let user_id = Uuid::new_v4();
        let sims = history(user_id, &[(70.0, &[]), (72.0, &[])]);
        let err = analyze_simulations(user_id, &sims).unwrap_err();
        assert!(err.is_insufficient_data());
        assert!(matches!(
            err,
            CoachingError::InsufficientData { required: 3, found: 2 }
        ));
    }

    #[test]
    fn medium_weakness_from_literal_thresholds() {
        let user_id = Uuid::new_v4();
        // oldest to newest: 80, 50, 55
        let sims = history(
            user_id,
            &[
                (60.0, &[("empathy", 55.0)]),
                (60.0, &[("empathy", 50.0)]),
                (60.0, &[("empathy", 80.0)]),
            ],
        );

        let analysis = analyze_simulations(user_id, &sims).unwrap();
        let empathy = &analysis.categories[0];
        assert!((empathy.average - 61.67).abs() < 0.1);
        assert_eq!(empathy.trend, Trend::Declining);

        assert_eq!(analysis.weaknesses.len(), 1);
        let weakness = &analysis.weaknesses[0];
        assert_eq!(weakness.priority, Priority::Medium);
        assert!((weakness.gap - 8.33).abs() < 0.1);
        assert!(analysis.strengths.is_empty());
    }

    #[test]
    fn neutral_band_is_neither_weakness_nor_strength() {
        let user_id = Uuid::new_v4();
        let row: &[(&str, f64)] = &[("professionalism", 72.0), ("empathy", 90.0)];
        let sims = history(user_id, &[(72.0, row), (72.0, row), (72.0, row)]);

        let analysis = analyze_simulations(user_id, &sims).unwrap();
        assert!(analysis.weaknesses.is_empty());
        assert_eq!(analysis.strengths.len(), 1);
        assert_eq!(analysis.strengths[0].category, "empathy");
        assert!(!analysis.has_weakness("professionalism"));
        assert!(!analysis.has_strength("professionalism"));
    }

    #[test]
    fn weaknesses_sort_by_priority_then_gap() {
        let user_id = Uuid::new_v4();
        let row: &[(&str, f64)] = &[
            ("active_listening", 67.0),
            ("empathy", 58.0),
            ("professionalism", 45.0),
            ("communication_clarity", 62.0),
        ];
        let sims = history(user_id, &[(60.0, row), (60.0, row), (60.0, row)]);

        let analysis = analyze_simulations(user_id, &sims).unwrap();
        let order: Vec<(&str, Priority)> = analysis
            .weaknesses
            .iter()
            .map(|w| (w.category.as_str(), w.priority))
            .collect();
        assert_eq!(
            order,
            vec![
                ("professionalism", Priority::High),
                ("empathy", Priority::High),
                ("communication_clarity", Priority::Medium),
                ("active_listening", Priority::Low),
            ]
        );
    }

    #[test]
    fn only_the_ten_newest_sessions_count() {
        let user_id = Uuid::new_v4();
        let empty: &[(&str, f64)] = &[];
        let mut rows = vec![(90.0, empty); 10];
        rows.push((10.0, empty));
        rows.push((10.0, empty));
        let sims = history(user_id, &rows);

        let analysis = analyze_simulations(user_id, &sims).unwrap();
        assert_eq!(analysis.sessions_analyzed, 10);
        assert_eq!(analysis.overall_average, 90.0);
    }

    #[test]
    fn trend_uses_three_point_threshold() {
        assert_eq!(trend_of(&[60.0, 63.0]), Trend::Improving);
        assert_eq!(trend_of(&[60.0, 62.9]), Trend::Stable);
        assert_eq!(trend_of(&[70.0, 67.0]), Trend::Declining);
        assert_eq!(trend_of(&[70.0]), Trend::Stable);
        // older half is the first len/2 values
        assert_eq!(trend_of(&[50.0, 80.0, 80.0]), Trend::Improving);
    }

    #[test]
    fn consistency_never_goes_negative() {
        assert_eq!(consistency(&[70.0, 70.0, 70.0]), 100.0);
        assert!((consistency(&[60.0, 80.0]) - 80.0).abs() < 1e-9);
        assert_eq!(consistency(&[0.0, 100.0]), 0.0);
    }
}
