use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_ENV: &str = "LEARNING_PATH_CONFIG";

/// Tunable constants for the recommendation engine.
///
/// Every field has a default, so a TOML file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_recommendations: usize,
    pub recalibration_threshold: usize,
    pub questions_per_point: f64,
    pub weights: ScoringWeights,
    pub composite: CompositeWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recommendations: 50,
            recalibration_threshold: 3,
            questions_per_point: 10.0,
            weights: ScoringWeights::default(),
            composite: CompositeWeights::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub base_priority: f64,
    pub base_urgency: f64,
    pub base_success_rate: f64,

    pub blocked_penalty: f64,
    pub blocked_success_rate: f64,

    pub weakness_boost: f64,
    pub weakness_urgency: f64,

    /// Difficulty 1..=5 is mapped onto the 0..=100 skill scale by this factor.
    pub difficulty_scale: f64,
    pub default_skill_level: f64,
    pub skill_match_factor: f64,
    pub tier_margin: f64,
    pub success_well_above: f64,
    pub success_above: f64,
    pub success_near: f64,
    pub success_below: f64,
    pub mismatch_penalty: f64,

    pub fast_speed_threshold: f64,
    pub slow_speed_threshold: f64,
    pub fast_min_difficulty: i32,
    pub slow_max_difficulty: i32,
    pub speed_boost: f64,

    pub mistake_threshold: usize,
    pub mistake_boost: f64,
    pub mistake_urgency: f64,

    pub stagnation_days: i64,
    pub stagnation_max_difficulty: i32,
    pub stagnation_boost: f64,

    pub easy_boost: f64,
    pub easy_success_floor: f64,

    pub short_course_minutes: i32,
    pub short_course_bonus: f64,

    pub in_progress_boost: f64,
    pub in_progress_urgency: f64,

    pub continuity_window: usize,
    pub continuity_wide_gap: f64,
    pub continuity_penalty: f64,
    pub continuity_success_penalty: f64,
    pub continuity_close_gap: f64,
    pub continuity_bonus: f64,

    pub min_success_rate: f64,
    pub max_success_rate: f64,
    pub min_urgency: f64,
    pub max_urgency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base_priority: 50.0,
            base_urgency: 50.0,
            base_success_rate: 70.0,

            blocked_penalty: 100.0,
            blocked_success_rate: 20.0,

            weakness_boost: 40.0,
            weakness_urgency: 30.0,

            difficulty_scale: 20.0,
            default_skill_level: 50.0,
            skill_match_factor: 0.3,
            tier_margin: 20.0,
            success_well_above: 90.0,
            success_above: 80.0,
            success_near: 65.0,
            success_below: 40.0,
            mismatch_penalty: 20.0,

            fast_speed_threshold: 2.0,
            slow_speed_threshold: 1.0,
            fast_min_difficulty: 3,
            slow_max_difficulty: 2,
            speed_boost: 15.0,

            mistake_threshold: 5,
            mistake_boost: 25.0,
            mistake_urgency: 20.0,

            stagnation_days: 7,
            stagnation_max_difficulty: 2,
            stagnation_boost: 20.0,

            easy_boost: 15.0,
            easy_success_floor: 95.0,

            short_course_minutes: 30,
            short_course_bonus: 10.0,

            in_progress_boost: 50.0,
            in_progress_urgency: 40.0,

            continuity_window: 3,
            continuity_wide_gap: 2.0,
            continuity_penalty: 15.0,
            continuity_success_penalty: 10.0,
            continuity_close_gap: 0.5,
            continuity_bonus: 10.0,

            min_success_rate: 10.0,
            max_success_rate: 95.0,
            min_urgency: 0.0,
            max_urgency: 100.0,
        }
    }
}

/// Blend used by the sequencer to rank topologically eligible points.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub priority: f64,
    pub urgency: f64,
    pub success_rate: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            priority: 0.5,
            urgency: 0.3,
            success_rate: 0.2,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_toml_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    /// Explicit path first, then `LEARNING_PATH_CONFIG`, then built-in defaults.
    pub fn resolve(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        match path {
            Some(path) => Self::load_file(&path),
            None => {
                tracing::debug!("using default engine config");
                Ok(Self::default())
            }
        }
    }
}
