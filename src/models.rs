use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::config::CompositeWeights;

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgePoint {
    pub id: String,
    pub subject: String,
    pub difficulty: i32,
    pub estimated_minutes: i32,
    pub prerequisites: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LearnerProgressRecord {
    pub point_id: String,
    pub status: ProgressStatus,
    pub best_score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct StudySession {
    pub start_time: DateTime<Utc>,
    pub duration_seconds: i64,
}

#[derive(Debug, Clone)]
pub struct WrongAnswerRecord {
    pub subject: String,
    pub mastered: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SkillAssessment {
    pub skill_profile: HashMap<String, f64>,
    pub weaknesses: HashSet<String>,
}

/// Everything the engine reads for one learner, fetched once per request.
#[derive(Debug, Clone, Default)]
pub struct LearnerSnapshot {
    pub points: Vec<KnowledgePoint>,
    pub progress: Vec<LearnerProgressRecord>,
    pub sessions: Vec<StudySession>,
    pub wrong_answers: Vec<WrongAnswerRecord>,
    pub assessment: Option<SkillAssessment>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearnerMetrics {
    pub total_completed: usize,
    pub avg_score: f64,
    pub error_rate_percent: f64,
    pub learning_speed_per_hour: f64,
    pub days_since_last_study: i64,
}

/// Why a point landed where it did. Later scoring rules overwrite earlier ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    NextInPath,
    BlockedByPrerequisites,
    ReinforceWeakSubject,
    ManyMistakes(String),
    GentleRestart,
    ResumeInProgress,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::NextInPath => f.write_str("next in learning path"),
            Reason::BlockedByPrerequisites => f.write_str("blocked by prerequisites"),
            Reason::ReinforceWeakSubject => f.write_str("reinforce weak subject"),
            Reason::ManyMistakes(subject) => write!(f, "many mistakes in {subject}"),
            Reason::GentleRestart => f.write_str("gentle restart"),
            Reason::ResumeInProgress => f.write_str("resume in-progress course"),
        }
    }
}

impl Serialize for Reason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub point_id: String,
    pub priority: i32,
    pub urgency: f64,
    pub predicted_success_rate: f64,
    pub estimated_minutes: i32,
    pub difficulty: i32,
    pub reason: Reason,
}

impl Recommendation {
    pub fn composite_score(&self, weights: &CompositeWeights) -> f64 {
        self.priority as f64 * weights.priority
            + self.urgency * weights.urgency
            + self.predicted_success_rate * weights.success_rate
    }
}
