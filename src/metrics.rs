use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{
    LearnerMetrics, LearnerProgressRecord, ProgressStatus, StudySession, WrongAnswerRecord,
};

pub const NEVER_STUDIED_DAYS: i64 = 999;
const UNKNOWN_ERROR_RATE: f64 = 50.0;
const DEFAULT_LEARNING_SPEED: f64 = 1.0;

pub fn compute_metrics(
    progress: &[LearnerProgressRecord],
    sessions: &[StudySession],
    wrong_answers: &[WrongAnswerRecord],
    now: DateTime<Utc>,
    questions_per_point: f64,
) -> LearnerMetrics {
    let total_completed = progress
        .iter()
        .filter(|record| record.status == ProgressStatus::Completed)
        .count();

    let scores: Vec<f64> = progress.iter().filter_map(|record| record.best_score).collect();
    let avg_score = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };

    let total_seconds: i64 = sessions
        .iter()
        .map(|session| session.duration_seconds.max(0))
        .sum();
    let learning_speed_per_hour = if total_seconds == 0 {
        DEFAULT_LEARNING_SPEED
    } else {
        total_completed as f64 / (total_seconds as f64 / 3600.0)
    };

    let error_rate_percent = if total_completed == 0 || questions_per_point <= 0.0 {
        UNKNOWN_ERROR_RATE
    } else {
        100.0 * wrong_answers.len() as f64 / (total_completed as f64 * questions_per_point)
    };

    let days_since_last_study = sessions
        .iter()
        .map(|session| session.start_time)
        .max()
        .map(|latest| (now - latest).num_days().max(0))
        .unwrap_or(NEVER_STUDIED_DAYS);

    LearnerMetrics {
        total_completed,
        avg_score,
        error_rate_percent,
        learning_speed_per_hour,
        days_since_last_study,
    }
}

/// Unmastered wrong answers per subject.
pub fn unmastered_by_subject(wrong_answers: &[WrongAnswerRecord]) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for answer in wrong_answers.iter().filter(|answer| !answer.mastered) {
        *counts.entry(answer.subject.clone()).or_insert(0) += 1;
    }
    counts
}

/// Most recent completions first; records without a timestamp trail, ordered by id.
pub fn recent_completions(progress: &[LearnerProgressRecord], window: usize) -> Vec<&LearnerProgressRecord> {
    let mut completed: Vec<&LearnerProgressRecord> = progress
        .iter()
        .filter(|record| record.status == ProgressStatus::Completed)
        .collect();

    completed.sort_by(|a, b| {
        b.completed_at
            .cmp(&a.completed_at)
            .then_with(|| a.point_id.cmp(&b.point_id))
    });
    completed.truncate(window);
    completed
}
