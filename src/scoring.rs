use std::collections::{HashMap, HashSet};

use crate::config::ScoringWeights;
use crate::graph::GraphNode;
use crate::models::{LearnerMetrics, ProgressStatus, Reason, Recommendation, SkillAssessment};

#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    pub metrics: &'a LearnerMetrics,
    pub assessment: Option<&'a SkillAssessment>,
    pub completed: &'a HashSet<String>,
    pub statuses: &'a HashMap<String, ProgressStatus>,
    pub unmastered_mistakes: &'a HashMap<String, usize>,
    pub recent_avg_difficulty: Option<f64>,
}

/// Rules run in a fixed order; the last one to set `reason` wins.
pub fn score_node(node: &GraphNode, ctx: &ScoringContext<'_>, weights: &ScoringWeights) -> Recommendation {
    let point = &node.point;
    let mut priority = weights.base_priority;
    let mut urgency = weights.base_urgency;
    let mut success = weights.base_success_rate;
    let mut reason = Reason::NextInPath;

    // 1. prerequisite gate
    let blocked = node
        .prerequisites
        .iter()
        .any(|prerequisite| !ctx.completed.contains(prerequisite));
    if blocked {
        priority -= weights.blocked_penalty;
        success = weights.blocked_success_rate;
        return finish(node, priority, urgency, success, Reason::BlockedByPrerequisites, weights);
    }

    // 2. weakness boost
    if let Some(assessment) = ctx.assessment {
        if assessment.weaknesses.contains(&point.subject) {
            priority += weights.weakness_boost;
            urgency += weights.weakness_urgency;
            reason = Reason::ReinforceWeakSubject;
        }
    }

    // 3. skill-difficulty match
    if let Some(assessment) = ctx.assessment {
        let skill = assessment
            .skill_profile
            .get(&point.subject)
            .copied()
            .unwrap_or(weights.default_skill_level);
        let difficulty_score = point.difficulty as f64 * weights.difficulty_scale;
        let match_score = 100.0 - (skill - difficulty_score).abs();
        priority += match_score * weights.skill_match_factor;

        success = if skill >= difficulty_score + weights.tier_margin {
            weights.success_well_above
        } else if skill >= difficulty_score {
            weights.success_above
        } else if skill >= difficulty_score - weights.tier_margin {
            weights.success_near
        } else {
            priority -= weights.mismatch_penalty;
            weights.success_below
        };
    }

    // 4. learning-speed adaptation
    let speed = ctx.metrics.learning_speed_per_hour;
    if speed > weights.fast_speed_threshold && point.difficulty >= weights.fast_min_difficulty {
        priority += weights.speed_boost;
    }
    if speed < weights.slow_speed_threshold && point.difficulty <= weights.slow_max_difficulty {
        priority += weights.speed_boost;
    }

    // 5. subject error pressure
    let mistakes = ctx
        .unmastered_mistakes
        .get(&point.subject)
        .copied()
        .unwrap_or(0);
    if mistakes > weights.mistake_threshold {
        priority += weights.mistake_boost;
        urgency += weights.mistake_urgency;
        reason = Reason::ManyMistakes(point.subject.clone());
    }

    // 6. stagnation recovery
    if ctx.metrics.days_since_last_study > weights.stagnation_days
        && point.difficulty <= weights.stagnation_max_difficulty
    {
        priority += weights.stagnation_boost;
        reason = Reason::GentleRestart;
    }

    // 7. easy course
    if point.difficulty == 1 {
        priority += weights.easy_boost;
        success = success.max(weights.easy_success_floor).min(weights.easy_success_floor);
    }

    // 8. short course
    if point.estimated_minutes <= weights.short_course_minutes {
        priority += weights.short_course_bonus;
    }

    // 9. in-progress continuation
    if ctx.statuses.get(&point.id) == Some(&ProgressStatus::InProgress) {
        priority += weights.in_progress_boost;
        urgency += weights.in_progress_urgency;
        reason = Reason::ResumeInProgress;
    }

    // 10. difficulty continuity
    if let Some(recent) = ctx.recent_avg_difficulty {
        let gap = (point.difficulty as f64 - recent).abs();
        if gap > weights.continuity_wide_gap {
            priority -= weights.continuity_penalty;
            success -= weights.continuity_success_penalty;
        } else if gap <= weights.continuity_close_gap {
            priority += weights.continuity_bonus;
        }
    }

    finish(node, priority, urgency, success, reason, weights)
}

fn finish(
    node: &GraphNode,
    priority: f64,
    urgency: f64,
    success: f64,
    reason: Reason,
    weights: &ScoringWeights,
) -> Recommendation {
    Recommendation {
        point_id: node.point.id.clone(),
        priority: priority.round() as i32,
        urgency: urgency.clamp(weights.min_urgency, weights.max_urgency),
        predicted_success_rate: success.clamp(weights.min_success_rate, weights.max_success_rate),
        estimated_minutes: node.point.estimated_minutes,
        difficulty: node.point.difficulty,
        reason,
    }
}
