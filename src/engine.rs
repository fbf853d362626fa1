use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::graph::load_graph;
use crate::metrics::{compute_metrics, recent_completions, unmastered_by_subject};
use crate::models::{
    KnowledgePoint, LearnerProgressRecord, LearnerSnapshot, ProgressStatus, Recommendation,
    SkillAssessment, StudySession, WrongAnswerRecord,
};
use crate::scoring::{score_node, ScoringContext};
use crate::sequencer::sequence;

/// Read-only feeds the engine pulls from at the start of each request.
#[async_trait]
pub trait LearnerDataSource: Send + Sync {
    async fn fetch_all_knowledge_points(&self) -> anyhow::Result<Vec<KnowledgePoint>>;
    async fn fetch_learner_progress(&self, learner_id: Uuid) -> anyhow::Result<Vec<LearnerProgressRecord>>;
    async fn fetch_study_sessions(&self, learner_id: Uuid) -> anyhow::Result<Vec<StudySession>>;
    async fn fetch_wrong_answers(&self, learner_id: Uuid) -> anyhow::Result<Vec<WrongAnswerRecord>>;
    async fn fetch_assessment(&self, learner_id: Uuid) -> anyhow::Result<Option<SkillAssessment>>;
}

pub struct Recommender<S> {
    source: S,
    config: EngineConfig,
}

impl<S: LearnerDataSource> Recommender<S> {
    pub fn new(source: S, config: EngineConfig) -> Self {
        Self { source, config }
    }

    pub async fn recommend(&self, learner_id: Uuid) -> anyhow::Result<Vec<Recommendation>> {
        self.recommend_at(learner_id, Utc::now()).await
    }

    pub async fn recommend_at(
        &self,
        learner_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Recommendation>> {
        let snapshot = LearnerSnapshot {
            points: self.source.fetch_all_knowledge_points().await?,
            progress: self.source.fetch_learner_progress(learner_id).await?,
            sessions: self.source.fetch_study_sessions(learner_id).await?,
            wrong_answers: self.source.fetch_wrong_answers(learner_id).await?,
            assessment: self.source.fetch_assessment(learner_id).await?,
        };

        let path = build_path(&snapshot, now, &self.config);
        tracing::info!(
            learner = %learner_id,
            recommendations = path.len(),
            "learning path generated"
        );
        Ok(path)
    }
}

/// True once enough points were completed since the last path was generated.
pub fn should_recalibrate(recently_completed_count: usize, threshold: usize) -> bool {
    recently_completed_count >= threshold
}

/// Run graph, metrics, scoring and sequencing over one learner snapshot.
pub fn build_path(
    snapshot: &LearnerSnapshot,
    now: DateTime<Utc>,
    config: &EngineConfig,
) -> Vec<Recommendation> {
    let graph = load_graph(&snapshot.points);
    if graph.is_empty() {
        tracing::debug!("no knowledge points loaded");
        return Vec::new();
    }

    let cyclic = graph.cyclic_nodes();
    if !cyclic.is_empty() {
        tracing::warn!(
            count = cyclic.len(),
            nodes = ?cyclic,
            "prerequisite cycle detected, ordering of these points is best effort"
        );
    }

    let metrics = compute_metrics(
        &snapshot.progress,
        &snapshot.sessions,
        &snapshot.wrong_answers,
        now,
        config.questions_per_point,
    );
    tracing::debug!(
        points = graph.len(),
        completed = metrics.total_completed,
        avg_score = metrics.avg_score,
        error_rate = metrics.error_rate_percent,
        speed_per_hour = metrics.learning_speed_per_hour,
        idle_days = metrics.days_since_last_study,
        "learner metrics"
    );

    let completed: HashSet<String> = snapshot
        .progress
        .iter()
        .filter(|record| record.status == ProgressStatus::Completed)
        .map(|record| record.point_id.clone())
        .collect();
    let statuses: HashMap<String, ProgressStatus> = snapshot
        .progress
        .iter()
        .map(|record| (record.point_id.clone(), record.status))
        .collect();
    let unmastered = unmastered_by_subject(&snapshot.wrong_answers);

    let recent_difficulties: Vec<f64> =
        recent_completions(&snapshot.progress, config.weights.continuity_window)
            .iter()
            .filter_map(|record| graph.get(&record.point_id))
            .map(|node| node.point.difficulty as f64)
            .collect();
    let recent_avg_difficulty = if recent_difficulties.is_empty() {
        None
    } else {
        Some(recent_difficulties.iter().sum::<f64>() / recent_difficulties.len() as f64)
    };

    let ctx = ScoringContext {
        metrics: &metrics,
        assessment: snapshot.assessment.as_ref(),
        completed: &completed,
        statuses: &statuses,
        unmastered_mistakes: &unmastered,
        recent_avg_difficulty,
    };

    let scored: Vec<Recommendation> = graph
        .nodes()
        .filter(|node| !completed.contains(&node.point.id))
        .map(|node| score_node(node, &ctx, &config.weights))
        .collect();

    let mut path = sequence(scored, &graph, &config.composite);
    path.truncate(config.max_recommendations);
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::models::Reason;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn point(id: &str, subject: &str, difficulty: i32, prerequisites: &[&str]) -> KnowledgePoint {
        KnowledgePoint {
            id: id.to_string(),
            subject: subject.to_string(),
            difficulty,
            estimated_minutes: 40,
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn progress(point_id: &str, status: ProgressStatus) -> LearnerProgressRecord {
        LearnerProgressRecord {
            point_id: point_id.to_string(),
            status,
            best_score: Some(75.0),
            completed_at: None,
        }
    }

    fn assert_topological(path: &[Recommendation], points: &[KnowledgePoint]) {
        let position: HashMap<&str, usize> = path
            .iter()
            .enumerate()
            .map(|(index, rec)| (rec.point_id.as_str(), index))
            .collect();
        for point in points {
            let Some(&at) = position.get(point.id.as_str()) else {
                continue;
            };
            for prerequisite in &point.prerequisites {
                if let Some(&before) = position.get(prerequisite.as_str()) {
                    assert!(
                        before < at,
                        "{} must come before {}",
                        prerequisite,
                        point.id
                    );
                }
            }
        }
    }

    /// Layered curriculum: each layer depends on one or two points of the previous one.
    fn curriculum(size: usize) -> Vec<KnowledgePoint> {
        (0..size)
            .map(|i| {
                let id = format!("kp-{i:03}");
                let difficulty = (i % 5) as i32 + 1;
                let prerequisites: Vec<String> = if i < 8 {
                    Vec::new()
                } else {
                    vec![format!("kp-{:03}", i - 8), format!("kp-{:03}", i - 3)]
                };
                KnowledgePoint {
                    id,
                    subject: if i % 2 == 0 { "math" } else { "physics" }.to_string(),
                    difficulty,
                    estimated_minutes: 20 + (i as i32 % 4) * 10,
                    prerequisites,
                }
            })
            .collect()
    }

    #[derive(Default)]
    struct MemorySource {
        snapshot: LearnerSnapshot,
        fail_points: bool,
    }

    #[async_trait]
    impl LearnerDataSource for MemorySource {
        async fn fetch_all_knowledge_points(&self) -> anyhow::Result<Vec<KnowledgePoint>> {
            if self.fail_points {
                anyhow::bail!("content store unavailable");
            }
            Ok(self.snapshot.points.clone())
        }

        async fn fetch_learner_progress(&self, _: Uuid) -> anyhow::Result<Vec<LearnerProgressRecord>> {
            Ok(self.snapshot.progress.clone())
        }

        async fn fetch_study_sessions(&self, _: Uuid) -> anyhow::Result<Vec<StudySession>> {
            Ok(self.snapshot.sessions.clone())
        }

        async fn fetch_wrong_answers(&self, _: Uuid) -> anyhow::Result<Vec<WrongAnswerRecord>> {
            Ok(self.snapshot.wrong_answers.clone())
        }

        async fn fetch_assessment(&self, _: Uuid) -> anyhow::Result<Option<SkillAssessment>> {
            Ok(self.snapshot.assessment.clone())
        }
    }

    #[test]
    fn recalibration_threshold() {
        assert!(!should_recalibrate(0, 3));
        assert!(!should_recalibrate(2, 3));
        assert!(should_recalibrate(3, 3));
        assert!(should_recalibrate(7, 3));
    }

    #[test]
    fn empty_progress_ranks_unlocked_points_first() {
        let points = vec![
            point("algebra", "math", 1, &[]),
            point("geometry", "math", 2, &[]),
            point("calculus", "math", 3, &["algebra"]),
            point("proofs", "math", 4, &["calculus", "geometry"]),
        ];
        let snapshot = LearnerSnapshot {
            points: points.clone(),
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 4);
        assert_eq!(path[0].point_id, "algebra");
        assert_eq!(path[1].point_id, "geometry");
        assert_eq!(path[2].reason, Reason::BlockedByPrerequisites);
        assert_topological(&path, &points);
    }

    #[test]
    fn completed_points_are_excluded_and_unlock_dependents() {
        let points = vec![
            point("algebra", "math", 1, &[]),
            point("calculus", "math", 3, &["algebra"]),
        ];
        let snapshot = LearnerSnapshot {
            points,
            progress: vec![progress("algebra", ProgressStatus::Completed)],
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].point_id, "calculus");
        assert_ne!(path[0].reason, Reason::BlockedByPrerequisites);
    }

    #[test]
    fn dangling_prerequisite_does_not_block() {
        let points = vec![
            point("optics", "physics", 3, &["retired-course"]),
            point("waves", "physics", 3, &["optics"]),
        ];
        let snapshot = LearnerSnapshot {
            points,
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].point_id, "optics");
        assert_eq!(path[0].reason, Reason::NextInPath);
        assert_eq!(path[0].priority, 50);
        assert_eq!(path[0].predicted_success_rate, 70.0);
        assert_eq!(path[1].reason, Reason::BlockedByPrerequisites);
    }

    #[test]
    fn long_blocked_chain_keeps_dag_order() {
        let points = vec![
            point("a", "math", 2, &[]),
            point("b", "math", 2, &["a"]),
            point("c", "math", 2, &["b"]),
            point("d", "math", 2, &["c", "a"]),
            point("e", "math", 1, &["d"]),
        ];
        let snapshot = LearnerSnapshot {
            points: points.clone(),
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 5);
        assert_eq!(path[0].point_id, "a");
        assert!(path[1..]
            .iter()
            .all(|rec| rec.reason == Reason::BlockedByPrerequisites));
        assert_topological(&path, &points);
    }

    #[test]
    fn fully_blocked_cyclic_graph_returns_every_point() {
        let points = vec![
            point("x", "math", 2, &["y"]),
            point("y", "math", 3, &["z"]),
            point("z", "math", 4, &["x"]),
            point("tail", "math", 2, &["z"]),
        ];
        let snapshot = LearnerSnapshot {
            points,
            ..Default::default()
        };
        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 4);
        assert!(path
            .iter()
            .all(|rec| rec.reason == Reason::BlockedByPrerequisites));
    }

    #[test]
    fn truncation_keeps_prerequisites_inside_window() {
        let points = curriculum(80);
        let snapshot = LearnerSnapshot {
            points: points.clone(),
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        assert_eq!(path.len(), 50);
        assert_topological(&path, &points);

        let included: HashSet<&str> = path.iter().map(|rec| rec.point_id.as_str()).collect();
        for rec in &path {
            let point = points.iter().find(|p| p.id == rec.point_id).unwrap();
            for prerequisite in &point.prerequisites {
                assert!(
                    included.contains(prerequisite.as_str()),
                    "{} lost prerequisite {}",
                    rec.point_id,
                    prerequisite
                );
            }
        }
    }

    #[test]
    fn identical_snapshots_give_identical_paths() {
        let mut snapshot = LearnerSnapshot {
            points: curriculum(30),
            progress: vec![
                progress("kp-000", ProgressStatus::Completed),
                progress("kp-001", ProgressStatus::Completed),
                progress("kp-009", ProgressStatus::InProgress),
            ],
            sessions: vec![StudySession {
                start_time: now() - Duration::days(2),
                duration_seconds: 3600,
            }],
            wrong_answers: (0..7)
                .map(|_| WrongAnswerRecord {
                    subject: "physics".to_string(),
                    mastered: false,
                })
                .collect(),
            assessment: None,
        };
        let mut assessment = SkillAssessment::default();
        assessment.skill_profile.insert("math".to_string(), 70.0);
        assessment.weaknesses.insert("physics".to_string());
        snapshot.assessment = Some(assessment);

        let config = EngineConfig::default();
        let first = build_path(&snapshot, now(), &config);
        let second = build_path(&snapshot, now(), &config);
        assert_eq!(first, second);
        assert_topological(&first, &snapshot.points);
    }

    #[test]
    fn recent_completions_drive_continuity() {
        let points = vec![
            point("easy-done", "math", 1, &[]),
            point("near", "math", 1, &[]),
            point("far", "math", 5, &[]),
        ];
        let mut done = progress("easy-done", ProgressStatus::Completed);
        done.completed_at = Some(now() - Duration::days(1));
        let snapshot = LearnerSnapshot {
            points,
            progress: vec![done],
            sessions: vec![StudySession {
                start_time: now() - Duration::days(1),
                duration_seconds: 3600,
            }],
            ..Default::default()
        };

        let path = build_path(&snapshot, now(), &EngineConfig::default());
        let far = path.iter().find(|rec| rec.point_id == "far").unwrap();
        let near = path.iter().find(|rec| rec.point_id == "near").unwrap();
        // far: 50 - 15 continuity; near: 50 + 15 easy + 10 continuity
        assert_eq!(far.priority, 35);
        assert_eq!(far.predicted_success_rate, 60.0);
        assert_eq!(near.priority, 75);
    }

    #[tokio::test]
    async fn recommend_pulls_from_source() {
        let source = MemorySource {
            snapshot: LearnerSnapshot {
                points: vec![point("intro", "math", 1, &[]), point("next", "math", 3, &["intro"])],
                ..Default::default()
            },
            fail_points: false,
        };
        let recommender = Recommender::new(source, EngineConfig::default());

        let path = recommender.recommend_at(Uuid::new_v4(), now()).await.unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].point_id, "intro");
        assert!(path[0].priority >= 85);
        assert_eq!(path[0].predicted_success_rate, 95.0);
        assert_eq!(path[1].priority, -50);
        assert_eq!(path[1].predicted_success_rate, 20.0);
    }

    #[tokio::test]
    async fn recommend_respects_configured_limit() {
        let source = MemorySource {
            snapshot: LearnerSnapshot {
                points: curriculum(20),
                ..Default::default()
            },
            fail_points: false,
        };
        let config = EngineConfig {
            max_recommendations: 5,
            ..Default::default()
        };
        let recommender = Recommender::new(source, config);
        let path = recommender.recommend(Uuid::new_v4()).await.unwrap();
        assert_eq!(path.len(), 5);
    }

    #[tokio::test]
    async fn missing_data_is_not_an_error() {
        let recommender = Recommender::new(MemorySource::default(), EngineConfig::default());
        let path = recommender.recommend(Uuid::new_v4()).await.unwrap();
        assert!(path.is_empty());
    }

    #[tokio::test]
    async fn source_failure_propagates() {
        let source = MemorySource {
            fail_points: true,
            ..Default::default()
        };
        let recommender = Recommender::new(source, EngineConfig::default());
        let err = recommender.recommend(Uuid::new_v4()).await.unwrap_err();
        assert!(err.to_string().contains("content store unavailable"));
    }
}
