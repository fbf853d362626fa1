use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::engine::LearnerDataSource;
use crate::models::{
    KnowledgePoint, LearnerProgressRecord, ProgressStatus, SkillAssessment, StudySession,
    WrongAnswerRecord,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed feeds for the recommendation engine.
#[derive(Clone)]
pub struct PgLearnerData {
    pool: PgPool,
}

impl PgLearnerData {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LearnerDataSource for PgLearnerData {
    async fn fetch_all_knowledge_points(&self) -> anyhow::Result<Vec<KnowledgePoint>> {
        let rows = sqlx::query(
            "SELECT id, subject, difficulty, estimated_minutes, prerequisites \
             FROM learning_path.knowledge_points ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to load knowledge points")?;

        Ok(rows
            .into_iter()
            .map(|row| KnowledgePoint {
                id: row.get("id"),
                subject: row.get("subject"),
                difficulty: row.get("difficulty"),
                estimated_minutes: row.get("estimated_minutes"),
                prerequisites: row.get("prerequisites"),
            })
            .collect())
    }

    async fn fetch_learner_progress(&self, learner_id: Uuid) -> anyhow::Result<Vec<LearnerProgressRecord>> {
        let rows = sqlx::query(
            "SELECT point_id, status, best_score, completed_at \
             FROM learning_path.progress WHERE learner_id = $1",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load learner progress")?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let status: String = row.get("status");
            records.push(LearnerProgressRecord {
                point_id: row.get("point_id"),
                status: ProgressStatus::parse(&status)
                    .with_context(|| format!("unknown progress status {status}"))?,
                best_score: row.get("best_score"),
                completed_at: row.get("completed_at"),
            });
        }

        Ok(records)
    }

    async fn fetch_study_sessions(&self, learner_id: Uuid) -> anyhow::Result<Vec<StudySession>> {
        let rows = sqlx::query(
            "SELECT start_time, duration_seconds \
             FROM learning_path.study_sessions WHERE learner_id = $1",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load study sessions")?;

        Ok(rows
            .into_iter()
            .map(|row| StudySession {
                start_time: row.get("start_time"),
                duration_seconds: row.get("duration_seconds"),
            })
            .collect())
    }

    async fn fetch_wrong_answers(&self, learner_id: Uuid) -> anyhow::Result<Vec<WrongAnswerRecord>> {
        let rows = sqlx::query(
            "SELECT subject, mastered FROM learning_path.wrong_answers WHERE learner_id = $1",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await
        .context("failed to load wrong answers")?;

        Ok(rows
            .into_iter()
            .map(|row| WrongAnswerRecord {
                subject: row.get("subject"),
                mastered: row.get("mastered"),
            })
            .collect())
    }

    async fn fetch_assessment(&self, learner_id: Uuid) -> anyhow::Result<Option<SkillAssessment>> {
        let row = sqlx::query(
            "SELECT skill_profile, weaknesses \
             FROM learning_path.skill_assessments WHERE learner_id = $1",
        )
        .bind(learner_id)
        .fetch_optional(&self.pool)
        .await
        .context("failed to load skill assessment")?;

        Ok(row.map(|row| {
            let profile: Json<HashMap<String, f64>> = row.get("skill_profile");
            let weaknesses: Vec<String> = row.get("weaknesses");
            SkillAssessment {
                skill_profile: profile.0,
                weaknesses: weaknesses.into_iter().collect(),
            }
        }))
    }
}

pub async fn find_learner_by_email(pool: &PgPool, email: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM learning_path.learners WHERE email = $1")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.map(|row| row.get("id"))
        .with_context(|| format!("no learner registered with email {email}"))
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let points: Vec<(&str, &str, i32, i32, Vec<&str>)> = vec![
        ("arith-basics", "math", 1, 20, vec![]),
        ("fractions", "math", 2, 35, vec!["arith-basics"]),
        ("linear-eq", "math", 2, 40, vec!["arith-basics"]),
        ("quadratics", "math", 3, 50, vec!["linear-eq", "fractions"]),
        ("functions", "math", 3, 45, vec!["linear-eq"]),
        ("derivatives", "math", 4, 60, vec!["functions", "quadratics"]),
        ("units", "physics", 1, 15, vec![]),
        ("kinematics", "physics", 2, 40, vec!["units", "linear-eq"]),
        ("forces", "physics", 3, 50, vec!["kinematics"]),
        ("energy", "physics", 3, 45, vec!["forces"]),
        ("atoms", "chemistry", 1, 25, vec![]),
        ("bonding", "chemistry", 2, 30, vec!["atoms"]),
        ("stoichiometry", "chemistry", 3, 55, vec!["bonding", "fractions"]),
    ];

    for (id, subject, difficulty, minutes, prerequisites) in &points {
        upsert_point(pool, id, subject, *difficulty, *minutes, prerequisites).await?;
    }

    let learner_id = Uuid::parse_str("6b1f3c2a-8d4e-4f6a-9c1b-2e7d5a9f0c34")?;
    sqlx::query(
        r#"
        INSERT INTO learning_path.learners (id, full_name, email)
        VALUES ($1, $2, $3)
        ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
        "#,
    )
    .bind(learner_id)
    .bind("Avery Lee")
    .bind("avery.lee@example.com")
    .execute(pool)
    .await?;

    let completed_at = |days: i64| -> anyhow::Result<DateTime<Utc>> {
        let base = Utc
            .with_ymd_and_hms(2026, 2, 20, 18, 0, 0)
            .single()
            .context("invalid date")?;
        Ok(base - Duration::days(days))
    };

    let progress = vec![
        ("arith-basics", "completed", Some(92.0), Some(completed_at(20)?)),
        ("units", "completed", Some(88.0), Some(completed_at(12)?)),
        ("linear-eq", "completed", Some(74.0), Some(completed_at(5)?)),
        ("kinematics", "in_progress", Some(55.0), None),
        ("atoms", "not_started", None, None),
    ];

    for (point_id, status, best_score, completed) in progress {
        sqlx::query(
            r#"
            INSERT INTO learning_path.progress
            (learner_id, point_id, status, best_score, completed_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (learner_id, point_id) DO UPDATE
            SET status = EXCLUDED.status,
                best_score = EXCLUDED.best_score,
                completed_at = EXCLUDED.completed_at
            "#,
        )
        .bind(learner_id)
        .bind(point_id)
        .bind(status)
        .bind(best_score)
        .bind(completed)
        .execute(pool)
        .await?;
    }

    sqlx::query("DELETE FROM learning_path.study_sessions WHERE learner_id = $1")
        .bind(learner_id)
        .execute(pool)
        .await?;
    for (days_ago, seconds) in [(20_i64, 2400_i64), (12, 1800), (5, 3000), (2, 1500)] {
        sqlx::query(
            r#"
            INSERT INTO learning_path.study_sessions (id, learner_id, start_time, duration_seconds)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(completed_at(days_ago)?)
        .bind(seconds)
        .execute(pool)
        .await?;
    }

    sqlx::query("DELETE FROM learning_path.wrong_answers WHERE learner_id = $1")
        .bind(learner_id)
        .execute(pool)
        .await?;
    let mistakes = std::iter::repeat(("physics", false))
        .take(6)
        .chain([("math", false), ("math", true)]);
    for (subject, mastered) in mistakes {
        sqlx::query(
            r#"
            INSERT INTO learning_path.wrong_answers (id, learner_id, subject, mastered)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(subject)
        .bind(mastered)
        .execute(pool)
        .await?;
    }

    let profile: HashMap<String, f64> = [("math", 62.0), ("physics", 38.0), ("chemistry", 50.0)]
        .into_iter()
        .map(|(subject, level)| (subject.to_string(), level))
        .collect();
    sqlx::query(
        r#"
        INSERT INTO learning_path.skill_assessments (learner_id, skill_profile, weaknesses)
        VALUES ($1, $2, $3)
        ON CONFLICT (learner_id) DO NOTHING
        "#,
    )
    .bind(learner_id)
    .bind(Json(profile))
    .bind(vec!["physics".to_string()])
    .execute(pool)
    .await?;

    Ok(())
}

async fn upsert_point(
    pool: &PgPool,
    id: &str,
    subject: &str,
    difficulty: i32,
    estimated_minutes: i32,
    prerequisites: &[&str],
) -> anyhow::Result<()> {
    let prerequisites: Vec<String> = prerequisites.iter().map(|p| p.to_string()).collect();
    sqlx::query(
        r#"
        INSERT INTO learning_path.knowledge_points
        (id, subject, difficulty, estimated_minutes, prerequisites)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE
        SET subject = EXCLUDED.subject,
            difficulty = EXCLUDED.difficulty,
            estimated_minutes = EXCLUDED.estimated_minutes,
            prerequisites = EXCLUDED.prerequisites
        "#,
    )
    .bind(id)
    .bind(subject)
    .bind(difficulty)
    .bind(estimated_minutes)
    .bind(prerequisites)
    .execute(pool)
    .await?;
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
struct CsvPoint {
    id: String,
    subject: String,
    difficulty: i32,
    estimated_minutes: i32,
    prerequisites: Option<String>,
}

fn split_prerequisites(raw: Option<&str>) -> Vec<&str> {
    raw.unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut imported = 0usize;

    for result in reader.deserialize::<CsvPoint>() {
        let row = result?;
        if !(1..=5).contains(&row.difficulty) || row.estimated_minutes < 0 {
            tracing::warn!(
                point = %row.id,
                difficulty = row.difficulty,
                minutes = row.estimated_minutes,
                "skipping knowledge point with out-of-range values"
            );
            continue;
        }

        let prerequisites = split_prerequisites(row.prerequisites.as_deref());
        upsert_point(
            pool,
            &row.id,
            &row.subject,
            row.difficulty,
            row.estimated_minutes,
            &prerequisites,
        )
        .await?;
        imported += 1;
    }

    Ok(imported)
}
