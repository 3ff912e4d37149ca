use crate::domain::models::{QuestionOption, QuestionType};
use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

struct LibraryQuestion<'a> {
    text: &'a str,
    qtype: QuestionType,
    weight: i16,
    options: &'a [(&'a str, f64)],
    yes_is_positive: bool,
    category: &'a str,
}

const LIBRARY: &[LibraryQuestion<'static>] = &[
    LibraryQuestion {
        text: "How would you rate your energy this week?",
        qtype: QuestionType::Scale,
        weight: 6,
        options: &[],
        yes_is_positive: true,
        category: "wellbeing",
    },
    LibraryQuestion {
        text: "How well did you sleep on average?",
        qtype: QuestionType::Scale,
        weight: 5,
        options: &[],
        yes_is_positive: true,
        category: "wellbeing",
    },
    LibraryQuestion {
        text: "Did you hit your training sessions?",
        qtype: QuestionType::Boolean,
        weight: 8,
        options: &[],
        yes_is_positive: true,
        category: "training",
    },
    LibraryQuestion {
        text: "Did you skip meals or go off plan?",
        qtype: QuestionType::Boolean,
        weight: 6,
        options: &[],
        yes_is_positive: false,
        category: "nutrition",
    },
    LibraryQuestion {
        text: "How closely did you follow your nutrition plan?",
        qtype: QuestionType::MultipleChoice,
        weight: 7,
        options: &[("Fully", 10.0), ("Mostly", 7.0), ("Partly", 4.0), ("Not at all", 0.0)],
        yes_is_positive: true,
        category: "nutrition",
    },
    LibraryQuestion {
        text: "How stressed did you feel?",
        qtype: QuestionType::MultipleChoice,
        weight: 5,
        options: &[("Not at all", 10.0), ("A little", 7.0), ("Quite a bit", 3.0), ("Very", 0.0)],
        yes_is_positive: true,
        category: "wellbeing",
    },
    LibraryQuestion {
        text: "Current body weight (kg)",
        qtype: QuestionType::Number,
        weight: 0,
        options: &[],
        yes_is_positive: true,
        category: "progress",
    },
    LibraryQuestion {
        text: "Anything you want your coach to know?",
        qtype: QuestionType::Text,
        weight: 0,
        options: &[],
        yes_is_positive: true,
        category: "general",
    },
];

pub async fn seed_all(pool: &PgPool) -> Result<()> {
    let inserted = seed_question_library(pool).await?;
    if inserted > 0 {
        tracing::info!(inserted, "Seeded question library");
    }
    Ok(())
}

/// Inserts the shared question library once; later runs leave it alone.
async fn seed_question_library(pool: &PgPool) -> Result<usize> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE coach_id IS NULL")
        .fetch_one(pool)
        .await?;
    if existing > 0 {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for question in LIBRARY {
        let options: Vec<QuestionOption> = question
            .options
            .iter()
            .map(|(text, weight)| QuestionOption {
                text: text.to_string(),
                weight: Some(*weight),
            })
            .collect();

        sqlx::query(
            r#"
            INSERT INTO questions (id, coach_id, text, question_type, question_weight, options, yes_is_positive, is_required, category)
            VALUES ($1, NULL, $2, $3, $4, $5, $6, FALSE, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(question.text)
        .bind(question.qtype)
        .bind(question.weight)
        .bind(Json(&options))
        .bind(question.yes_is_positive)
        .bind(question.category)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(LIBRARY.len())
}
