use crate::domain::models::{Answer, Question, QuestionOption, QuestionType, ScoreThresholds, TrafficLight};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Upper bound of a single normalized answer score.
pub const MAX_ANSWER_SCORE: f64 = 10.0;
pub const DEFAULT_QUESTION_WEIGHT: i16 = 5;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuestionScore {
    pub question_id: Uuid,
    pub weight: i16,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoreBreakdown {
    pub score: i16,
    pub scored_questions: usize,
    pub answered_questions: usize,
    pub traffic_light: TrafficLight,
    pub per_question: Vec<QuestionScore>,
}

/// Weighted score of a response on 0..=100.
///
/// Each scorable answer is normalized to 0..=10 and weighted by the
/// question's `question_weight`; unscorable answers are counted as answered
/// but do not move the score.
pub fn score_response(
    questions: &[Question],
    answers: &[Answer],
    thresholds: ScoreThresholds,
) -> ScoreBreakdown {
    let by_id: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    let mut answered = 0usize;
    let mut per_question = Vec::new();

    for answer in answers {
        let Some(question) = by_id.get(&answer.question_id) else {
            continue;
        };
        if is_blank(&answer.value) {
            continue;
        }
        answered += 1;

        let weight = question.question_weight.clamp(0, 10);
        if weight == 0 || !question.qtype.is_scorable() {
            continue;
        }
        let Some(score) = answer_score(question, &answer.value) else {
            continue;
        };

        weighted_sum += score * weight as f64;
        weight_total += MAX_ANSWER_SCORE * weight as f64;
        per_question.push(QuestionScore {
            question_id: question.id,
            weight,
            score,
        });
    }

    let score = if weight_total > 0.0 {
        ((weighted_sum / weight_total) * 100.0).round().clamp(0.0, 100.0) as i16
    } else {
        0
    };

    ScoreBreakdown {
        score,
        scored_questions: per_question.len(),
        answered_questions: answered,
        traffic_light: thresholds.classify(score),
        per_question,
    }
}

/// Normalized 0..=10 score of one answer, `None` when the answer does not score.
pub fn answer_score(question: &Question, value: &Value) -> Option<f64> {
    match question.qtype {
        QuestionType::Scale => as_number(value).map(|v| v.clamp(1.0, MAX_ANSWER_SCORE)),
        QuestionType::Boolean => {
            let yes = as_bool(value)?;
            Some(if yes == question.yes_is_positive {
                MAX_ANSWER_SCORE
            } else {
                0.0
            })
        }
        QuestionType::MultipleChoice => choice_score(&question.options, value),
        QuestionType::Number | QuestionType::Text => None,
    }
}

fn choice_score(options: &[QuestionOption], value: &Value) -> Option<f64> {
    let weight_of = |selected: &str| -> Option<f64> {
        find_option(options, selected)
            .and_then(|opt| opt.weight)
            .map(|w| w.clamp(0.0, MAX_ANSWER_SCORE))
    };

    match value {
        Value::String(selected) => weight_of(selected),
        Value::Array(items) => {
            let weights = items
                .iter()
                .filter_map(|item| item.as_str())
                .map(weight_of)
                .collect::<Option<Vec<_>>>()?;
            if weights.is_empty() {
                return None;
            }
            Some(weights.iter().sum::<f64>() / weights.len() as f64)
        }
        _ => None,
    }
}

pub fn find_option<'a>(options: &'a [QuestionOption], selected: &str) -> Option<&'a QuestionOption> {
    let needle = selected.trim().to_lowercase();
    options
        .iter()
        .find(|opt| opt.text.trim().to_lowercase() == needle)
}

pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "true" | "y" => Some(true),
            "no" | "false" | "n" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}
