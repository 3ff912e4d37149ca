use crate::domain::models::{Answer, Question, QuestionType};
use crate::domain::scoring::{as_bool, as_number, find_option, is_blank};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TEXT_ANSWER_LEN: usize = 5000;

#[derive(Debug, Error, PartialEq)]
pub enum SubmissionError {
    #[error("no answers submitted")]
    Empty,
    #[error("question {0} is not part of this form")]
    UnknownQuestion(Uuid),
    #[error("question {0} answered more than once")]
    DuplicateAnswer(Uuid),
    #[error("required question {0} has no answer")]
    MissingRequired(Uuid),
    #[error("invalid answer for question {question_id}: {reason}")]
    InvalidValue { question_id: Uuid, reason: String },
    #[error("check-in already completed")]
    AlreadyCompleted,
}

/// Checks submitted answers against the form's questions and returns them in
/// form order with blank answers dropped.
pub fn validate_answers(
    questions: &[Question],
    answers: Vec<Answer>,
) -> Result<Vec<Answer>, SubmissionError> {
    if answers.is_empty() {
        return Err(SubmissionError::Empty);
    }

    let known: HashMap<Uuid, &Question> = questions.iter().map(|q| (q.id, q)).collect();
    let mut seen = HashSet::new();
    let mut by_question = HashMap::new();

    for answer in answers {
        let Some(question) = known.get(&answer.question_id) else {
            return Err(SubmissionError::UnknownQuestion(answer.question_id));
        };
        if !seen.insert(answer.question_id) {
            return Err(SubmissionError::DuplicateAnswer(answer.question_id));
        }
        if is_blank(&answer.value) {
            continue;
        }
        check_value(question, &answer.value)?;
        by_question.insert(answer.question_id, answer);
    }

    let mut ordered = Vec::with_capacity(by_question.len());
    for question in questions {
        match by_question.remove(&question.id) {
            Some(answer) => ordered.push(answer),
            None if question.is_required => {
                return Err(SubmissionError::MissingRequired(question.id))
            }
            None => {}
        }
    }

    if ordered.is_empty() {
        return Err(SubmissionError::Empty);
    }
    Ok(ordered)
}

fn check_value(question: &Question, value: &Value) -> Result<(), SubmissionError> {
    let invalid = |reason: &str| SubmissionError::InvalidValue {
        question_id: question.id,
        reason: reason.to_string(),
    };

    match question.qtype {
        QuestionType::Scale => {
            let v = as_number(value).ok_or_else(|| invalid("expected a number"))?;
            if !(1.0..=10.0).contains(&v) {
                return Err(invalid("scale answers must be between 1 and 10"));
            }
        }
        QuestionType::Number => {
            as_number(value).ok_or_else(|| invalid("expected a number"))?;
        }
        QuestionType::Boolean => {
            as_bool(value).ok_or_else(|| invalid("expected yes or no"))?;
        }
        QuestionType::MultipleChoice => {
            let selected: Vec<&str> = match value {
                Value::String(s) => vec![s.as_str()],
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().ok_or_else(|| invalid("expected option text")))
                    .collect::<Result<_, _>>()?,
                _ => return Err(invalid("expected option text")),
            };
            if selected
                .iter()
                .any(|s| find_option(&question.options, s).is_none())
            {
                return Err(invalid("unknown option"));
            }
        }
        QuestionType::Text => {
            let text = value.as_str().ok_or_else(|| invalid("expected text"))?;
            if text.chars().count() > MAX_TEXT_ANSWER_LEN {
                return Err(invalid("text answer too long"));
            }
        }
    }
    Ok(())
}
