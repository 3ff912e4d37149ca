use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "client_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    Active,
    Pending,
    Suspended,
    Archived,
}

impl TryFrom<&str> for ClientStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "active" => Ok(ClientStatus::Active),
            "pending" => Ok(ClientStatus::Pending),
            "suspended" | "paused" => Ok(ClientStatus::Suspended),
            "archived" | "inactive" => Ok(ClientStatus::Archived),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Scale,
    Boolean,
    MultipleChoice,
    Number,
    Text,
}

impl QuestionType {
    /// Whether answers of this type can contribute to a score at all.
    pub fn is_scorable(&self) -> bool {
        matches!(
            self,
            QuestionType::Scale | QuestionType::Boolean | QuestionType::MultipleChoice
        )
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "assignment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Completed,
    Overdue,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrafficLight {
    Red,
    Orange,
    Green,
}

impl TrafficLight {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficLight::Red => "red",
            TrafficLight::Orange => "orange",
            TrafficLight::Green => "green",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub status: ClientStatus,
    pub timezone: String,
    pub onboarding_completed: bool,
    pub can_start_checkins: bool,
    pub red_max: i16,
    pub orange_max: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            red_max: self.red_max,
            orange_max: self.orange_max,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreThresholds {
    pub red_max: i16,
    pub orange_max: i16,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            red_max: 33,
            orange_max: 80,
        }
    }
}

impl ScoreThresholds {
    pub fn is_valid(&self) -> bool {
        (0..=100).contains(&self.red_max)
            && (0..=100).contains(&self.orange_max)
            && self.red_max < self.orange_max
    }

    pub fn classify(&self, score: i16) -> TrafficLight {
        if score <= self.red_max {
            TrafficLight::Red
        } else if score <= self.orange_max {
            TrafficLight::Orange
        } else {
            TrafficLight::Green
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Form {
    pub id: Uuid,
    pub coach_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub question_ids: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    /// `None` for library questions shared by every coach.
    pub coach_id: Option<Uuid>,
    pub text: String,
    #[sqlx(rename = "question_type")]
    #[serde(rename = "type")]
    pub qtype: QuestionType,
    pub question_weight: i16,
    pub options: Json<Vec<QuestionOption>>,
    pub yes_is_positive: bool,
    pub is_required: bool,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CheckInAssignment {
    pub id: Uuid,
    pub series_id: Uuid,
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub form_id: Uuid,
    pub recurring_week: Option<i32>,
    pub total_weeks: i32,
    pub due_date: DateTime<Utc>,
    pub status: AssignmentStatus,
    pub response_id: Option<Uuid>,
    pub score: Option<i16>,
    pub completed_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub overdue_notice_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    pub question_id: Uuid,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FormResponse {
    pub id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub client_id: Uuid,
    pub coach_id: Uuid,
    pub form_id: Uuid,
    pub recurring_week: Option<i32>,
    pub answers: Json<Vec<Answer>>,
    pub score: i16,
    pub scored_questions: i32,
    pub answered_questions: i32,
    pub traffic_light: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub coach_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notice {
    pub id: Uuid,
    pub coach_id: Uuid,
    /// `None` means the notice goes to every client of the coach.
    pub client_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OutboxEmail {
    pub id: Uuid,
    pub kind: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub assignment_id: Option<Uuid>,
    pub status: String,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}
