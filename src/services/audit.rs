use crate::db;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// A record of one mutating API call, logged and persisted to `audit_log`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(
        actor: impl Into<String>,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        Self {
            actor: actor.into(),
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn emit(&self) {
        tracing::info!(
            audit.actor = %self.actor,
            audit.action = %self.action,
            audit.resource_type = %self.resource_type,
            audit.resource_id = %self.resource_id,
            "audit event"
        );
    }

    /// Emits the event and stores it. A failed insert is logged, never returned.
    pub async fn record(self, pool: &PgPool) {
        self.emit();
        if let Err(e) = db::insert_audit(
            pool,
            &self.actor,
            &self.action,
            &self.resource_type,
            &self.resource_id,
            self.details.as_ref(),
        )
        .await
        {
            tracing::warn!(
                action = %self.action,
                resource_id = %self.resource_id,
                "Failed to write audit row: {}",
                e
            );
        }
    }
}

pub fn coach_actor(coach_id: Uuid) -> String {
    format!("coach:{coach_id}")
}

pub fn client_actor(client_id: Uuid) -> String {
    format!("client:{client_id}")
}

pub const SYSTEM_ACTOR: &str = "system";

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_event_with_details() {
        let id = Uuid::new_v4();
        let event = AuditEvent::new(coach_actor(Uuid::nil()), "form.delete", "form", id)
            .with_details(json!({ "title": "Weekly" }));
        assert_eq!(event.actor, "coach:00000000-0000-0000-0000-000000000000");
        assert_eq!(event.resource_id, id.to_string());
        assert_eq!(event.details.unwrap()["title"], "Weekly");
    }
}
