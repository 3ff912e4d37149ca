use crate::domain::models::{AssignmentStatus, CheckInAssignment, Client, ClientStatus, FormResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClientInventoryRow {
    pub client_id: Uuid,
    pub name: String,
    pub email: String,
    pub status: ClientStatus,
    pub total_assignments: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    /// completed / (completed + overdue), in percent.
    pub completion_rate: f64,
    pub average_score: Option<f64>,
    pub latest_score: Option<i16>,
    pub latest_traffic_light: Option<String>,
    pub last_submitted_at: Option<DateTime<Utc>>,
    pub next_due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InventoryTotals {
    pub clients: usize,
    pub active_clients: usize,
    pub total_assignments: usize,
    pub completed: usize,
    pub pending: usize,
    pub overdue: usize,
    pub completion_rate: f64,
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientInventory {
    pub clients: Vec<ClientInventoryRow>,
    pub totals: InventoryTotals,
}

pub fn completion_rate(completed: usize, overdue: usize) -> f64 {
    let due = completed + overdue;
    if due == 0 {
        return 0.0;
    }
    round1(completed as f64 / due as f64 * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Aggregates per-client check-in counts and scores. Archived clients are
/// skipped; rows are ordered by overdue count, then name.
pub fn build_inventory(
    clients: &[Client],
    assignments: &[CheckInAssignment],
    responses: &[FormResponse],
) -> ClientInventory {
    let mut by_client: HashMap<Uuid, Vec<&CheckInAssignment>> = HashMap::new();
    for a in assignments {
        by_client.entry(a.client_id).or_default().push(a);
    }
    let mut responses_by_client: HashMap<Uuid, Vec<&FormResponse>> = HashMap::new();
    for r in responses {
        responses_by_client.entry(r.client_id).or_default().push(r);
    }

    let mut rows = Vec::new();
    let mut totals = InventoryTotals::default();
    let mut all_scores: Vec<f64> = Vec::new();

    for client in clients.iter().filter(|c| c.status != ClientStatus::Archived) {
        let docs = by_client.get(&client.id).map(Vec::as_slice).unwrap_or(&[]);
        let count = |status: AssignmentStatus| docs.iter().filter(|a| a.status == status).count();
        let completed = count(AssignmentStatus::Completed);
        let pending = count(AssignmentStatus::Pending);
        let overdue = count(AssignmentStatus::Overdue);

        let next_due_date = docs
            .iter()
            .filter(|a| a.status != AssignmentStatus::Completed)
            .map(|a| a.due_date)
            .min();

        let mut client_responses = responses_by_client
            .get(&client.id)
            .cloned()
            .unwrap_or_default();
        client_responses.sort_by_key(|r| r.submitted_at);
        let scores: Vec<f64> = client_responses.iter().map(|r| r.score as f64).collect();
        let latest = client_responses.last();

        all_scores.extend(&scores);
        totals.clients += 1;
        if client.status == ClientStatus::Active {
            totals.active_clients += 1;
        }
        totals.total_assignments += docs.len();
        totals.completed += completed;
        totals.pending += pending;
        totals.overdue += overdue;

        rows.push(ClientInventoryRow {
            client_id: client.id,
            name: client.display_name(),
            email: client.email.clone(),
            status: client.status,
            total_assignments: docs.len(),
            completed,
            pending,
            overdue,
            completion_rate: completion_rate(completed, overdue),
            average_score: mean(&scores),
            latest_score: latest.map(|r| r.score),
            latest_traffic_light: latest.map(|r| r.traffic_light.clone()),
            last_submitted_at: latest.map(|r| r.submitted_at),
            next_due_date,
        });
    }

    totals.completion_rate = completion_rate(totals.completed, totals.overdue);
    totals.average_score = mean(&all_scores);
    rows.sort_by(|a, b| b.overdue.cmp(&a.overdue).then_with(|| a.name.cmp(&b.name)));

    ClientInventory {
        clients: rows,
        totals,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(round1(values.iter().sum::<f64>() / values.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recurring::tests::assignment;
    use chrono::{Duration, TimeZone};
    use sqlx::types::Json;

    fn client(first: &str, status: ClientStatus) -> Client {
        Client {
            id: Uuid::new_v4(),
            coach_id: Uuid::nil(),
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            email: format!("{}@example.com", first.to_lowercase()),
            phone: None,
            status,
            timezone: "UTC".to_string(),
            onboarding_completed: true,
            can_start_checkins: true,
            red_max: 33,
            orange_max: 80,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn scored(client_id: Uuid, score: i16, submitted_at: DateTime<Utc>) -> FormResponse {
        FormResponse {
            id: Uuid::new_v4(),
            assignment_id: None,
            client_id,
            coach_id: Uuid::nil(),
            form_id: Uuid::nil(),
            recurring_week: None,
            answers: Json(Vec::new()),
            score,
            scored_questions: 1,
            answered_questions: 1,
            traffic_light: (if score > 80 { "green" } else { "orange" }).to_string(),
            submitted_at,
            reviewed_at: None,
            coach_notes: None,
        }
    }

    #[test]
    fn completion_rate_ignores_pending() {
        assert_eq!(completion_rate(0, 0), 0.0);
        assert_eq!(completion_rate(2, 1), 66.7);
        assert_eq!(completion_rate(3, 0), 100.0);
    }

    #[test]
    fn inventory_counts_and_orders_by_overdue() {
        let t0 = Utc.with_ymd_and_hms(2026, 1, 5, 9, 0, 0).unwrap();
        let ana = client("Ana", ClientStatus::Active);
        let ben = client("Ben", ClientStatus::Pending);
        let gone = client("Zed", ClientStatus::Archived);

        let series = Uuid::new_v4();
        let mut docs = Vec::new();
        for (week, status) in [
            (1, AssignmentStatus::Completed),
            (2, AssignmentStatus::Completed),
            (3, AssignmentStatus::Pending),
        ] {
            let mut a = assignment(series, Some(week), t0 + Duration::weeks(week as i64 - 1));
            a.client_id = ana.id;
            a.status = status;
            docs.push(a);
        }
        let mut late = assignment(Uuid::new_v4(), Some(1), t0);
        late.client_id = ben.id;
        late.status = AssignmentStatus::Overdue;
        docs.push(late);
        let mut archived = assignment(Uuid::new_v4(), Some(1), t0);
        archived.client_id = gone.id;
        docs.push(archived);

        let responses = vec![
            scored(ana.id, 90, t0 + Duration::weeks(1)),
            scored(ana.id, 70, t0),
        ];

        let inv = build_inventory(&[ana.clone(), ben.clone(), gone], &docs, &responses);
        assert_eq!(inv.clients.len(), 2);
        assert_eq!(inv.clients[0].client_id, ben.id);
        assert_eq!(inv.clients[0].completion_rate, 0.0);

        let row = &inv.clients[1];
        assert_eq!(row.completed, 2);
        assert_eq!(row.pending, 1);
        assert_eq!(row.completion_rate, 100.0);
        assert_eq!(row.average_score, Some(80.0));
        assert_eq!(row.latest_score, Some(90));
        assert_eq!(row.latest_traffic_light.as_deref(), Some("green"));
        assert_eq!(row.next_due_date, Some(t0 + Duration::weeks(2)));

        assert_eq!(inv.totals.clients, 2);
        assert_eq!(inv.totals.active_clients, 1);
        assert_eq!(inv.totals.total_assignments, 4);
        assert_eq!(inv.totals.completion_rate, 66.7);
    }
}
