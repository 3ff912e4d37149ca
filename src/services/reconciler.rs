use crate::db::assignments;
use crate::domain::reconcile::{self, ReconcileAction, ReconcilePlan, ReconcileSummary};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Clients reconciled at once; each holds one pooled connection.
const RECONCILE_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Serialize)]
pub struct ClientReconcileReport {
    pub client_id: Uuid,
    pub summary: ReconcileSummary,
    pub actions: Vec<ReconcileAction>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub dry_run: bool,
    pub clients_checked: usize,
    pub clients_changed: usize,
    pub summary: ReconcileSummary,
    pub clients: Vec<ClientReconcileReport>,
}

impl ReconcileReport {
    fn push(&mut self, client: ClientReconcileReport) {
        self.clients_checked += 1;
        if client.summary.total() > 0 {
            self.clients_changed += 1;
            self.summary.merge(&client.summary);
            self.clients.push(client);
        }
    }
}

async fn apply(conn: &mut PgConnection, plan: &ReconcilePlan) -> Result<()> {
    for action in plan.ordered() {
        match action {
            ReconcileAction::RepointResponse {
                response_id,
                assignment_id,
            } => assignments::repoint_response(&mut *conn, *response_id, *assignment_id).await?,
            ReconcileAction::RemoveDuplicate { assignment_id, .. } => {
                assignments::delete_assignment(&mut *conn, *assignment_id).await?;
            }
            ReconcileAction::SetWeek {
                assignment_id,
                week,
            } => assignments::set_assignment_week(&mut *conn, *assignment_id, *week).await?,
            ReconcileAction::LinkResponse {
                assignment_id,
                response_id,
                score,
                completed_at,
            } => {
                assignments::complete_assignment(
                    &mut *conn,
                    *assignment_id,
                    *response_id,
                    *score,
                    *completed_at,
                )
                .await?
            }
            ReconcileAction::UnlinkMissingResponse {
                assignment_id,
                status,
            } => assignments::clear_assignment_response(&mut *conn, *assignment_id, *status).await?,
            ReconcileAction::MarkOverdue { assignment_id } => {
                assignments::mark_assignment_overdue(&mut *conn, *assignment_id).await?
            }
        }
    }
    Ok(())
}

/// Plans and, unless `dry_run`, applies the repairs for one client inside a
/// single transaction.
pub async fn reconcile_client(
    pool: &PgPool,
    client_id: Uuid,
    now: DateTime<Utc>,
    grace: Duration,
    dry_run: bool,
) -> Result<ClientReconcileReport> {
    let mut tx = pool.begin().await?;
    let docs = assignments::list_client_assignments(&mut *tx, client_id).await?;
    let responses = assignments::list_client_responses(&mut *tx, client_id).await?;

    let plan = reconcile::plan(&docs, &responses, now, grace);
    if !plan.is_empty() && !dry_run {
        apply(&mut *tx, &plan).await?;
        tx.commit().await?;
        tracing::info!(
            client_id = %client_id,
            actions = plan.actions.len(),
            "Reconciled client check-ins"
        );
    } else {
        tx.rollback().await?;
    }

    Ok(ClientReconcileReport {
        client_id,
        summary: plan.summary(),
        actions: plan.actions,
    })
}

/// Runs reconciliation for one client or for every client with assignments.
/// A failure for one client is logged and the run continues.
pub async fn run(
    pool: &PgPool,
    client_id: Option<Uuid>,
    now: DateTime<Utc>,
    grace: Duration,
    dry_run: bool,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport {
        dry_run,
        ..Default::default()
    };

    if let Some(client_id) = client_id {
        report.push(reconcile_client(pool, client_id, now, grace, dry_run).await?);
        return Ok(report);
    }

    let client_ids = assignments::client_ids_with_assignments(pool).await?;
    let results: Vec<(Uuid, Result<ClientReconcileReport>)> = stream::iter(client_ids)
        .map(|client_id| {
            let pool = pool.clone();
            async move {
                let result = reconcile_client(&pool, client_id, now, grace, dry_run).await;
                (client_id, result)
            }
        })
        .buffer_unordered(RECONCILE_CONCURRENCY)
        .collect()
        .await;

    for (client_id, result) in results {
        match result {
            Ok(client) => report.push(client),
            Err(e) => tracing::error!(client_id = %client_id, "Reconciliation failed: {}", e),
        }
    }

    if report.clients_changed > 0 {
        tracing::info!(
            dry_run,
            clients = report.clients_changed,
            total = report.summary.total(),
            "Reconciliation run finished"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_keeps_only_changed_clients() {
        let mut report = ReconcileReport::default();
        report.push(ClientReconcileReport {
            client_id: Uuid::new_v4(),
            summary: ReconcileSummary::default(),
            actions: vec![],
        });
        let changed = Uuid::new_v4();
        report.push(ClientReconcileReport {
            client_id: changed,
            summary: ReconcileSummary {
                marked_overdue: 2,
                ..Default::default()
            },
            actions: vec![],
        });

        assert_eq!(report.clients_checked, 2);
        assert_eq!(report.clients_changed, 1);
        assert_eq!(report.clients[0].client_id, changed);
        assert_eq!(report.summary.marked_overdue, 2);
    }
}
