use crate::domain::models::{AssignmentStatus, CheckInAssignment, FormResponse};
use crate::domain::recurring::{derive_status, resolved_weeks};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

/// Maximum distance between submission time and due date for an orphan
/// response to be matched to an assignment.
pub const ORPHAN_MATCH_WINDOW_DAYS: i64 = 3;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileAction {
    SetWeek {
        assignment_id: Uuid,
        week: i32,
    },
    RemoveDuplicate {
        assignment_id: Uuid,
        kept: Uuid,
    },
    RepointResponse {
        response_id: Uuid,
        assignment_id: Uuid,
    },
    LinkResponse {
        assignment_id: Uuid,
        response_id: Uuid,
        score: i16,
        completed_at: DateTime<Utc>,
    },
    UnlinkMissingResponse {
        assignment_id: Uuid,
        status: AssignmentStatus,
    },
    MarkOverdue {
        assignment_id: Uuid,
    },
}

impl ReconcileAction {
    /// Application order: responses move off duplicates before the duplicates
    /// are deleted, and weeks are written only once duplicates are gone.
    pub fn phase(&self) -> u8 {
        match self {
            ReconcileAction::RepointResponse { .. } => 0,
            ReconcileAction::RemoveDuplicate { .. } => 1,
            ReconcileAction::SetWeek { .. } => 2,
            ReconcileAction::LinkResponse { .. } => 3,
            ReconcileAction::UnlinkMissingResponse { .. } => 4,
            ReconcileAction::MarkOverdue { .. } => 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub weeks_set: usize,
    pub duplicates_removed: usize,
    pub responses_repointed: usize,
    pub responses_linked: usize,
    pub links_cleared: usize,
    pub marked_overdue: usize,
}

impl ReconcileSummary {
    pub fn merge(&mut self, other: &ReconcileSummary) {
        self.weeks_set += other.weeks_set;
        self.duplicates_removed += other.duplicates_removed;
        self.responses_repointed += other.responses_repointed;
        self.responses_linked += other.responses_linked;
        self.links_cleared += other.links_cleared;
        self.marked_overdue += other.marked_overdue;
    }

    pub fn total(&self) -> usize {
        self.weeks_set
            + self.duplicates_removed
            + self.responses_repointed
            + self.responses_linked
            + self.links_cleared
            + self.marked_overdue
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcilePlan {
    pub actions: Vec<ReconcileAction>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn summary(&self) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for action in &self.actions {
            match action {
                ReconcileAction::SetWeek { .. } => summary.weeks_set += 1,
                ReconcileAction::RemoveDuplicate { .. } => summary.duplicates_removed += 1,
                ReconcileAction::RepointResponse { .. } => summary.responses_repointed += 1,
                ReconcileAction::LinkResponse { .. } => summary.responses_linked += 1,
                ReconcileAction::UnlinkMissingResponse { .. } => summary.links_cleared += 1,
                ReconcileAction::MarkOverdue { .. } => summary.marked_overdue += 1,
            }
        }
        summary
    }

    /// Actions in the order they must be applied.
    pub fn ordered(&self) -> Vec<&ReconcileAction> {
        let mut actions: Vec<&ReconcileAction> = self.actions.iter().collect();
        actions.sort_by_key(|a| a.phase());
        actions
    }
}

struct Kept<'a> {
    doc: &'a CheckInAssignment,
    week: i32,
}

/// Plans the repairs needed for one client's assignments and responses.
pub fn plan(
    assignments: &[CheckInAssignment],
    responses: &[FormResponse],
    now: DateTime<Utc>,
    grace: Duration,
) -> ReconcilePlan {
    let live: HashMap<Uuid, &FormResponse> = responses.iter().map(|r| (r.id, r)).collect();
    let mut actions = Vec::new();

    let mut series: BTreeMap<Uuid, Vec<CheckInAssignment>> = BTreeMap::new();
    for doc in assignments {
        series.entry(doc.series_id).or_default().push(doc.clone());
    }

    let rank = |doc: &CheckInAssignment| match doc.response_id {
        Some(id) if live.contains_key(&id) && doc.status == AssignmentStatus::Completed => 0,
        Some(id) if live.contains_key(&id) => 1,
        Some(_) => 2,
        None => 3,
    };

    let mut kept: Vec<Kept> = Vec::new();
    let mut redirect: HashMap<Uuid, Uuid> = HashMap::new();

    for docs in series.values() {
        let weeks = resolved_weeks(docs);
        let mut by_week: BTreeMap<i32, Vec<&CheckInAssignment>> = BTreeMap::new();
        for (doc, week) in docs.iter().zip(weeks) {
            by_week.entry(week).or_default().push(doc);
        }

        for (week, mut group) in by_week {
            group.sort_by_key(|d| (rank(*d), d.created_at, d.id));
            let keeper = group[0];
            for dup in &group[1..] {
                redirect.insert(dup.id, keeper.id);
                actions.push(ReconcileAction::RemoveDuplicate {
                    assignment_id: dup.id,
                    kept: keeper.id,
                });
            }
            if keeper.recurring_week.filter(|w| *w >= 1).is_none() {
                actions.push(ReconcileAction::SetWeek {
                    assignment_id: keeper.id,
                    week,
                });
            }
            kept.push(Kept { doc: keeper, week });
        }
    }

    let kept_ids: HashSet<Uuid> = kept.iter().map(|k| k.doc.id).collect();
    let mut ordered_responses: Vec<&FormResponse> = responses.iter().collect();
    ordered_responses.sort_by_key(|r| (r.submitted_at, r.id));

    // assignment id -> response that completes it
    let mut owner: HashMap<Uuid, &FormResponse> = HashMap::new();
    let mut placed: HashSet<Uuid> = HashSet::new();

    // Direct references first, then those inherited from removed duplicates.
    for via_duplicate in [false, true] {
        for resp in &ordered_responses {
            let Some(id) = resp.assignment_id else { continue };
            if redirect.contains_key(&id) != via_duplicate {
                continue;
            }
            let target = redirect.get(&id).copied().unwrap_or(id);
            if kept_ids.contains(&target) {
                owner.entry(target).or_insert(*resp);
                placed.insert(resp.id);
            }
        }
    }

    // Back-references claim their assignment before any orphan is matched.
    for resp in &ordered_responses {
        if placed.contains(&resp.id) {
            continue;
        }
        let back_ref = kept
            .iter()
            .find(|k| k.doc.response_id == Some(resp.id) && !owner.contains_key(&k.doc.id));
        if let Some(k) = back_ref {
            owner.insert(k.doc.id, *resp);
            placed.insert(resp.id);
        }
    }

    for resp in &ordered_responses {
        if placed.contains(&resp.id) {
            continue;
        }
        if let Some(target) = match_orphan(resp, &kept, &owner, &live) {
            owner.insert(target, *resp);
            placed.insert(resp.id);
        }
    }

    for k in &kept {
        let doc = k.doc;
        match owner.get(&doc.id) {
            Some(resp) => {
                if resp.assignment_id != Some(doc.id) {
                    actions.push(ReconcileAction::RepointResponse {
                        response_id: resp.id,
                        assignment_id: doc.id,
                    });
                }
                if doc.response_id != Some(resp.id)
                    || doc.status != AssignmentStatus::Completed
                    || doc.score != Some(resp.score)
                {
                    actions.push(ReconcileAction::LinkResponse {
                        assignment_id: doc.id,
                        response_id: resp.id,
                        score: resp.score,
                        completed_at: doc.completed_at.unwrap_or(resp.submitted_at),
                    });
                }
            }
            None => {
                let status = derive_status(AssignmentStatus::Pending, doc.due_date, now, grace);
                if doc.response_id.is_some() || doc.status == AssignmentStatus::Completed {
                    actions.push(ReconcileAction::UnlinkMissingResponse {
                        assignment_id: doc.id,
                        status,
                    });
                } else if doc.status == AssignmentStatus::Pending
                    && status == AssignmentStatus::Overdue
                {
                    actions.push(ReconcileAction::MarkOverdue {
                        assignment_id: doc.id,
                    });
                }
            }
        }
    }

    ReconcilePlan { actions }
}

fn match_orphan(
    resp: &FormResponse,
    kept: &[Kept],
    owner: &HashMap<Uuid, &FormResponse>,
    live: &HashMap<Uuid, &FormResponse>,
) -> Option<Uuid> {
    let completed_elsewhere = |doc: &CheckInAssignment| {
        doc.status == AssignmentStatus::Completed
            && doc.response_id.map_or(false, |id| live.contains_key(&id))
    };
    let candidates: Vec<&Kept> = kept
        .iter()
        .filter(|k| k.doc.form_id == resp.form_id && !owner.contains_key(&k.doc.id))
        .filter(|k| !completed_elsewhere(k.doc))
        .collect();

    if let Some(week) = resp.recurring_week {
        if let Some(k) = candidates.iter().find(|k| k.week == week) {
            return Some(k.doc.id);
        }
    }

    let window = Duration::days(ORPHAN_MATCH_WINDOW_DAYS);
    candidates
        .iter()
        .map(|k| (k, (k.doc.due_date - resp.submitted_at).num_seconds().abs()))
        .filter(|(_, distance)| *distance <= window.num_seconds())
        .min_by_key(|(k, distance)| (*distance, k.week))
        .map(|(k, _)| k.doc.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recurring::tests::assignment;
    use chrono::TimeZone;
    use sqlx::types::Json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 17, 0, 0).unwrap()
    }

    fn response(assignment_id: Option<Uuid>, form_id: Uuid, submitted_at: DateTime<Utc>) -> FormResponse {
        FormResponse {
            id: Uuid::new_v4(),
            assignment_id,
            client_id: Uuid::nil(),
            coach_id: Uuid::nil(),
            form_id,
            recurring_week: None,
            answers: Json(Vec::new()),
            score: 72,
            scored_questions: 3,
            answered_questions: 3,
            traffic_light: "orange".to_string(),
            submitted_at,
            reviewed_at: None,
            coach_notes: None,
        }
    }

    fn completed(mut doc: CheckInAssignment, resp: &FormResponse) -> CheckInAssignment {
        doc.status = AssignmentStatus::Completed;
        doc.response_id = Some(resp.id);
        doc.score = Some(resp.score);
        doc.completed_at = Some(resp.submitted_at);
        doc
    }

    #[test]
    fn consistent_data_needs_no_actions() {
        let series = Uuid::new_v4();
        let w1 = assignment(series, Some(1), at(2026, 1, 5));
        let resp = response(Some(w1.id), w1.form_id, at(2026, 1, 4));
        let w1 = completed(w1, &resp);
        let w2 = assignment(series, Some(2), at(2026, 1, 12));

        let plan = plan(&[w1, w2], &[resp], at(2026, 1, 8), Duration::zero());
        assert!(plan.is_empty(), "{:?}", plan.actions);
    }

    #[test]
    fn duplicates_keep_the_completed_document() {
        let series = Uuid::new_v4();
        let w1 = assignment(series, Some(1), at(2026, 1, 5));
        let early = assignment(series, Some(2), at(2026, 1, 12));
        let mut late = assignment(series, None, at(2026, 1, 13));
        late.created_at = early.created_at + Duration::hours(1);
        let resp = response(Some(late.id), late.form_id, at(2026, 1, 12));
        let late = completed(late, &resp);

        let plan = plan(
            &[w1, early.clone(), late.clone()],
            &[resp],
            at(2026, 1, 14),
            Duration::zero(),
        );
        assert!(plan.actions.contains(&ReconcileAction::RemoveDuplicate {
            assignment_id: early.id,
            kept: late.id,
        }));
        assert!(plan.actions.contains(&ReconcileAction::SetWeek {
            assignment_id: late.id,
            week: 2,
        }));
        assert_eq!(plan.summary().duplicates_removed, 1);
        assert_eq!(plan.summary().responses_linked, 0);
    }

    #[test]
    fn completed_document_outranks_earlier_linked_one() {
        let series = Uuid::new_v4();
        let mut linked = assignment(series, Some(1), at(2026, 1, 5));
        let first = response(Some(linked.id), linked.form_id, at(2026, 1, 5));
        linked.response_id = Some(first.id);
        let mut done = assignment(series, Some(1), at(2026, 1, 5));
        done.created_at = linked.created_at + Duration::hours(1);
        let second = response(Some(done.id), done.form_id, at(2026, 1, 6));
        let done = completed(done, &second);

        let plan = plan(
            &[linked.clone(), done.clone()],
            &[first, second],
            at(2026, 1, 7),
            Duration::zero(),
        );
        assert_eq!(
            plan.actions,
            vec![ReconcileAction::RemoveDuplicate {
                assignment_id: linked.id,
                kept: done.id,
            }]
        );
    }

    #[test]
    fn earlier_stray_response_cannot_take_a_completed_week() {
        let series = Uuid::new_v4();
        let doc = assignment(series, Some(1), at(2026, 1, 5));
        let mut real = response(None, doc.form_id, at(2026, 1, 5));
        real.recurring_week = Some(1);
        let doc = completed(doc, &real);
        let mut stray = response(None, doc.form_id, at(2026, 1, 4));
        stray.recurring_week = Some(1);

        let plan = plan(
            &[doc.clone()],
            &[stray.clone(), real.clone()],
            at(2026, 1, 6),
            Duration::zero(),
        );
        assert_eq!(
            plan.actions,
            vec![ReconcileAction::RepointResponse {
                response_id: real.id,
                assignment_id: doc.id,
            }]
        );
    }

    #[test]
    fn one_sided_link_is_completed() {
        let series = Uuid::new_v4();
        let doc = assignment(series, Some(1), at(2026, 1, 5));
        let resp = response(Some(doc.id), doc.form_id, at(2026, 1, 5));

        let plan = plan(&[doc.clone()], &[resp.clone()], at(2026, 1, 6), Duration::zero());
        assert_eq!(
            plan.actions,
            vec![ReconcileAction::LinkResponse {
                assignment_id: doc.id,
                response_id: resp.id,
                score: 72,
                completed_at: resp.submitted_at,
            }]
        );
    }

    #[test]
    fn orphan_response_matched_by_week_then_due_date() {
        let series = Uuid::new_v4();
        let w1 = assignment(series, Some(1), at(2026, 1, 5));
        let w2 = assignment(series, Some(2), at(2026, 1, 12));

        let mut by_week = response(None, w1.form_id, at(2026, 1, 6));
        by_week.recurring_week = Some(2);
        let by_date = response(None, w1.form_id, at(2026, 1, 4));

        let plan = plan(
            &[w1.clone(), w2.clone()],
            &[by_week.clone(), by_date.clone()],
            at(2026, 1, 8),
            Duration::zero(),
        );
        assert!(plan.actions.contains(&ReconcileAction::RepointResponse {
            response_id: by_week.id,
            assignment_id: w2.id,
        }));
        assert!(plan.actions.contains(&ReconcileAction::RepointResponse {
            response_id: by_date.id,
            assignment_id: w1.id,
        }));
        assert_eq!(plan.summary().responses_linked, 2);
    }

    #[test]
    fn orphan_outside_window_is_left_alone() {
        let series = Uuid::new_v4();
        let doc = assignment(series, Some(1), at(2026, 1, 5));
        let stray = response(None, doc.form_id, at(2026, 1, 20));

        let plan = plan(&[doc], &[stray], at(2026, 1, 4), Duration::zero());
        assert!(plan.is_empty());
    }

    #[test]
    fn dangling_response_reference_is_cleared() {
        let series = Uuid::new_v4();
        let ghost = response(None, Uuid::nil(), at(2026, 1, 5));
        let doc = completed(assignment(series, Some(1), at(2026, 1, 5)), &ghost);

        let plan = plan(&[doc.clone()], &[], at(2026, 1, 9), Duration::zero());
        assert_eq!(
            plan.actions,
            vec![ReconcileAction::UnlinkMissingResponse {
                assignment_id: doc.id,
                status: AssignmentStatus::Overdue,
            }]
        );
    }

    #[test]
    fn stale_pending_marked_overdue() {
        let series = Uuid::new_v4();
        let doc = assignment(series, Some(1), at(2026, 1, 5));
        let plan = plan(&[doc.clone()], &[], at(2026, 1, 7), Duration::zero());
        assert_eq!(
            plan.actions,
            vec![ReconcileAction::MarkOverdue { assignment_id: doc.id }]
        );
    }

    #[test]
    fn ordered_actions_follow_phases() {
        let id = Uuid::new_v4();
        let plan = ReconcilePlan {
            actions: vec![
                ReconcileAction::MarkOverdue { assignment_id: id },
                ReconcileAction::SetWeek { assignment_id: id, week: 3 },
                ReconcileAction::RemoveDuplicate { assignment_id: id, kept: id },
            ],
        };
        let phases: Vec<u8> = plan.ordered().iter().map(|a| a.phase()).collect();
        assert_eq!(phases, vec![1, 2, 5]);
    }
}
