// Unit tests for the default rule catalog

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use solarops_shared::ActionType;
use uuid::Uuid;

use crate::tests::fixtures::*;
use crate::tests::helpers::FakeJobState;
use crate::workflows::catalog::{
    InstallCompleteNotice, InvoiceOverdue, MaterialsBackordered, PermitStalled, QcFailureRework,
    SafetyIncidentOpen, WarrantyClaimAging,
};
use crate::workflows::job_state::{IncidentSeverity, JobStatus};
use crate::workflows::rules::{Effect, RuleCondition, RuleContext, RuleMatch};

async fn check(
    condition: &dyn RuleCondition,
    state: &FakeJobState,
    job_id: Uuid,
    now: DateTime<Utc>,
) -> Option<RuleMatch> {
    let ctx = RuleContext {
        job_id,
        now,
        jobs: state,
    };
    condition.check(&ctx).await.unwrap()
}

fn seeded(job: crate::workflows::job_state::JobRecord) -> (FakeJobState, Uuid) {
    let state = FakeJobState::new();
    let id = job.id;
    state.add_job(job);
    (state, id)
}

#[cfg(test)]
mod permit_tests {
    use super::*;

    #[tokio::test]
    async fn test_stalled_permit_creates_task() {
        let (state, job_id) = seeded(JobFixture::new().status(JobStatus::Permitting, base_time()).build());

        let matched = check(&PermitStalled::default(), &state, job_id, days_after(15)).await.unwrap();

        assert_eq!(matched.action_type, ActionType::ExternalTask);
        assert_eq!(matched.metadata["days_in_permitting"], 15);
        assert!(matches!(
            &matched.effects[..],
            [Effect::ExternalTask { target_id, due_in_days: 2, .. }] if target_id == "proj-100"
        ));
    }

    #[tokio::test]
    async fn test_recent_permit_is_quiet() {
        let (state, job_id) = seeded(JobFixture::new().status(JobStatus::Permitting, base_time()).build());
        assert!(check(&PermitStalled::default(), &state, job_id, days_after(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_unlinked_or_other_status_is_quiet() {
        let (state, unlinked) =
            seeded(JobFixture::new().status(JobStatus::Permitting, base_time()).unlinked().build());
        let scheduled = JobFixture::new().status(JobStatus::Scheduled, base_time()).build();
        let scheduled_id = scheduled.id;
        state.add_job(scheduled);

        assert!(check(&PermitStalled::default(), &state, unlinked, days_after(30)).await.is_none());
        assert!(check(&PermitStalled::default(), &state, scheduled_id, days_after(30)).await.is_none());
    }
}

#[cfg(test)]
mod qc_tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_failed_inspection_requests_rework() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_inspection(failed_inspection(job_id, days_after(2)));

        let matched = check(&QcFailureRework, &state, job_id, days_after(3)).await.unwrap();

        assert_eq!(matched.metadata["failed_items"], 3);
        assert_eq!(matched.effects.len(), 1);
    }

    #[tokio::test]
    async fn test_only_latest_inspection_counts() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_inspection(failed_inspection(job_id, days_after(1)));
        state.add_inspection(passed_inspection(job_id, days_after(2)));

        assert!(check(&QcFailureRework, &state, job_id, days_after(3)).await.is_none());
    }

    #[tokio::test]
    async fn test_booked_reinspection_is_quiet() {
        let (state, job_id) = seeded(JobFixture::new().build());
        let mut inspection = failed_inspection(job_id, days_after(1));
        inspection.reinspection_scheduled_at = Some(days_after(4));
        state.add_inspection(inspection);

        assert!(check(&QcFailureRework, &state, job_id, days_after(2)).await.is_none());
    }
}

#[cfg(test)]
mod safety_tests {
    use super::*;

    #[tokio::test]
    async fn test_open_high_incident_adds_note_and_task() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_incident(incident(job_id, IncidentSeverity::High));
        state.add_incident(incident(job_id, IncidentSeverity::Low));

        let matched = check(&SafetyIncidentOpen::default(), &state, job_id, base_time()).await.unwrap();

        assert_eq!(matched.action_type, ActionType::ExternalNote);
        assert_eq!(matched.metadata["open_incidents"], 1);
        assert_eq!(matched.metadata["highest_severity"], "HIGH");
        assert!(matches!(
            &matched.effects[..],
            [Effect::ExternalNote { .. }, Effect::ExternalTask { due_in_days: 1, .. }]
        ));
    }

    #[tokio::test]
    async fn test_minor_or_resolved_incidents_are_quiet() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_incident(incident(job_id, IncidentSeverity::Medium));
        let mut resolved = incident(job_id, IncidentSeverity::Critical);
        resolved.resolved_at = Some(base_time());
        state.add_incident(resolved);

        assert!(check(&SafetyIncidentOpen::default(), &state, job_id, base_time()).await.is_none());
    }
}

#[cfg(test)]
mod materials_tests {
    use super::*;

    #[tokio::test]
    async fn test_late_backorder_notes_project_and_tells_customer() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_order(backorder(job_id, "Microinverter IQ8", days_after(-2)));

        let matched = check(&MaterialsBackordered, &state, job_id, base_time()).await.unwrap();

        assert_eq!(matched.metadata["count"], 1);
        assert!(matches!(
            &matched.effects[..],
            [Effect::ExternalNote { .. }, Effect::CustomerMessage(m)] if m.message_type == "MATERIAL_DELAY" && m.send_email
        ));
    }

    #[tokio::test]
    async fn test_unlinked_job_only_messages_customer() {
        let (state, job_id) = seeded(JobFixture::new().unlinked().build());
        state.add_order(backorder(job_id, "Racking rail", days_after(-1)));

        let matched = check(&MaterialsBackordered, &state, job_id, base_time()).await.unwrap();

        assert!(matches!(&matched.effects[..], [Effect::CustomerMessage(_)]));
    }

    #[tokio::test]
    async fn test_future_or_delivered_orders_are_quiet() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_order(backorder(job_id, "Battery", days_after(5)));
        let mut delivered = backorder(job_id, "Panels", days_after(-5));
        delivered.delivered_at = Some(days_after(-1));
        state.add_order(delivered);

        assert!(check(&MaterialsBackordered, &state, job_id, base_time()).await.is_none());
    }
}

#[cfg(test)]
mod install_tests {
    use super::*;

    #[tokio::test]
    async fn test_fresh_install_emails_and_texts() {
        let (state, job_id) = seeded(JobFixture::new().installed_at(base_time()).build());

        let matched = check(&InstallCompleteNotice::default(), &state, job_id, days_after(1)).await.unwrap();

        assert_eq!(matched.action_type, ActionType::CustomerEmail);
        assert!(matches!(
            &matched.effects[..],
            [Effect::CustomerMessage(m)] if m.send_email && m.send_sms
        ));
    }

    #[tokio::test]
    async fn test_old_install_is_quiet() {
        let (state, job_id) = seeded(JobFixture::new().installed_at(base_time()).build());
        assert!(check(&InstallCompleteNotice::default(), &state, job_id, days_after(5)).await.is_none());
    }
}

#[cfg(test)]
mod invoice_tests {
    use super::*;

    #[tokio::test]
    async fn test_overdue_balance_sends_reminder_and_task() {
        let (state, job_id) = seeded(JobFixture::new().build());
        let due = (base_time() - Duration::days(40)).date_naive();
        state.add_invoice(invoice(job_id, Decimal::new(250000, 2), Decimal::new(100000, 2), due));

        let matched = check(&InvoiceOverdue::default(), &state, job_id, base_time()).await.unwrap();

        assert_eq!(matched.action_type, ActionType::CustomerEmail);
        assert_eq!(matched.metadata["outstanding"], "1500.00");
        assert!(matches!(
            &matched.effects[..],
            [Effect::CustomerMessage(_), Effect::ExternalTask { due_in_days: 5, .. }]
        ));
    }

    #[tokio::test]
    async fn test_paid_or_within_grace_is_quiet() {
        let (state, job_id) = seeded(JobFixture::new().build());
        let long_ago = (base_time() - Duration::days(90)).date_naive();
        let recent = (base_time() - Duration::days(20)).date_naive();
        state.add_invoice(invoice(job_id, Decimal::new(1000, 0), Decimal::new(1000, 0), long_ago));
        state.add_invoice(invoice(job_id, Decimal::new(1000, 0), Decimal::ZERO, recent));

        assert!(check(&InvoiceOverdue::default(), &state, job_id, base_time()).await.is_none());
    }
}

#[cfg(test)]
mod warranty_tests {
    use super::*;

    #[tokio::test]
    async fn test_aging_claim_escalates() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_claim(warranty_claim(job_id, days_after(-12)));

        let matched = check(&WarrantyClaimAging::default(), &state, job_id, base_time()).await.unwrap();

        assert_eq!(matched.metadata["oldest_open_days"], 12);
        assert_eq!(matched.effects.len(), 1);
    }

    #[tokio::test]
    async fn test_young_or_closed_claims_are_quiet() {
        let (state, job_id) = seeded(JobFixture::new().build());
        state.add_claim(warranty_claim(job_id, days_after(-5)));
        let mut closed = warranty_claim(job_id, days_after(-40));
        closed.closed_at = Some(days_after(-1));
        state.add_claim(closed);

        assert!(check(&WarrantyClaimAging::default(), &state, job_id, base_time()).await.is_none());
    }
}
