// Rule Catalog - Default solar-installation automation rules
//
// Each rule is a small struct implementing RuleCondition. Conditions only read job
// state through the context; the effects they return are dispatched by the evaluator.

use async_trait::async_trait;
use chrono::Duration;
use rust_decimal::Decimal;
use serde_json::json;
use solarops_shared::{ActionType, Department};

use super::dispatcher::CustomerMessage;
use super::job_state::{IncidentSeverity, JobRecord, JobStatus, StateResult};
use super::rules::{Effect, RegistryError, RuleCondition, RuleContext, RuleMatch, RuleRegistry, WorkflowRule};

pub const PERMIT_STALLED: &str = "permit_stalled";
pub const QC_FAILURE_REWORK: &str = "qc_failure_rework";
pub const SAFETY_INCIDENT_OPEN: &str = "safety_incident_open";
pub const MATERIALS_BACKORDERED: &str = "materials_backordered";
pub const INSTALL_COMPLETE_NOTICE: &str = "install_complete_notice";
pub const INVOICE_OVERDUE: &str = "invoice_overdue";
pub const WARRANTY_CLAIM_AGING: &str = "warranty_claim_aging";

/// Default rules in evaluation order
pub fn default_rules() -> Vec<WorkflowRule> {
    vec![
        WorkflowRule::new(PERMIT_STALLED, "Stalled permit follow-up", Department::Admin, 7, PermitStalled::default())
            .with_description("Creates a permit follow-up task when a job sits in permitting too long"),
        WorkflowRule::new(QC_FAILURE_REWORK, "QC failure rework", Department::Production, 3, QcFailureRework)
            .with_description("Creates a rework task when the latest QC inspection failed with no re-inspection booked"),
        WorkflowRule::new(SAFETY_INCIDENT_OPEN, "Open safety incident", Department::Safety, 1, SafetyIncidentOpen::default())
            .with_description("Flags unresolved high-severity safety incidents on the project"),
        WorkflowRule::new(MATERIALS_BACKORDERED, "Backordered materials", Department::Production, 7, MaterialsBackordered)
            .with_description("Notes late backordered materials and tells the customer about the delay"),
        WorkflowRule::new(INSTALL_COMPLETE_NOTICE, "Install complete notice", Department::Sales, 30, InstallCompleteNotice::default())
            .with_description("Emails and texts the customer once their system is installed"),
        WorkflowRule::new(INVOICE_OVERDUE, "Overdue invoice reminder", Department::Finance, 14, InvoiceOverdue::default())
            .with_description("Reminds the customer about invoices past due and opens a collections task"),
        WorkflowRule::new(WARRANTY_CLAIM_AGING, "Aging warranty claim", Department::Warranty, 5, WarrantyClaimAging::default())
            .with_description("Escalates warranty claims left open too long"),
    ]
}

pub fn default_registry(disabled: &[String]) -> Result<RuleRegistry, RegistryError> {
    Ok(RuleRegistry::from_rules(default_rules())?.with_disabled(disabled))
}

fn project_target(job: &JobRecord) -> Option<String> {
    job.external_project_id.clone().filter(|id| !id.trim().is_empty())
}

#[derive(Debug, Clone)]
pub struct PermitStalled {
    pub stale_after_days: i64,
}

impl Default for PermitStalled {
    fn default() -> Self {
        Self { stale_after_days: 14 }
    }
}

#[async_trait]
impl RuleCondition for PermitStalled {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let job = ctx.jobs.job(ctx.job_id).await?;
        if job.status != JobStatus::Permitting {
            return Ok(None);
        }
        let Some(target) = project_target(&job) else {
            return Ok(None);
        };

        let days_waiting = (ctx.now - job.status_changed_at).num_days();
        if days_waiting < self.stale_after_days {
            return Ok(None);
        }

        Ok(Some(
            RuleMatch::new(
                ActionType::ExternalTask,
                json!({ "job_number": job.job_number, "days_in_permitting": days_waiting }),
            )
            .with_effect(Effect::ExternalTask {
                target_id: target,
                title: format!("Follow up on permit for job {}", job.job_number),
                description: format!(
                    "Permit has been pending for {} days. Contact the AHJ for a status update.",
                    days_waiting
                ),
                due_in_days: 2,
            }),
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct QcFailureRework;

#[async_trait]
impl RuleCondition for QcFailureRework {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let inspections = ctx.jobs.qc_inspections(ctx.job_id).await?;
        let Some(latest) = inspections.first() else {
            return Ok(None);
        };
        if latest.passed || latest.reinspection_scheduled_at.is_some() {
            return Ok(None);
        }

        let job = ctx.jobs.job(ctx.job_id).await?;
        let Some(target) = project_target(&job) else {
            return Ok(None);
        };

        Ok(Some(
            RuleMatch::new(
                ActionType::ExternalTask,
                json!({
                    "inspection_id": latest.id,
                    "failed_items": latest.failed_items,
                    "score": latest.score,
                }),
            )
            .with_effect(Effect::ExternalTask {
                target_id: target,
                title: format!("QC rework required for job {}", job.job_number),
                description: format!(
                    "Inspection on {} failed with {} item(s). Schedule rework and a re-inspection.",
                    latest.inspected_at.date_naive(),
                    latest.failed_items
                ),
                due_in_days: 3,
            }),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SafetyIncidentOpen {
    pub min_severity: IncidentSeverity,
}

impl Default for SafetyIncidentOpen {
    fn default() -> Self {
        Self {
            min_severity: IncidentSeverity::High,
        }
    }
}

#[async_trait]
impl RuleCondition for SafetyIncidentOpen {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let incidents = ctx.jobs.safety_incidents(ctx.job_id).await?;
        let open: Vec<_> = incidents
            .iter()
            .filter(|i| i.resolved_at.is_none() && i.severity >= self.min_severity)
            .collect();
        let Some(highest) = open.iter().map(|i| i.severity).max() else {
            return Ok(None);
        };

        let job = ctx.jobs.job(ctx.job_id).await?;
        let Some(target) = project_target(&job) else {
            return Ok(None);
        };

        let summary = open
            .iter()
            .map(|i| format!("[{}] {}", i.severity.as_str(), i.description))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(Some(
            RuleMatch::new(
                ActionType::ExternalNote,
                json!({ "open_incidents": open.len(), "highest_severity": highest.as_str() }),
            )
            .with_effect(Effect::ExternalNote {
                target_id: target.clone(),
                text: format!("Unresolved safety incidents:\n{}", summary),
            })
            .with_effect(Effect::ExternalTask {
                target_id: target,
                title: format!("Resolve {} safety incident(s) on job {}", open.len(), job.job_number),
                description: summary,
                due_in_days: 1,
            }),
        ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialsBackordered;

#[async_trait]
impl RuleCondition for MaterialsBackordered {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let orders = ctx.jobs.material_orders(ctx.job_id).await?;
        let late: Vec<_> = orders
            .iter()
            .filter(|o| {
                o.backordered
                    && o.delivered_at.is_none()
                    && o.expected_at.is_some_and(|expected| expected < ctx.now)
            })
            .collect();
        if late.is_empty() {
            return Ok(None);
        }

        let job = ctx.jobs.job(ctx.job_id).await?;
        let items: Vec<&str> = late.iter().map(|o| o.item.as_str()).collect();

        let mut matched = RuleMatch::new(
            ActionType::ExternalNote,
            json!({ "backordered_items": items, "count": late.len() }),
        );
        if let Some(target) = project_target(&job) {
            matched = matched.with_effect(Effect::ExternalNote {
                target_id: target,
                text: format!("Backordered past expected delivery: {}", items.join(", ")),
            });
        }

        Ok(Some(matched.with_effect(Effect::CustomerMessage(CustomerMessage {
            message_type: "MATERIAL_DELAY".to_string(),
            channel: "PROJECT_UPDATES".to_string(),
            title: "Equipment delivery delayed".to_string(),
            body: "Some equipment for your installation is backordered. We will confirm a new install date as soon as it ships.".to_string(),
            send_email: true,
            send_sms: false,
        }))))
    }
}

#[derive(Debug, Clone)]
pub struct InstallCompleteNotice {
    pub window_days: i64,
}

impl Default for InstallCompleteNotice {
    fn default() -> Self {
        Self { window_days: 2 }
    }
}

#[async_trait]
impl RuleCondition for InstallCompleteNotice {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let job = ctx.jobs.job(ctx.job_id).await?;
        if job.status != JobStatus::Installed {
            return Ok(None);
        }
        let Some(installed_at) = job.installed_at else {
            return Ok(None);
        };
        if ctx.now - installed_at > Duration::days(self.window_days) {
            return Ok(None);
        }

        Ok(Some(
            RuleMatch::new(
                ActionType::CustomerEmail,
                json!({ "job_number": job.job_number, "installed_at": installed_at }),
            )
            .with_effect(Effect::CustomerMessage(CustomerMessage {
                message_type: "INSTALL_COMPLETE".to_string(),
                channel: "PROJECT_UPDATES".to_string(),
                title: "Your solar system is installed".to_string(),
                body: "Installation is complete. Next up is the utility inspection and permission to operate; we will keep you posted.".to_string(),
                send_email: true,
                send_sms: true,
            })),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct InvoiceOverdue {
    pub grace_days: i64,
}

impl Default for InvoiceOverdue {
    fn default() -> Self {
        Self { grace_days: 30 }
    }
}

#[async_trait]
impl RuleCondition for InvoiceOverdue {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let cutoff = ctx.now.date_naive() - Duration::days(self.grace_days);
        let invoices = ctx.jobs.invoices(ctx.job_id).await?;
        let overdue: Vec<_> = invoices
            .iter()
            .filter(|inv| inv.balance() > Decimal::ZERO && inv.due_date < cutoff)
            .collect();
        let Some(oldest_due) = overdue.iter().map(|inv| inv.due_date).min() else {
            return Ok(None);
        };

        let outstanding: Decimal = overdue.iter().map(|inv| inv.balance()).sum();
        let job = ctx.jobs.job(ctx.job_id).await?;

        let mut matched = RuleMatch::new(
            ActionType::CustomerEmail,
            json!({
                "overdue_invoices": overdue.len(),
                "outstanding": outstanding.to_string(),
                "oldest_due_date": oldest_due,
            }),
        )
        .with_effect(Effect::CustomerMessage(CustomerMessage {
            message_type: "PAYMENT_REMINDER".to_string(),
            channel: "BILLING".to_string(),
            title: "Payment reminder".to_string(),
            body: format!(
                "Our records show an outstanding balance of ${} due since {}. Please contact us if you have already paid.",
                outstanding.round_dp(2),
                oldest_due
            ),
            send_email: true,
            send_sms: false,
        }));

        if let Some(target) = project_target(&job) {
            matched = matched.with_effect(Effect::ExternalTask {
                target_id: target,
                title: format!("Collections follow-up for job {}", job.job_number),
                description: format!("${} outstanding across {} invoice(s)", outstanding.round_dp(2), overdue.len()),
                due_in_days: 5,
            });
        }

        Ok(Some(matched))
    }
}

#[derive(Debug, Clone)]
pub struct WarrantyClaimAging {
    pub max_open_days: i64,
}

impl Default for WarrantyClaimAging {
    fn default() -> Self {
        Self { max_open_days: 10 }
    }
}

#[async_trait]
impl RuleCondition for WarrantyClaimAging {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>> {
        let claims = ctx.jobs.warranty_claims(ctx.job_id).await?;
        let aging: Vec<_> = claims
            .iter()
            .filter(|c| c.closed_at.is_none() && (ctx.now - c.opened_at).num_days() > self.max_open_days)
            .collect();
        let Some(oldest_days) = aging.iter().map(|c| (ctx.now - c.opened_at).num_days()).max() else {
            return Ok(None);
        };

        let job = ctx.jobs.job(ctx.job_id).await?;
        let Some(target) = project_target(&job) else {
            return Ok(None);
        };

        let claim_ids: Vec<_> = aging.iter().map(|c| c.id).collect();
        let summaries = aging.iter().map(|c| c.summary.as_str()).collect::<Vec<_>>().join("; ");

        Ok(Some(
            RuleMatch::new(
                ActionType::ExternalTask,
                json!({ "claim_ids": claim_ids, "oldest_open_days": oldest_days }),
            )
            .with_effect(Effect::ExternalTask {
                target_id: target,
                title: format!("Warranty claim open {} days on job {}", oldest_days, job.job_number),
                description: summaries,
                due_in_days: 2,
            }),
        ))
    }
}
