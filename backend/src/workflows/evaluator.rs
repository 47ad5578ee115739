// Rule Evaluator - Condition check, cooldown dedup, effect dispatch and logging

use chrono::{DateTime, Duration, Utc};
use solarops_shared::WorkflowActionLog;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::action_log::{ActionLogStore, NewActionLog};
use super::dispatcher::ExternalEffectDispatcher;
use super::job_state::JobStateReader;
use super::rules::{Effect, RuleContext, WorkflowRule};
use super::{WorkflowError, WorkflowResult};

#[derive(Clone)]
pub struct RuleEvaluator {
    jobs: Arc<dyn JobStateReader>,
    log_store: Arc<dyn ActionLogStore>,
    dispatcher: Arc<dyn ExternalEffectDispatcher>,
}

impl RuleEvaluator {
    pub fn new(
        jobs: Arc<dyn JobStateReader>,
        log_store: Arc<dyn ActionLogStore>,
        dispatcher: Arc<dyn ExternalEffectDispatcher>,
    ) -> Self {
        Self {
            jobs,
            log_store,
            dispatcher,
        }
    }

    pub async fn evaluate(&self, rule: &WorkflowRule, job_id: Uuid) -> WorkflowResult<Option<WorkflowActionLog>> {
        self.evaluate_at(rule, job_id, Utc::now()).await
    }

    /// Evaluate one rule for one job as of `now`.
    ///
    /// Returns the appended log row when the rule fires, `None` when it is disabled,
    /// its condition does not hold, or it already fired within its cooldown.
    pub async fn evaluate_at(
        &self,
        rule: &WorkflowRule,
        job_id: Uuid,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Option<WorkflowActionLog>> {
        if !rule.enabled {
            return Ok(None);
        }

        let ctx = RuleContext {
            job_id,
            now,
            jobs: self.jobs.as_ref(),
        };
        let matched = rule
            .condition
            .check(&ctx)
            .await
            .map_err(|source| WorkflowError::Condition {
                rule_key: rule.key.clone(),
                job_id,
                source,
            })?;
        let Some(matched) = matched else {
            return Ok(None);
        };

        // Only the most recent prior firing matters. A window reaching past the
        // representable range covers every recorded firing.
        let window_start = Duration::try_days(rule.cooldown_days)
            .and_then(|cooldown| now.checked_sub_signed(cooldown))
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if let Some(previous) = self
            .log_store
            .latest_after(job_id, &rule.key, window_start)
            .await?
        {
            debug!(
                "Rule '{}' suppressed for job {}: fired at {}",
                rule.key, job_id, previous.created_at
            );
            return Ok(None);
        }

        let failed = self.apply_effects(rule, job_id, &matched.effects).await;

        let entry = self
            .log_store
            .append(NewActionLog {
                job_id,
                rule_key: rule.key.clone(),
                action_type: matched.action_type,
                created_at: now,
                metadata: matched.metadata,
            })
            .await?;

        info!(
            "Rule '{}' fired for job {} ({} effect(s), {} failed)",
            rule.key,
            job_id,
            matched.effects.len(),
            failed
        );

        Ok(Some(entry))
    }

    /// Issue each effect once. Failures are logged and swallowed; returns how many failed.
    async fn apply_effects(&self, rule: &WorkflowRule, job_id: Uuid, effects: &[Effect]) -> usize {
        let mut failed = 0;

        for effect in effects {
            let result = match effect {
                Effect::ExternalTask {
                    target_id,
                    title,
                    description,
                    due_in_days,
                } => {
                    self.dispatcher
                        .create_external_task(target_id, title, description, *due_in_days)
                        .await
                }
                Effect::ExternalNote { target_id, text } => {
                    self.dispatcher.create_external_note(target_id, text).await
                }
                Effect::CustomerMessage(message) => {
                    self.dispatcher.send_customer_message(job_id, message).await
                }
            };

            if let Err(e) = result {
                failed += 1;
                warn!("Rule '{}' effect failed for job {}: {}", rule.key, job_id, e);
            }
        }

        failed
    }
}
