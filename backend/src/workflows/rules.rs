// Workflow Rules - Rule descriptors, condition trait and the ordered registry

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use solarops_shared::{ActionType, Department, RuleDescriptor};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::dispatcher::CustomerMessage;
use super::job_state::{JobStateReader, StateResult};

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("Rule key must not be blank")]
    BlankKey,
    #[error("Rule '{0}' is already registered")]
    DuplicateKey(String),
    #[error("Rule '{key}' has negative cooldown of {cooldown_days} days")]
    NegativeCooldown { key: String, cooldown_days: i64 },
    #[error("Rule '{key}' cooldown of {cooldown_days} days exceeds the {max} day maximum")]
    CooldownTooLarge { key: String, cooldown_days: i64, max: i64 },
}

/// Upper bound on a rule cooldown, roughly a century
pub const MAX_COOLDOWN_DAYS: i64 = 36_500;

/// Everything a condition may read while deciding whether to fire
pub struct RuleContext<'a> {
    pub job_id: Uuid,
    pub now: DateTime<Utc>,
    pub jobs: &'a dyn JobStateReader,
}

/// External side effect requested by a matching rule
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    ExternalTask {
        target_id: String,
        title: String,
        description: String,
        due_in_days: u32,
    },
    ExternalNote {
        target_id: String,
        text: String,
    },
    CustomerMessage(CustomerMessage),
}

/// Outcome of a positive condition check
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub action_type: ActionType,
    pub metadata: serde_json::Value,
    pub effects: Vec<Effect>,
}

impl RuleMatch {
    pub fn new(action_type: ActionType, metadata: serde_json::Value) -> Self {
        Self {
            action_type,
            metadata,
            effects: Vec::new(),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Domain predicate of a rule. Must only read state; effects are returned, not performed.
#[async_trait]
pub trait RuleCondition: Send + Sync {
    async fn check(&self, ctx: &RuleContext<'_>) -> StateResult<Option<RuleMatch>>;
}

#[derive(Clone)]
pub struct WorkflowRule {
    pub key: String,
    pub name: String,
    pub description: String,
    pub department: Department,
    pub enabled: bool,
    pub cooldown_days: i64,
    pub condition: Arc<dyn RuleCondition>,
}

impl WorkflowRule {
    pub fn new(
        key: &str,
        name: &str,
        department: Department,
        cooldown_days: i64,
        condition: impl RuleCondition + 'static,
    ) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            description: String::new(),
            department,
            enabled: true,
            cooldown_days,
            condition: Arc::new(condition),
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor {
            key: self.key.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            department: self.department,
            enabled: self.enabled,
            cooldown_days: self.cooldown_days,
        }
    }
}

impl fmt::Debug for WorkflowRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowRule")
            .field("key", &self.key)
            .field("department", &self.department)
            .field("enabled", &self.enabled)
            .field("cooldown_days", &self.cooldown_days)
            .finish()
    }
}

/// Ordered rule table, fixed once the engine is built.
/// Registration order is the evaluation order within a job pass.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    rules: Vec<WorkflowRule>,
    keys: HashSet<String>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rule: WorkflowRule) -> Result<(), RegistryError> {
        if rule.key.trim().is_empty() {
            return Err(RegistryError::BlankKey);
        }
        if rule.cooldown_days < 0 {
            return Err(RegistryError::NegativeCooldown {
                key: rule.key,
                cooldown_days: rule.cooldown_days,
            });
        }
        if rule.cooldown_days > MAX_COOLDOWN_DAYS {
            return Err(RegistryError::CooldownTooLarge {
                key: rule.key,
                cooldown_days: rule.cooldown_days,
                max: MAX_COOLDOWN_DAYS,
            });
        }
        if !self.keys.insert(rule.key.clone()) {
            return Err(RegistryError::DuplicateKey(rule.key));
        }

        self.rules.push(rule);
        Ok(())
    }

    pub fn from_rules(rules: impl IntoIterator<Item = WorkflowRule>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for rule in rules {
            registry.register(rule)?;
        }
        Ok(registry)
    }

    /// Switch off the named rules. Applied at start-up only.
    pub fn with_disabled(mut self, keys: &[String]) -> Self {
        for rule in self.rules.iter_mut() {
            if keys.iter().any(|k| k == &rule.key) {
                rule.enabled = false;
            }
        }
        self
    }

    pub fn rules(&self) -> &[WorkflowRule] {
        &self.rules
    }

    pub fn get(&self, key: &str) -> Option<&WorkflowRule> {
        self.rules.iter().find(|r| r.key == key)
    }

    pub fn list_all(&self) -> Vec<RuleDescriptor> {
        self.rules.iter().map(WorkflowRule::descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
