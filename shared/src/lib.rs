use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Owning department of a workflow rule. Classification only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Department {
    Sales,
    Production,
    Admin,
    Safety,
    Warranty,
    Finance,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "SALES",
            Self::Production => "PRODUCTION",
            Self::Admin => "ADMIN",
            Self::Safety => "SAFETY",
            Self::Warranty => "WARRANTY",
            Self::Finance => "FINANCE",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of external effect a firing took. Informational, used for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    ExternalTask,
    ExternalNote,
    CustomerEmail,
    CustomerSms,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExternalTask => "EXTERNAL_TASK",
            Self::ExternalNote => "EXTERNAL_NOTE",
            Self::CustomerEmail => "CUSTOMER_EMAIL",
            Self::CustomerSms => "CUSTOMER_SMS",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action type: {0}")]
pub struct UnknownActionType(pub String);

impl FromStr for ActionType {
    type Err = UnknownActionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXTERNAL_TASK" => Ok(Self::ExternalTask),
            "EXTERNAL_NOTE" => Ok(Self::ExternalNote),
            "CUSTOMER_EMAIL" => Ok(Self::CustomerEmail),
            "CUSTOMER_SMS" => Ok(Self::CustomerSms),
            other => Err(UnknownActionType(other.to_string())),
        }
    }
}

/// Introspection view of a registered rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub key: String,
    pub name: String,
    pub description: String,
    pub department: Department,
    pub enabled: bool,
    pub cooldown_days: i64,
}

/// One row per rule firing. Never updated once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowActionLog {
    pub id: Uuid,
    pub job_id: Uuid,
    pub rule_key: String,
    pub action_type: ActionType,
    pub created_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunJobResponse {
    pub job_id: Uuid,
    pub actions: Vec<WorkflowActionLog>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunAllRequest {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAllResponse {
    pub processed: usize,
    pub actions: usize,
    pub failed: usize,
}
