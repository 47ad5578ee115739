// Effect Dispatcher - Issues external tasks, notes and customer messages for firing rules

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{SmsConfig, TaskProviderConfig};
use crate::services::email::{customer_update_template, EmailService};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("Request to {service} failed: {message}")]
    Transport { service: &'static str, message: String },
    #[error("{service} rejected the request with status {status}: {body}")]
    Rejected { service: &'static str, status: u16, body: String },
    #[error("Customer for job {job_id} has no {field} on file")]
    MissingContact { job_id: Uuid, field: &'static str },
    #[error("Customer message delivery failed: {0}")]
    Delivery(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Message shown in the customer portal and optionally mirrored by email/SMS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerMessage {
    pub message_type: String,
    pub channel: String,
    pub title: String,
    pub body: String,
    pub send_email: bool,
    pub send_sms: bool,
}

/// Boundary for every external side effect a rule can take.
///
/// Implementations report failures through the returned error; the caller logs
/// and discards them so a firing is recorded on attempt, not on confirmed delivery.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExternalEffectDispatcher: Send + Sync {
    async fn create_external_task(
        &self,
        target_id: &str,
        title: &str,
        description: &str,
        due_in_days: u32,
    ) -> DispatchResult<()>;

    async fn create_external_note(&self, target_id: &str, text: &str) -> DispatchResult<()>;

    async fn send_customer_message(&self, job_id: Uuid, message: &CustomerMessage) -> DispatchResult<()>;
}

/// Client for the project-management API that owns crew tasks and job notes
#[derive(Debug, Clone)]
pub struct TaskProviderClient {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

impl TaskProviderClient {
    pub fn new(config: &TaskProviderConfig) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Transport {
                service: "task provider",
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    pub async fn create_task(
        &self,
        target_id: &str,
        title: &str,
        description: &str,
        due_date: NaiveDate,
    ) -> DispatchResult<()> {
        let payload = serde_json::json!({
            "project_id": target_id,
            "title": title,
            "description": description,
            "due_date": due_date.to_string(),
        });
        self.post("/tasks", &payload).await
    }

    pub async fn create_note(&self, target_id: &str, text: &str) -> DispatchResult<()> {
        let payload = serde_json::json!({
            "project_id": target_id,
            "body": text,
        });
        self.post("/notes", &payload).await
    }

    async fn post(&self, path: &str, payload: &serde_json::Value) -> DispatchResult<()> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                service: "task provider",
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::Rejected {
                service: "task provider",
                status,
                body,
            })
        }
    }
}

/// Twilio-compatible SMS sender
#[derive(Debug, Clone)]
pub struct SmsClient {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsClient {
    pub fn new(config: SmsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn send_sms(&self, to: &str, body: &str) -> DispatchResult<()> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_sid
        );

        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[("To", to), ("From", self.config.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| DispatchError::Transport {
                service: "sms provider",
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(DispatchError::Rejected {
                service: "sms provider",
                status,
                body,
            })
        }
    }
}

#[derive(Debug, FromRow)]
struct CustomerContact {
    customer_id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
}

/// Production dispatcher. Clients are built once from config and reused.
#[derive(Clone)]
pub struct ProviderDispatcher {
    db_pool: PgPool,
    tasks: Option<TaskProviderClient>,
    email: Option<EmailService>,
    sms: Option<SmsClient>,
}

impl ProviderDispatcher {
    pub fn new(
        db_pool: PgPool,
        tasks: Option<TaskProviderClient>,
        email: Option<EmailService>,
        sms: Option<SmsClient>,
    ) -> Self {
        Self {
            db_pool,
            tasks,
            email,
            sms,
        }
    }

    fn tasks(&self) -> DispatchResult<&TaskProviderClient> {
        self.tasks.as_ref().ok_or(DispatchError::NotConfigured("task provider"))
    }

    async fn customer_contact(&self, job_id: Uuid) -> DispatchResult<CustomerContact> {
        let contact = sqlx::query_as::<_, CustomerContact>(
            r#"
            SELECT c.id AS customer_id, c.full_name, c.email, c.phone
            FROM jobs j
            JOIN customers c ON c.id = j.customer_id
            WHERE j.id = $1
            "#,
        )
        .bind(job_id)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(contact)
    }

    async fn record_portal_notification(
        &self,
        job_id: Uuid,
        customer_id: Uuid,
        message: &CustomerMessage,
    ) -> DispatchResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customer_notifications
            (id, job_id, customer_id, notification_type, channel, title, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_id)
        .bind(customer_id)
        .bind(&message.message_type)
        .bind(&message.channel)
        .bind(&message.title)
        .bind(&message.body)
        .execute(&self.db_pool)
        .await?;

        Ok(())
    }

    async fn deliver_email(
        &self,
        job_id: Uuid,
        contact: &CustomerContact,
        message: &CustomerMessage,
    ) -> DispatchResult<()> {
        let email = self.email.as_ref().ok_or(DispatchError::NotConfigured("smtp"))?;
        let address = contact
            .email
            .as_deref()
            .ok_or(DispatchError::MissingContact { job_id, field: "email" })?;

        let template = customer_update_template(&contact.full_name, &message.title, &message.body);
        email
            .send_email(
                address,
                Some(&contact.full_name),
                &template.subject,
                &template.html_body,
                template.text_body.as_deref(),
            )
            .await
            .map_err(|e| DispatchError::Delivery(e.to_string()))
    }

    async fn deliver_sms(
        &self,
        job_id: Uuid,
        contact: &CustomerContact,
        message: &CustomerMessage,
    ) -> DispatchResult<()> {
        let sms = self.sms.as_ref().ok_or(DispatchError::NotConfigured("sms provider"))?;
        let phone = contact
            .phone
            .as_deref()
            .ok_or(DispatchError::MissingContact { job_id, field: "phone" })?;

        sms.send_sms(phone, &format!("{}: {}", message.title, message.body)).await
    }
}

pub(crate) fn due_date_in(days: u32) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(i64::from(days))
}

#[async_trait]
impl ExternalEffectDispatcher for ProviderDispatcher {
    async fn create_external_task(
        &self,
        target_id: &str,
        title: &str,
        description: &str,
        due_in_days: u32,
    ) -> DispatchResult<()> {
        self.tasks()?
            .create_task(target_id, title, description, due_date_in(due_in_days))
            .await?;
        info!("Created external task '{}' on project {}", title, target_id);
        Ok(())
    }

    async fn create_external_note(&self, target_id: &str, text: &str) -> DispatchResult<()> {
        self.tasks()?.create_note(target_id, text).await?;
        info!("Added external note on project {}", target_id);
        Ok(())
    }

    async fn send_customer_message(&self, job_id: Uuid, message: &CustomerMessage) -> DispatchResult<()> {
        let contact = self.customer_contact(job_id).await?;
        self.record_portal_notification(job_id, contact.customer_id, message).await?;

        // Email and SMS are attempted independently of each other
        let mut failures = Vec::new();
        if message.send_email {
            if let Err(e) = self.deliver_email(job_id, &contact, message).await {
                warn!("Email for job {} failed: {}", job_id, e);
                failures.push(e.to_string());
            }
        }
        if message.send_sms {
            if let Err(e) = self.deliver_sms(job_id, &contact, message).await {
                warn!("SMS for job {} failed: {}", job_id, e);
                failures.push(e.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Delivery(failures.join("; ")))
        }
    }
}
