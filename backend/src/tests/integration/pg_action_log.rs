// Integration tests for the Postgres-backed action log
//
// These need a migrated database. Run with:
// TEST_DATABASE_URL=postgresql://... cargo test -- --ignored

use chrono::Duration;
use serde_json::json;
use solarops_shared::ActionType;
use sqlx::PgPool;
use uuid::Uuid;

use crate::tests::fixtures::{base_time, days_after};
use crate::workflows::action_log::{ActionLogFilter, ActionLogStore, NewActionLog};
use crate::workflows::PgActionLogStore;

async fn test_pool() -> PgPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let pool = PgPool::connect(&url).await.expect("Failed to connect to test database");
    crate::database::migrate(&pool).await.expect("Failed to run migrations");
    pool
}

#[cfg(test)]
mod pg_action_log_tests {
    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_append_and_latest_after_is_strict() {
        let store = PgActionLogStore::new(test_pool().await);
        let job_id = Uuid::new_v4();

        let row = store
            .append(NewActionLog {
                job_id,
                rule_key: "permit_stalled".to_string(),
                action_type: ActionType::ExternalTask,
                created_at: base_time(),
                metadata: json!({ "days_in_permitting": 15 }),
            })
            .await
            .unwrap();
        assert_eq!(row.action_type, ActionType::ExternalTask);

        let inside = store
            .latest_after(job_id, "permit_stalled", base_time() - Duration::days(1))
            .await
            .unwrap();
        assert_eq!(inside.map(|r| r.id), Some(row.id));

        let boundary = store.latest_after(job_id, "permit_stalled", base_time()).await.unwrap();
        assert!(boundary.is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_recent_orders_newest_first() {
        let store = PgActionLogStore::new(test_pool().await);
        let job_id = Uuid::new_v4();

        for day in 0..3 {
            store
                .append(NewActionLog {
                    job_id,
                    rule_key: "qc_failure_rework".to_string(),
                    action_type: ActionType::ExternalTask,
                    created_at: days_after(day),
                    metadata: json!({}),
                })
                .await
                .unwrap();
        }

        let filter = ActionLogFilter {
            job_id: Some(job_id),
            rule_key: None,
            limit: Some(2),
        };
        let rows = store.recent(&filter).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].created_at, days_after(2));
        assert_eq!(rows[1].created_at, days_after(1));
    }
}
