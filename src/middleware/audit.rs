use sqlx::PgPool;
use uuid::Uuid;

/// Log an audit event. Called explicitly in handlers after mutations and
/// logins; a failure is logged and never fails the request.
pub async fn log_event(
    pool: &PgPool,
    owner_id: Uuid,
    actor_id: Option<Uuid>,
    action: &str,
    resource_type: &str,
    resource_id: Option<Uuid>,
    details: Option<serde_json::Value>,
) {
    if let Err(e) = crate::db::audit::log_event(
        pool,
        owner_id,
        actor_id,
        action,
        resource_type,
        resource_id,
        details,
    )
    .await
    {
        tracing::error!("Failed to log audit event: {e}");
    }
}
