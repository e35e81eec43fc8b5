//! Side effects shared by mutating handlers: audit entries and notifications

use serde_json::Value;
use tpm_common::PracticeEvent;
use tracing::{debug, error};
use uuid::Uuid;

use crate::db::audit as audit_log;
use crate::db::notifications::{self, NewNotification, Notification};
use crate::{ApiResult, AppState};

/// Record a mutation in the audit log
///
/// Called after the mutation has been committed, so a failed insert is
/// logged rather than turned into an error response for a change that stuck.
pub async fn audit(
    state: &AppState,
    practice_id: Uuid,
    actor: &str,
    action: &str,
    entity_type: &str,
    entity_id: Uuid,
    details: Value,
) {
    match audit_log::record(&state.db, practice_id, actor, action, entity_type, entity_id, details)
        .await
    {
        Ok(()) => debug!(%practice_id, actor, action, entity_type, %entity_id, "Audited"),
        Err(e) => error!(
            %practice_id,
            actor,
            action,
            entity_type,
            %entity_id,
            "Failed to record audit entry: {}",
            e
        ),
    }
}

/// Store a notification and publish it to live subscribers
pub async fn notify(
    state: &AppState,
    practice_id: Uuid,
    new: NewNotification,
) -> ApiResult<Notification> {
    let notification = notifications::create_notification(&state.db, practice_id, new).await?;
    state.event_bus.emit_lossy(PracticeEvent::NotificationCreated {
        practice_id,
        notification_id: notification.id,
        recipient_id: notification.recipient_id,
        message: notification.message.clone(),
    });
    Ok(notification)
}
