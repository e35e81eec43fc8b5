//! Event types and EventBus
//!
//! Events are broadcast in-process and forwarded to SSE subscribers of the
//! practice they belong to.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Practice-scoped event
///
/// Every variant carries the owning practice so subscribers can filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PracticeEvent {
    /// A notification was created
    NotificationCreated {
        practice_id: Uuid,
        notification_id: Uuid,
        /// Addressed staff member; `None` means practice-wide
        recipient_id: Option<Uuid>,
        message: String,
    },

    /// A session note draft was saved
    SessionNoteSaved {
        practice_id: Uuid,
        note_id: Uuid,
        version: i64,
    },

    /// A session note was finalized and locked
    SessionNoteFinalized {
        practice_id: Uuid,
        note_id: Uuid,
    },

    /// Responses were saved on an assessment assignment
    AssessmentProgress {
        practice_id: Uuid,
        assignment_id: Uuid,
        answered: i64,
        total: i64,
    },

    /// An assessment assignment was completed
    AssessmentCompleted {
        practice_id: Uuid,
        assignment_id: Uuid,
        client_id: Uuid,
        score: Option<i64>,
    },
}

impl PracticeEvent {
    /// Practice this event belongs to
    pub fn practice_id(&self) -> Uuid {
        match self {
            PracticeEvent::NotificationCreated { practice_id, .. }
            | PracticeEvent::SessionNoteSaved { practice_id, .. }
            | PracticeEvent::SessionNoteFinalized { practice_id, .. }
            | PracticeEvent::AssessmentProgress { practice_id, .. }
            | PracticeEvent::AssessmentCompleted { practice_id, .. } => *practice_id,
        }
    }

    /// Whether a subscriber of `practice_id`, acting as `staff_id`, may see this event
    ///
    /// Notifications addressed to a staff member reach only that member.
    pub fn is_visible_to(&self, practice_id: Uuid, staff_id: Option<Uuid>) -> bool {
        if self.practice_id() != practice_id {
            return false;
        }
        match self {
            PracticeEvent::NotificationCreated {
                recipient_id: Some(recipient),
                ..
            } => staff_id == Some(*recipient),
            _ => true,
        }
    }

    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            PracticeEvent::NotificationCreated { .. } => "NotificationCreated",
            PracticeEvent::SessionNoteSaved { .. } => "SessionNoteSaved",
            PracticeEvent::SessionNoteFinalized { .. } => "SessionNoteFinalized",
            PracticeEvent::AssessmentProgress { .. } => "AssessmentProgress",
            PracticeEvent::AssessmentCompleted { .. } => "AssessmentCompleted",
        }
    }
}

/// Broadcast channel for [`PracticeEvent`]s
///
/// Cheap to clone; all clones share one channel. When a subscriber lags
/// behind by more than `capacity` events the oldest are dropped for it.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PracticeEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use tpm_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PracticeEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PracticeEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let practice_id = Uuid::new_v4();
        let note_id = Uuid::new_v4();

        bus.emit_lossy(PracticeEvent::SessionNoteFinalized { practice_id, note_id });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.practice_id(), practice_id);
        assert_eq!(event.event_type(), "SessionNoteFinalized");
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit_lossy(PracticeEvent::SessionNoteSaved {
            practice_id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
            version: 2,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_addressed_notification_visible_to_recipient_only() {
        let practice_id = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let addressed = PracticeEvent::NotificationCreated {
            practice_id,
            notification_id: Uuid::new_v4(),
            recipient_id: Some(recipient),
            message: "Task assigned".to_string(),
        };

        assert!(addressed.is_visible_to(practice_id, Some(recipient)));
        assert!(!addressed.is_visible_to(practice_id, Some(Uuid::new_v4())));
        assert!(!addressed.is_visible_to(practice_id, None));
        assert!(!addressed.is_visible_to(Uuid::new_v4(), Some(recipient)));

        let practice_wide = PracticeEvent::NotificationCreated {
            practice_id,
            notification_id: Uuid::new_v4(),
            recipient_id: None,
            message: "Assessment completed".to_string(),
        };
        assert!(practice_wide.is_visible_to(practice_id, None));
        assert!(practice_wide.is_visible_to(practice_id, Some(recipient)));
    }

    #[test]
    fn test_other_practice_events_hidden() {
        let event = PracticeEvent::SessionNoteFinalized {
            practice_id: Uuid::new_v4(),
            note_id: Uuid::new_v4(),
        };
        assert!(event.is_visible_to(event.practice_id(), None));
        assert!(!event.is_visible_to(Uuid::new_v4(), None));
    }

    #[test]
    fn test_serialized_with_type_tag() {
        let event = PracticeEvent::AssessmentProgress {
            practice_id: Uuid::nil(),
            assignment_id: Uuid::nil(),
            answered: 3,
            total: 10,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "AssessmentProgress");
        assert_eq!(json["answered"], 3);
    }
}
