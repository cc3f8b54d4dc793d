//! In-process event bus.
//!
//! Stores emit onto the bus right after a successful write. Delivery is a
//! non-blocking `broadcast` send; with no subscriber, or a lagging one, the
//! event is simply dropped and the writer never notices.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::clubs::membership::MembershipStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClubEvent {
    MessagePosted {
        message_id: String,
        club_id: i64,
        sender_id: i64,
    },
    MembershipChanged {
        membership_id: i64,
        club_id: i64,
        user_id: i64,
        status: MembershipStatus,
    },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<ClubEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: ClubEvent) {
        // Err only means nobody is listening.
        if self.tx.send(Arc::new(event)).is_err() {
            tracing::trace!("event dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ClubEvent>> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(ClubEvent::MessagePosted { message_id: "m".into(), club_id: 1, sender_id: 1 });
    }

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(4);
        let mut rx = bus.subscribe();
        let event = ClubEvent::MembershipChanged {
            membership_id: 3,
            club_id: 1,
            user_id: 2,
            status: MembershipStatus::Approved,
        };
        bus.emit(event.clone());
        assert_eq!(*rx.recv().await.unwrap(), event);
    }
}
