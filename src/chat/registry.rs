//! Room group membership and fan-out.

use std::{collections::HashMap, sync::Arc};

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::frame::{Outbound, SessionId};
use crate::ChatError;

/// Live sessions per room group.
///
/// Each group is one map entry, so joins, leaves and broadcasts on a group
/// serialize on that entry's shard lock while other rooms proceed. Only weak
/// handles to the sessions' outbound queues are held; a session that went
/// away without leaving is skipped and never kept alive.
#[derive(Default)]
pub struct RoomRegistry {
    groups: DashMap<String, HashMap<SessionId, mpsc::WeakSender<Arc<str>>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, group: &str, session_id: SessionId, outbound: &mpsc::Sender<Arc<str>>) {
        let _ = self.groups
            .entry(group.to_owned())
            .or_default()
            .insert(session_id, outbound.downgrade());
        debug!(group, %session_id, "joined room group");
    }

    /// Leaving a group the session is not in is a no-op.
    pub fn leave(&self, group: &str, session_id: SessionId) -> bool {
        let mut removed = false;
        let _ = self.groups.remove_if_mut(group, |_, members| {
            removed = members.remove(&session_id).is_some();
            members.is_empty()
        });
        if removed {
            debug!(group, %session_id, "left room group");
        }
        removed
    }

    /// Delivers `frame` to every session in the group and returns how many
    /// queues accepted it. A full or closed queue is skipped; it never delays
    /// the remaining recipients.
    pub fn broadcast(&self, group: &str, frame: &Outbound) -> Result<usize, ChatError> {
        let json: Arc<str> = serde_json::to_string(frame)
            .map_err(|err| ChatError::Transport(format!("could not encode frame: {err}")))?
            .into();

        let Some(members) = self.groups.get(group) else {
            return Ok(0);
        };

        let mut delivered = 0;
        for (session_id, outbound) in members.iter() {
            let Some(outbound) = outbound.upgrade() else {
                debug!(group, %session_id, "skipping departed session");
                continue;
            };
            match outbound.try_send(Arc::clone(&json)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => warn!(group, %session_id, "outbound queue full, dropping frame"),
                Err(TrySendError::Closed(_)) => debug!(group, %session_id, "outbound queue closed"),
            }
        }
        debug!(group, recipients = members.len(), delivered, "broadcast frame");
        Ok(delivered)
    }

    pub fn contains(&self, group: &str, session_id: SessionId) -> bool {
        self.groups.get(group).is_some_and(|members| members.contains_key(&session_id))
    }

    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |members| members.len())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(origin: SessionId) -> Outbound {
        Outbound::Typing { typing: true, username: "ann".into(), origin }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_member() {
        let registry = RoomRegistry::new();
        let (a, b) = (SessionId::new(), SessionId::new());
        let (tx_a, mut rx_a) = mpsc::channel(4);
        let (tx_b, mut rx_b) = mpsc::channel(4);
        registry.join("chat_club_1", a, &tx_a);
        registry.join("chat_club_1", b, &tx_b);

        assert_eq!(registry.broadcast("chat_club_1", &typing(a)).unwrap(), 2);
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let registry = RoomRegistry::new();
        let (tx, mut rx) = mpsc::channel(4);
        registry.join("chat_club_1", SessionId::new(), &tx);

        assert_eq!(registry.broadcast("chat_club_2", &typing(SessionId::new())).unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn leave_is_idempotent_and_prunes_groups() {
        let registry = RoomRegistry::new();
        let session_id = SessionId::new();
        let (tx, _rx) = mpsc::channel(4);
        registry.join("chat_club_1", session_id, &tx);

        assert!(registry.leave("chat_club_1", session_id));
        assert!(!registry.leave("chat_club_1", session_id));
        assert!(!registry.leave("chat_club_9", session_id));
        assert_eq!(registry.group_count(), 0);
    }

    #[tokio::test]
    async fn full_queue_does_not_block_others() {
        let registry = RoomRegistry::new();
        let (slow_tx, _slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        registry.join("chat_club_1", SessionId::new(), &slow_tx);
        registry.join("chat_club_1", SessionId::new(), &fast_tx);

        let origin = SessionId::new();
        assert_eq!(registry.broadcast("chat_club_1", &typing(origin)).unwrap(), 2);
        assert_eq!(registry.broadcast("chat_club_1", &typing(origin)).unwrap(), 1);
        assert!(fast_rx.try_recv().is_ok());
        assert!(fast_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn dropped_sessions_are_skipped() {
        let registry = RoomRegistry::new();
        let (tx, rx) = mpsc::channel::<Arc<str>>(4);
        registry.join("chat_club_1", SessionId::new(), &tx);
        drop(tx);
        drop(rx);

        assert_eq!(registry.broadcast("chat_club_1", &typing(SessionId::new())).unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_churn_leaves_no_groups_behind() {
        let registry = Arc::new(RoomRegistry::new());

        let tasks: Vec<_> = (0..32)
            .map(|task| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    let (tx, mut rx) = mpsc::channel(16);
                    for cycle in 0..200 {
                        let group = format!("chat_club_{}", (task + cycle) % 4);
                        let id = SessionId::new();
                        registry.join(&group, id, &tx);
                        assert!(registry.contains(&group, id));
                        registry.broadcast(&group, &typing(id)).unwrap();
                        assert!(registry.leave(&group, id));
                        assert!(!registry.contains(&group, id));
                        while rx.try_recv().is_ok() {}
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.group_count(), 0);
        for group in 0..4 {
            assert_eq!(registry.member_count(&format!("chat_club_{group}")), 0);
        }
    }
}
