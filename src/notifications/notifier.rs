use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::{sync::broadcast::{self, error::RecvError}, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{StoreError, clubs::membership::{self, MembershipStatus}, events::ClubEvent};

/// Turns bus events into in-app notifications, off the chat path.
#[derive(Clone)]
pub struct Notifier {
    db_pool: SqlitePool,
}

impl Notifier {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub fn spawn(self, mut events: broadcast::Receiver<Arc<ClubEvent>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(err) = self.dispatch(&event).await {
                            warn!(?event, error = %err, "notification dispatch failed");
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "notifier lagged behind the event bus"),
                    Err(RecvError::Closed) => break,
                }
            }
            info!("notifier stopped");
        })
    }

    /// Returns the number of notifications written.
    pub async fn dispatch(&self, event: &ClubEvent) -> Result<usize, StoreError> {
        match *event {
            ClubEvent::MessagePosted { club_id, sender_id, .. } => {
                let Some(club) = self.club_name(club_id).await? else {
                    return Ok(0);
                };
                let content = format!("New message in {club}");
                let recipients = membership::approved_members(&self.db_pool, club_id).await?;

                // All recipients or none.
                let mut tx = self.db_pool.begin().await?;
                let mut written = 0;
                for user_id in recipients {
                    if user_id == sender_id {
                        continue;
                    }
                    super::insert(&mut *tx, user_id, &content).await?;
                    written += 1;
                }
                tx.commit().await?;
                debug!(club_id, written, "message notifications written");
                Ok(written)
            }
            ClubEvent::MembershipChanged { club_id, user_id, status, .. } => {
                if status == MembershipStatus::Pending {
                    return Ok(0);
                }
                let Some(club) = self.club_name(club_id).await? else {
                    return Ok(0);
                };
                super::insert(&self.db_pool, user_id, &format!("Your membership request for {club} was {status}")).await?;
                Ok(1)
            }
        }
    }

    async fn club_name(&self, club_id: i64) -> Result<Option<String>, StoreError> {
        let name: Option<(String,)> = sqlx::query_as("SELECT name FROM clubs WHERE id=?")
            .bind(club_id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(name.map(|(name,)| name))
    }
}
