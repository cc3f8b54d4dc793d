use std::{fmt, str::FromStr};

use serde::Serialize;
use sqlx::SqlitePool;

use crate::{StoreError, db, events::{ClubEvent, EventBus}};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Pending,
    Approved,
    Rejected,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        use MembershipStatus::*;
        match self {
            Pending => "pending",
            Approved => "approved",
            Rejected => "rejected",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use MembershipStatus::*;
        match s {
            "pending" => Ok(Pending),
            "approved" => Ok(Approved),
            "rejected" => Ok(Rejected),
            other => Err(format!("unknown membership status {other:?}")),
        }
    }
}

impl fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Role::*;
        match s {
            "member" => Ok(Member),
            "moderator" => Ok(Moderator),
            "admin" => Ok(Admin),
            other => Err(format!("unknown membership role {other:?}")),
        }
    }
}

/// A user who currently counts as an approved member of a club.
///
/// The club's designated admin has no membership row; it resolves to
/// `implicit: true` with the admin role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef {
    pub principal: i64,
    pub role: Role,
    pub implicit: bool,
}

pub async fn resolve_member(db_pool: &SqlitePool, user_id: i64, club_id: i64) -> Result<Option<MemberRef>, StoreError> {
    let row: Option<(i64, Option<String>, Option<String>)> = sqlx::query_as(
        "SELECT c.admin_id,m.role,m.status FROM clubs c \
         LEFT JOIN memberships m ON m.club_id=c.id AND m.user_id=? \
         WHERE c.id=?",
    )
        .bind(user_id)
        .bind(club_id)
        .fetch_optional(db_pool)
        .await?;

    let Some((admin_id, role, status)) = row else {
        return Ok(None);
    };

    if admin_id == user_id {
        return Ok(Some(MemberRef { principal: user_id, role: Role::Admin, implicit: true }));
    }

    let (Some(role), Some(status)) = (role, status) else {
        return Ok(None);
    };
    let status = MembershipStatus::from_str(&status).map_err(StoreError::Rejected)?;
    if status != MembershipStatus::Approved {
        return Ok(None);
    }

    Ok(Some(MemberRef {
        principal: user_id,
        role: Role::from_str(&role).map_err(StoreError::Rejected)?,
        implicit: false,
    }))
}

/// Admin of the club, or holder of an approved membership. Reads the store on
/// every call; nothing is cached.
pub async fn authorize(db_pool: &SqlitePool, user_id: i64, club_id: i64) -> Result<bool, StoreError> {
    Ok(resolve_member(db_pool, user_id, club_id).await?.is_some())
}

pub async fn request_membership(db_pool: &SqlitePool, user_id: i64, club_id: i64) -> Result<i64, StoreError> {
    let (membership_id,): (i64,) = sqlx::query_as(
        "INSERT INTO memberships (user_id,club_id,role,status,applied_at) VALUES (?,?,'member','pending',?) RETURNING id",
    )
        .bind(user_id)
        .bind(club_id)
        .bind(db::now_millis())
        .fetch_one(db_pool)
        .await
        .map_err(|err| StoreError::from_insert(err, "membership"))?;

    tracing::info!(membership_id, user_id, club_id, "membership requested");
    Ok(membership_id)
}

pub async fn set_status(
    db_pool: &SqlitePool,
    bus: &EventBus,
    membership_id: i64,
    status: MembershipStatus,
) -> Result<(), StoreError> {
    let Some((user_id, club_id)): Option<(i64, i64)> =
        sqlx::query_as("UPDATE memberships SET status=? WHERE id=? RETURNING user_id,club_id")
            .bind(status.as_str())
            .bind(membership_id)
            .fetch_optional(db_pool)
            .await?
    else {
        return Err(StoreError::NotFound("membership"));
    };

    tracing::info!(membership_id, user_id, club_id, %status, "membership status changed");
    bus.emit(ClubEvent::MembershipChanged { membership_id, club_id, user_id, status });
    Ok(())
}

/// Everyone who may read the club's chat: approved members plus the admin.
pub async fn approved_members(db_pool: &SqlitePool, club_id: i64) -> Result<Vec<i64>, StoreError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT admin_id FROM clubs WHERE id=? \
         UNION \
         SELECT user_id FROM memberships WHERE club_id=? AND status='approved'",
    )
        .bind(club_id)
        .bind(club_id)
        .fetch_all(db_pool)
        .await?;

    Ok(rows.into_iter().map(|(user_id,)| user_id).collect())
}
