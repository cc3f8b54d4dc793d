mod common;

use clubchat::{
    StoreError,
    clubs::membership::{self, MemberRef, MembershipStatus, Role},
    events::ClubEvent,
};
use common::Club;

#[tokio::test]
async fn admin_is_an_implicit_member() {
    let club = Club::new().await;

    let member = membership::resolve_member(&club.app.db_pool, club.admin.user_id, club.club_id).await.unwrap();
    assert_eq!(member, Some(MemberRef { principal: club.admin.user_id, role: Role::Admin, implicit: true }));
    assert!(membership::authorize(&club.app.db_pool, club.admin.user_id, club.club_id).await.unwrap());
}

#[tokio::test]
async fn only_approved_rows_authorize() {
    let club = Club::new().await;
    let (approved, _) = club.member("approved", MembershipStatus::Approved).await;
    let (pending, _) = club.member("pending", MembershipStatus::Pending).await;
    let (rejected, _) = club.member("rejected", MembershipStatus::Rejected).await;
    let stranger = club.outsider("stranger").await;

    let member = membership::resolve_member(&club.app.db_pool, approved.user_id, club.club_id).await.unwrap();
    assert_eq!(member, Some(MemberRef { principal: approved.user_id, role: Role::Member, implicit: false }));

    for user in [pending, rejected, stranger] {
        assert!(!membership::authorize(&club.app.db_pool, user.user_id, club.club_id).await.unwrap(), "{}", user.username);
    }
}

#[tokio::test]
async fn unknown_club_authorizes_nobody() {
    let club = Club::new().await;
    assert!(!membership::authorize(&club.app.db_pool, club.admin.user_id, club.club_id + 1).await.unwrap());
}

#[tokio::test]
async fn one_membership_per_user_and_club() {
    let club = Club::new().await;
    let (alice, _) = club.member("alice", MembershipStatus::Pending).await;

    let again = membership::request_membership(&club.app.db_pool, alice.user_id, club.club_id).await;
    assert!(matches!(again, Err(StoreError::AlreadyExists("membership"))));
}

#[tokio::test]
async fn status_changes_take_effect_immediately_and_are_announced() {
    let club = Club::new().await;
    let (alice, membership_id) = club.member("alice", MembershipStatus::Pending).await;
    let mut events = club.app.bus.subscribe();

    membership::set_status(&club.app.db_pool, &club.app.bus, membership_id, MembershipStatus::Approved).await.unwrap();
    assert!(membership::authorize(&club.app.db_pool, alice.user_id, club.club_id).await.unwrap());

    membership::set_status(&club.app.db_pool, &club.app.bus, membership_id, MembershipStatus::Rejected).await.unwrap();
    assert!(!membership::authorize(&club.app.db_pool, alice.user_id, club.club_id).await.unwrap());

    let first = events.try_recv().unwrap();
    assert_eq!(*first, ClubEvent::MembershipChanged {
        membership_id,
        club_id: club.club_id,
        user_id: alice.user_id,
        status: MembershipStatus::Approved,
    });
    assert!(matches!(*events.try_recv().unwrap(), ClubEvent::MembershipChanged { status: MembershipStatus::Rejected, .. }));
}

#[tokio::test]
async fn unknown_membership_cannot_change_status() {
    let club = Club::new().await;
    let result = membership::set_status(&club.app.db_pool, &club.app.bus, 404, MembershipStatus::Approved).await;
    assert!(matches!(result, Err(StoreError::NotFound("membership"))));
}

#[tokio::test]
async fn approved_members_include_admin() {
    let club = Club::new().await;
    let (alice, _) = club.member("alice", MembershipStatus::Approved).await;
    club.member("bob", MembershipStatus::Pending).await;

    let mut members = membership::approved_members(&club.app.db_pool, club.club_id).await.unwrap();
    members.sort();
    assert_eq!(members, vec![club.admin.user_id, alice.user_id]);
}

#[tokio::test]
async fn users_store_identity_only() {
    let club = Club::new().await;

    let columns: Vec<(String,)> = sqlx::query_as("SELECT name FROM pragma_table_info('users') ORDER BY cid")
        .fetch_all(&club.app.db_pool)
        .await
        .unwrap();
    assert_eq!(columns, [("id".to_owned(),), ("username".to_owned(),)]);

    let loaded = clubchat::session::Principal::load(&club.app.db_pool, club.admin.user_id).await.unwrap();
    assert_eq!(loaded, Some(club.admin.clone()));
}
