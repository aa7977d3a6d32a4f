mod common;

use std::time::Duration;

use tokio::sync::broadcast::Receiver;
use tokio::time::timeout;
use tokio_test::assert_ok;

use common::{spawn_sim, SIM_PASSWORD};
use pawnshop_admin::errors::AdminError;
use pawnshop_admin::session::{
    ActivityEvent, ActivityKind, ActivityOutcome, SessionNotice, TimerState, SESSION_KEY,
};
use pawnshop_admin::storage::SessionStorage;

async fn next_matching(
    rx: &mut Receiver<SessionNotice>,
    wanted: impl Fn(&SessionNotice) -> bool,
) -> SessionNotice {
    timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(notice) if wanted(&notice) => return notice,
                Ok(_) => continue,
                Err(e) => panic!("notice channel failed: {e}"),
            }
        }
    })
    .await
    .expect("timed out waiting for notice")
}

#[tokio::test]
async fn login_starts_timer_and_persists_session() {
    let server = spawn_sim().await;
    let config = server.config();
    let ctx = server.context_with(&config);
    let mut notices = ctx.subscribe();

    let user = assert_ok!(ctx.login("manager", SIM_PASSWORD).await);
    assert!(ctx.is_authenticated());
    assert_eq!(ctx.current_user(), Some(user.clone()));
    assert_eq!(ctx.timer().state(), TimerState::Active);
    assert_eq!(notices.recv().await.unwrap(), SessionNotice::LoggedIn(user));

    let storage = SessionStorage::new(config.session.resolve_storage_dir());
    assert!(storage.load(SESSION_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn restore_resumes_a_stored_session() {
    let server = spawn_sim().await;
    let config = server.config();

    let first = server.context_with(&config);
    first.login("clerk", SIM_PASSWORD).await.unwrap();

    let second = server.context_with(&config);
    assert!(!second.is_authenticated());
    let restored = second.restore().await.unwrap().expect("session restored");
    assert_eq!(restored.username, "clerk");
    assert!(second.is_authenticated());
    assert_eq!(second.timer().state(), TimerState::Active);
    assert_ok!(second.customers().get(1).await);
}

#[tokio::test]
async fn restore_with_nothing_stored_is_none() {
    let server = spawn_sim().await;
    let ctx = server.context();
    assert_eq!(ctx.restore().await.unwrap(), None);
    assert_eq!(ctx.timer().state(), TimerState::Idle);
}

#[tokio::test]
async fn restore_drops_a_rejected_session() {
    let server = spawn_sim().await;
    let config = server.config();

    let clerk = server.context_with(&config);
    clerk.login("clerk", SIM_PASSWORD).await.unwrap();

    // An admin disables the account behind the stored token.
    let admin = server.signed_in("admin").await;
    admin.users().set_active(3, false).await.unwrap();

    let resumed = server.context_with(&config);
    assert_eq!(resumed.restore().await.unwrap(), None);

    let storage = SessionStorage::new(config.session.resolve_storage_dir());
    assert_eq!(storage.load(SESSION_KEY).await.unwrap(), None);
}

#[tokio::test]
async fn restore_trusts_stored_user_when_offline() {
    let server = spawn_sim().await;
    let mut config = server.config();

    let ctx = server.context_with(&config);
    ctx.login("manager", SIM_PASSWORD).await.unwrap();

    // Nothing listens on port 9 of localhost.
    config.api.base_url = "http://127.0.0.1:9".to_string();
    let offline = server.context_with(&config);
    let user = offline.restore().await.unwrap().expect("stored user");
    assert_eq!(user.username, "manager");
}

#[tokio::test]
async fn logout_clears_everything() {
    let server = spawn_sim().await;
    let config = server.config();
    let ctx = server.context_with(&config);
    ctx.login("manager", SIM_PASSWORD).await.unwrap();
    ctx.inventory_fetcher().load(false).await.unwrap();
    let mut notices = ctx.subscribe();

    assert_ok!(ctx.logout().await);
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.current_user(), None);
    assert_eq!(ctx.timer().state(), TimerState::Idle);
    assert_eq!(notices.recv().await.unwrap(), SessionNotice::LoggedOut);

    let storage = SessionStorage::new(config.session.resolve_storage_dir());
    assert_eq!(storage.load(SESSION_KEY).await.unwrap(), None);
    assert_eq!(storage.child("reports").load("inventory_report").await.unwrap(), None);

    let again = server.context_with(&config);
    assert_eq!(again.restore().await.unwrap(), None);
}

#[tokio::test]
async fn unauthorized_response_ends_the_session() {
    let server = spawn_sim().await;
    let ctx = server.signed_in("clerk").await;
    let mut notices = ctx.subscribe();

    // Revoke the token on the server only; the client still holds it.
    ctx.auth().logout().await.unwrap();
    assert!(ctx.api().has_token());

    let err = ctx.customers().get(1).await.unwrap_err();
    let err = ctx.check_error(err).await;
    assert!(matches!(err, AdminError::Unauthorized(_)));
    assert!(!ctx.is_authenticated());
    assert_eq!(notices.recv().await.unwrap(), SessionNotice::Rejected);
}

#[tokio::test]
async fn other_errors_keep_the_session() {
    let server = spawn_sim().await;
    let ctx = server.signed_in("clerk").await;

    let err = ctx.reports().inventory().await.unwrap_err();
    let err = ctx.check_error(err).await;
    assert!(matches!(err, AdminError::Forbidden(_)));
    assert!(ctx.is_authenticated());
}

#[tokio::test]
async fn idle_session_warns_then_times_out() {
    let server = spawn_sim().await;
    let mut config = server.config();
    config.session.timeout_secs = 2;
    config.session.warning_secs = 1;
    let storage_dir = config.session.resolve_storage_dir();

    let ctx = server.context_with(&config);
    let mut notices = ctx.subscribe();
    ctx.login("clerk", SIM_PASSWORD).await.unwrap();

    // Pointer movement during the warning does not save the session.
    let warning = next_matching(&mut notices, |n| {
        matches!(n, SessionNotice::WarningShown { .. })
    })
    .await;
    assert!(matches!(warning, SessionNotice::WarningShown { remaining } if remaining <= Duration::from_secs(1)));
    let outcome = ctx.record_activity(ActivityEvent::trusted(ActivityKind::PointerMove));
    assert!(matches!(outcome, ActivityOutcome::Ignored(_)));

    next_matching(&mut notices, |n| *n == SessionNotice::TimedOut).await;
    assert!(!ctx.is_authenticated());
    assert_eq!(ctx.timer().state(), TimerState::Expired);

    // Storage is wiped in the background.
    let storage = SessionStorage::new(storage_dir);
    let wiped = timeout(Duration::from_secs(2), async {
        while storage.load(SESSION_KEY).await.unwrap().is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(wiped.is_ok(), "session file still present after timeout");
}

#[tokio::test]
async fn extending_the_warning_keeps_the_session() {
    let server = spawn_sim().await;
    let mut config = server.config();
    config.session.timeout_secs = 2;
    config.session.warning_secs = 1;

    let ctx = server.context_with(&config);
    let mut notices = ctx.subscribe();
    ctx.login("clerk", SIM_PASSWORD).await.unwrap();

    next_matching(&mut notices, |n| matches!(n, SessionNotice::WarningShown { .. })).await;
    assert_ok!(ctx.extend_session());
    assert_eq!(ctx.timer().state(), TimerState::Active);
    next_matching(&mut notices, |n| *n == SessionNotice::Extended).await;
    assert!(ctx.is_authenticated());

    // Extending outside the warning is refused.
    let err = ctx.extend_session().unwrap_err();
    assert!(matches!(err, AdminError::InvalidTransition { .. }));
}
