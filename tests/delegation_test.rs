//! Delegation session manager tests.

use std::collections::HashSet;
use std::time::Duration;

use node_orchestrator::delegation::{DelegationConfig, DelegationError, DelegationManager, SessionId};
use tokio_test::assert_ok;

const TOKEN: &str = "delegation-secret";

fn manager(max_sessions: usize) -> DelegationManager {
    DelegationManager::new(DelegationConfig {
        auth_token: TOKEN.to_string(),
        max_sessions,
        session_lifetime: Duration::from_secs(3600),
    })
}

#[tokio::test]
async fn test_capacity_then_revoke_frees_slot() {
    let manager = manager(2);

    let first = manager.create_session(TOKEN, "alice").await.unwrap();
    let _second = manager.create_session(TOKEN, "bob").await.unwrap();
    assert_eq!(
        manager.create_session(TOKEN, "carol").await,
        Err(DelegationError::CapacityExceeded { max: 2 })
    );

    manager.revoke(&first).await.unwrap();
    assert_ok!(manager.create_session(TOKEN, "carol").await);
    assert_eq!(manager.active_count().await, 2);
}

#[tokio::test]
async fn test_wrong_token_creates_nothing() {
    let manager = manager(2);
    assert_eq!(
        manager.create_session("not-the-token", "mallory").await,
        Err(DelegationError::Unauthorized)
    );
    assert_eq!(
        manager.create_session("", "mallory").await,
        Err(DelegationError::Unauthorized)
    );
    assert_eq!(manager.active_count().await, 0);
    assert!(manager.list().await.is_empty());
}

#[tokio::test]
async fn test_validate_known_and_unknown() {
    let manager = manager(2);
    let id = manager.create_session(TOKEN, "alice").await.unwrap();

    assert_ok!(manager.validate(&id).await);
    assert_eq!(
        manager.validate(&SessionId::from("deadbeef")).await,
        Err(DelegationError::SessionNotFound)
    );
}

#[tokio::test]
async fn test_revoke_is_idempotent() {
    let manager = manager(1);
    let id = manager.create_session(TOKEN, "alice").await.unwrap();

    manager.revoke(&id).await.unwrap();
    manager.revoke(&id).await.unwrap();
    assert_eq!(manager.validate(&id).await, Err(DelegationError::SessionNotFound));
}

#[tokio::test]
async fn test_stop_purges_everything_and_is_safe_when_empty() {
    let manager = manager(3);
    assert_eq!(manager.stop().await, 0);

    let id = manager.create_session(TOKEN, "alice").await.unwrap();
    manager.create_session(TOKEN, "bob").await.unwrap();
    assert_eq!(manager.stop().await, 2);
    assert_eq!(manager.active_count().await, 0);
    assert_eq!(manager.validate(&id).await, Err(DelegationError::SessionNotFound));
}

#[tokio::test]
async fn test_session_ids_are_unique() {
    let manager = manager(64);
    let mut seen = HashSet::new();
    for i in 0..64 {
        let id = manager.create_session(TOKEN, &format!("caller-{i}")).await.unwrap();
        assert_eq!(id.as_str().len(), 64);
        assert!(seen.insert(id));
    }
}

#[tokio::test]
async fn test_list_hides_full_ids() {
    let manager = manager(2);
    let id = manager.create_session(TOKEN, "alice").await.unwrap();

    let sessions = manager.list().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id_prefix, id.prefix());
    assert_eq!(sessions[0].requested_by, "alice");
    assert!(sessions[0].expires_at > sessions[0].created_at);

    let json = serde_json::to_string(&sessions).unwrap();
    assert!(!json.contains(id.as_str()));
}

#[tokio::test]
async fn test_cleanup_drops_expired_sessions() {
    let manager = DelegationManager::new(DelegationConfig {
        auth_token: TOKEN.to_string(),
        max_sessions: 4,
        session_lifetime: Duration::from_millis(20),
    });
    manager.create_session(TOKEN, "alice").await.unwrap();
    manager.create_session(TOKEN, "bob").await.unwrap();

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(manager.active_count().await, 0);
    assert_eq!(manager.cleanup().await, 2);
    assert_eq!(manager.cleanup().await, 0);
}

#[tokio::test]
async fn test_zero_max_sessions_refuses_every_session() {
    let manager = manager(0);
    assert_eq!(manager.max_sessions(), 0);
    assert!(manager.is_enabled());
    assert_eq!(
        manager.create_session(TOKEN, "alice").await,
        Err(DelegationError::CapacityExceeded { max: 0 })
    );
    assert_eq!(manager.active_count().await, 0);
}
