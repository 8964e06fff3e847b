//! End to end wiring: session manager events drive the business selector the
//! same way an app boot would

use std::sync::{Arc, LazyLock};

use futures::{pin_mut, poll};
use opsdesk_client_core::{drive_selector, BusinessSelector, SelectorPhase, SessionManager};
use opsdesk_shared::{id::UserId, session::SessionChange};
use opsdesk_test_helper::{
    business_named, session_for, FakeDirectory, FakeIdentity, MemorySelectionStore, TRACING,
};

#[tokio::test]
async fn boot_resolves_session_and_loads_businesses() {
    // Arrange
    LazyLock::force(&TRACING);
    let identity = Arc::new(FakeIdentity::default());
    let directory = Arc::new(FakeDirectory::default());
    let store = Arc::new(MemorySelectionStore::default());
    let user_id = UserId::new_random();
    identity.set_resolved_session(Some(session_for(user_id)));
    let acme = business_named("Acme");
    directory.grant_all(user_id, &[acme.clone()]);

    let manager = SessionManager::new(identity.clone());
    let selector = BusinessSelector::new(directory, store);
    let driver = drive_selector(manager.subscribe(), selector.clone());
    pin_mut!(driver);

    // Act - boot
    manager.resolve().await;
    assert!(poll!(driver.as_mut()).is_pending());

    // Assert
    assert!(manager.is_authenticated());
    assert_eq!(selector.active_business(), Some(acme));

    // Act - sign out notification flows all the way through
    manager.sign_out().await.unwrap();
    identity.emit(SessionChange::SignedOut);
    manager.pump_changes();
    assert!(poll!(driver.as_mut()).is_pending());

    // Assert
    assert!(!manager.is_authenticated());
    assert_eq!(selector.phase(), SelectorPhase::Idle);
}
