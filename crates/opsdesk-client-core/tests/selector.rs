use std::sync::{Arc, LazyLock};

use futures::{pin_mut, poll};
use opsdesk_client_core::{selection_key, BusinessSelector, Notice, SelectionStore, SelectorPhase};
use opsdesk_shared::{
    business::{Business, BusinessDraft, BusinessKind},
    errors::BusinessCreateError,
    id::{BusinessId, UserId},
};
use opsdesk_test_helper::{business_named, FakeDirectory, MemorySelectionStore, TRACING};

fn setup() -> (Arc<FakeDirectory>, Arc<MemorySelectionStore>, BusinessSelector) {
    LazyLock::force(&TRACING);
    let directory = Arc::new(FakeDirectory::default());
    let store = Arc::new(MemorySelectionStore::default());
    let selector = BusinessSelector::new(directory.clone(), store.clone());
    (directory, store, selector)
}

fn draft_named(name: &str) -> BusinessDraft {
    BusinessDraft {
        name: name.try_into().unwrap(),
        kind: BusinessKind::Digital,
        address: None,
        currency: "USD".try_into().unwrap(),
    }
}

fn persisted_id(store: &MemorySelectionStore, user_id: UserId) -> Option<BusinessId> {
    store
        .get(&selection_key(user_id))
        .unwrap()
        .map(|raw| raw.parse().unwrap())
}

#[tokio::test]
async fn user_without_admin_record_sees_an_empty_list() {
    // Arrange
    let (_directory, _store, selector) = setup();
    let user_id = UserId::new_random();

    // Act
    selector.apply_session(Some(user_id)).await;

    // Assert - empty is a normal ready state, not a failure
    assert_eq!(
        selector.phase(),
        SelectorPhase::Ready {
            businesses: vec![],
            active: None
        }
    );
}

#[tokio::test]
async fn admin_without_grants_sees_an_empty_list() {
    // Arrange
    let (directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    directory.add_admin(user_id);

    // Act
    selector.apply_session(Some(user_id)).await;

    // Assert
    assert!(selector.phase().is_ready());
    assert!(selector.businesses().is_empty());
}

#[tokio::test]
async fn first_business_by_name_becomes_active_and_is_persisted() {
    // Arrange - granted out of name order on purpose
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let zeta = business_named("Zeta");
    directory.grant_all(user_id, &[zeta.clone(), acme.clone()]);

    // Act
    selector.apply_session(Some(user_id)).await;

    // Assert
    assert_eq!(selector.businesses(), vec![acme.clone(), zeta]);
    assert_eq!(selector.active_business(), Some(acme.clone()));
    assert_eq!(persisted_id(&store, user_id), Some(acme.id));
}

#[tokio::test]
async fn persisted_selection_is_restored() {
    // Arrange
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let zeta = business_named("Zeta");
    directory.grant_all(user_id, &[acme, zeta.clone()]);
    store
        .set(&selection_key(user_id), &zeta.id.to_string())
        .unwrap();

    // Act
    selector.apply_session(Some(user_id)).await;

    // Assert - not the first by name, the remembered one
    assert_eq!(selector.active_business(), Some(zeta));
}

#[tokio::test]
async fn selection_survives_sign_out_and_sign_in() {
    // Arrange
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let zeta = business_named("Zeta");
    directory.grant_all(user_id, &[acme, zeta.clone()]);
    selector.apply_session(Some(user_id)).await;
    selector.switch_business(zeta.id).unwrap();

    // Act - sign out then back in
    selector.apply_session(None).await;
    assert_eq!(selector.phase(), SelectorPhase::Idle);
    assert_eq!(selector.active_business(), None);
    selector.apply_session(Some(user_id)).await;

    // Assert
    assert_eq!(selector.active_business(), Some(zeta.clone()));
    assert_eq!(persisted_id(&store, user_id), Some(zeta.id));
}

#[tokio::test]
async fn stale_persisted_selection_falls_back_to_first_by_name() {
    // Arrange - persisted id points at a business the user can no longer see
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let zeta = business_named("Zeta");
    directory.grant_all(user_id, &[acme.clone(), zeta]);
    store
        .set(&selection_key(user_id), &BusinessId::new_random().to_string())
        .unwrap();

    // Act
    selector.apply_session(Some(user_id)).await;

    // Assert - silent fallback, storage corrected
    assert_eq!(selector.active_business(), Some(acme.clone()));
    assert_eq!(persisted_id(&store, user_id), Some(acme.id));
}

#[tokio::test]
async fn switch_updates_memory_storage_and_notifies() {
    // Arrange
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let zeta = business_named("Zeta");
    directory.grant_all(user_id, &[acme, zeta.clone()]);
    selector.apply_session(Some(user_id)).await;
    let mut notices = selector.subscribe_notices();

    // Act
    let switched = selector.switch_business(zeta.id);

    // Assert
    assert_eq!(switched, Some(zeta.clone()));
    assert_eq!(selector.active_business(), Some(zeta.clone()));
    assert_eq!(persisted_id(&store, user_id), Some(zeta.id));
    assert_eq!(
        notices.try_next().unwrap().unwrap(),
        Notice::Switched {
            name: zeta.name.clone()
        }
    );
}

#[tokio::test]
async fn switch_to_unknown_business_is_a_noop() {
    // Arrange
    let (directory, store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    directory.grant_all(user_id, &[acme.clone()]);
    selector.apply_session(Some(user_id)).await;
    let mut notices = selector.subscribe_notices();

    // Act
    let switched = selector.switch_business(BusinessId::new_random());

    // Assert - nothing moved, nobody was told anything
    assert_eq!(switched, None);
    assert_eq!(selector.active_business(), Some(acme.clone()));
    assert_eq!(persisted_id(&store, user_id), Some(acme.id));
    assert!(notices.try_next().is_err());
}

#[tokio::test]
async fn stale_fetch_result_is_discarded() {
    // Arrange - user A's fetch is held back while user B signs in
    let (directory, _store, selector) = setup();
    let user_a = UserId::new_random();
    let user_b = UserId::new_random();
    directory.grant_all(user_a, &[business_named("Alpha")]);
    let bravo = business_named("Bravo");
    directory.grant_all(user_b, &[bravo.clone()]);

    directory.hold_next_rows_query();
    let fetch_a = selector.apply_session(Some(user_a));
    pin_mut!(fetch_a);
    assert!(poll!(fetch_a.as_mut()).is_pending());

    // Act - the newer fetch completes first, then the stale one lands
    selector.apply_session(Some(user_b)).await;
    assert_eq!(selector.businesses(), vec![bravo.clone()]);
    directory.release_held();
    fetch_a.await;

    // Assert - the late answer for user A must not overwrite user B's list
    assert_eq!(selector.businesses(), vec![bravo]);
}

#[tokio::test]
async fn add_business_grants_and_refetches() {
    // Arrange
    let (directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    let admin = directory.grant_all(user_id, &[acme.clone()]);
    selector.apply_session(Some(user_id)).await;
    let mut notices = selector.subscribe_notices();

    // Act
    let created = selector.add_business(draft_named("NewCo")).await.unwrap();

    // Assert - the list came back from the directory, not a local splice
    assert_eq!(directory.rows_queries(), 2);
    assert_eq!(directory.inserted_grants(), vec![(admin.id, created.id)]);
    let names: Vec<String> = selector
        .businesses()
        .iter()
        .map(|b| b.name.to_string())
        .collect();
    assert_eq!(names, vec!["Acme", "NewCo"]);
    assert_eq!(
        notices.try_next().unwrap().unwrap(),
        Notice::Created {
            name: created.name.clone()
        }
    );
}

#[tokio::test]
async fn add_business_failure_leaves_the_list_untouched() {
    // Arrange
    let (directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    directory.grant_all(user_id, &[acme.clone()]);
    selector.apply_session(Some(user_id)).await;
    let before = selector.phase();
    directory.fail_next_business_insert("insert rejected");
    let mut notices = selector.subscribe_notices();

    // Act
    let actual = selector.add_business(draft_named("NewCo")).await;

    // Assert
    assert!(matches!(actual, Err(BusinessCreateError::Backend(_))));
    assert_eq!(selector.phase(), before);
    assert!(matches!(
        notices.try_next().unwrap().unwrap(),
        Notice::CreateFailed { .. }
    ));
    assert!(directory.inserted_grants().is_empty());
}

#[tokio::test]
async fn add_business_requires_an_admin_record() {
    // Arrange - signed in but no admin record exists for the user
    let (_directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    selector.apply_session(Some(user_id)).await;

    // Act
    let actual = selector.add_business(draft_named("NewCo")).await;

    // Assert
    assert_eq!(actual, Err(BusinessCreateError::NoAdminRecord));
}

#[tokio::test]
async fn add_business_requires_a_session() {
    // Arrange
    let (_directory, _store, selector) = setup();

    // Act
    let actual = selector.add_business(draft_named("NewCo")).await;

    // Assert
    assert_eq!(actual, Err(BusinessCreateError::NotSignedIn));
}

#[tokio::test]
async fn in_flight_fetch_cannot_clobber_a_post_create_list() {
    // Arrange - a refresh is held back, then a create finishes first
    let (directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    directory.grant_all(user_id, &[acme.clone()]);
    selector.apply_session(Some(user_id)).await;

    directory.hold_next_rows_query();
    let stale_refresh = selector.refresh();
    pin_mut!(stale_refresh);
    assert!(poll!(stale_refresh.as_mut()).is_pending());

    // Act
    selector.add_business(draft_named("NewCo")).await.unwrap();
    assert_eq!(selector.businesses().len(), 2);
    directory.release_held();
    stale_refresh.await;

    // Assert - the pre-create answer arrived late and was discarded
    let names: Vec<String> = selector
        .businesses()
        .iter()
        .map(|b| b.name.to_string())
        .collect();
    assert_eq!(names, vec!["Acme", "NewCo"]);
}

#[tokio::test]
async fn refresh_recovers_from_a_failed_load() {
    // Arrange
    let (directory, _store, selector) = setup();
    let user_id = UserId::new_random();
    let acme = business_named("Acme");
    directory.grant_all(user_id, &[acme.clone()]);
    directory.fail_next_admin_lookup("directory unavailable");
    selector.apply_session(Some(user_id)).await;
    assert!(selector.phase().is_failed());

    // Act
    selector.refresh().await;

    // Assert
    assert!(selector.phase().is_ready());
    assert_eq!(selector.active_business(), Some(acme));
}

#[tokio::test]
async fn refresh_while_signed_out_is_a_noop() {
    // Arrange
    let (_directory, _store, selector) = setup();

    // Act
    selector.refresh().await;

    // Assert
    assert_eq!(selector.phase(), SelectorPhase::Idle);
}
