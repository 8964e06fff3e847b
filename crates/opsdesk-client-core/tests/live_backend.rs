//! IMPORTANT!!!
//! These tests talk to a real hosted backend and are ignored by default.
//! Only intended for local testing. Provide the connection settings via
//! `opsdesk.toml` in the crate folder (or `OPSDESK_*` env vars) plus the
//! credentials of an existing test user:
//! - `LIVE_TEST_EMAIL`
//! - `LIVE_TEST_PASSWORD`
//!
//! Then run `cargo test -- --ignored` from the folder
//! "crates/opsdesk-client-core".

use std::sync::Arc;

use opsdesk_client_core::{get_configuration, RestBackend, SessionManager};
use opsdesk_shared::req_args::SignInArgs;

fn live_args() -> SignInArgs {
    let email = std::env::var("LIVE_TEST_EMAIL").expect("LIVE_TEST_EMAIL must be set");
    let password = std::env::var("LIVE_TEST_PASSWORD").expect("LIVE_TEST_PASSWORD must be set");
    SignInArgs::new(email, password.into())
}

#[tokio::test]
#[ignore = "needs a reachable backend and test user credentials, see module docs"]
async fn sign_in_sign_out_round_trip() {
    // Arrange
    let config = get_configuration().expect("failed to load configuration");
    let backend = Arc::new(RestBackend::from_config(config));
    let manager = SessionManager::new(backend.clone());
    manager.resolve().await;

    // Assert - Ensure not signed in (no refresh token was configured)
    assert!(
        !manager.is_authenticated(),
        "should not be signed in before signing in"
    );

    // Act - Sign in
    manager
        .sign_in(live_args())
        .await
        .expect("IMPORTANT!!! sign in failed, check the backend and credentials");
    manager.pump_changes();

    // Assert
    assert!(manager.is_authenticated());

    // Act - Sign out
    manager.sign_out().await.expect("sign out request failed");
    manager.pump_changes();

    // Assert
    assert!(!manager.is_authenticated());
}
