//! Client-side state containers for the opsdesk dashboard: the session
//! manager (who is signed in) and the business selector (which businesses the
//! user may access and which one is active). Screens read from these and do
//! their own tenant-scoped fetches.
//!
//! NB: The assumption is made that the async runtime has already been started
//! before any functions from this library are called

#![warn(unused_crate_dependencies)]

mod config;
mod driver;
pub mod rest;
mod selector;
mod services;
mod session;
mod storage;

pub use config::{get_configuration, RestConfig};
pub use driver::drive_selector;
pub use rest::{RestBackend, UiCallBack};
pub use selector::{BusinessSelector, Notice, SelectorPhase};
pub use services::{selection_key, BusinessDirectory, IdentityService, SelectionStore};
pub use session::{Session, SessionEvent, SessionManager};
pub use storage::FileSelectionStore;
