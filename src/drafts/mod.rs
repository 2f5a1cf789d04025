//! Draft persistence for onboarding and sign-up forms.

pub mod keys;
pub mod routes;
pub mod store;

pub use keys::DraftKey;
pub use routes::{DraftRouteState, draft_routes};
pub use store::{DEFAULT_EXCLUDED_FIELDS, DraftStorage, FormPersistenceStore};
