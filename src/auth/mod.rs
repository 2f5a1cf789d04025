//! Authentication state: session and profile resolution merged into one
//! snapshot.
//!
//! The session resolver and the profile resolver run independently; the
//! aggregator recomputes the snapshot whenever either publishes. Gating
//! decisions only ever read the snapshot.

pub mod local;
pub mod model;
pub mod profile;
pub mod runtime;
pub mod session;
pub mod snapshot;

pub use local::LocalSessionProvider;
pub use model::{CanonicalProfile, Identity, RoleProfile, Session, UserId, UserType, VerificationStatus};
pub use profile::{ProfileResolver, ProfileState, ProfileStore};
pub use runtime::AuthRuntime;
pub use session::{SessionEvent, SessionProvider, SessionResolver, SessionState};
pub use snapshot::{AuthStateAggregator, AuthStateSnapshot, aggregate};
