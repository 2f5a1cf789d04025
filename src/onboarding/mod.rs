//! Onboarding: role selection and the per-role step flow.
//!
//! Each role walks a fixed number of steps. Submitting a step updates the
//! role profile (authoritative for gating) and mirrors the result onto the
//! canonical profile.

pub mod progress;
pub mod routes;
pub mod service;

pub use progress::{OnboardingProgress, StepOutcome};
pub use routes::{OnboardingRouteState, onboarding_routes};
pub use service::OnboardingService;
