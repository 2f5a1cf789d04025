//! Route gating: requirements, the ordered decision and its REST surface.

pub mod decision;
pub mod requirement;
pub mod routes;

pub use decision::{GateDecision, GateRule, Navigation, Redirect, RedirectReason, evaluate};
pub use requirement::{RequirementError, RouteRequirement, RouteTable};
pub use routes::{GateRouteState, gate_routes};
