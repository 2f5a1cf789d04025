//! Mentor Gate: auth state resolution, route gating and onboarding drafts.

pub mod app;
pub mod auth;
pub mod config;
pub mod drafts;
pub mod error;
pub mod gate;
pub mod onboarding;
pub mod store;
