//! Error types for Mentor Gate.

use std::time::Duration;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Onboarding error: {0}")]
    Onboarding(#[from] OnboardingError),

    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures while resolving the current session.
///
/// These never reach the render path; the session resolver settles to an
/// absent identity and keeps the message for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Session provider unavailable: {0}")]
    Unavailable(String),

    #[error("Session resolution timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Failures while loading canonical or role profiles.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile fetch failed for user {user_id}: {reason}")]
    FetchFailed { user_id: String, reason: String },

    #[error("Profile fetch for user {user_id} timed out after {timeout:?}")]
    Timeout { user_id: String, timeout: Duration },

    #[error("Profile write failed for user {user_id}: {reason}")]
    WriteFailed { user_id: String, reason: String },
}

/// Draft storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(#[from] DatabaseError),

    #[error("Draft for {key} is not a JSON object")]
    NotAnObject { key: String },

    #[error("Unknown draft key: {0}")]
    UnknownKey(String),
}

/// Onboarding mutation errors.
#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error("No role selected for user {user_id}")]
    RoleNotSelected { user_id: String },

    #[error("Role already selected for user {user_id}: {role}")]
    RoleAlreadySelected { user_id: String, role: String },

    #[error("Cannot submit step {step}: expected step {expected} of {total}")]
    InvalidStep { step: u32, expected: u32, total: u32 },

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
