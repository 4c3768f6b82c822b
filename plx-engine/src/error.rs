//! Error types for plx-engine
//!
//! Structural and validation failures are typed variants returned to the
//! caller; the transaction that produced them has already been rolled back.
//! Integration fetch failures never appear here: they are reported on the
//! resolved item (see [`crate::resolve::IntegrationError`]).

use thiserror::Error;
use uuid::Uuid;

use crate::collaborators::ResourceType;

/// Linked-list corruption detected while walking or verifying a chain
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    /// Non-empty playlist with no item whose prev pointer is NULL
    #[error("no head item in a non-empty playlist")]
    MissingHead,

    #[error("{0} items claim to be the head")]
    MultipleHeads(usize),

    /// Walk visited more nodes than the playlist holds
    #[error("circular dependency detected")]
    CircularDependency,

    #[error("item {from} points at unknown item {to}")]
    DanglingPointer { from: String, to: String },

    /// Walk ended before reaching every item
    #[error("{unreachable} items unreachable from the head")]
    Orphans { unreachable: usize },

    #[error("link {from} -> {to} is not mirrored by the prev pointer")]
    InconsistentLink { from: String, to: String },

    #[error("item {0} has no widget config")]
    MissingConfig(String),
}

/// Main error type for plx-engine
#[derive(Error, Debug)]
pub enum Error {
    /// plx-common error (configuration, database initialization)
    #[error("Common error: {0}")]
    Common(#[from] plx_common::Error),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Playlist not found: {0}")]
    PlaylistNotFound(Uuid),

    /// Item missing, or not part of the playlist the operation named
    #[error("Playlist item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("Widget not found: {0}")]
    WidgetNotFound(String),

    /// Options rejected by the widget's options schema
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// Negative item duration
    #[error("Invalid timing: {0}")]
    InvalidTiming(String),

    /// Admitting the reference would make playlist rendering recurse forever
    #[error("Circular reference: playlist {selected} cannot be embedded in playlist {current}")]
    CircularReference { current: Uuid, selected: Uuid },

    #[error("Quota exceeded: {resource_type} for organization {organization_id}")]
    QuotaExceeded {
        organization_id: String,
        resource_type: ResourceType,
    },

    /// Playlist is still embedded by another playlist
    #[error("Playlist {0} is referenced by another playlist")]
    PlaylistInUse(Uuid),

    #[error("Integrity violation in playlist {playlist_id}: {kind}")]
    Integrity {
        playlist_id: Uuid,
        kind: IntegrityError,
    },

    #[error("Render depth {depth} exceeded at playlist {playlist_id}")]
    RenderDepthExceeded { playlist_id: Uuid, depth: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures caused by SQLite lock contention
    pub fn is_lock_contention(&self) -> bool {
        match self {
            Error::Database(db_err) => db_err.to_string().contains("database is locked"),
            Error::Common(plx_common::Error::Database(db_err)) => {
                db_err.to_string().contains("database is locked")
            }
            _ => false,
        }
    }
}

/// Convenience Result type using plx-engine Error
pub type Result<T> = std::result::Result<T, Error>;
