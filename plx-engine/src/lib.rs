//! plx-engine: playlist composition and integrity engine
//!
//! Keeps each playlist's items as a doubly linked list of rows, refuses
//! playlist references that would make rendering recurse, and resolves
//! items into render-ready records. [`PlaylistEngine`] is the entry point.

pub mod collaborators;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod playlist;
pub mod resolve;
pub mod schema;
pub mod utils;

pub use engine::{NewItem, PlaylistEngine};
pub use error::{Error, IntegrityError, Result};
pub use playlist::ChainReport;
pub use resolve::{ResolvedConfig, ResolvedItem};
