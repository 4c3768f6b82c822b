//! Database access layer
//!
//! Row-level queries for playlists, items, widget configs, reference edges
//! and settings. Mutating functions take a `&mut SqliteConnection` so the
//! caller decides the transaction boundary.

pub mod items;
pub mod playlists;
pub mod references;
pub mod settings;
pub mod widget_configs;
