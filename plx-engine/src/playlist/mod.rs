//! Playlist ordering: linked-list mutations, materialization and locking

pub mod linked_list;
pub mod locks;
pub mod materializer;

pub use linked_list::ItemTiming;
pub use locks::PlaylistLocks;
pub use materializer::{to_ordered_sequence, ChainReport};
