// src/watch/mod.rs

//! File watching and change detection.
//!
//! This module is responsible for:
//! - Compiling `sources` / `watch` / `exclude` glob patterns per task.
//! - Wiring up a cross-platform filesystem watcher (`notify`).
//! - Debouncing changes per binding and running incremental rebuilds, with
//!   content hashing to skip saves that did not change anything.
//!
//! It does **not** know about the task graph; bindings carry their own
//! rebuild action.

pub mod controller;
pub mod hash;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use controller::{BindingAction, BindingState, WatchBinding, WatchController};
pub use hash::{compute_file_hash, ContentHashes};
pub use patterns::{collect_matching_files, PathMatcher};
pub use watcher::{spawn_watcher, WatcherHandle};
