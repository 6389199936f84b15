// src/exec/mod.rs

//! Action execution layer.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `RealExecutorBackend` that the runtime uses in production, and which
//!   tests can replace with a fake implementation.
//! - [`task_runner`] runs a single task action and reports its completion
//!   back to the runtime as a `RuntimeEvent`.

pub mod backend;
pub mod task_runner;

pub use backend::{ExecutorBackend, RealExecutorBackend};
