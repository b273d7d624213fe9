//! Routing of transport events to per-task delegates.
//!
//! # Overview
//!
//! - [`Dispatcher`] owns the task registry and runs as a single loop.
//! - [`TaskDelegate`] accumulates a task's body and progress and produces
//!   its final result.
//! - [`placement`] moves finished downloads to their destination.

mod delegate;
pub mod placement;
mod registry;

pub use delegate::{Completion, Progress, ProgressHook, TaskDelegate};
pub use registry::{Dispatcher, DispatcherHandle};
