//! Execution context for workflow runs.
//!
//! This module provides:
//! - [`Value`], the closed set of value shapes a context can hold
//! - [`Handle`], an opaque reference to an external resource
//! - [`Context`], the ordered map threaded through every step

mod handle;
mod state;
mod value;

pub use handle::Handle;
pub use state::{Context, ERROR_KEY, STOP_KEY};
pub use value::Value;
