//! The pool scheduler: single authority over workers and the task queue.
//!
//! Split into focused submodules:
//! - `core`: `Pool` handle, construction with warm-up, stats and accessors
//! - `dispatch`: submission, the assignment pass and completion routing
//! - `lifecycle`: cancellation, worker replacement and pool termination
//!
//! Every state transition happens under one mutex. Futures are settled, and
//! therefore user continuations run, only after that mutex is released.

mod core;
mod dispatch;
mod lifecycle;

pub use self::core::Pool;
