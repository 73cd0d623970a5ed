//! Runtime core: process state engines and the daemon controller.
//!
//! This module contains the embedded implementation of the chainvisor
//! runtime. The public API re-exported from here is [`Daemon`] plus the
//! statement model types; the engine itself is an internal building block.
//!
//! ## Files & responsibilities
//! - **daemon.rs**: top-level controller; global-init hooks, per-process
//!   load (failures skipped, abort only when none load), one actor per
//!   process in a JoinSet, signal handling, terminate edge, exit when the
//!   process set drains.
//! - **process.rs**: the per-process state machine: the AP/FP two-pointer
//!   scheme, `work`/`fight`/`advance`/`wait`/`retreat`, instance feedback
//!   handlers, the single retry deadline.
//! - **statement.rs**: statement templates (load-time module resolution,
//!   argument construction) and per-statement runtime state.
//! - **shutdown.rs**: OS termination-signal listeners.
//!
//! ## Wiring (module-level flow)
//! ```text
//! config::parse() ──► Document ──► Daemon::new(document, registry)
//!
//! Daemon::run()
//!   ├─ Module::global_init() per registered module
//!   ├─ ProcessEngine::load() per declared process
//!   ├─ spawn ProcessEngine::run(child_token) per process ──┐
//!   └─ select: signal → cancel token; JoinSet drained → Ok │
//!                                                          │
//! ProcessEngine::run()  (one actor per process) ◄──────────┘
//! loop {
//!   select:
//!     instance feedback (mpsc)  → apply transition → work()
//!     retry deadline            → clear error → advance()
//!     token cancelled           → terminating → work()
//! }
//!
//! work(): disarm timer; terminating ? retreat() : fight()
//! ```
//!
//! ## Rules
//! - Statements advance strictly in index order and retreat strictly in
//!   reverse index order; processes are independent of each other.
//! - The pointer invariants hold whenever an actor awaits; debug builds
//!   assert them at every `work` entry.
//! - The retry deadline is the only timer a process owns: only the statement
//!   at AP can ever be waiting.

mod daemon;
mod process;
mod shutdown;
mod statement;

#[cfg(test)]
mod tests;

use std::time::Duration;

pub use daemon::Daemon;
pub use statement::{Argument, StatementState, StatementTemplate};

/// How long a statement waits after a failed advance (or an erroring
/// termination) before it is retried.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(10);
