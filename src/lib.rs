//! # chainvisor
//!
//! **Chainvisor** is a declarative statement-chain supervision runtime.
//!
//! A configuration document declares independent *processes*; each process is
//! an ordered chain of *statements* (module invocations). The runtime brings
//! every chain up in order, keeps it up, reacts to module state changes
//! (tearing dependents down when an upstream statement goes down), and
//! retreats in reverse order on termination.
//!
//! ## Features
//!
//! | Area           | Description                                                    | Key types / traits                        |
//! |----------------|----------------------------------------------------------------|-------------------------------------------|
//! | **Engine**     | Per-process state machine with ordered teardown and retries.   | [`Daemon`]                                |
//! | **Modules**    | Pluggable statement types with lifecycle feedback.             | [`Module`], [`ModuleInstance`], [`ModuleRegistry`] |
//! | **Values**     | Argument lists and resolved variables.                         | [`Value`], [`Argument`]                   |
//! | **Config**     | Declarative document model and parser.                         | [`config::Document`], [`config::parse`]   |
//! | **Events**     | Broadcast stream of engine transitions.                        | [`Event`], [`EventKind`], [`Bus`]         |
//! | **Errors**     | Typed errors per failure domain.                               | [`LoadError`], [`ModuleError`], [`RuntimeError`] |
//!
//! ```no_run
//! use chainvisor::{config, Daemon, ModuleRegistry};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let document = config::parse(
//!         r#"
//!         process demo {
//!             var("hello") greeting;
//!             list(greeting, "world") words;
//!             sleep("250");
//!         }
//!         "#,
//!     )?;
//!
//!     // Built-in modules; register your own with `ModuleRegistry::register`.
//!     let registry = ModuleRegistry::builtin();
//!
//!     let daemon = Daemon::new(document, registry);
//!     let _events = daemon.subscribe();
//!
//!     // Runs until a termination signal, then retreats every chain.
//!     daemon.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod engine;
mod error;
mod events;
mod value;

pub mod config;
pub mod logging;
pub mod modules;

// ---- Public re-exports ----

pub use engine::{Argument, Daemon, StatementState, StatementTemplate, RETRY_INTERVAL};
pub use error::{AdvanceError, LoadError, ModuleError, RuntimeError};
pub use events::{Bus, Event, EventKind, DEFAULT_BUS_CAPACITY};
pub use modules::{
    InstanceCtx, InstanceHandle, Module, ModuleInstance, ModuleRegistry, StatementEvent,
};
pub use value::Value;
