//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the daemon and the process engines.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] — classification and payload metadata
//! - [`Bus`] — thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: [`Daemon`](crate::Daemon) (shutdown), each process
//!   engine (statement lifecycle, victory, retreat).
//! - **Consumers**: embedders and tests via
//!   [`Daemon::subscribe`](crate::Daemon::subscribe).

mod bus;
mod event;

pub use bus::{Bus, DEFAULT_BUS_CAPACITY};
pub use event::{Event, EventKind};
