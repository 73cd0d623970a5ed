//! # Daemon: owns the process set and drives shutdown.
//!
//! The [`Daemon`] is the top of the runtime:
//!
//! - Runs every registered module's one-shot global-init hook (failure aborts
//!   startup).
//! - Loads each declared process into a [`ProcessEngine`]; a process that
//!   fails to load is logged at error and skipped, and startup aborts only
//!   when none load.
//! - Spawns one engine actor per process into a [`JoinSet`] and waits.
//! - On the first termination signal, publishes
//!   [`ShutdownRequested`](EventKind::ShutdownRequested) and cancels the
//!   runtime token; every engine retreats in reverse statement order.
//!   Repeated signals are logged and ignored.
//! - Returns once the last process has finished retreating.
//!
//! ```text
//! Daemon::run()
//!   ├─ global-init hooks
//!   ├─ ProcessEngine::load() per declaration
//!   ├─ spawn engine actors ── child tokens of runtime_token
//!   └─ loop select:
//!        signal   → publish ShutdownRequested, runtime_token.cancel()
//!        join_next → None (set drained) → return
//! ```

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Document;
use crate::engine::process::ProcessEngine;
use crate::engine::shutdown::Signals;
use crate::error::{LoadError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::modules::ModuleRegistry;

/// The daemon controller: a loaded configuration document, a module
/// registry, and the event bus shared with every process engine.
pub struct Daemon {
    document: Document,
    registry: ModuleRegistry,
    bus: Bus,
}

impl Daemon {
    /// Creates a daemon from a parsed document and a module registry.
    pub fn new(document: Document, registry: ModuleRegistry) -> Self {
        Self {
            document,
            registry,
            bus: Bus::default(),
        }
    }

    /// Subscribes to the runtime event stream.
    ///
    /// Subscribe before calling [`run`](Daemon::run) to observe events from
    /// the very first advance.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Runs the daemon until every process has retreated after a termination
    /// signal.
    ///
    /// Fatal startup failures (global-init hook, signal installation, no
    /// process loaded) return an error; per-process load failures do not.
    pub async fn run(self) -> Result<(), RuntimeError> {
        for module in self.registry.iter() {
            module
                .global_init()
                .map_err(|source| RuntimeError::GlobalInit {
                    module: module.kind().to_string(),
                    source,
                })?;
        }

        let mut signals = Signals::new()?;

        let mut engines = Vec::new();
        for decl in &self.document.processes {
            match ProcessEngine::load(decl, &self.registry, self.bus.clone()) {
                Ok(engine) => engines.push(engine),
                Err(e) => error!(
                    target: "chainvisor::daemon",
                    "failed to load process {}: {}", decl.name, e
                ),
            }
        }
        if engines.is_empty() {
            return Err(RuntimeError::Load(LoadError::NoProcesses));
        }

        let runtime_token = CancellationToken::new();
        let mut set = JoinSet::new();
        for engine in engines {
            set.spawn(engine.run(runtime_token.child_token()));
        }

        info!(target: "chainvisor::daemon", "entering event loop");

        let mut terminating = false;
        loop {
            tokio::select! {
                name = signals.recv() => {
                    info!(target: "chainvisor::daemon", "termination requested ({name})");
                    if !terminating {
                        terminating = true;
                        self.bus.publish(Event::now(EventKind::ShutdownRequested));
                        runtime_token.cancel();
                    }
                }
                next = set.join_next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }

        info!(target: "chainvisor::daemon", "all processes retreated");
        Ok(())
    }
}
