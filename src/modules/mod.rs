//! # Module capability set, instance feedback, and the registry.
//!
//! A *module* implements one statement type. The engine depends only on the
//! capability set defined here:
//!
//! - [`Module`] — type name, optional one-shot global init, instance init.
//! - [`ModuleInstance`] — a live realization for one statement: can be asked
//!   to terminate ([`die`](ModuleInstance::die)) and to resolve variable
//!   paths ([`get_var`](ModuleInstance::get_var)).
//!
//! ## Feedback plane
//!
//! Instances report state changes through an [`InstanceHandle`] instead of raw
//! callbacks. The handle carries a stable `(statement index, epoch)` pair and
//! an mpsc sender into the owning process actor:
//!
//! ```text
//! Module::init(ctx)                      engine actor loop
//!   └─ ctx.handle ── Up/Down/Dying ────► handle_event()
//!                 └─ Died{is_error} ───► handle_died()
//! ```
//!
//! ## Rules
//! - A handle may be used from `init` itself (synchronous `Up`) or from any
//!   helper task the instance spawns; delivery is always a queued message, so
//!   the engine never re-enters itself.
//! - After the instance reports `Died`, the engine destroys it; messages sent
//!   on an outdated handle carry a stale epoch and are discarded.
//! - Every instance must eventually answer `die` with `Died`.
//!
//! ## Built-in modules
//! [`ModuleRegistry::builtin`] registers `var`, `list`, `sleep`, and `exec`.

mod exec;
mod list;
mod sleep;
mod var;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::ModuleError;
use crate::value::Value;

/// A state change reported by a live module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementEvent {
    /// The instance is up; dependent statements may advance.
    Up,
    /// The instance went down but intends to come back up.
    Down,
    /// The instance has started terminating on its own.
    Dying,
}

/// Message payload carried from an instance to its process actor.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Feedback {
    /// An `Up`/`Down`/`Dying` state change.
    Event(StatementEvent),
    /// The instance has finished terminating.
    Died {
        /// Whether termination reported an error (triggers retry bookkeeping).
        is_error: bool,
    },
}

/// An addressed feedback message: which statement, which instance generation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FeedbackMsg {
    pub(crate) index: usize,
    pub(crate) epoch: u64,
    pub(crate) feedback: Feedback,
}

/// Handle through which a module instance reports state changes.
///
/// Cloneable; safe to move into helper tasks. All methods are non-blocking
/// (the channel is unbounded) and silently drop the message once the owning
/// process has gone away.
#[derive(Clone)]
pub struct InstanceHandle {
    index: usize,
    epoch: u64,
    tx: mpsc::UnboundedSender<FeedbackMsg>,
}

impl InstanceHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<FeedbackMsg>, index: usize, epoch: u64) -> Self {
        Self { index, epoch, tx }
    }

    /// Reports a state change.
    pub fn event(&self, event: StatementEvent) {
        self.send(Feedback::Event(event));
    }

    /// Reports that the instance is up.
    pub fn up(&self) {
        self.event(StatementEvent::Up);
    }

    /// Reports that the instance went down.
    pub fn down(&self) {
        self.event(StatementEvent::Down);
    }

    /// Reports that the instance has started terminating on its own.
    pub fn dying(&self) {
        self.event(StatementEvent::Dying);
    }

    /// Reports that the instance has finished terminating.
    ///
    /// This must be the last message an instance sends. `is_error` marks the
    /// statement for retry bookkeeping.
    pub fn died(&self, is_error: bool) {
        self.send(Feedback::Died { is_error });
    }

    fn send(&self, feedback: Feedback) {
        let _ = self.tx.send(FeedbackMsg {
            index: self.index,
            epoch: self.epoch,
            feedback,
        });
    }
}

/// Everything a module needs to create an instance.
pub struct InstanceCtx {
    /// The statement's local name, if declared.
    pub name: Option<String>,
    /// The materialized argument list (always a [`Value::List`]). Owned by the
    /// instance for its whole lifetime.
    pub args: Value,
    /// Log prefix of the form `process <pname>: statement <i>: module: `.
    pub log_prefix: String,
    /// Feedback handle bound to this instance generation.
    pub handle: InstanceHandle,
}

/// A statement type implementation.
pub trait Module: Send + Sync + 'static {
    /// The dotted type name statements use to select this module.
    fn kind(&self) -> &str;

    /// One-shot hook invoked at daemon start. Failure aborts startup.
    fn global_init(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Creates a live instance for one statement.
    ///
    /// The instance owns `ctx.args`. It may report `Up` synchronously through
    /// `ctx.handle` before returning, or later from a helper task. Returning
    /// an error is an advance failure; the engine retries the statement after
    /// [`RETRY_INTERVAL`](crate::engine::RETRY_INTERVAL).
    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError>;
}

/// A live module instance bound to one statement.
pub trait ModuleInstance: Send + 'static {
    /// Requests termination. The instance must eventually report
    /// [`died`](InstanceHandle::died), possibly from within this call.
    fn die(&mut self);

    /// Resolves a variable path to a value. The empty path refers to the
    /// instance's primary value.
    fn get_var(&self, path: &str) -> Result<Value, ModuleError>;
}

/// Table mapping dotted module-type names to implementations.
///
/// Built once at startup; lookup is the only operation afterwards.
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn Module>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in modules (`var`, `list`, `sleep`,
    /// `exec`) registered.
    pub fn builtin() -> Self {
        let mut reg = Self::new();
        reg.register(Arc::new(var::VarModule));
        reg.register(Arc::new(list::ListModule));
        reg.register(Arc::new(sleep::SleepModule));
        reg.register(Arc::new(exec::ExecModule));
        reg
    }

    /// Registers a module under its type name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register(&mut self, module: Arc<dyn Module>) -> &mut Self {
        self.modules.insert(module.kind().to_string(), module);
        self
    }

    /// Looks up a module by its dotted type name.
    pub fn get(&self, kind: &str) -> Option<Arc<dyn Module>> {
        self.modules.get(kind).cloned()
    }

    /// Iterates over the registered modules (for global-init hooks).
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Module>> {
        self.modules.values()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
