//! # Statement templates and per-statement runtime state.
//!
//! A [`StatementTemplate`] is the immutable description of one statement:
//! optional local name, the module resolved from the registry at load time,
//! and the argument list. [`ProcStatement`] is its runtime shell inside a
//! process: current [`StatementState`], error bookkeeping for the retry
//! timer, the instance generation counter, and, while instantiated, the
//! live module instance (which owns the materialized argument list).
//!
//! ## State machine (per statement)
//! ```text
//!              advance                  Up
//! FORGOTTEN ──────────────► CHILD ──────────► ADULT
//!     ▲                       │ ▲               │
//!     │                 Dying │ │ Down          │ Dying / kill
//!     │                  kill ▼ │               ▼
//!     └────────── Died ────── DYING ◄───────────┘
//! ```

use std::sync::Arc;

use tokio::time::Instant;

use crate::config::{ArgDecl, StatementDecl};
use crate::engine::RETRY_INTERVAL;
use crate::error::LoadError;
use crate::modules::{Module, ModuleInstance, ModuleRegistry};
use crate::value::Value;

/// One argument of a statement template.
#[derive(Debug, Clone)]
pub enum Argument {
    /// A literal value, deep-copied into the argument list at each advance.
    Literal(Value),
    /// A variable reference, resolved against an earlier live statement at
    /// each advance.
    VarRef {
        /// Local name of the referenced statement.
        target: String,
        /// Dotted variable path; `None` means the referent's primary value.
        path: Option<String>,
    },
}

impl std::fmt::Debug for StatementTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementTemplate")
            .field("name", &self.name)
            .field("module", &self.module.kind())
            .field("args", &self.args)
            .finish()
    }
}

/// The static description of one statement, built once at process load.
pub struct StatementTemplate {
    /// Optional local name; absent means the statement is unreferenceable.
    pub name: Option<String>,
    /// The module implementing this statement type (registry reference).
    pub module: Arc<dyn Module>,
    /// Arguments, in declaration order.
    pub args: Vec<Argument>,
}

impl StatementTemplate {
    /// Builds a template from a parsed statement node.
    ///
    /// Joins the module-type token sequence into a dotted name and resolves
    /// it against the registry; an unknown type fails the containing process
    /// load.
    pub fn load(
        process: &str,
        index: usize,
        decl: &StatementDecl,
        registry: &ModuleRegistry,
    ) -> Result<Self, LoadError> {
        let kind = decl.module.join(".");
        let module = registry.get(&kind).ok_or_else(|| LoadError::UnknownModule {
            process: process.to_string(),
            index,
            module: kind,
        })?;

        let args = decl
            .args
            .iter()
            .map(|arg| match arg {
                ArgDecl::Str(s) => Argument::Literal(Value::str(s.clone())),
                ArgDecl::Ref(parts) => Argument::VarRef {
                    target: parts[0].clone(),
                    path: (parts.len() > 1).then(|| parts[1..].join(".")),
                },
            })
            .collect();

        Ok(Self {
            name: decl.name.clone(),
            module,
            args,
        })
    }
}

/// Lifecycle state of one process-statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// No live instance; the initial and terminal-per-cycle state.
    Forgotten,
    /// Instance created, not yet reported up.
    Child,
    /// Instance reported up and has not gone down since.
    Adult,
    /// Instance asked to terminate; awaiting its died report.
    Dying,
}

/// Runtime shell of one statement within a process.
pub(crate) struct ProcStatement {
    /// Position within the process (stable address for feedback).
    pub(crate) index: usize,
    /// The immutable template.
    pub(crate) template: StatementTemplate,
    /// Current lifecycle state.
    pub(crate) state: StatementState,
    /// Whether the last cycle ended in error (gates the retry wait).
    pub(crate) have_error: bool,
    /// Retry deadline, set together with `have_error`.
    pub(crate) error_until: Option<Instant>,
    /// Instance generation; feedback with an older epoch is stale.
    pub(crate) epoch: u64,
    /// The live instance, present from advance until the died report. Owns
    /// the materialized argument list.
    pub(crate) instance: Option<Box<dyn ModuleInstance>>,
}

impl ProcStatement {
    pub(crate) fn new(index: usize, template: StatementTemplate) -> Self {
        Self {
            index,
            template,
            state: StatementState::Forgotten,
            have_error: false,
            error_until: None,
            epoch: 0,
            instance: None,
        }
    }

    /// Records an advance or termination error and starts the retry window.
    pub(crate) fn set_error(&mut self, now: Instant) {
        debug_assert_eq!(self.state, StatementState::Forgotten);
        self.have_error = true;
        self.error_until = Some(now + RETRY_INTERVAL);
    }
}
