//! # Error types used by the chainvisor runtime and modules.
//!
//! Four enums, one per failure domain:
//!
//! - [`LoadError`] — configuration parsing and process/statement template load.
//! - [`AdvanceError`] — argument materialization and instance-init failures
//!   during a statement advance; always recovered locally via the retry timer.
//! - [`ModuleError`] — the module boundary: instance init, variable
//!   resolution, argument validation.
//! - [`RuntimeError`] — daemon-level startup failures; fatal.
//!
//! Advance and module errors never propagate between processes; they are
//! logged and converted into per-statement retry state.

use thiserror::Error;

/// Errors raised while loading the configuration document or building
/// statement templates from it.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LoadError {
    /// The configuration text did not parse.
    #[error("line {line}: {message}")]
    Parse {
        /// 1-based line of the offending token.
        line: usize,
        /// Description of what was expected.
        message: String,
    },

    /// A statement names a module type the registry does not know.
    #[error("process {process}: statement {index}: unknown module type '{module}'")]
    UnknownModule {
        /// Owning process name.
        process: String,
        /// Statement position within the process.
        index: usize,
        /// The dotted module type that failed lookup.
        module: String,
    },

    /// Every declared process failed to load (or none were declared).
    #[error("no processes loaded")]
    NoProcesses,
}

/// Errors raised by a single statement advance.
///
/// These are always recovered locally: the statement records an error and the
/// engine retries after [`RETRY_INTERVAL`](crate::engine::RETRY_INTERVAL).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AdvanceError {
    /// A variable reference names a statement that is not live earlier in the
    /// chain.
    #[error("unknown statement name in variable: {target}.{path}")]
    UnknownReference {
        /// The referenced statement name.
        target: String,
        /// The requested variable path (may be empty).
        path: String,
    },

    /// The referenced statement exists but could not resolve the path.
    #[error("failed to resolve variable: {target}.{path}: {source}")]
    Resolve {
        /// The referenced statement name.
        target: String,
        /// The requested variable path (may be empty).
        path: String,
        /// The module's resolution error.
        source: ModuleError,
    },

    /// The module instance failed to initialize.
    #[error("failed to initialize: {source}")]
    Init {
        /// The module's init error.
        source: ModuleError,
    },
}

/// Errors produced by modules.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ModuleError {
    /// The materialized argument list does not fit the module.
    #[error("bad arguments: {reason}")]
    BadArgs {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// Instance initialization failed.
    #[error("init failed: {reason}")]
    Init {
        /// Why the instance could not be created.
        reason: String,
    },

    /// The instance does not expose the requested variable path.
    #[error("unknown variable '{path}'")]
    UnknownVariable {
        /// The path that failed to resolve.
        path: String,
    },

    /// An I/O failure inside the module (e.g. spawning a child process).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors produced by daemon startup.
///
/// These are fatal: the daemon logs them and exits with code 1.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A module's one-shot global-init hook failed.
    #[error("global init failed for module '{module}': {source}")]
    GlobalInit {
        /// The module type whose hook failed.
        module: String,
        /// The hook's error.
        source: ModuleError,
    },

    /// No process survived loading.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Termination-signal listeners could not be installed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}
