//! # `exec` runs and supervises a child process.
//!
//! `exec(command, arg...)` spawns the command and reports `Up` once the child
//! is running. If the child exits on its own the instance reports `Dying`
//! followed by `Died` (with error when the exit status is non-zero), which
//! makes the engine tear down dependents and retry the statement. Asking the
//! instance to die kills the child and waits for it to be reaped.
//!
//! Variables: `pid` (the child's process id).

use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::error::ModuleError;
use crate::modules::{InstanceCtx, Module, ModuleInstance};
use crate::value::Value;

pub(crate) struct ExecModule;

impl Module for ExecModule {
    fn kind(&self) -> &str {
        "exec"
    }

    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
        let args = ctx.args.as_list().ok_or_else(|| ModuleError::BadArgs {
            reason: "expected an argument list".into(),
        })?;
        let mut argv = Vec::with_capacity(args.len());
        for a in args {
            argv.push(a.as_str().ok_or_else(|| ModuleError::BadArgs {
                reason: "command and arguments must be strings".into(),
            })?);
        }
        let [cmd, rest @ ..] = argv.as_slice() else {
            return Err(ModuleError::BadArgs {
                reason: "expected at least a command".into(),
            });
        };

        let mut child = Command::new(cmd)
            .args(rest)
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id();

        ctx.handle.up();

        let kill = CancellationToken::new();
        let kill_rx = kill.clone();
        let handle = ctx.handle.clone();
        let log_prefix = ctx.log_prefix;
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let is_error = !status.as_ref().map(|s| s.success()).unwrap_or(false);
                    match status {
                        Ok(s) => tracing::info!(
                            target: "chainvisor::modules",
                            "{log_prefix}exited: {s}"
                        ),
                        Err(e) => tracing::error!(
                            target: "chainvisor::modules",
                            "{log_prefix}wait failed: {e}"
                        ),
                    }
                    handle.dying();
                    handle.died(is_error);
                }
                _ = kill_rx.cancelled() => {
                    let _ = child.start_kill();
                    let _ = child.wait().await;
                    handle.died(false);
                }
            }
        });

        Ok(Box::new(ExecInstance { pid, kill }))
    }
}

struct ExecInstance {
    pid: Option<u32>,
    kill: CancellationToken,
}

impl ModuleInstance for ExecInstance {
    fn die(&mut self) {
        self.kill.cancel();
    }

    fn get_var(&self, path: &str) -> Result<Value, ModuleError> {
        match (path, self.pid) {
            ("pid", Some(pid)) => Ok(Value::str(pid.to_string())),
            _ => Err(ModuleError::UnknownVariable { path: path.into() }),
        }
    }
}
