//! # `sleep` goes up after a delay.
//!
//! `sleep(ms_up)` or `sleep(ms_up, ms_down)`. The instance reports `Up`
//! `ms_up` milliseconds after init; when asked to die it waits `ms_down`
//! milliseconds (default 0) before reporting `Died`. Useful for sequencing
//! chains and for exercising asynchronous transitions.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::ModuleError;
use crate::modules::{InstanceCtx, InstanceHandle, Module, ModuleInstance};
use crate::value::Value;

pub(crate) struct SleepModule;

impl Module for SleepModule {
    fn kind(&self) -> &str {
        "sleep"
    }

    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
        let args = ctx.args.as_list().ok_or_else(|| ModuleError::BadArgs {
            reason: "expected an argument list".into(),
        })?;
        let (up, down) = match args {
            [up] => (ms_arg(up)?, Duration::ZERO),
            [up, down] => (ms_arg(up)?, ms_arg(down)?),
            other => {
                return Err(ModuleError::BadArgs {
                    reason: format!("expected 1 or 2 arguments, got {}", other.len()),
                });
            }
        };

        let cancel = CancellationToken::new();
        let up_token = cancel.clone();
        let handle = ctx.handle.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(up) => handle.up(),
                _ = up_token.cancelled() => {}
            }
        });

        Ok(Box::new(SleepInstance {
            down,
            cancel,
            handle: ctx.handle,
        }))
    }
}

struct SleepInstance {
    down: Duration,
    cancel: CancellationToken,
    handle: InstanceHandle,
}

impl ModuleInstance for SleepInstance {
    fn die(&mut self) {
        // Stop a pending Up so it cannot race the teardown.
        self.cancel.cancel();

        if self.down.is_zero() {
            self.handle.died(false);
            return;
        }
        let down = self.down;
        let handle = self.handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(down).await;
            handle.died(false);
        });
    }

    fn get_var(&self, path: &str) -> Result<Value, ModuleError> {
        Err(ModuleError::UnknownVariable { path: path.into() })
    }
}

fn ms_arg(v: &Value) -> Result<Duration, ModuleError> {
    let s = v.as_str().ok_or_else(|| ModuleError::BadArgs {
        reason: "delay must be a string of milliseconds".into(),
    })?;
    let ms: u64 = s.parse().map_err(|_| ModuleError::BadArgs {
        reason: format!("bad millisecond value '{s}'"),
    })?;
    Ok(Duration::from_millis(ms))
}
