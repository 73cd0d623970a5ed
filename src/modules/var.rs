//! # `var` holds one value.
//!
//! `var(value) name;` stores its single argument and goes up immediately.
//! The empty variable path resolves to the stored value, so later statements
//! can write `name` to read it back; there are no sub-paths.

use crate::error::ModuleError;
use crate::modules::{InstanceCtx, InstanceHandle, Module, ModuleInstance};
use crate::value::Value;

pub(crate) struct VarModule;

impl Module for VarModule {
    fn kind(&self) -> &str {
        "var"
    }

    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
        let Value::List(mut args) = ctx.args else {
            return Err(ModuleError::BadArgs {
                reason: "expected an argument list".into(),
            });
        };
        if args.len() != 1 {
            return Err(ModuleError::BadArgs {
                reason: format!("expected 1 argument, got {}", args.len()),
            });
        }
        let value = args.remove(0);

        // Up before returning: exercises the synchronous-UP path.
        ctx.handle.up();

        Ok(Box::new(VarInstance {
            value,
            handle: ctx.handle,
        }))
    }
}

struct VarInstance {
    value: Value,
    handle: InstanceHandle,
}

impl ModuleInstance for VarInstance {
    fn die(&mut self) {
        self.handle.died(false);
    }

    fn get_var(&self, path: &str) -> Result<Value, ModuleError> {
        if path.is_empty() {
            Ok(self.value.clone())
        } else {
            Err(ModuleError::UnknownVariable { path: path.into() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::FeedbackMsg;
    use tokio::sync::mpsc;

    fn ctx(args: Value) -> (InstanceCtx, mpsc::UnboundedReceiver<FeedbackMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = InstanceCtx {
            name: None,
            args,
            log_prefix: "process t: statement 0: module: ".into(),
            handle: InstanceHandle::new(tx, 0, 1),
        };
        (ctx, rx)
    }

    #[test]
    fn stores_and_resolves_its_value() {
        let (ctx, mut rx) = ctx(Value::List(vec![Value::str("hello")]));
        let inst = VarModule.init(ctx).unwrap();

        // synchronous Up was queued
        assert!(rx.try_recv().is_ok());

        assert_eq!(inst.get_var("").unwrap(), Value::str("hello"));
        assert!(matches!(
            inst.get_var("x"),
            Err(ModuleError::UnknownVariable { .. })
        ));
    }

    #[test]
    fn rejects_wrong_arity() {
        let (ctx, _rx) = ctx(Value::List(vec![]));
        assert!(matches!(
            VarModule.init(ctx),
            Err(ModuleError::BadArgs { .. })
        ));
    }
}
