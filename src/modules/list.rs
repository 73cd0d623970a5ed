//! # `list` holds its argument list.
//!
//! `list(a, b, c) name;` stores the whole materialized argument list and goes
//! up immediately. The empty path resolves to the list; `length` resolves to
//! the item count as a string.

use crate::error::ModuleError;
use crate::modules::{InstanceCtx, InstanceHandle, Module, ModuleInstance};
use crate::value::Value;

pub(crate) struct ListModule;

impl Module for ListModule {
    fn kind(&self) -> &str {
        "list"
    }

    fn init(&self, ctx: InstanceCtx) -> Result<Box<dyn ModuleInstance>, ModuleError> {
        ctx.handle.up();
        Ok(Box::new(ListInstance {
            items: ctx.args,
            handle: ctx.handle,
        }))
    }
}

struct ListInstance {
    items: Value,
    handle: InstanceHandle,
}

impl ModuleInstance for ListInstance {
    fn die(&mut self) {
        self.handle.died(false);
    }

    fn get_var(&self, path: &str) -> Result<Value, ModuleError> {
        match path {
            "" => Ok(self.items.clone()),
            "length" => Ok(Value::str(self.items.len().to_string())),
            _ => Err(ModuleError::UnknownVariable { path: path.into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::InstanceHandle;
    use tokio::sync::mpsc;

    #[test]
    fn resolves_list_and_length() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = InstanceCtx {
            name: Some("l".into()),
            args: Value::List(vec![Value::str("a"), Value::str("b")]),
            log_prefix: String::new(),
            handle: InstanceHandle::new(tx, 0, 1),
        };
        let inst = ListModule.init(ctx).unwrap();

        assert_eq!(
            inst.get_var("").unwrap(),
            Value::List(vec![Value::str("a"), Value::str("b")])
        );
        assert_eq!(inst.get_var("length").unwrap(), Value::str("2"));
    }
}
