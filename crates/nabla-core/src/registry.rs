//! Per-function implementation registry.
//!
//! Each function kind has a [`FunctionDb`] mapping `backend:type_config`
//! keys to constructors. Kernel-library crates register their variants;
//! callers resolve one through a [`Context`]'s backend priority list.

use parking_lot::RwLock;

use crate::{BackendSpec, Context, Function, NablaError, Operator, Result};

/// Constructor taking a context and the function's own arguments.
pub type Creator<A> = fn(&Context, A) -> Result<Box<dyn Function>>;

struct Entry<A> {
    backend: String,
    type_config: String,
    creator: Creator<A>,
}

/// Registered implementations of one function kind.
pub struct FunctionDb<A> {
    name: &'static str,
    entries: RwLock<Vec<Entry<A>>>,
}

impl<A> FunctionDb<A> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register `creator` under `backend:type_config`, replacing any previous one.
    pub fn add(&self, backend: &str, type_config: &str, creator: Creator<A>) {
        let mut entries = self.entries.write();
        if let Some(e) = entries
            .iter_mut()
            .find(|e| e.backend == backend && e.type_config == type_config)
        {
            tracing::warn!("{}: replacing implementation for {}:{}", self.name, backend, type_config);
            e.creator = creator;
            return;
        }
        tracing::debug!("{}: registered {}:{}", self.name, backend, type_config);
        entries.push(Entry {
            backend: backend.to_string(),
            type_config: type_config.to_string(),
            creator,
        });
    }

    /// Registered `backend:type_config` keys, in registration order.
    pub fn backends(&self) -> Vec<String> {
        self.entries
            .read()
            .iter()
            .map(|e| format!("{}:{}", e.backend, e.type_config))
            .collect()
    }

    /// First creator matching the context's backend priority list.
    pub fn query(&self, ctx: &Context) -> Result<(BackendSpec, Creator<A>)> {
        let specs = ctx.backends()?;
        let entries = self.entries.read();
        for spec in specs {
            let hit = entries
                .iter()
                .find(|e| e.backend == spec.name && e.type_config == spec.type_config);
            if let Some(e) = hit {
                return Ok((spec, e.creator));
            }
        }
        Err(NablaError::NotImplemented {
            function: self.name.to_string(),
            backends: ctx.backend.clone(),
        })
    }

    /// Resolve and construct, wrapped in an [`Operator`].
    pub fn create(&self, ctx: &Context, args: A) -> Result<Operator> {
        let (spec, creator) = self.query(ctx)?;
        tracing::debug!("{}: creating {} implementation", self.name, spec);
        Ok(Operator::new(creator(ctx, args)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Variable;

    struct Named {
        ctx: Context,
        name: &'static str,
    }

    impl Function for Named {
        fn name(&self) -> &str {
            self.name
        }
        fn context(&self) -> &Context {
            &self.ctx
        }
        fn allowed_array_classes(&self) -> Vec<String> {
            vec!["CpuArray".into()]
        }
        fn num_inputs(&self) -> usize {
            0
        }
        fn num_outputs(&self) -> usize {
            0
        }
        fn setup_impl(&mut self, _: &[&Variable], _: &[&Variable]) -> Result<()> {
            Ok(())
        }
        fn forward_impl(&mut self, _: &[&Variable], _: &[&Variable]) -> Result<()> {
            Ok(())
        }
        fn backward_impl(&mut self, _: &[&Variable], _: &[&Variable], _: &[bool], _: &[bool]) -> Result<()> {
            Ok(())
        }
    }

    fn slow(ctx: &Context, _: ()) -> Result<Box<dyn Function>> {
        Ok(Box::new(Named { ctx: ctx.clone(), name: "Slow" }))
    }

    fn fast(ctx: &Context, _: ()) -> Result<Box<dyn Function>> {
        Ok(Box::new(Named { ctx: ctx.clone(), name: "Fast" }))
    }

    fn db() -> FunctionDb<()> {
        let db = FunctionDb::new("Thing");
        db.add("cpu", "float", slow);
        db.add("accel", "float", fast);
        db
    }

    #[test]
    fn test_priority_order() {
        let db = db();
        let ctx = Context::new(&["accel:float", "cpu:float"], "CpuArray", "0");
        assert_eq!(db.create(&ctx, ()).unwrap().name(), "Fast");

        let ctx = ctx.with_backend(&["cpu:float", "accel:float"]);
        assert_eq!(db.create(&ctx, ()).unwrap().name(), "Slow");
    }

    #[test]
    fn test_fallthrough_and_miss() {
        let db = db();
        let ctx = Context::new(&["accel:double", "cpu:float"], "CpuArray", "0");
        assert_eq!(db.create(&ctx, ()).unwrap().name(), "Slow");

        let ctx = ctx.with_backend(&["accel:double"]);
        assert!(matches!(db.create(&ctx, ()), Err(NablaError::NotImplemented { .. })));
    }

    #[test]
    fn test_replace() {
        let db = db();
        db.add("cpu", "float", fast);
        assert_eq!(db.backends(), vec!["cpu:float", "accel:float"]);
        assert_eq!(db.create(&Context::cpu(), ()).unwrap().name(), "Fast");
    }
}
