//! A script engine whose functions are plain Rust closures.
//!
//! Useful when the shell is embedded without a scripting language, for the
//! shell's own built-in hooks, and in tests.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::script::{ScriptEngine, ScriptError, ScriptFunction, ScriptModule, Value};

type ClosureFn = dyn Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync;

struct Closure(Box<ClosureFn>);

/// Cheap to clone; clones share the loaded modules.
#[derive(Clone, Default)]
pub struct ClosureEngine {
    modules: Arc<RwLock<HashMap<&'static str, Arc<dyn ScriptModule>>>>,
}

impl ClosureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a closure as a script function this engine can call.
    pub fn function<F>(f: F) -> ScriptFunction
    where
        F: Fn(&[Value]) -> Result<Value, ScriptError> + Send + Sync + 'static,
    {
        ScriptFunction::new(Closure(Box::new(f)))
    }

    /// Call `module.function(args)` on a loaded module, as a script would.
    pub fn call_module(
        &self,
        module: &str,
        function: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        let module = self
            .modules
            .read()
            .expect("module registry poisoned")
            .get(module)
            .cloned()
            .ok_or_else(|| ScriptError::new(format!("module '{module}' not found")))?;
        module.call(function, args)
    }

    /// Call a method on a userdata handle, as `handle:method(args)` would.
    pub fn call_method(
        &self,
        handle: &Value,
        method: &str,
        args: &[Value],
    ) -> Result<Value, ScriptError> {
        match handle {
            Value::UserData(ud) => ud.call_method(method, args),
            other => Err(ScriptError::new(format!(
                "attempt to index a {} value",
                other.type_name()
            ))),
        }
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules
            .read()
            .expect("module registry poisoned")
            .contains_key(name)
    }
}

impl ScriptEngine for ClosureEngine {
    fn call(&self, func: &ScriptFunction, args: Vec<Value>) -> Result<Value, ScriptError> {
        let closure = func
            .downcast_ref::<Closure>()
            .ok_or_else(|| ScriptError::new("attempt to call a function from another engine"))?;
        (closure.0)(&args)
    }

    fn load_module(&self, module: Arc<dyn ScriptModule>) -> Result<(), ScriptError> {
        self.modules
            .write()
            .expect("module registry poisoned")
            .insert(module.name(), module);
        Ok(())
    }
}
