//! Script tools: Rust closures registered by name.
//!
//! A `script` tool declares a call such as `calc_interest($1, $2)`. The
//! positional placeholders are substituted with the tool arguments, the name
//! before `(` is looked up in the registry, and the closure receives the raw
//! argument list.

use agentkit_core::error::ToolError;
use std::collections::HashMap;
use std::sync::Arc;

/// A registered script function.
pub type ScriptFn = Arc<dyn Fn(&[String]) -> anyhow::Result<String> + Send + Sync>;

/// Explicit registry of script functions, built before the dispatcher.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<String, ScriptFn>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `f` under `name`, replacing any previous registration.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[String]) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.scripts.insert(name.into(), Arc::new(f));
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[String]) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register(name, f);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ScriptFn> {
        self.scripts.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scripts.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Resolve `declaration` and call the registered function with `args`.
    pub fn call(&self, declaration: &str, args: &[String]) -> Result<String, ToolError> {
        let name = function_name(&substitute_args(declaration, args));
        let f = self
            .get(&name)
            .ok_or_else(|| ToolError::NotFound(format!("script function '{name}' is not registered")))?;
        f(args).map_err(|e| ToolError::ExecutionFailed {
            tool_name: name,
            reason: e.to_string(),
        })
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.scripts.keys().collect();
        names.sort();
        f.debug_struct("ScriptRegistry").field("scripts", &names).finish()
    }
}

/// Replace `$1..$n` with the arguments. Higher indexes go first so `$1`
/// never eats the prefix of `$10`.
pub fn substitute_args(declaration: &str, args: &[String]) -> String {
    let mut out = declaration.to_string();
    for (i, arg) in args.iter().enumerate().rev() {
        out = out.replace(&format!("${}", i + 1), arg);
    }
    out
}

/// The callee name of a declaration: everything before the first `(`.
pub fn function_name(declaration: &str) -> String {
    declaration
        .split_once('(')
        .map_or(declaration, |(name, _)| name)
        .trim()
        .to_string()
}
