//! Registry of externally implemented functions.
//!
//! A CHP function without a body is implemented natively. Its name is mapped
//! to a symbol (through the `[externs]` configuration table, or unchanged when
//! no mapping exists), and the symbol to a registered callable. Resolutions
//! are cached after the first call.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::interpreter::traits::{SimError, SimResult};
use crate::interpreter::value::Scalar;

/// A native function: takes the evaluated arguments, returns the raw result.
pub type ExternFn = Rc<dyn Fn(&[Scalar]) -> u64>;

/// Name-to-callable registry for external functions.
#[derive(Default)]
pub struct ExternRegistry {
    symbols: HashMap<String, ExternFn>,
    aliases: HashMap<String, String>,
    resolved: RefCell<HashMap<String, ExternFn>>,
}

impl fmt::Debug for ExternRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut symbols: Vec<_> = self.symbols.keys().collect();
        symbols.sort();
        f.debug_struct("ExternRegistry")
            .field("symbols", &symbols)
            .field("aliases", &self.aliases)
            .finish()
    }
}

impl ExternRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a function-name to symbol mapping.
    pub fn with_aliases(aliases: HashMap<String, String>) -> Self {
        Self {
            aliases,
            ..Default::default()
        }
    }

    /// Register a native callable under `symbol`.
    pub fn register<F>(&mut self, symbol: &str, f: F)
    where
        F: Fn(&[Scalar]) -> u64 + 'static,
    {
        self.symbols.insert(symbol.to_string(), Rc::new(f));
        self.resolved.borrow_mut().clear();
    }

    /// Map CHP function `function` to `symbol`.
    pub fn alias(&mut self, function: &str, symbol: &str) {
        self.aliases.insert(function.to_string(), symbol.to_string());
        self.resolved.borrow_mut().clear();
    }

    /// Find the callable for `function`.
    pub fn resolve(&self, function: &str) -> SimResult<ExternFn> {
        if let Some(f) = self.resolved.borrow().get(function) {
            return Ok(Rc::clone(f));
        }
        let symbol = self
            .aliases
            .get(function)
            .map(String::as_str)
            .unwrap_or(function);
        let f = self
            .symbols
            .get(symbol)
            .cloned()
            .ok_or_else(|| SimError::UnresolvedExtern {
                function: function.to_string(),
                symbol: symbol.to_string(),
            })?;
        log::debug!("resolved external function {} -> {}", function, symbol);
        self.resolved
            .borrow_mut()
            .insert(function.to_string(), Rc::clone(&f));
        Ok(f)
    }

    /// Call `function` with `args`; the result is truncated to `width`.
    pub fn call(&self, function: &str, args: &[Scalar], width: u32) -> SimResult<Scalar> {
        let f = self.resolve(function)?;
        Ok(Scalar::new(f(args), width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_registered() {
        let mut reg = ExternRegistry::new();
        reg.register("add", |a| a[0].value + a[1].value);
        let r = reg
            .call("add", &[Scalar::new(3, 4), Scalar::new(14, 4)], 4)
            .unwrap();
        assert_eq!(r, Scalar::new(1, 4));
    }

    #[test]
    fn test_alias_lookup() {
        let mut aliases = HashMap::new();
        aliases.insert("sqrt".to_string(), "isqrt64".to_string());
        let mut reg = ExternRegistry::with_aliases(aliases);
        reg.register("isqrt64", |a| (a[0].value as f64).sqrt() as u64);
        assert_eq!(reg.call("sqrt", &[Scalar::new(49, 8)], 8).unwrap().value, 7);
    }

    #[test]
    fn test_unresolved() {
        let mut reg = ExternRegistry::new();
        reg.alias("f", "missing_sym");
        assert_eq!(
            reg.resolve("f").err(),
            Some(SimError::UnresolvedExtern {
                function: "f".to_string(),
                symbol: "missing_sym".to_string()
            })
        );
    }
}
