//! Function-local scopes.
//!
//! Each function call pushes a [`Scope`] binding the callee's ports, internal
//! variables and `self`. Structures are stored flattened, so every binding is
//! a list of fields and a scalar is simply a one-field binding.

use std::collections::HashMap;
use std::ops::Range;

use crate::interpreter::traits::{SimError, SimResult};
use crate::interpreter::value::Scalar;
use crate::lang::{DataType, FieldKind};

/// Storage for one local variable.
#[derive(Debug, Clone)]
struct LocalVar {
    widths: Vec<u32>,
    values: Vec<u64>,
}

/// Bindings of one function activation.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    vars: HashMap<String, LocalVar>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with type `ty`, zero-initialized.
    pub fn declare(&mut self, name: &str, ty: &DataType) {
        let widths: Vec<u32> = match ty {
            DataType::Bool => vec![1],
            DataType::Int(w) => vec![*w],
            DataType::Struct(s) => s.flatten().into_iter().map(FieldKind::width).collect(),
        };
        let values = vec![0; widths.len()];
        self.vars.insert(name.to_string(), LocalVar { widths, values });
    }

    /// Read the fields in `range` of `name`.
    pub fn read(&self, name: &str, range: Range<usize>) -> Option<Vec<Scalar>> {
        let var = self.vars.get(name)?;
        let widths = var.widths.get(range.clone())?;
        let values = var.values.get(range)?;
        Some(
            widths
                .iter()
                .zip(values)
                .map(|(&w, &v)| Scalar::raw(v, w))
                .collect(),
        )
    }

    /// Read one scalar field of `name`.
    pub fn read_scalar(&self, name: &str, field: usize) -> Option<Scalar> {
        self.read(name, field..field + 1)?.pop()
    }

    /// Write `values` starting at field `start`, truncating each to the
    /// declared width.
    pub fn write(&mut self, name: &str, start: usize, values: &[Scalar]) -> Option<()> {
        let var = self.vars.get_mut(name)?;
        if start + values.len() > var.values.len() {
            return None;
        }
        for (i, v) in values.iter().enumerate() {
            let w = var.widths[start + i];
            var.values[start + i] = v.truncate(w).value;
        }
        Some(())
    }
}

/// Stack of active function scopes, innermost last.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    stack: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) -> Option<Scope> {
        self.stack.pop()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top(&self) -> SimResult<&Scope> {
        self.stack
            .last()
            .ok_or_else(|| SimError::Malformed("local variable outside a function".to_string()))
    }

    pub fn top_mut(&mut self) -> SimResult<&mut Scope> {
        self.stack
            .last_mut()
            .ok_or_else(|| SimError::Malformed("local variable outside a function".to_string()))
    }

    pub fn clear(&mut self) {
        self.stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::StructType;
    use std::rc::Rc;

    #[test]
    fn test_scalar_binding_truncates() {
        let mut scope = Scope::new();
        scope.declare("x", &DataType::Int(4));
        assert_eq!(scope.read_scalar("x", 0), Some(Scalar::new(0, 4)));

        scope.write("x", 0, &[Scalar::raw(0x1F, 5)]).unwrap();
        assert_eq!(scope.read_scalar("x", 0), Some(Scalar::new(0xF, 4)));
        assert!(scope.read_scalar("y", 0).is_none());
    }

    #[test]
    fn test_struct_binding() {
        let ty = Rc::new(StructType::new(
            "p",
            vec![("a", DataType::Int(8)), ("ok", DataType::Bool)],
        ));
        let mut scope = Scope::new();
        scope.declare("s", &DataType::Struct(ty));
        scope
            .write("s", 0, &[Scalar::new(200, 8), Scalar::bit(true)])
            .unwrap();
        assert_eq!(
            scope.read("s", 0..2).unwrap(),
            vec![Scalar::new(200, 8), Scalar::bit(true)]
        );
        assert!(scope.write("s", 1, &[Scalar::zero(), Scalar::zero()]).is_none());
    }

    #[test]
    fn test_stack_top() {
        let mut stack = ScopeStack::new();
        assert!(stack.top().is_err());
        stack.push(Scope::new());
        assert_eq!(stack.depth(), 1);
        assert!(stack.top_mut().is_ok());
        stack.pop();
        assert_eq!(stack.depth(), 0);
    }
}
