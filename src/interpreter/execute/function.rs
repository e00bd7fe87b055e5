//! Function calls.
//!
//! A CHP-bodied function runs to completion inside the caller's step with a
//! private [`Scope`]: arguments are bound to ports (truncated to the port
//! widths), the body executes, and the value of `self` is returned.

use crate::interpreter::compile::{ChpExpr, CompiledFunction, FnArm, FnStmt};
use crate::interpreter::traits::{SimError, SimResult};
use crate::interpreter::value::{Aggregate, Scalar, Value};
use crate::lang::DataType;

use super::scalar::Evaluator;
use super::scope::Scope;

impl<'a> Evaluator<'a> {
    /// Call `f` with `args` evaluated in the caller's context.
    pub fn call(&mut self, f: &CompiledFunction, args: &[ChpExpr]) -> SimResult<Value> {
        if args.len() != f.ports.len() {
            return Err(SimError::ArgumentCount {
                function: f.name.clone(),
                expected: f.ports.len(),
                found: args.len(),
            });
        }
        let values = args
            .iter()
            .map(|a| self.eval_value(a))
            .collect::<SimResult<Vec<_>>>()?;

        let Some(body) = &f.body else {
            return self.call_external(f, &values);
        };

        let mut scope = Scope::new();
        for (name, ty) in f.ports.iter().chain(&f.locals) {
            scope.declare(name, ty);
        }
        scope.declare("self", &f.ret);
        for ((name, _), v) in f.ports.iter().zip(&values) {
            let fields: Vec<Scalar> = match v {
                Value::Scalar(s) => vec![*s],
                Value::Aggregate(a) => a.fields.clone(),
            };
            scope.write(name, 0, &fields).ok_or_else(|| {
                SimError::Malformed(format!("function {}: argument `{}` does not fit its port", f.name, name))
            })?;
        }

        log::trace!("{}: call {} (depth {})", self.process, f.name, self.scopes.depth());
        self.scopes.push(scope);
        let result = self.run(body, &f.name);
        let scope = self.scopes.pop();
        result?;

        let scope = scope.ok_or_else(|| SimError::Malformed("function scope stack underflow".to_string()))?;
        let width = match &f.ret {
            DataType::Struct(s) => s.field_count(),
            _ => 1,
        };
        let mut ret = scope
            .read("self", 0..width)
            .ok_or_else(|| SimError::Malformed(format!("function {}: no result binding", f.name)))?;
        Ok(match f.ret {
            DataType::Struct(_) => Value::Aggregate(Aggregate::new(ret)),
            _ => Value::Scalar(ret.pop().unwrap_or_else(Scalar::zero)),
        })
    }

    fn call_external(&mut self, f: &CompiledFunction, values: &[Value]) -> SimResult<Value> {
        if matches!(f.ret, DataType::Struct(_)) {
            return Err(SimError::ExternStructReturn {
                function: f.name.clone(),
            });
        }
        let args = values
            .iter()
            .map(|v| {
                v.as_scalar().ok_or_else(|| {
                    SimError::Malformed(format!(
                        "function {}: structure arguments cannot be passed to external functions",
                        f.name
                    ))
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        let r = self.externs.call(&f.name, &args, f.ret.width())?;
        Ok(Value::Scalar(r))
    }

    /// Execute a function body statement.
    fn run(&mut self, s: &FnStmt, fname: &str) -> SimResult<()> {
        match s {
            FnStmt::Seq(items) => {
                for item in items {
                    self.run(item, fname)?;
                }
            }
            FnStmt::Select(arms) => match self.pick(arms)? {
                Some(body) => {
                    if let Some(body) = body {
                        self.run(body, fname)?;
                    }
                }
                None => {
                    return Err(SimError::AllGuardsFalse {
                        function: fname.to_string(),
                    })
                }
            },
            FnStmt::Loop(arms) => {
                while let Some(body) = self.pick(arms)? {
                    if let Some(body) = body {
                        self.run(body, fname)?;
                    }
                }
            }
            FnStmt::DoLoop(body, guard) => loop {
                if let Some(body) = body {
                    self.run(body, fname)?;
                }
                if !self.eval(guard)?.is_true() {
                    break;
                }
            },
            FnStmt::Skip => {}
            FnStmt::Assign(target, e) => {
                let values = if matches!(target.ty, DataType::Struct(_)) {
                    self.eval_struct(e)?.fields
                } else {
                    vec![self.eval(e)?]
                };
                if values.len() != target.fields.len() {
                    return Err(SimError::Malformed(format!(
                        "function {}: assignment to `{}` has {} fields, expected {}",
                        fname,
                        target.name,
                        values.len(),
                        target.fields.len()
                    )));
                }
                self.scopes
                    .top_mut()?
                    .write(&target.name, target.fields.start, &values)
                    .ok_or_else(|| SimError::Malformed(format!("local `{}` is not bound", target.name)))?;
            }
            FnStmt::Log(items) => {
                let line = self.format_log(items)?;
                self.log.write_raw(&line);
            }
        }
        Ok(())
    }

    /// First arm whose guard holds. `Some(None)` is a taken arm with no body.
    fn pick<'s>(&mut self, arms: &'s [FnArm]) -> SimResult<Option<Option<&'s FnStmt>>> {
        for (guard, body) in arms {
            let taken = match guard {
                None => true,
                Some(g) => self.eval(g)?.is_true(),
            };
            if taken {
                return Ok(Some(body.as_ref()));
            }
        }
        Ok(None)
    }
}
