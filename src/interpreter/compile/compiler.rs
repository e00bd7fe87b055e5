//! Expression compiler.
//!
//! Turns source expressions and identifiers into [`ChpExpr`]s whose variable
//! references are pre-resolved through a [`LayoutResolver`]. Inside function
//! bodies identifiers resolve to the function's local scope instead.

use std::collections::HashMap;
use std::rc::Rc;

use super::expr::{ArrayIndex, ChanRef, ChpExpr, LocalRef, LogItem, StructRef, VarRef};
use super::function::{CompiledFunction, FnArm, FnStmt};
use crate::interpreter::diagnostics::{Diagnostics, Warning};
use crate::interpreter::traits::{SimError, SimResult};
use crate::interpreter::value::Scalar;
use crate::lang::{Chp, DataType, Expr, Function, GuardedCmd, Id, IdPart, LogArg, StructType};
use crate::state::{field_slots, ArrayRange, ChanDir, LayoutResolver, ScalarSlot, Symbol};

/// What an identifier resolved to.
#[derive(Debug, Clone)]
pub enum Resolved {
    Scalar(VarRef),
    Struct(StructRef),
    Chan(ChanRef),
}

#[derive(Clone, Copy)]
enum Ctx<'f> {
    Process,
    Function(&'f Function),
}

/// Width of an integer literal: its bit length, at least 1.
pub fn literal_width(v: u64) -> u32 {
    (64 - v.leading_zeros()).max(1)
}

/// Compiles expressions for one process instance.
pub struct ExprCompiler<'a> {
    layout: &'a dyn LayoutResolver,
    diag: &'a mut Diagnostics,
    functions: HashMap<String, Rc<CompiledFunction>>,
    in_progress: Vec<String>,
}

impl<'a> ExprCompiler<'a> {
    pub fn new(layout: &'a dyn LayoutResolver, diag: &'a mut Diagnostics) -> Self {
        Self {
            layout,
            diag,
            functions: HashMap::new(),
            in_progress: Vec::new(),
        }
    }

    pub fn layout(&self) -> &'a dyn LayoutResolver {
        self.layout
    }

    /// Report a build-time warning.
    pub fn warn(&mut self, w: Warning) {
        self.diag.warn(w);
    }

    /// Compile an expression in process scope.
    pub fn compile(&mut self, e: &Expr) -> SimResult<ChpExpr> {
        self.expr(e, Ctx::Process)
    }

    /// Compile `log(...)` arguments in process scope.
    pub fn log_args(&mut self, args: &[LogArg]) -> SimResult<Vec<LogItem>> {
        self.log_items(args, Ctx::Process)
    }

    /// Resolve an identifier to a channel.
    pub fn channel(&mut self, id: &Id) -> SimResult<ChanRef> {
        match self.resolve(id)? {
            Resolved::Chan(c) => Ok(c),
            _ => Err(self.wrong_kind(id, "a channel")),
        }
    }

    /// Resolve an identifier in process scope.
    pub fn resolve(&mut self, id: &Id) -> SimResult<Resolved> {
        let first = id
            .parts
            .first()
            .ok_or_else(|| SimError::Malformed("empty identifier".to_string()))?;
        if id.parts[1..].iter().any(|p| !p.index.is_empty()) {
            return Err(self.wrong_kind(id, "indexable past its first component"));
        }
        let sym = self
            .layout
            .lookup(&first.name)
            .cloned()
            .ok_or_else(|| self.unknown(id))?;
        let fields: Vec<&str> = id.parts[1..].iter().map(|p| p.name.as_str()).collect();
        let name = self.qualify(id);

        match sym {
            Symbol::Bool { offset, shared } => {
                self.plain(id, first, &fields)?;
                Ok(Resolved::Scalar(VarRef {
                    name,
                    slot: ScalarSlot::Bool(offset),
                    index: None,
                    shared,
                }))
            }
            Symbol::Int {
                offset,
                width,
                shared,
            } => {
                self.plain(id, first, &fields)?;
                Ok(Resolved::Scalar(VarRef {
                    name,
                    slot: ScalarSlot::Int(offset, width),
                    index: None,
                    shared,
                }))
            }
            Symbol::BoolArray { base, range, shared } => {
                if !fields.is_empty() {
                    return Err(self.wrong_kind(id, "a structure"));
                }
                let index = self.array_index(id, first, range, 0, 1)?;
                Ok(Resolved::Scalar(VarRef {
                    name,
                    slot: ScalarSlot::Bool(base),
                    index: Some(index),
                    shared,
                }))
            }
            Symbol::IntArray {
                base,
                width,
                range,
                shared,
            } => {
                if !fields.is_empty() {
                    return Err(self.wrong_kind(id, "a structure"));
                }
                let index = self.array_index(id, first, range, 1, 0)?;
                Ok(Resolved::Scalar(VarRef {
                    name,
                    slot: ScalarSlot::Int(base, width),
                    index: Some(index),
                    shared,
                }))
            }
            Symbol::Struct {
                ty,
                int_base,
                bool_base,
                shared,
            } => {
                if !first.index.is_empty() {
                    return Err(self.wrong_kind(id, "an array"));
                }
                let slots = field_slots(&ty, int_base, bool_base);
                self.struct_path(id, name, ty, slots, None, &fields, shared)
            }
            Symbol::StructArray {
                ty,
                int_base,
                bool_base,
                range,
                shared,
            } => {
                let (ni, nb) = ty.counts();
                let index = self.array_index(id, first, range, ni, nb)?;
                let slots = field_slots(&ty, int_base, bool_base);
                self.struct_path(id, name, ty, slots, Some(index), &fields, shared)
            }
            Symbol::Chan { offset, dir, data } => {
                self.plain(id, first, &fields)?;
                Ok(Resolved::Chan(ChanRef {
                    name,
                    offset,
                    dir,
                    data,
                }))
            }
        }
    }

    /// Compile a function once and cache it by name.
    pub fn function(&mut self, f: &Rc<Function>) -> SimResult<Rc<CompiledFunction>> {
        if let Some(cf) = self.functions.get(&f.name) {
            return Ok(Rc::clone(cf));
        }
        if self.in_progress.contains(&f.name) {
            return Err(SimError::Malformed(format!(
                "recursive call to function {}",
                f.name
            )));
        }
        if f.is_external() && matches!(f.ret, DataType::Struct(_)) {
            return Err(SimError::ExternStructReturn {
                function: f.name.clone(),
            });
        }

        self.in_progress.push(f.name.clone());
        let body = f.body.as_ref().map(|b| self.fn_stmt(b, f));
        self.in_progress.pop();

        let compiled = Rc::new(CompiledFunction {
            name: f.name.clone(),
            ports: f.ports.clone(),
            locals: f.locals.clone(),
            ret: f.ret.clone(),
            body: body.transpose()?,
        });
        log::debug!(
            "{}: compiled function {}{}",
            self.layout.instance_name(),
            f.name,
            if compiled.is_external() { " (external)" } else { "" }
        );
        self.functions.insert(f.name.clone(), Rc::clone(&compiled));
        Ok(compiled)
    }

    fn expr(&mut self, e: &Expr, ctx: Ctx<'_>) -> SimResult<ChpExpr> {
        Ok(match e {
            Expr::True => ChpExpr::Const(Scalar::bit(true)),
            Expr::False => ChpExpr::Const(Scalar::bit(false)),
            Expr::Int(v) => ChpExpr::Const(Scalar::new(*v, literal_width(*v))),
            Expr::Unary(op, a) => ChpExpr::Unary(*op, Box::new(self.expr(a, ctx)?)),
            Expr::Binary(op, l, r) => ChpExpr::Binary(
                *op,
                Box::new(self.expr(l, ctx)?),
                Box::new(self.expr(r, ctx)?),
            ),
            Expr::Query(c, a, b) => ChpExpr::Query(
                Box::new(self.expr(c, ctx)?),
                Box::new(self.expr(a, ctx)?),
                Box::new(self.expr(b, ctx)?),
            ),
            Expr::Concat(items) => ChpExpr::Concat(
                items
                    .iter()
                    .map(|x| self.expr(x, ctx))
                    .collect::<SimResult<_>>()?,
            ),
            Expr::Bitfield { id, lo, hi } => {
                let lo = lo.unwrap_or(*hi);
                match ctx {
                    Ctx::Process => match self.resolve(id)? {
                        Resolved::Scalar(var) => ChpExpr::Bitfield { var, lo, hi: *hi },
                        _ => return Err(self.wrong_kind(id, "an integer")),
                    },
                    Ctx::Function(f) => {
                        let local = self.local(id, f)?;
                        if matches!(local.ty, DataType::Struct(_)) {
                            return Err(self.wrong_kind(id, "an integer"));
                        }
                        ChpExpr::LocalBitfield { local, lo, hi: *hi }
                    }
                }
            }
            Expr::Var(id) => match ctx {
                Ctx::Process => match self.resolve(id)? {
                    Resolved::Scalar(v) => ChpExpr::Var(v),
                    Resolved::Struct(s) => ChpExpr::Struct(s),
                    Resolved::Chan(c) => {
                        if c.dir != ChanDir::Input {
                            return Err(self.wrong_kind(id, "an input channel"));
                        }
                        ChpExpr::ChanValue(c)
                    }
                },
                Ctx::Function(f) => ChpExpr::Local(self.local(id, f)?),
            },
            Expr::Probe(id) => match ctx {
                Ctx::Process => ChpExpr::Probe(self.channel(id)?),
                Ctx::Function(f) => {
                    return Err(SimError::CommunicationInFunction {
                        function: f.name.clone(),
                    })
                }
            },
            Expr::BuiltinBool(a) => ChpExpr::BuiltinBool(Box::new(self.expr(a, ctx)?)),
            Expr::BuiltinInt(a, w) => {
                let w = match w {
                    Some(w) => Some(Box::new(self.expr(w, ctx)?)),
                    None => None,
                };
                ChpExpr::BuiltinInt(Box::new(self.expr(a, ctx)?), w)
            }
            Expr::Call(f, args) => {
                let cf = self.function(f)?;
                if args.len() != cf.ports.len() {
                    return Err(SimError::ArgumentCount {
                        function: cf.name.clone(),
                        expected: cf.ports.len(),
                        found: args.len(),
                    });
                }
                let args = args
                    .iter()
                    .map(|a| self.expr(a, ctx))
                    .collect::<SimResult<_>>()?;
                ChpExpr::Call(cf, args)
            }
        })
    }

    fn log_items(&mut self, args: &[LogArg], ctx: Ctx<'_>) -> SimResult<Vec<LogItem>> {
        args.iter()
            .map(|a| match a {
                LogArg::Str(s) => Ok(LogItem::Str(s.clone())),
                LogArg::Expr(e) => Ok(LogItem::Expr(self.expr(e, ctx)?)),
            })
            .collect()
    }

    fn fn_stmt(&mut self, c: &Chp, f: &Function) -> SimResult<FnStmt> {
        Ok(match c {
            Chp::Seq(items) | Chp::Par(items) => FnStmt::Seq(
                items
                    .iter()
                    .map(|s| self.fn_stmt(s, f))
                    .collect::<SimResult<_>>()?,
            ),
            Chp::Select(gcs) | Chp::SelectNondet(gcs) => FnStmt::Select(self.fn_arms(gcs, f)?),
            Chp::Loop(gcs) => FnStmt::Loop(self.fn_arms(gcs, f)?),
            Chp::DoLoop(gc) => {
                if gc.replicator.is_some() {
                    return Err(SimError::ReplicationInFunction {
                        function: f.name.clone(),
                    });
                }
                let guard = gc.guard.as_ref().ok_or_else(|| {
                    SimError::Malformed(format!("function {}: do-loop without a guard", f.name))
                })?;
                let body = match &gc.body {
                    Some(b) => Some(Box::new(self.fn_stmt(b, f)?)),
                    None => None,
                };
                FnStmt::DoLoop(body, self.expr(guard, Ctx::Function(f))?)
            }
            Chp::Skip => FnStmt::Skip,
            Chp::Send(..) | Chp::Recv(..) => {
                return Err(SimError::CommunicationInFunction {
                    function: f.name.clone(),
                })
            }
            Chp::Assign(id, e) => {
                let target = self.local(id, f)?;
                let value = self.expr(e, Ctx::Function(f))?;
                FnStmt::Assign(target, value)
            }
            Chp::Call(name, args) => {
                if name == "log" {
                    FnStmt::Log(self.log_items(args, Ctx::Function(f))?)
                } else {
                    self.warn(Warning::UnknownBuiltin {
                        process: self.layout.instance_name().to_string(),
                        name: name.clone(),
                    });
                    FnStmt::Skip
                }
            }
        })
    }

    fn fn_arms(&mut self, gcs: &[GuardedCmd], f: &Function) -> SimResult<Vec<FnArm>> {
        gcs.iter()
            .map(|gc| {
                if gc.replicator.is_some() {
                    return Err(SimError::ReplicationInFunction {
                        function: f.name.clone(),
                    });
                }
                let guard = match &gc.guard {
                    Some(g) => Some(self.expr(g, Ctx::Function(f))?),
                    None => None,
                };
                let body = match &gc.body {
                    Some(b) => Some(self.fn_stmt(b, f)?),
                    None => None,
                };
                Ok((guard, body))
            })
            .collect()
    }

    /// Resolve an identifier against a function's ports, locals and `self`.
    fn local(&self, id: &Id, f: &Function) -> SimResult<LocalRef> {
        let first = id
            .parts
            .first()
            .ok_or_else(|| SimError::Malformed("empty identifier".to_string()))?;
        if id.parts.iter().any(|p| !p.index.is_empty()) {
            return Err(SimError::WrongKind {
                ident: id.to_string(),
                process: f.name.clone(),
                expected: "a scalar or structure (arrays are not supported in functions)",
            });
        }
        let ty = if first.name == "self" {
            f.ret.clone()
        } else {
            f.ports
                .iter()
                .chain(&f.locals)
                .find(|(n, _)| *n == first.name)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| SimError::UnknownIdentifier {
                    ident: id.to_string(),
                    process: f.name.clone(),
                })?
        };

        let fields: Vec<&str> = id.parts[1..].iter().map(|p| p.name.as_str()).collect();
        if fields.is_empty() {
            let n = match &ty {
                DataType::Struct(s) => s.field_count(),
                _ => 1,
            };
            return Ok(LocalRef {
                name: first.name.clone(),
                ty,
                fields: 0..n,
            });
        }
        let DataType::Struct(s) = &ty else {
            return Err(SimError::WrongKind {
                ident: id.to_string(),
                process: f.name.clone(),
                expected: "a structure",
            });
        };
        let (fields, ty) = s.locate(&fields).ok_or_else(|| SimError::UnknownIdentifier {
            ident: id.to_string(),
            process: f.name.clone(),
        })?;
        Ok(LocalRef {
            name: first.name.clone(),
            ty,
            fields,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn struct_path(
        &self,
        id: &Id,
        name: String,
        ty: Rc<StructType>,
        slots: Vec<ScalarSlot>,
        index: Option<Box<ArrayIndex>>,
        fields: &[&str],
        shared: bool,
    ) -> SimResult<Resolved> {
        if fields.is_empty() {
            return Ok(Resolved::Struct(StructRef {
                name,
                ty,
                slots,
                index,
                shared,
            }));
        }
        let (range, found) = ty.locate(fields).ok_or_else(|| self.unknown(id))?;
        Ok(match found {
            DataType::Struct(sub) => Resolved::Struct(StructRef {
                name,
                ty: sub,
                slots: slots[range].to_vec(),
                index,
                shared,
            }),
            _ => Resolved::Scalar(VarRef {
                name,
                slot: slots[range.start],
                index,
                shared,
            }),
        })
    }

    fn array_index(
        &mut self,
        id: &Id,
        first: &IdPart,
        range: ArrayRange,
        int_stride: usize,
        bool_stride: usize,
    ) -> SimResult<Box<ArrayIndex>> {
        if first.index.len() != range.dims() {
            return Err(self.wrong_kind(id, "indexed with its declared number of dimensions"));
        }
        let indices = first
            .index
            .iter()
            .map(|e| self.expr(e, Ctx::Process))
            .collect::<SimResult<_>>()?;
        Ok(Box::new(ArrayIndex {
            range,
            indices,
            int_stride,
            bool_stride,
        }))
    }

    /// Scalars and channels take neither indices nor field accesses.
    fn plain(&self, id: &Id, first: &IdPart, fields: &[&str]) -> SimResult<()> {
        if !first.index.is_empty() {
            return Err(self.wrong_kind(id, "an array"));
        }
        if !fields.is_empty() {
            return Err(self.wrong_kind(id, "a structure"));
        }
        Ok(())
    }

    fn qualify(&self, id: &Id) -> String {
        format!("{}.{}", self.layout.instance_name(), id)
    }

    fn unknown(&self, id: &Id) -> SimError {
        SimError::UnknownIdentifier {
            ident: self.qualify(id),
            process: self.layout.instance_name().to_string(),
        }
    }

    fn wrong_kind(&self, id: &Id, expected: &'static str) -> SimError {
        SimError::WrongKind {
            ident: self.qualify(id),
            process: self.layout.instance_name().to_string(),
            expected,
        }
    }
}
