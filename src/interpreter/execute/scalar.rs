//! Scalar expression evaluation.
//!
//! Bit-width rules per operator:
//!
//! | Operator | Result width |
//! |----------|--------------|
//! | `&` `\|` `^` | max(l, r) |
//! | `+` `-` | max(l, r) + 1 |
//! | `*` | l + r |
//! | `/` | l |
//! | `%` | r |
//! | `<<` | l + 2^r - 1 |
//! | `>>` `>>>` | l |
//! | comparisons | 1 |
//! | concatenation | sum of operands |
//!
//! Expressions never truncate arithmetic results; only assignment does.

use smallvec::SmallVec;

use crate::interpreter::compile::{ArrayIndex, ChpExpr, LocalRef, LogItem, VarRef};
use crate::interpreter::diagnostics::{Diagnostics, SimLog, Warning};
use crate::interpreter::traits::{IndexVec, SimError, SimResult};
use crate::interpreter::value::{mask, Scalar};
use crate::lang::{BinOp, UnOp};
use crate::state::{ChanDir, Logic, ScalarSlot, StateStore};

use super::externs::ExternRegistry;
use super::scope::ScopeStack;

/// Evaluates compiled expressions against the global state.
///
/// Holds everything evaluation may touch: the store (read only), the
/// function scope stack of the owning process, external functions, and the
/// diagnostic sinks.
pub struct Evaluator<'a> {
    pub(super) store: &'a StateStore,
    pub(super) scopes: &'a mut ScopeStack,
    pub(super) externs: &'a ExternRegistry,
    pub(super) diag: &'a mut Diagnostics,
    pub(super) log: &'a mut SimLog,
    pub(super) process: &'a str,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        store: &'a StateStore,
        scopes: &'a mut ScopeStack,
        externs: &'a ExternRegistry,
        diag: &'a mut Diagnostics,
        log: &'a mut SimLog,
        process: &'a str,
    ) -> Self {
        Self {
            store,
            scopes,
            externs,
            diag,
            log,
            process,
        }
    }

    /// Evaluate a scalar expression.
    pub fn eval(&mut self, e: &ChpExpr) -> SimResult<Scalar> {
        match e {
            ChpExpr::Const(s) => Ok(*s),
            ChpExpr::Var(v) => {
                let slot = self.locate(v)?;
                self.read(slot, &v.name)
            }
            ChpExpr::Bitfield { var, lo, hi } => {
                let slot = self.locate(var)?;
                let src = self.read(slot, &var.name)?;
                Ok(self.bitfield(src, *lo, *hi, &var.name))
            }
            ChpExpr::Local(l) => self.read_local(l),
            ChpExpr::LocalBitfield { local, lo, hi } => {
                let src = self.read_local(local)?;
                Ok(self.bitfield(src, *lo, *hi, &local.name))
            }
            ChpExpr::Probe(c) => {
                let chan = self.store.chan(c.offset)?;
                Ok(Scalar::bit(match c.dir {
                    ChanDir::Input => chan.waiting_sender(),
                    ChanDir::Output => chan.waiting_receiver(),
                }))
            }
            ChpExpr::ChanValue(c) => {
                let chan = self.store.chan(c.offset)?;
                if chan.waiting_sender() {
                    chan.data2.as_scalar().ok_or_else(|| {
                        SimError::Malformed(format!("{}: structure value in scalar context", c.name))
                    })
                } else {
                    Ok(Scalar::new(0, c.width().max(1)))
                }
            }
            ChpExpr::Unary(op, a) => {
                let v = self.eval(a)?;
                Ok(unary(*op, v))
            }
            ChpExpr::Binary(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                Ok(self.binary(*op, l, r))
            }
            ChpExpr::Query(c, a, b) => {
                if self.eval(c)?.is_true() {
                    self.eval(a)
                } else {
                    self.eval(b)
                }
            }
            ChpExpr::Concat(items) => {
                let mut acc = Scalar::raw(0, 0);
                for item in items {
                    let v = self.eval(item)?;
                    let shifted = acc.value.checked_shl(v.width).unwrap_or(0);
                    acc = Scalar::raw(shifted | v.value, acc.width + v.width);
                }
                Ok(acc)
            }
            ChpExpr::BuiltinBool(a) => Ok(Scalar::bit(self.eval(a)?.is_true())),
            ChpExpr::BuiltinInt(a, w) => {
                let v = self.eval(a)?;
                match w {
                    // No width selects the low bit.
                    None => Ok(v.truncate(1)),
                    Some(w) => {
                        let w = self.eval(w)?.value as i64;
                        Ok(match self.width(w) {
                            Some(w) => v.truncate(w),
                            None => Scalar::zero(),
                        })
                    }
                }
            }
            ChpExpr::Call(f, args) => {
                let v = self.call(f, args)?;
                v.as_scalar().ok_or_else(|| {
                    SimError::Malformed(format!(
                        "function {} returns a structure in scalar context",
                        f.name
                    ))
                })
            }
            ChpExpr::Struct(s) => Err(SimError::Malformed(format!(
                "{}: structure used in scalar context",
                s.name
            ))),
        }
    }

    /// Store slot of a scalar reference, applying its array index.
    pub fn locate(&mut self, v: &VarRef) -> SimResult<ScalarSlot> {
        match &v.index {
            None => Ok(v.slot),
            Some(ix) => {
                let n = self.element(ix, &v.name)?;
                Ok(v.slot.element(n, ix.int_stride, ix.bool_stride))
            }
        }
    }

    /// Element number selected by an array index, bounds-checked.
    pub fn element(&mut self, ix: &ArrayIndex, name: &str) -> SimResult<usize> {
        let mut indices: IndexVec = SmallVec::with_capacity(ix.indices.len());
        for e in &ix.indices {
            indices.push(self.eval(e)?.value as i64);
        }
        ix.range
            .offset(&indices)
            .ok_or_else(|| SimError::IndexOutOfBounds {
                ident: name.to_string(),
                indices,
                process: self.process.to_string(),
            })
    }

    /// Read a scalar from the store.
    pub fn read(&mut self, slot: ScalarSlot, name: &str) -> SimResult<Scalar> {
        match slot {
            ScalarSlot::Bool(off) => match self.store.get_bool(off)? {
                Logic::X => {
                    self.diag.warn(Warning::UndefinedBool {
                        process: self.process.to_string(),
                        ident: name.to_string(),
                    });
                    Ok(Scalar::zero())
                }
                b => Ok(Scalar::bit(b == Logic::One)),
            },
            ScalarSlot::Int(off, w) => Ok(Scalar::raw(self.store.get_int(off)?, w)),
        }
    }

    /// Render `log(...)` arguments.
    pub fn format_log(&mut self, items: &[LogItem]) -> SimResult<String> {
        let mut out = String::new();
        for item in items {
            match item {
                LogItem::Str(s) => out.push_str(s),
                LogItem::Expr(e) => {
                    let v = self.eval(e)?;
                    out.push_str(&(v.value & mask(v.width)).to_string());
                }
            }
        }
        Ok(out)
    }

    fn read_local(&mut self, l: &LocalRef) -> SimResult<Scalar> {
        self.scopes
            .top()?
            .read_scalar(&l.name, l.fields.start)
            .ok_or_else(|| SimError::Malformed(format!("local `{}` is not bound", l.name)))
    }

    fn bitfield(&mut self, src: Scalar, lo: u32, hi: u32, name: &str) -> Scalar {
        if hi >= src.width {
            self.diag.warn(Warning::BitfieldOverflow {
                process: self.process.to_string(),
                ident: name.to_string(),
                hi,
                width: src.width,
            });
        }
        match self.width(hi as i64 - lo as i64 + 1) {
            Some(w) => Scalar::new(src.value.checked_shr(lo).unwrap_or(0), w),
            None => Scalar::zero(),
        }
    }

    /// Validate a computed width, warning on non-positive values.
    fn width(&mut self, w: i64) -> Option<u32> {
        if w <= 0 {
            self.diag.warn(Warning::NonPositiveWidth {
                process: self.process.to_string(),
                width: w,
            });
            None
        } else {
            Some(w.min(u32::MAX as i64) as u32)
        }
    }

    fn binary(&mut self, op: BinOp, l: Scalar, r: Scalar) -> Scalar {
        let wmax = l.width.max(r.width);
        match op {
            BinOp::And => Scalar::raw(l.value & r.value, wmax),
            BinOp::Or => Scalar::raw(l.value | r.value, wmax),
            BinOp::Xor => Scalar::raw(l.value ^ r.value, wmax),
            BinOp::Add => Scalar::raw(l.value.wrapping_add(r.value), wmax.saturating_add(1)),
            BinOp::Sub => Scalar::raw(l.value.wrapping_sub(r.value), wmax.saturating_add(1)),
            BinOp::Mul => Scalar::raw(l.value.wrapping_mul(r.value), l.width.saturating_add(r.width)),
            BinOp::Div => {
                if r.value == 0 {
                    self.diag.warn(Warning::DivisionByZero {
                        process: self.process.to_string(),
                    });
                    Scalar::raw(0, l.width)
                } else {
                    Scalar::raw(l.value / r.value, l.width)
                }
            }
            BinOp::Mod => {
                if r.value == 0 {
                    self.diag.warn(Warning::ModuloByZero {
                        process: self.process.to_string(),
                    });
                    Scalar::raw(0, r.width)
                } else {
                    Scalar::raw(l.value % r.value, r.width)
                }
            }
            BinOp::Shl => {
                let growth = if r.width >= 32 {
                    u32::MAX
                } else {
                    (1u32 << r.width) - 1
                };
                Scalar::raw(shl(l.value, r.value), l.width.saturating_add(growth))
            }
            BinOp::Shr => Scalar::raw(shr(l.value, r.value), l.width),
            BinOp::Asr => Scalar::raw(asr(l.value, r.value, l.width), l.width),
            BinOp::Lt => Scalar::bit(l.value < r.value),
            BinOp::Gt => Scalar::bit(l.value > r.value),
            BinOp::Le => Scalar::bit(l.value <= r.value),
            BinOp::Ge => Scalar::bit(l.value >= r.value),
            BinOp::Eq => Scalar::bit(l.value == r.value),
            BinOp::Ne => Scalar::bit(l.value != r.value),
        }
    }
}

fn unary(op: UnOp, v: Scalar) -> Scalar {
    match op {
        UnOp::Not | UnOp::Complement => Scalar::raw(!v.value & mask(v.width), v.width),
        UnOp::Neg => {
            let modulus = if v.width >= 64 { 0 } else { 1u64 << v.width };
            Scalar::raw(modulus.wrapping_sub(v.value), v.width)
        }
    }
}

fn shl(v: u64, by: u64) -> u64 {
    if by >= 64 {
        0
    } else {
        v << by
    }
}

fn shr(v: u64, by: u64) -> u64 {
    if by >= 64 {
        0
    } else {
        v >> by
    }
}

/// Arithmetic shift right within `width` bits.
fn asr(v: u64, by: u64, width: u32) -> u64 {
    if width == 0 {
        return 0;
    }
    let negative = (v >> (width - 1).min(63)) & 1 == 1;
    if !negative {
        return shr(v, by);
    }
    if by >= width as u64 {
        return mask(width);
    }
    let fill = mask(by as u32) << (width as u64 - by);
    shr(v, by) | fill
}
