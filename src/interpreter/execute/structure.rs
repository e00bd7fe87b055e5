//! Structure (aggregate) evaluation and state writes.

use crate::interpreter::compile::{ChpExpr, StructRef};
use crate::interpreter::traits::{SimError, SimResult};
use crate::interpreter::value::{Aggregate, Scalar, Value};
use crate::lang::DataType;
use crate::state::{Logic, ScalarSlot, StateStore};

use super::scalar::Evaluator;

impl<'a> Evaluator<'a> {
    /// Evaluate a structure-valued expression.
    pub fn eval_struct(&mut self, e: &ChpExpr) -> SimResult<Aggregate> {
        match e {
            ChpExpr::Struct(s) => {
                let slots = self.locate_struct(s)?;
                let fields = slots
                    .iter()
                    .map(|slot| self.read(*slot, &s.name))
                    .collect::<SimResult<Vec<_>>>()?;
                Ok(Aggregate::new(fields))
            }
            ChpExpr::Local(l) => {
                let fields = self
                    .scopes
                    .top()?
                    .read(&l.name, l.fields.clone())
                    .ok_or_else(|| SimError::Malformed(format!("local `{}` is not bound", l.name)))?;
                Ok(Aggregate::new(fields))
            }
            ChpExpr::ChanValue(c) => {
                let chan = self.store.chan(c.offset)?;
                if chan.waiting_sender() {
                    return chan.data2.as_aggregate().cloned().ok_or_else(|| {
                        SimError::Malformed(format!("{}: scalar value in structure context", c.name))
                    });
                }
                match &c.data {
                    DataType::Struct(ty) => Ok(Aggregate::new(
                        ty.flatten()
                            .into_iter()
                            .map(|k| Scalar::new(0, k.width()))
                            .collect(),
                    )),
                    _ => Err(SimError::Malformed(format!(
                        "{}: scalar channel in structure context",
                        c.name
                    ))),
                }
            }
            ChpExpr::Call(f, args) => match self.call(f, args)? {
                Value::Aggregate(a) => Ok(a),
                Value::Scalar(_) => Err(SimError::Malformed(format!(
                    "function {} returns a scalar in structure context",
                    f.name
                ))),
            },
            _ => Err(SimError::Malformed(
                "scalar expression in structure context".to_string(),
            )),
        }
    }

    /// Evaluate either kind of expression.
    pub fn eval_value(&mut self, e: &ChpExpr) -> SimResult<Value> {
        if e.is_aggregate() {
            Ok(Value::Aggregate(self.eval_struct(e)?))
        } else {
            Ok(Value::Scalar(self.eval(e)?))
        }
    }

    /// Store slots of every field of a structure reference.
    pub fn locate_struct(&mut self, s: &StructRef) -> SimResult<Vec<ScalarSlot>> {
        match &s.index {
            None => Ok(s.slots.clone()),
            Some(ix) => {
                let n = self.element(ix, &s.name)?;
                Ok(s
                    .slots
                    .iter()
                    .map(|slot| slot.element(n, ix.int_stride, ix.bool_stride))
                    .collect())
            }
        }
    }
}

/// Write a scalar, truncated to the slot's declared width.
pub fn write_scalar(store: &mut StateStore, slot: ScalarSlot, v: Scalar) -> SimResult<()> {
    match slot {
        ScalarSlot::Bool(off) => store.set_bool(off, Logic::from_bit(v.value)),
        ScalarSlot::Int(off, w) => store.set_int(off, v.truncate(w).value),
    }
}

/// Write an aggregate field by field.
pub fn write_fields(store: &mut StateStore, slots: &[ScalarSlot], values: &Aggregate) -> SimResult<()> {
    if slots.len() != values.fields.len() {
        return Err(SimError::Malformed(format!(
            "structure assignment of {} fields into {}",
            values.fields.len(),
            slots.len()
        )));
    }
    for (slot, v) in slots.iter().zip(&values.fields) {
        write_scalar(store, *slot, *v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::interpreter::compile::ArrayIndex;
    use crate::interpreter::diagnostics::{Diagnostics, SimLog};
    use crate::interpreter::execute::{ExternRegistry, ScopeStack};
    use crate::lang::StructType;
    use crate::state::{field_slots, ArrayRange};

    fn pair() -> Rc<StructType> {
        Rc::new(StructType::new(
            "pair",
            vec![("v", DataType::Int(6)), ("ok", DataType::Bool)],
        ))
    }

    #[test]
    fn test_struct_array_round_trip() {
        let mut store = StateStore::new();
        let ty = pair();
        let int_base = store.alloc_ints(3);
        let bool_base = store.alloc_bools(3);
        let r = StructRef {
            name: "top.p.s".to_string(),
            ty: Rc::clone(&ty),
            slots: field_slots(&ty, int_base, bool_base),
            index: Some(Box::new(ArrayIndex {
                range: ArrayRange::linear(3),
                indices: vec![ChpExpr::Const(Scalar::new(2, 2))],
                int_stride: 1,
                bool_stride: 1,
            })),
            shared: false,
        };

        let mut scopes = ScopeStack::new();
        let externs = ExternRegistry::new();
        let mut diag = Diagnostics::new();
        let mut log = SimLog::new();

        let slots = Evaluator::new(&store, &mut scopes, &externs, &mut diag, &mut log, "top.p")
            .locate_struct(&r)
            .unwrap();
        write_fields(
            &mut store,
            &slots,
            &Aggregate::new(vec![Scalar::new(45, 6), Scalar::bit(true)]),
        )
        .unwrap();
        assert_eq!(store.get_bool(bool_base.at(2)).unwrap(), Logic::One);

        let back = Evaluator::new(&store, &mut scopes, &externs, &mut diag, &mut log, "top.p")
            .eval_struct(&ChpExpr::Struct(r))
            .unwrap();
        assert_eq!(back.fields, vec![Scalar::new(45, 6), Scalar::bit(true)]);
        assert_eq!(store.get_int(int_base.at(2)).unwrap(), 45);
        assert_eq!(diag.count(), 0);
    }

    #[test]
    fn test_write_scalar_truncates() {
        let mut store = StateStore::new();
        let off = store.alloc_ints(1);
        let slot = ScalarSlot::Int(off, 4);
        write_scalar(&mut store, slot, Scalar::raw(16, 5)).unwrap();
        assert_eq!(store.get_int(off).unwrap(), 0);

        let b = store.alloc_bools(1);
        write_scalar(&mut store, ScalarSlot::Bool(b), Scalar::bit(true)).unwrap();
        assert_eq!(store.get_bool(b).unwrap(), Logic::One);
    }

    #[test]
    fn test_field_count_mismatch() {
        let mut store = StateStore::new();
        let off = store.alloc_ints(1);
        let err = write_fields(
            &mut store,
            &[ScalarSlot::Int(off, 4)],
            &Aggregate::new(vec![Scalar::zero(), Scalar::zero()]),
        );
        assert!(matches!(err, Err(SimError::Malformed(_))));
    }
}
