//! Variable layout.
//!
//! Maps the identifiers visible inside a process instance onto flat offsets
//! in the [`StateStore`]. Structures are flattened: integer fields sit
//! consecutively from an integer base, boolean fields from a boolean base,
//! and arrays of structures advance both bases by a per-element stride.
//!
//! # Example
//!
//! ```ignore
//! let mut store = StateStore::new();
//! let mut layout = ProcessLayout::new("top.buf", "buffer");
//! layout.declare_int(&mut store, "x", 8, false);
//! let c = layout.declare_chan(&mut store, "L", DataType::Int(8), ChanDir::Input);
//!
//! // Another instance sees the same channel from the other end.
//! let mut peer = ProcessLayout::new("top.src", "source");
//! peer.bind("R", Symbol::chan(c, ChanDir::Output, DataType::Int(8)));
//! ```

use std::collections::HashMap;
use std::rc::Rc;

use super::channel::{ChanDir, ChannelState};
use super::store::{BoolOffset, ChanOffset, IntOffset, StateStore};
use crate::lang::{DataType, FieldKind, StructType};

/// Declared index ranges of an array, inclusive on both ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayRange {
    dims: Vec<(i64, i64)>,
}

impl ArrayRange {
    pub fn new(dims: Vec<(i64, i64)>) -> Self {
        Self { dims }
    }

    /// One-dimensional `[0..n-1]`.
    pub fn linear(n: usize) -> Self {
        Self::new(vec![(0, n as i64 - 1)])
    }

    pub fn dims(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.dims
            .iter()
            .map(|(lo, hi)| (hi - lo + 1).max(0) as usize)
            .product()
    }

    /// Row-major element number for `indices`, or `None` when any index is
    /// outside its range or the dimension count is wrong.
    pub fn offset(&self, indices: &[i64]) -> Option<usize> {
        if indices.len() != self.dims.len() {
            return None;
        }
        let mut off = 0usize;
        for (&idx, &(lo, hi)) in indices.iter().zip(&self.dims) {
            if idx < lo || idx > hi {
                return None;
            }
            off = off * (hi - lo + 1) as usize + (idx - lo) as usize;
        }
        Some(off)
    }
}

/// Location of one scalar in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarSlot {
    Bool(BoolOffset),
    Int(IntOffset, u32),
}

impl ScalarSlot {
    pub fn width(self) -> u32 {
        match self {
            ScalarSlot::Bool(_) => 1,
            ScalarSlot::Int(_, w) => w,
        }
    }

    /// Same slot in array element `n`, given per-element strides.
    pub fn element(self, n: usize, int_stride: usize, bool_stride: usize) -> Self {
        match self {
            ScalarSlot::Bool(b) => ScalarSlot::Bool(b.at(n * bool_stride)),
            ScalarSlot::Int(i, w) => ScalarSlot::Int(i.at(n * int_stride), w),
        }
    }
}

/// Flattened field slots of a structure stored at the given bases.
pub fn field_slots(ty: &StructType, int_base: IntOffset, bool_base: BoolOffset) -> Vec<ScalarSlot> {
    let (mut ni, mut nb) = (0, 0);
    ty.flatten()
        .into_iter()
        .map(|kind| match kind {
            FieldKind::Int(w) => {
                ni += 1;
                ScalarSlot::Int(int_base.at(ni - 1), w)
            }
            FieldKind::Bool => {
                nb += 1;
                ScalarSlot::Bool(bool_base.at(nb - 1))
            }
        })
        .collect()
}

/// What an identifier refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Bool {
        offset: BoolOffset,
        shared: bool,
    },
    Int {
        offset: IntOffset,
        width: u32,
        shared: bool,
    },
    BoolArray {
        base: BoolOffset,
        range: ArrayRange,
        shared: bool,
    },
    IntArray {
        base: IntOffset,
        width: u32,
        range: ArrayRange,
        shared: bool,
    },
    Struct {
        ty: Rc<StructType>,
        int_base: IntOffset,
        bool_base: BoolOffset,
        shared: bool,
    },
    StructArray {
        ty: Rc<StructType>,
        int_base: IntOffset,
        bool_base: BoolOffset,
        range: ArrayRange,
        shared: bool,
    },
    Chan {
        offset: ChanOffset,
        dir: ChanDir,
        data: DataType,
    },
}

impl Symbol {
    pub fn chan(offset: ChanOffset, dir: ChanDir, data: DataType) -> Self {
        Symbol::Chan { offset, dir, data }
    }

    /// Same symbol, marked visible to other processes.
    pub fn shared(mut self) -> Self {
        match &mut self {
            Symbol::Bool { shared, .. }
            | Symbol::Int { shared, .. }
            | Symbol::BoolArray { shared, .. }
            | Symbol::IntArray { shared, .. }
            | Symbol::Struct { shared, .. }
            | Symbol::StructArray { shared, .. } => *shared = true,
            Symbol::Chan { .. } => {}
        }
        self
    }
}

/// Identifier resolution for one process instance.
pub trait LayoutResolver {
    /// Fully-qualified instance name, used to qualify identifiers.
    fn instance_name(&self) -> &str;

    /// Process type name, used for cost lookups.
    fn type_name(&self) -> &str;

    /// Symbol bound to `name`.
    fn lookup(&self, name: &str) -> Option<&Symbol>;

    /// Every bound symbol.
    fn symbols(&self) -> Vec<(&str, &Symbol)>;
}

/// Table-driven layout for one process instance.
#[derive(Debug, Clone)]
pub struct ProcessLayout {
    instance: String,
    type_name: String,
    symbols: HashMap<String, Symbol>,
}

impl ProcessLayout {
    pub fn new(instance: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            type_name: type_name.into(),
            symbols: HashMap::new(),
        }
    }

    /// Bind `name` to an existing symbol, e.g. one declared by another
    /// process instance.
    pub fn bind(&mut self, name: &str, sym: Symbol) {
        self.symbols.insert(name.to_string(), sym);
    }

    pub fn symbol(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).cloned()
    }

    pub fn declare_bool(&mut self, store: &mut StateStore, name: &str, shared: bool) -> BoolOffset {
        let offset = store.alloc_bools(1);
        self.bind(name, Symbol::Bool { offset, shared });
        offset
    }

    pub fn declare_int(
        &mut self,
        store: &mut StateStore,
        name: &str,
        width: u32,
        shared: bool,
    ) -> IntOffset {
        let offset = store.alloc_ints(1);
        self.bind(name, Symbol::Int { offset, width, shared });
        offset
    }

    pub fn declare_bool_array(
        &mut self,
        store: &mut StateStore,
        name: &str,
        range: ArrayRange,
        shared: bool,
    ) -> BoolOffset {
        let base = store.alloc_bools(range.size());
        self.bind(name, Symbol::BoolArray { base, range, shared });
        base
    }

    pub fn declare_int_array(
        &mut self,
        store: &mut StateStore,
        name: &str,
        width: u32,
        range: ArrayRange,
        shared: bool,
    ) -> IntOffset {
        let base = store.alloc_ints(range.size());
        self.bind(name, Symbol::IntArray { base, width, range, shared });
        base
    }

    pub fn declare_struct(
        &mut self,
        store: &mut StateStore,
        name: &str,
        ty: &Rc<StructType>,
    ) -> (IntOffset, BoolOffset) {
        let (ni, nb) = ty.counts();
        let int_base = store.alloc_ints(ni);
        let bool_base = store.alloc_bools(nb);
        self.bind(
            name,
            Symbol::Struct {
                ty: Rc::clone(ty),
                int_base,
                bool_base,
                shared: false,
            },
        );
        (int_base, bool_base)
    }

    pub fn declare_struct_array(
        &mut self,
        store: &mut StateStore,
        name: &str,
        ty: &Rc<StructType>,
        range: ArrayRange,
    ) -> (IntOffset, BoolOffset) {
        let (ni, nb) = ty.counts();
        let n = range.size();
        let int_base = store.alloc_ints(ni * n);
        let bool_base = store.alloc_bools(nb * n);
        self.bind(
            name,
            Symbol::StructArray {
                ty: Rc::clone(ty),
                int_base,
                bool_base,
                range,
                shared: false,
            },
        );
        (int_base, bool_base)
    }

    /// Allocate a channel and bind it with direction `dir` in this instance.
    pub fn declare_chan(
        &mut self,
        store: &mut StateStore,
        name: &str,
        data: DataType,
        dir: ChanDir,
    ) -> ChanOffset {
        let qualified = format!("{}.{}", self.instance, name);
        let offset = store.alloc_chan(ChannelState::new(qualified, data.width()));
        self.bind(name, Symbol::chan(offset, dir, data));
        offset
    }
}

impl LayoutResolver for ProcessLayout {
    fn instance_name(&self) -> &str {
        &self.instance
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    fn symbols(&self) -> Vec<(&str, &Symbol)> {
        let mut all: Vec<_> = self.symbols.iter().map(|(k, v)| (k.as_str(), v)).collect();
        all.sort_by(|a, b| a.0.cmp(b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_offset_row_major() {
        let r = ArrayRange::new(vec![(0, 2), (1, 4)]);
        assert_eq!(r.size(), 12);
        assert_eq!(r.offset(&[0, 1]), Some(0));
        assert_eq!(r.offset(&[0, 4]), Some(3));
        assert_eq!(r.offset(&[2, 4]), Some(11));
        assert_eq!(r.offset(&[3, 1]), None);
        assert_eq!(r.offset(&[0, 0]), None);
        assert_eq!(r.offset(&[0]), None);
    }

    #[test]
    fn test_struct_field_slots() {
        let ty = StructType::new(
            "t",
            vec![
                ("a", DataType::Int(8)),
                ("v", DataType::Bool),
                ("b", DataType::Int(3)),
            ],
        );
        let slots = field_slots(&ty, IntOffset(10), BoolOffset(4));
        assert_eq!(
            slots,
            vec![
                ScalarSlot::Int(IntOffset(10), 8),
                ScalarSlot::Bool(BoolOffset(4)),
                ScalarSlot::Int(IntOffset(11), 3),
            ]
        );
        assert_eq!(slots[2].element(2, 2, 1), ScalarSlot::Int(IntOffset(15), 3));
    }

    #[test]
    fn test_declarations_allocate_storage() {
        let mut store = StateStore::new();
        let mut layout = ProcessLayout::new("top.p", "proc");
        layout.declare_int(&mut store, "x", 8, false);
        layout.declare_int_array(&mut store, "a", 4, ArrayRange::linear(5), false);
        let ty = Rc::new(StructType::new(
            "pair",
            vec![("x", DataType::Int(4)), ("ok", DataType::Bool)],
        ));
        layout.declare_struct_array(&mut store, "s", &ty, ArrayRange::linear(3));
        let c = layout.declare_chan(&mut store, "C", DataType::Int(8), ChanDir::Output);

        assert_eq!(store.int_count(), 1 + 5 + 3);
        assert_eq!(store.bool_count(), 3);
        assert_eq!(store.chan(c).unwrap().name, "top.p.C");
        assert_eq!(store.chan(c).unwrap().width, 8);
        assert!(matches!(layout.lookup("a"), Some(Symbol::IntArray { width: 4, .. })));
        assert_eq!(layout.type_name(), "proc");
        assert_eq!(layout.symbols().len(), 4);
    }

    #[test]
    fn test_bind_shared_channel() {
        let mut store = StateStore::new();
        let mut rx = ProcessLayout::new("rx", "sink");
        let c = rx.declare_chan(&mut store, "C", DataType::Int(4), ChanDir::Input);
        let mut tx = ProcessLayout::new("tx", "source");
        tx.bind("out", Symbol::chan(c, ChanDir::Output, DataType::Int(4)));
        assert_eq!(
            tx.lookup("out"),
            Some(&Symbol::Chan {
                offset: c,
                dir: ChanDir::Output,
                data: DataType::Int(4)
            })
        );
    }
}
