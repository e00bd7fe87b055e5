//! Evaluated values.
//!
//! Every scalar carries its bit-width as data. Widths are recomputed by each
//! operation and only an assignment (or a port binding) truncates.

use std::fmt;

/// All-ones mask for `width` bits, saturating at 64.
#[inline]
pub fn mask(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// A scalar value with its bit-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scalar {
    pub value: u64,
    pub width: u32,
}

impl Scalar {
    /// Value masked to `width`.
    #[inline]
    pub fn new(value: u64, width: u32) -> Self {
        Self {
            value: value & mask(width),
            width,
        }
    }

    /// Value kept as-is, even if wider than `width`.
    #[inline]
    pub fn raw(value: u64, width: u32) -> Self {
        Self { value, width }
    }

    /// Single-bit value.
    #[inline]
    pub fn bit(b: bool) -> Self {
        Self {
            value: b as u64,
            width: 1,
        }
    }

    /// Width-1 zero.
    #[inline]
    pub fn zero() -> Self {
        Self::bit(false)
    }

    #[inline]
    pub fn is_true(self) -> bool {
        self.value != 0
    }

    /// Mask down to `width` and adopt it.
    #[inline]
    pub fn truncate(self, width: u32) -> Self {
        Self::new(self.value, width)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Flattened structure value, fields in port order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Aggregate {
    pub fields: Vec<Scalar>,
}

impl Aggregate {
    pub fn new(fields: Vec<Scalar>) -> Self {
        Self { fields }
    }
}

/// Either kind of evaluated value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Scalar(Scalar),
    Aggregate(Aggregate),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(Scalar::zero())
    }
}

impl Value {
    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Value::Scalar(s) => Some(*s),
            Value::Aggregate(_) => None,
        }
    }

    pub fn as_aggregate(&self) -> Option<&Aggregate> {
        match self {
            Value::Scalar(_) => None,
            Value::Aggregate(a) => Some(a),
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Aggregate> for Value {
    fn from(a: Aggregate) -> Self {
        Value::Aggregate(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask(0), 0);
        assert_eq!(mask(1), 1);
        assert_eq!(mask(4), 0xF);
        assert_eq!(mask(64), u64::MAX);
        assert_eq!(mask(200), u64::MAX);
    }

    #[test]
    fn test_scalar_truncate() {
        let s = Scalar::raw(16, 5);
        assert_eq!(s.truncate(4), Scalar::new(0, 4));
        assert_eq!(Scalar::new(0x1FF, 8).value, 0xFF);
        assert!(Scalar::bit(true).is_true());
        assert!(!Scalar::zero().is_true());
    }

    #[test]
    fn test_value_accessors() {
        let v: Value = Scalar::new(3, 2).into();
        assert_eq!(v.as_scalar(), Some(Scalar::new(3, 2)));
        assert!(v.as_aggregate().is_none());

        let a: Value = Aggregate::new(vec![Scalar::bit(true)]).into();
        assert!(a.as_scalar().is_none());
        assert_eq!(Value::default(), Value::Scalar(Scalar::zero()));
    }
}
