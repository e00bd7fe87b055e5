//! Data types and function declarations.

use std::rc::Rc;

use super::chp::Chp;

/// Kind and width of one flattened structure field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int(u32),
}

impl FieldKind {
    pub fn width(self) -> u32 {
        match self {
            FieldKind::Bool => 1,
            FieldKind::Int(w) => w,
        }
    }
}

/// Type of a variable, port or channel payload.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Bool,
    Int(u32),
    Struct(Rc<StructType>),
}

impl DataType {
    /// Width of a scalar type; structures report 0.
    pub fn width(&self) -> u32 {
        match self {
            DataType::Bool => 1,
            DataType::Int(w) => *w,
            DataType::Struct(_) => 0,
        }
    }
}

/// A user-defined structure (`deftype`).
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, DataType)>,
}

impl StructType {
    pub fn new(name: impl Into<String>, fields: Vec<(&str, DataType)>) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .into_iter()
                .map(|(n, t)| (n.to_string(), t))
                .collect(),
        }
    }

    /// All scalar fields in port order, nested structures expanded in place.
    pub fn flatten(&self) -> Vec<FieldKind> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<FieldKind>) {
        for (_, ty) in &self.fields {
            match ty {
                DataType::Bool => out.push(FieldKind::Bool),
                DataType::Int(w) => out.push(FieldKind::Int(*w)),
                DataType::Struct(s) => s.flatten_into(out),
            }
        }
    }

    /// Number of flattened scalar fields.
    pub fn field_count(&self) -> usize {
        self.fields
            .iter()
            .map(|(_, ty)| match ty {
                DataType::Struct(s) => s.field_count(),
                _ => 1,
            })
            .sum()
    }

    /// Number of integer and boolean scalars, in that order.
    pub fn counts(&self) -> (usize, usize) {
        self.flatten()
            .iter()
            .fold((0, 0), |(ni, nb), k| match k {
                FieldKind::Int(_) => (ni + 1, nb),
                FieldKind::Bool => (ni, nb + 1),
            })
    }

    /// Locate a field path.
    ///
    /// Returns the range of flattened field positions covered by the path
    /// together with the type found there.
    pub fn locate(&self, path: &[&str]) -> Option<(std::ops::Range<usize>, DataType)> {
        let (first, rest) = path.split_first()?;
        let mut pos = 0;
        for (name, ty) in &self.fields {
            let span = match ty {
                DataType::Struct(s) => s.field_count(),
                _ => 1,
            };
            if name == first {
                if rest.is_empty() {
                    return Some((pos..pos + span, ty.clone()));
                }
                let DataType::Struct(inner) = ty else {
                    return None;
                };
                let (range, found) = inner.locate(rest)?;
                return Some((pos + range.start..pos + range.end, found));
            }
            pos += span;
        }
        None
    }
}

/// A CHP function definition.
///
/// Functions without a body are external and resolved through the
/// external function registry at call time.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub ports: Vec<(String, DataType)>,
    pub locals: Vec<(String, DataType)>,
    pub ret: DataType,
    pub body: Option<Chp>,
}

impl Function {
    pub fn is_external(&self) -> bool {
        self.body.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet() -> StructType {
        let header = Rc::new(StructType::new(
            "hdr",
            vec![("valid", DataType::Bool), ("tag", DataType::Int(4))],
        ));
        StructType::new(
            "packet",
            vec![
                ("data", DataType::Int(8)),
                ("h", DataType::Struct(header)),
                ("last", DataType::Bool),
            ],
        )
    }

    #[test]
    fn test_flatten_order() {
        let p = packet();
        assert_eq!(
            p.flatten(),
            vec![
                FieldKind::Int(8),
                FieldKind::Bool,
                FieldKind::Int(4),
                FieldKind::Bool
            ]
        );
        assert_eq!(p.field_count(), 4);
        assert_eq!(p.counts(), (2, 2));
    }

    #[test]
    fn test_locate_nested() {
        let p = packet();
        let (range, ty) = p.locate(&["h", "tag"]).unwrap();
        assert_eq!(range, 2..3);
        assert_eq!(ty, DataType::Int(4));

        let (range, ty) = p.locate(&["h"]).unwrap();
        assert_eq!(range, 1..3);
        assert!(matches!(ty, DataType::Struct(_)));

        assert!(p.locate(&["missing"]).is_none());
        assert!(p.locate(&["data", "x"]).is_none());
    }
}
