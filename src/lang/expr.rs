//! Source expressions and identifiers.

use std::fmt;
use std::rc::Rc;

use super::types::Function;

/// One component of an identifier path.
#[derive(Debug, Clone, PartialEq)]
pub struct IdPart {
    /// Component name.
    pub name: String,
    /// Array index expressions, outermost dimension first.
    pub index: Vec<Expr>,
}

/// A possibly dotted and indexed identifier such as `buf[i].valid`.
#[derive(Debug, Clone, PartialEq)]
pub struct Id {
    pub parts: Vec<IdPart>,
}

impl Id {
    /// A plain, single-component identifier.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            parts: vec![IdPart {
                name: name.into(),
                index: Vec::new(),
            }],
        }
    }

    /// A single-component identifier with array indices.
    pub fn indexed(name: impl Into<String>, index: Vec<Expr>) -> Self {
        Self {
            parts: vec![IdPart {
                name: name.into(),
                index,
            }],
        }
    }

    /// Append a structure field access.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.parts.push(IdPart {
            name: name.into(),
            index: Vec::new(),
        });
        self
    }

    /// Name of the first component.
    pub fn root(&self) -> &str {
        self.parts.first().map(|p| p.name.as_str()).unwrap_or("")
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", part.name)?;
            for idx in &part.index {
                match idx {
                    Expr::Int(v) => write!(f, "[{}]", v)?,
                    Expr::Var(id) => write!(f, "[{}]", id)?,
                    _ => write!(f, "[..]")?,
                }
            }
        }
        Ok(())
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Logical/bitwise not (`~` on booleans, masked to width on integers).
    Not,
    /// Two's complement negation within the operand width.
    Neg,
    /// One's complement within the operand width.
    Complement,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// Left shift.
    Shl,
    /// Logical right shift.
    Shr,
    /// Arithmetic right shift.
    Asr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
}

impl BinOp {
    /// True for operators producing a single-bit result.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge | BinOp::Eq | BinOp::Ne
        )
    }

    /// Source spelling, used in debug output.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Asr => ">>>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
        }
    }
}

/// A source expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    True,
    False,
    Int(u64),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `c ? a : b`
    Query(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `{a, b, c}`, most significant operand first.
    Concat(Vec<Expr>),
    /// `x{hi..lo}`, or `x{hi}` when `lo` is absent.
    Bitfield {
        id: Id,
        lo: Option<u32>,
        hi: u32,
    },
    Var(Id),
    /// `#C`
    Probe(Id),
    /// Built-in `bool(x)`.
    BuiltinBool(Box<Expr>),
    /// Built-in `int(x)` / `int(x, w)`.
    BuiltinInt(Box<Expr>, Option<Box<Expr>>),
    Call(Rc<Function>, Vec<Expr>),
}

impl Expr {
    pub fn var(name: &str) -> Self {
        Expr::Var(Id::new(name))
    }

    pub fn probe(name: &str) -> Self {
        Expr::Probe(Id::new(name))
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn unary(op: UnOp, e: Expr) -> Self {
        Expr::Unary(op, Box::new(e))
    }

    pub fn query(cond: Expr, a: Expr, b: Expr) -> Self {
        Expr::Query(Box::new(cond), Box::new(a), Box::new(b))
    }

    pub fn call(func: &Rc<Function>, args: Vec<Expr>) -> Self {
        Expr::Call(Rc::clone(func), args)
    }
}
