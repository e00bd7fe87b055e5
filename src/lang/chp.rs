//! Structured CHP statement trees.

use super::expr::{Expr, Id};

/// A string literal or expression passed to `log(...)`.
#[derive(Debug, Clone, PartialEq)]
pub enum LogArg {
    Str(String),
    Expr(Expr),
}

/// A guard and the statement it protects.
///
/// A `None` guard is the `else` arm.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedCmd {
    pub guard: Option<Expr>,
    pub body: Option<Chp>,
    /// Replication variable for `(i : lo..hi : G -> S)` forms that the
    /// front end did not expand.
    pub replicator: Option<String>,
}

impl GuardedCmd {
    pub fn new(guard: Expr, body: Chp) -> Self {
        Self {
            guard: Some(guard),
            body: Some(body),
            replicator: None,
        }
    }

    /// Guard with an empty (skip) body.
    pub fn skip(guard: Expr) -> Self {
        Self {
            guard: Some(guard),
            body: None,
            replicator: None,
        }
    }

    /// The `else` arm.
    pub fn otherwise(body: Option<Chp>) -> Self {
        Self {
            guard: None,
            body,
            replicator: None,
        }
    }
}

/// A CHP statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Chp {
    /// `S1; S2; ...`
    Seq(Vec<Chp>),
    /// `S1, S2, ...`
    Par(Vec<Chp>),
    /// `[G1 -> S1 [] G2 -> S2]`
    Select(Vec<GuardedCmd>),
    /// `[G1 -> S1 | G2 -> S2]`
    SelectNondet(Vec<GuardedCmd>),
    /// `*[G1 -> S1 [] G2 -> S2]`
    Loop(Vec<GuardedCmd>),
    /// `*[S <- G]`
    DoLoop(Box<GuardedCmd>),
    Skip,
    Assign(Id, Expr),
    /// `C!e`, or a bare `C!` dataless send.
    Send(Id, Option<Expr>),
    /// `C?x`, or a bare `C?` dataless receive.
    Recv(Id, Option<Id>),
    /// Built-in procedure call such as `log(...)`.
    Call(String, Vec<LogArg>),
}

impl Chp {
    pub fn assign(id: Id, e: Expr) -> Self {
        Chp::Assign(id, e)
    }

    pub fn send(chan: &str, e: Expr) -> Self {
        Chp::Send(Id::new(chan), Some(e))
    }

    pub fn recv(chan: &str, target: &str) -> Self {
        Chp::Recv(Id::new(chan), Some(Id::new(target)))
    }

    pub fn log(args: Vec<LogArg>) -> Self {
        Chp::Call("log".to_string(), args)
    }

    /// `*[ body ]`, an unconditional infinite loop.
    pub fn forever(body: Chp) -> Self {
        Chp::Loop(vec![GuardedCmd::new(Expr::True, body)])
    }
}
