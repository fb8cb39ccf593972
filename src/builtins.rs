use std::collections::HashMap;
use std::rc::Rc;

use lazy_static::lazy_static;

use crate::ast::{ListNode, Node};
use crate::entity::Entity;
use crate::env::Scope;
use crate::error::{EvalError, EvalErrorKind};
use crate::eval::{Context, Flow};

/// N-ary left fold with an identity element. `list` scans right-to-left to
/// build a right-nested cons chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    Add,
    Multiply,
    Strcat,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binary {
    Subtract,
    Divide,
    Equal,
    Less,
    Greater,
    Expt,
    Cons,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unary {
    Car,
    Cdr,
    Char,
}

/// Forms that control evaluation order or bind names instead of consuming
/// pre-evaluated operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    If,
    Define,
    Lambda,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Scan(Scan),
    Binary(Binary),
    Unary(Unary),
    Control(Control),
}

lazy_static! {
    static ref REGISTRY: HashMap<&'static str, Builtin> = {
        let mut table = HashMap::new();
        table.insert("+", Builtin::Scan(Scan::Add));
        table.insert("*", Builtin::Scan(Scan::Multiply));
        table.insert("strcat", Builtin::Scan(Scan::Strcat));
        table.insert("list", Builtin::Scan(Scan::List));
        table.insert("-", Builtin::Binary(Binary::Subtract));
        table.insert("/", Builtin::Binary(Binary::Divide));
        table.insert("=", Builtin::Binary(Binary::Equal));
        table.insert("<", Builtin::Binary(Binary::Less));
        table.insert(">", Builtin::Binary(Binary::Greater));
        table.insert("expt", Builtin::Binary(Binary::Expt));
        table.insert("cons", Builtin::Binary(Binary::Cons));
        table.insert("car", Builtin::Unary(Unary::Car));
        table.insert("cdr", Builtin::Unary(Unary::Cdr));
        table.insert("char", Builtin::Unary(Unary::Char));
        table.insert("if", Builtin::Control(Control::If));
        table.insert("define", Builtin::Control(Control::Define));
        table.insert("lambda", Builtin::Control(Control::Lambda));
        table
    };
}

pub fn is_builtin(name: &str) -> bool {
    name == "null" || REGISTRY.contains_key(name)
}

/// The immutable base scope injected into every evaluation context.
pub fn base_scope() -> Scope {
    let mut scope = Scope::new();
    scope.insert("null".to_string(), Entity::Null);
    for (name, builtin) in REGISTRY.iter() {
        scope.insert((*name).to_string(), Entity::Builtin(*builtin));
    }
    scope
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Scan(op) => op.name(),
            Builtin::Binary(op) => op.name(),
            Builtin::Unary(op) => op.name(),
            Builtin::Control(op) => op.name(),
        }
    }

    pub(crate) fn reduce(
        self,
        ctx: &mut Context,
        node: &Rc<ListNode>,
    ) -> Result<Flow, EvalError> {
        match self {
            Builtin::Scan(op) => op.reduce(ctx, node).map(Flow::Value),
            Builtin::Binary(op) => op.reduce(ctx, node).map(Flow::Value),
            Builtin::Unary(op) => op.reduce(ctx, node).map(Flow::Value),
            Builtin::Control(Control::If) => ctx.reduce_if(node),
            Builtin::Control(Control::Define) => ctx.reduce_define(node).map(Flow::Value),
            Builtin::Control(Control::Lambda) => ctx.reduce_lambda(node).map(Flow::Value),
        }
    }
}

impl Scan {
    fn name(self) -> &'static str {
        match self {
            Scan::Add => "+",
            Scan::Multiply => "*",
            Scan::Strcat => "strcat",
            Scan::List => "list",
        }
    }

    fn identity(self) -> Entity {
        match self {
            Scan::Add => Entity::Number(0.0),
            Scan::Multiply => Entity::Number(1.0),
            Scan::Strcat => Entity::make_string(""),
            Scan::List => Entity::Null,
        }
    }

    fn reversed(self) -> bool {
        matches!(self, Scan::List)
    }

    fn expects(self) -> &'static str {
        match self {
            Scan::Add | Scan::Multiply => "number",
            Scan::Strcat => "string",
            Scan::List => "value",
        }
    }

    fn accepts(self, value: &Entity) -> bool {
        match self {
            Scan::Add | Scan::Multiply => matches!(value, Entity::Number(_)),
            Scan::Strcat => matches!(value, Entity::Str(_)),
            Scan::List => true,
        }
    }

    fn step(self, acc: Entity, new: Entity) -> Entity {
        match (self, acc, new) {
            (Scan::Add, Entity::Number(a), Entity::Number(b)) => Entity::Number(a + b),
            (Scan::Multiply, Entity::Number(a), Entity::Number(b)) => Entity::Number(a * b),
            (Scan::Strcat, Entity::Str(a), Entity::Str(b)) => {
                Entity::make_string(format!("{}{}", a, b))
            }
            (Scan::List, acc, new) => Entity::Pair(Rc::new((new, acc))),
            _ => panic!("eval bug: scan operand changed type after the check"),
        }
    }

    fn reduce(self, ctx: &mut Context, node: &Rc<ListNode>) -> Result<Entity, EvalError> {
        let operands: Vec<&Node> = if self.reversed() {
            node.items[1..].iter().rev().collect()
        } else {
            node.items[1..].iter().collect()
        };

        let mut acc = self.identity();
        for operand in operands {
            let value = ctx.evaluate_value(operand)?;
            if !self.accepts(&value) {
                return Err(ctx.error(
                    EvalErrorKind::TypeMismatch,
                    format!(
                        "operator '{}' expected {}, got {} from {}",
                        self.name(),
                        self.expects(),
                        value.type_name(),
                        operand
                    ),
                ));
            }
            acc = self.step(acc, value);
        }
        Ok(acc)
    }
}

impl Binary {
    fn name(self) -> &'static str {
        match self {
            Binary::Subtract => "-",
            Binary::Divide => "/",
            Binary::Equal => "=",
            Binary::Less => "<",
            Binary::Greater => ">",
            Binary::Expt => "expt",
            Binary::Cons => "cons",
        }
    }

    fn accepts(self, left: &Entity, right: &Entity) -> bool {
        use Entity::{Bool, Null, Number, Str};
        match self {
            Binary::Subtract | Binary::Divide | Binary::Expt => {
                matches!((left, right), (Number(_), Number(_)))
            }
            Binary::Equal => matches!(
                (left, right),
                (Number(_), Number(_))
                    | (Str(_), Str(_))
                    | (Bool(_), Bool(_))
                    | (Null, _)
                    | (_, Null)
            ),
            Binary::Less | Binary::Greater => {
                matches!((left, right), (Number(_), Number(_)) | (Str(_), Str(_)))
            }
            Binary::Cons => true,
        }
    }

    fn step(self, left: Entity, right: Entity) -> Entity {
        use Entity::{Bool, Number, Str};
        match (self, left, right) {
            (Binary::Subtract, Number(a), Number(b)) => Number(a - b),
            (Binary::Divide, Number(a), Number(b)) => Number(a / b),
            (Binary::Expt, Number(a), Number(b)) => Number(a.powf(b)),
            (Binary::Equal, a, b) => Bool(a == b),
            (Binary::Less, Number(a), Number(b)) => Bool(a < b),
            (Binary::Less, Str(a), Str(b)) => Bool(a < b),
            (Binary::Greater, Number(a), Number(b)) => Bool(a > b),
            (Binary::Greater, Str(a), Str(b)) => Bool(a > b),
            (Binary::Cons, a, b) => Entity::Pair(Rc::new((a, b))),
            _ => panic!("eval bug: binary operand changed type after the check"),
        }
    }

    fn reduce(self, ctx: &mut Context, node: &Rc<ListNode>) -> Result<Entity, EvalError> {
        if node.items.len() != 3 {
            return Err(ctx.error(
                EvalErrorKind::ArityMismatch,
                format!(
                    "operator '{}' needs exactly 2 operands, got {}",
                    self.name(),
                    node.items.len() - 1
                ),
            ));
        }
        let left = ctx.evaluate_value(&node.items[1])?;
        let right = ctx.evaluate_value(&node.items[2])?;
        if !self.accepts(&left, &right) {
            return Err(ctx.error(
                EvalErrorKind::TypeMismatch,
                format!(
                    "operator '{}' got unexpected types {} and {} in {}",
                    self.name(),
                    left.type_name(),
                    right.type_name(),
                    node
                ),
            ));
        }
        Ok(self.step(left, right))
    }
}

impl Unary {
    fn name(self) -> &'static str {
        match self {
            Unary::Car => "car",
            Unary::Cdr => "cdr",
            Unary::Char => "char",
        }
    }

    fn expects(self) -> &'static str {
        match self {
            Unary::Car | Unary::Cdr => "pair",
            Unary::Char => "number",
        }
    }

    fn accepts(self, value: &Entity) -> bool {
        match self {
            Unary::Car | Unary::Cdr => matches!(value, Entity::Pair(_)),
            Unary::Char => matches!(value, Entity::Number(_)),
        }
    }

    fn step(self, value: &Entity) -> Option<Entity> {
        match (self, value) {
            (Unary::Car, Entity::Pair(pair)) => Some(pair.0.clone()),
            (Unary::Cdr, Entity::Pair(pair)) => Some(pair.1.clone()),
            (Unary::Char, Entity::Number(n)) => {
                // Truncated toward zero, like an integer cast.
                let code = n.trunc();
                if code < 0.0 || code > f64::from(u32::MAX) {
                    return None;
                }
                char::from_u32(code as u32).map(|c| Entity::make_string(c.to_string()))
            }
            _ => panic!("eval bug: unary operand changed type after the check"),
        }
    }

    fn reduce(self, ctx: &mut Context, node: &Rc<ListNode>) -> Result<Entity, EvalError> {
        if node.items.len() != 2 {
            return Err(ctx.error(
                EvalErrorKind::ArityMismatch,
                format!(
                    "operator '{}' needs exactly 1 operand, got {}",
                    self.name(),
                    node.items.len() - 1
                ),
            ));
        }
        let value = ctx.evaluate_value(&node.items[1])?;
        if !self.accepts(&value) {
            return Err(ctx.error(
                EvalErrorKind::TypeMismatch,
                format!(
                    "operator '{}' expected {}, got {} from {}",
                    self.name(),
                    self.expects(),
                    value.type_name(),
                    node.items[1]
                ),
            ));
        }
        self.step(&value).ok_or_else(|| {
            ctx.error(
                EvalErrorKind::TypeMismatch,
                format!(
                    "operator '{}' got an invalid code point from {}",
                    self.name(),
                    node.items[1]
                ),
            )
        })
    }
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Control::If => "if",
            Control::Define => "define",
            Control::Lambda => "lambda",
        }
    }
}
