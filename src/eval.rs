use std::collections::HashSet;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::ast::{AtomNode, ListNode, Node};
use crate::builtins::{self, Builtin, Control};
use crate::entity::{ClosureData, Entity};
use crate::env::{Scope, Scopes};
use crate::error::{EvalError, EvalErrorKind};

/// Per-form evaluation outcome. A tail marker stands in for the value of a
/// self-call detected in tail position; it never escapes the call protocol,
/// because `evaluate_value` resolves stray markers with a plain call.
#[derive(Debug)]
pub enum Flow {
    Value(Entity),
    TailCall(PendingCall),
}

#[derive(Debug)]
pub struct PendingCall {
    closure: Rc<ClosureData>,
    node: Rc<ListNode>,
}

enum BodyOutcome {
    Return(Entity),
    Rebind(Vec<(String, Entity)>),
}

/// Owns the scope stack, the operator traceback, and the kill flag for one
/// evaluation of a batch of top-level forms.
pub struct Context {
    source: Rc<str>,
    scopes: Scopes,
    trace: Vec<Entity>,
    kill: Arc<AtomicBool>,
}

impl Context {
    pub fn new(source: &str, kill: Arc<AtomicBool>) -> Self {
        Context {
            source: Rc::from(source),
            scopes: Scopes::new(builtins::base_scope()),
            trace: Vec::new(),
            kill,
        }
    }

    /// Evaluates top-level forms in order, stopping at the first error.
    pub fn evaluate_program(&mut self, nodes: &[Node]) -> Result<Vec<Entity>, EvalError> {
        nodes.iter().map(|node| self.evaluate_value(node)).collect()
    }

    pub fn evaluate(&mut self, node: &Node) -> Result<Flow, EvalError> {
        self.check_kill()?;
        match node {
            Node::Atom(atom) => {
                let value = self.resolve_atom(atom).ok_or_else(|| {
                    self.unknown_identifier(atom)
                })?;
                Ok(Flow::Value(value))
            }
            Node::List(list) => self.evaluate_list(list),
        }
    }

    pub(crate) fn evaluate_value(&mut self, node: &Node) -> Result<Entity, EvalError> {
        match self.evaluate(node)? {
            Flow::Value(value) => Ok(value),
            // A self-call outside tail position still has to produce a value.
            Flow::TailCall(pending) => self.call(&pending.closure, &pending.node),
        }
    }

    fn evaluate_list(&mut self, list: &Rc<ListNode>) -> Result<Flow, EvalError> {
        let head = list.items.first().ok_or_else(|| {
            self.error(
                EvalErrorKind::StructuralError,
                format!("empty list at {} cannot be evaluated", list.position),
            )
        })?;

        // A list head is evaluated to support computed operators; an atom
        // head must be a bound name, literal parsing does not apply.
        let operator = match head {
            Node::List(_) => self.evaluate_value(head)?,
            Node::Atom(atom) => self
                .scopes
                .lookup(&atom.name)
                .ok_or_else(|| self.unknown_identifier(atom))?,
        };

        if let Entity::Closure(closure) = &operator {
            if self.is_tail_call(closure) {
                return Ok(Flow::TailCall(PendingCall {
                    closure: Rc::clone(closure),
                    node: Rc::clone(list),
                }));
            }
        }

        self.trace.push(operator.clone());
        let outcome = self.reduce(&operator, list);
        self.trace.pop();
        outcome
    }

    fn reduce(&mut self, operator: &Entity, node: &Rc<ListNode>) -> Result<Flow, EvalError> {
        match operator {
            Entity::Builtin(builtin) => builtin.reduce(self, node),
            Entity::Closure(closure) => self.call(closure, node).map(Flow::Value),
            other => Err(self.error(
                EvalErrorKind::TypeMismatch,
                format!("{} is not callable in {}", other, node),
            )),
        }
    }

    /// A call is tail-recursive when the operator currently on top of the
    /// traceback is the same closure, or the top is `if` and the frame just
    /// below it is the same closure. Deeper nesting is deliberately not
    /// optimized.
    fn is_tail_call(&self, closure: &Rc<ClosureData>) -> bool {
        let same = |frame: &Entity| matches!(frame, Entity::Closure(c) if Rc::ptr_eq(c, closure));
        match self.trace.last() {
            Some(Entity::Builtin(Builtin::Control(Control::If))) => {
                self.trace.len() >= 2 && same(&self.trace[self.trace.len() - 2])
            }
            Some(frame) => same(frame),
            None => false,
        }
    }

    /// Shared resolution predicate. Runtime identifier lookup and capture
    /// analysis both go through here, so the two cannot drift apart.
    fn resolve_atom(&self, atom: &AtomNode) -> Option<Entity> {
        if atom.quoted {
            return Some(Entity::make_string(atom.name.clone()));
        }
        self.scopes.lookup(&atom.name).or_else(|| literal(atom))
    }

    fn unknown_identifier(&self, atom: &AtomNode) -> EvalError {
        self.error(
            EvalErrorKind::UnknownIdentifier,
            format!("unknown identifier '{}' at {}", atom.name, atom.position),
        )
    }

    pub(crate) fn reduce_if(&mut self, node: &Rc<ListNode>) -> Result<Flow, EvalError> {
        if node.items.len() != 4 {
            return Err(self.error(
                EvalErrorKind::ArityMismatch,
                format!(
                    "operator 'if' needs exactly 3 operands, got {}",
                    node.items.len() - 1
                ),
            ));
        }
        match self.evaluate_value(&node.items[1])? {
            Entity::Bool(true) => self.evaluate(&node.items[2]),
            Entity::Bool(false) => self.evaluate(&node.items[3]),
            other => Err(self.error(
                EvalErrorKind::TypeMismatch,
                format!(
                    "predicate {} should be bool, got {}",
                    node.items[1],
                    other.type_name()
                ),
            )),
        }
    }

    pub(crate) fn reduce_define(&mut self, node: &Rc<ListNode>) -> Result<Entity, EvalError> {
        if node.items.len() < 3 {
            return Err(self.error(
                EvalErrorKind::StructuralError,
                format!("'define' needs a name and a body in {}", node),
            ));
        }
        match &node.items[1] {
            Node::Atom(name) => {
                let value = self.define_value(&node.items[2..])?;
                self.scopes.define(name.name.clone(), value);
            }
            Node::List(signature) => {
                let closure = self.build_closure(node, signature, true)?;
                let name = closure.name.clone();
                self.scopes.define(name, Entity::Closure(closure));
            }
        }
        Ok(Entity::Null)
    }

    pub(crate) fn reduce_lambda(&mut self, node: &Rc<ListNode>) -> Result<Entity, EvalError> {
        if node.items.len() < 3 {
            return Err(self.error(
                EvalErrorKind::StructuralError,
                format!("'lambda' needs a parameter list and a body in {}", node),
            ));
        }
        match &node.items[1] {
            Node::List(params) => {
                let closure = self.build_closure(node, params, false)?;
                Ok(Entity::Closure(closure))
            }
            Node::Atom(_) => Err(self.error(
                EvalErrorKind::StructuralError,
                "the second parameter of 'lambda' should be a list".to_string(),
            )),
        }
    }

    /// Value form of `define`: the body runs in a scope of its own, so inner
    /// definitions do not leak into the surrounding one. With several forms,
    /// the first non-null result wins, like a function body.
    fn define_value(&mut self, forms: &[Node]) -> Result<Entity, EvalError> {
        self.scopes.push(Scope::new());
        let outcome = self.define_value_forms(forms);
        self.scopes.pop();
        outcome
    }

    fn define_value_forms(&mut self, forms: &[Node]) -> Result<Entity, EvalError> {
        if let [form] = forms {
            return self.evaluate_value(form);
        }
        for form in forms {
            let value = self.evaluate_value(form)?;
            if !value.is_null() {
                return Ok(value);
            }
        }
        Err(self.error(
            EvalErrorKind::MissingFunctionBody,
            "'define' body produced no value".to_string(),
        ))
    }

    fn build_closure(
        &self,
        node: &Rc<ListNode>,
        signature: &ListNode,
        named: bool,
    ) -> Result<Rc<ClosureData>, EvalError> {
        let (name, param_atoms) = if named {
            match signature.items.first() {
                Some(Node::Atom(atom)) => (atom.name.clone(), &signature.items[1..]),
                _ => {
                    return Err(self.error(
                        EvalErrorKind::StructuralError,
                        format!("function name must be an identifier in {}", node),
                    ))
                }
            }
        } else {
            ("lambda".to_string(), &signature.items[..])
        };

        let mut params = Vec::with_capacity(param_atoms.len());
        for param in param_atoms {
            match param {
                Node::Atom(atom) => params.push(Rc::clone(atom)),
                Node::List(_) => {
                    return Err(self.error(
                        EvalErrorKind::StructuralError,
                        format!("parameter of '{}' must be an identifier", name),
                    ))
                }
            }
        }

        let mut bound = HashSet::new();
        let captured = self.capture(node, &mut bound)?;
        Ok(Rc::new(ClosureData {
            name,
            node: Rc::clone(node),
            captured,
            params,
        }))
    }

    /// Definition-time free-variable analysis. The bound set is seeded with
    /// every atom of the signature, function name included, so self-calls
    /// resolve dynamically instead of being captured. Each free name is
    /// snapshotted once, at its current value.
    fn capture(
        &self,
        func_node: &ListNode,
        bound: &mut HashSet<String>,
    ) -> Result<Scope, EvalError> {
        let mut captured = Scope::new();
        if let Some(Node::List(signature)) = func_node.items.get(1) {
            for item in &signature.items {
                if let Node::Atom(atom) = item {
                    bound.insert(atom.name.clone());
                }
            }
        }

        for form in func_node.items.iter().skip(2) {
            match form {
                Node::Atom(atom) => self.capture_atom(atom, bound, &mut captured)?,
                Node::List(sub) => {
                    if let Some(introduced) = binder_name(sub) {
                        // The nested definition is visible to later sibling
                        // forms; the recursion gets an extended copy.
                        bound.insert(introduced.to_string());
                        let nested = self.capture(sub, &mut bound.clone())?;
                        for (name, value) in nested {
                            captured.insert(name, value);
                        }
                    } else {
                        self.capture_form_atoms(sub, bound, &mut captured)?;
                    }
                }
            }
        }
        Ok(captured)
    }

    fn capture_form_atoms(
        &self,
        list: &ListNode,
        bound: &HashSet<String>,
        captured: &mut Scope,
    ) -> Result<(), EvalError> {
        for item in &list.items {
            match item {
                Node::Atom(atom) => self.capture_atom(atom, bound, captured)?,
                Node::List(sub) => self.capture_form_atoms(sub, bound, captured)?,
            }
        }
        Ok(())
    }

    fn capture_atom(
        &self,
        atom: &AtomNode,
        bound: &HashSet<String>,
        captured: &mut Scope,
    ) -> Result<(), EvalError> {
        if self.is_free(atom, bound)? {
            if let Some(value) = self.scopes.lookup(&atom.name) {
                captured.insert(atom.name.clone(), value);
            }
        }
        Ok(())
    }

    fn is_free(&self, atom: &AtomNode, bound: &HashSet<String>) -> Result<bool, EvalError> {
        let unbound = !bound.contains(&atom.name) && !builtins::is_builtin(&atom.name);
        let resolvable = self.resolve_atom(atom).is_some();
        if unbound && !resolvable {
            return Err(self.error(
                EvalErrorKind::UsedBeforeDefined,
                format!(
                    "'{}' at {} is used before defined",
                    atom.name, atom.position
                ),
            ));
        }
        Ok(unbound && resolvable && literal(atom).is_none())
    }

    /// One call: BIND_ARGS, then loop { PUSH_SCOPES, EXEC_BODY, POP_SCOPES },
    /// where the loop only repeats for a tail self-call after rebinding the
    /// parameter scope in place. The pops run on every exit path.
    pub(crate) fn call(
        &mut self,
        closure: &Rc<ClosureData>,
        call_node: &ListNode,
    ) -> Result<Entity, EvalError> {
        let args = &call_node.items[1..];
        if args.len() != closure.params.len() {
            return Err(self.arity_mismatch(closure, args.len()));
        }

        // Arguments evaluate in the caller's scope.
        let mut params = Scope::new();
        for (param, arg) in closure.params.iter().zip(args) {
            let value = self.evaluate_value(arg)?;
            params.insert(param.name.clone(), value);
        }

        loop {
            self.scopes.push(params.clone());
            self.scopes.push(closure.captured.clone());
            let outcome = self.run_body(closure);
            self.scopes.pop();
            self.scopes.pop();

            match outcome? {
                BodyOutcome::Return(value) => return Ok(value),
                BodyOutcome::Rebind(bindings) => {
                    for (name, value) in bindings {
                        params.insert(name, value);
                    }
                }
            }
        }
    }

    fn run_body(&mut self, closure: &Rc<ClosureData>) -> Result<BodyOutcome, EvalError> {
        for form in closure.body() {
            match self.evaluate(form)? {
                Flow::Value(value) if value.is_null() => continue,
                Flow::Value(value) => return Ok(BodyOutcome::Return(value)),
                Flow::TailCall(pending) => {
                    debug_assert!(
                        Rc::ptr_eq(&pending.closure, closure),
                        "eval bug: tail marker crossed a call boundary"
                    );
                    let args = &pending.node.items[1..];
                    if args.len() != closure.params.len() {
                        return Err(self.arity_mismatch(closure, args.len()));
                    }
                    // The new bindings evaluate against the still-live
                    // scopes before any of them is applied.
                    let mut bindings = Vec::with_capacity(args.len());
                    for (param, arg) in closure.params.iter().zip(args) {
                        bindings.push((param.name.clone(), self.evaluate_value(arg)?));
                    }
                    return Ok(BodyOutcome::Rebind(bindings));
                }
            }
        }
        Err(self.error(
            EvalErrorKind::MissingFunctionBody,
            format!("function '{}' should produce a value", closure.name),
        ))
    }

    fn arity_mismatch(&self, closure: &ClosureData, got: usize) -> EvalError {
        self.error(
            EvalErrorKind::ArityMismatch,
            format!(
                "function '{}' takes {} arguments, got {}",
                closure.name,
                closure.params.len(),
                got
            ),
        )
    }

    fn check_kill(&self) -> Result<(), EvalError> {
        if self.kill.load(Ordering::Relaxed) {
            Err(self.error(EvalErrorKind::Killed, "killed".to_string()))
        } else {
            Ok(())
        }
    }

    pub(crate) fn error(&self, kind: EvalErrorKind, message: String) -> EvalError {
        EvalError {
            kind,
            message,
            trace: self.render_trace(),
        }
    }

    fn render_trace(&self) -> Vec<String> {
        self.trace
            .iter()
            .map(|frame| match frame {
                Entity::Closure(closure) => {
                    let row = closure.node.position.row as usize;
                    let line = self
                        .source
                        .lines()
                        .nth(row - 1)
                        .unwrap_or("")
                        .trim_end();
                    format!("  line {}, in <function '{}'>\n    {}", row, closure.name, line)
                }
                other => format!("  {}", other),
            })
            .collect()
    }
}

/// Literal classification of a bare token: the exact spellings `True` and
/// `False`, else a float.
fn literal(atom: &AtomNode) -> Option<Entity> {
    if atom.quoted {
        return Some(Entity::make_string(atom.name.clone()));
    }
    match atom.name.as_str() {
        "True" => Some(Entity::Bool(true)),
        "False" => Some(Entity::Bool(false)),
        name => name.parse::<f64>().ok().map(Entity::Number),
    }
}

/// For a `define`/`lambda` sub-form, the name it introduces into the
/// surrounding body.
fn binder_name(sub: &ListNode) -> Option<&str> {
    match sub.items.first() {
        Some(Node::Atom(head))
            if !head.quoted && (head.name == "define" || head.name == "lambda") =>
        {
            match sub.items.get(1)? {
                Node::Atom(named) => Some(&named.name),
                Node::List(signature) => match signature.items.first()? {
                    Node::Atom(first) => Some(&first.name),
                    Node::List(_) => None,
                },
            }
        }
        _ => None,
    }
}
