use im_rc::HashMap;

use crate::entity::Entity;

/// A single binding frame. The persistent map makes the captured-scope copy
/// taken on every trampoline turn an O(1) operation.
pub type Scope = HashMap<String, Entity>;

/// Ordered stack of scopes. The bottom scope is the immutable builtin
/// registry; above it sits the top-level scope that `define` writes into.
/// Neither of the two is ever popped.
#[derive(Debug)]
pub struct Scopes {
    stack: Vec<Scope>,
}

impl Scopes {
    pub fn new(base: Scope) -> Self {
        Scopes {
            stack: vec![base, Scope::new()],
        }
    }

    pub fn push(&mut self, scope: Scope) {
        self.stack.push(scope);
    }

    pub fn pop(&mut self) {
        debug_assert!(self.stack.len() > 2, "eval bug: tried to pop a base scope");
        self.stack.pop();
    }

    /// Binds a name in the innermost scope.
    pub fn define(&mut self, name: String, value: Entity) {
        self.stack
            .last_mut()
            .expect("eval bug: empty scope stack")
            .insert(name, value);
    }

    /// Scans innermost to outermost and returns the first match.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }
}
