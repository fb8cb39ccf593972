use std::fmt::{self, Display};
use std::rc::Rc;

/// Source location of a form, 1-based. The reader owns the only mutable
/// cursor; nodes receive copies taken at the first character of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub row: u32,
    pub column: u32,
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Atom(Rc<AtomNode>),
    List(Rc<ListNode>),
}

#[derive(Debug)]
pub struct AtomNode {
    pub name: String,
    /// Written as a quoted string literal, as opposed to a bare token.
    pub quoted: bool,
    pub position: Position,
}

#[derive(Debug)]
pub struct ListNode {
    pub items: Vec<Node>,
    pub position: Position,
}

impl Node {
    pub fn position(&self) -> Position {
        match self {
            Node::Atom(atom) => atom.position,
            Node::List(list) => list.position,
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Atom(atom) => write!(f, "{}", atom),
            Node::List(list) => write!(f, "{}", list),
        }
    }
}

impl Display for AtomNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.quoted {
            write!(f, "\"")?;
            for char in self.name.chars() {
                match char {
                    '"' => write!(f, "\\\"")?,
                    '\\' => write!(f, "\\\\")?,
                    '\n' => write!(f, "\\n")?,
                    '\t' => write!(f, "\\t")?,
                    '\r' => write!(f, "\\r")?,
                    c => write!(f, "{}", c)?,
                }
            }
            write!(f, "\"")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl Display for ListNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        let mut items = self.items.iter();
        if let Some(item) = items.next() {
            write!(f, "{}", item)?;
        }
        for item in items {
            write!(f, " {}", item)?;
        }
        write!(f, ")")
    }
}
