use std::io::BufRead;
use std::rc::Rc;

use crate::ast::{AtomNode, ListNode, Node, Position};
use crate::error::SyntaxError;

/// Parses a document into its top-level forms. Characters are pulled lazily,
/// one buffered line at a time, so the whole input never has to be in memory.
pub fn parse<R: BufRead>(input: R) -> Result<Vec<Node>, SyntaxError> {
    let mut reader = Reader {
        cursor: Cursor::new(input)?,
    };
    let mut forms = Vec::new();
    loop {
        reader.skip_whitespace()?;
        match reader.cursor.current() {
            None => return Ok(forms),
            Some(')') => return Err(SyntaxError::UnmatchedClose(reader.cursor.position())),
            Some(_) => forms.push(reader.form()?),
        }
    }
}

/// Explicit cursor over the input: the source, the current line buffer, and
/// the row/column of the character under the cursor.
struct Cursor<R> {
    input: R,
    line: Vec<char>,
    row: u32,
    col: usize,
    eof: bool,
}

impl<R: BufRead> Cursor<R> {
    fn new(input: R) -> Result<Self, SyntaxError> {
        let mut cursor = Cursor {
            input,
            line: Vec::new(),
            row: 0,
            col: 0,
            eof: false,
        };
        cursor.next_line()?;
        Ok(cursor)
    }

    fn current(&self) -> Option<char> {
        if self.eof {
            None
        } else {
            self.line.get(self.col).copied()
        }
    }

    fn position(&self) -> Position {
        Position {
            row: self.row.max(1),
            column: self.col as u32 + 1,
        }
    }

    fn advance(&mut self) -> Result<(), SyntaxError> {
        self.col += 1;
        if self.col >= self.line.len() {
            self.next_line()?;
        }
        Ok(())
    }

    fn next_line(&mut self) -> Result<(), SyntaxError> {
        let mut buf = String::new();
        if self.input.read_line(&mut buf)? == 0 {
            self.eof = true;
        } else {
            self.row += 1;
            self.col = 0;
            self.line = buf.chars().collect();
        }
        Ok(())
    }
}

struct Reader<R> {
    cursor: Cursor<R>,
}

impl<R: BufRead> Reader<R> {
    fn skip_whitespace(&mut self) -> Result<(), SyntaxError> {
        while self.cursor.current().map_or(false, char::is_whitespace) {
            self.cursor.advance()?;
        }
        Ok(())
    }

    fn form(&mut self) -> Result<Node, SyntaxError> {
        match self.cursor.current() {
            Some('(') => self.list(),
            Some(quote @ ('"' | '\'')) => self.string(quote),
            _ => self.bare_atom(),
        }
    }

    fn list(&mut self) -> Result<Node, SyntaxError> {
        let position = self.cursor.position();
        self.cursor.advance()?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace()?;
            match self.cursor.current() {
                None => return Err(SyntaxError::UnexpectedEof(self.cursor.position())),
                Some(')') => {
                    self.cursor.advance()?;
                    return Ok(Node::List(Rc::new(ListNode { items, position })));
                }
                Some(_) => items.push(self.form()?),
            }
        }
    }

    /// A maximal run of characters up to whitespace or a parenthesis. Quote
    /// characters do not end a token already in progress.
    fn bare_atom(&mut self) -> Result<Node, SyntaxError> {
        let position = self.cursor.position();
        let mut name = String::new();
        while let Some(c) = self.cursor.current() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            name.push(c);
            self.cursor.advance()?;
        }
        Ok(Node::Atom(Rc::new(AtomNode {
            name,
            quoted: false,
            position,
        })))
    }

    fn string(&mut self, quote: char) -> Result<Node, SyntaxError> {
        let position = self.cursor.position();
        self.cursor.advance()?;
        let mut name = String::new();
        loop {
            match self.cursor.current() {
                None => return Err(SyntaxError::UnterminatedString(position)),
                Some(c) if c == quote => {
                    self.cursor.advance()?;
                    return Ok(Node::Atom(Rc::new(AtomNode {
                        name,
                        quoted: true,
                        position,
                    })));
                }
                Some('\\') => {
                    self.cursor.advance()?;
                    match self.cursor.current() {
                        None => return Err(SyntaxError::UnterminatedString(position)),
                        Some('n') => name.push('\n'),
                        Some('t') => name.push('\t'),
                        Some('r') => name.push('\r'),
                        // Unknown escapes pass the character through bare.
                        Some(c) => name.push(c),
                    }
                    self.cursor.advance()?;
                }
                Some(c) => {
                    name.push(c);
                    self.cursor.advance()?;
                }
            }
        }
    }
}

#[cfg(test)]
mod reader_tests {
    use super::*;

    fn parse_str(s: &str) -> Result<Vec<Node>, SyntaxError> {
        parse(s.as_bytes())
    }

    fn render(nodes: &[Node]) -> Vec<String> {
        nodes.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn reads_atoms_and_nested_lists() {
        let nodes = parse_str("(+ (+ 1 (1 2 3 4)) 1 2 3)").unwrap();
        assert_eq!(render(&nodes), vec!["(+ (+ 1 (1 2 3 4)) 1 2 3)"]);

        let nodes = parse_str("(define x 1) x").unwrap();
        assert_eq!(render(&nodes), vec!["(define x 1)", "x"]);
    }

    #[test]
    fn tracks_positions_across_lines() {
        let nodes = parse_str("(a b)\n  (c\nd)").unwrap();
        assert_eq!(nodes[0].position(), Position { row: 1, column: 1 });
        assert_eq!(nodes[1].position(), Position { row: 2, column: 3 });
        match &nodes[1] {
            Node::List(list) => {
                assert_eq!(list.items[0].position(), Position { row: 2, column: 4 });
                assert_eq!(list.items[1].position(), Position { row: 3, column: 1 });
            }
            other => panic!("expected a list, got {}", other),
        }
    }

    #[test]
    fn reads_strings_with_both_quote_chars_and_escapes() {
        let nodes = parse_str(r#"(define x "12\"3") (define y '\n\t\\\r') 'q'"#).unwrap();
        match &nodes[0] {
            Node::List(list) => match &list.items[2] {
                Node::Atom(atom) => {
                    assert!(atom.quoted);
                    assert_eq!(atom.name, "12\"3");
                }
                other => panic!("expected an atom, got {}", other),
            },
            other => panic!("expected a list, got {}", other),
        }
        match &nodes[1] {
            Node::List(list) => match &list.items[2] {
                Node::Atom(atom) => assert_eq!(atom.name, "\n\t\\\r"),
                other => panic!("expected an atom, got {}", other),
            },
            other => panic!("expected a list, got {}", other),
        }
    }

    #[test]
    fn unknown_escapes_drop_only_the_backslash() {
        let nodes = parse_str(r#""a\qb""#).unwrap();
        match &nodes[0] {
            Node::Atom(atom) => assert_eq!(atom.name, "aqb"),
            other => panic!("expected an atom, got {}", other),
        }
    }

    #[test]
    fn keeps_empty_strings_and_empty_lists() {
        let nodes = parse_str("(f '' \"\") ()").unwrap();
        match &nodes[0] {
            Node::List(list) => assert_eq!(list.items.len(), 3),
            other => panic!("expected a list, got {}", other),
        }
        match &nodes[1] {
            Node::List(list) => assert!(list.items.is_empty()),
            other => panic!("expected a list, got {}", other),
        }
    }

    #[test]
    fn rejects_unbalanced_documents() {
        assert!(matches!(
            parse_str("(+ (+ 1 (1 2 3 4)) 1 2 3"),
            Err(SyntaxError::UnexpectedEof(_))
        ));
        assert!(matches!(
            parse_str("(+ 1 2)))"),
            Err(SyntaxError::UnmatchedClose(_))
        ));
        assert!(matches!(
            parse_str("(define x \"abc"),
            Err(SyntaxError::UnterminatedString(_))
        ));
        assert!(matches!(
            parse_str("\"abc\\"),
            Err(SyntaxError::UnterminatedString(_))
        ));
    }

    #[test]
    fn rendering_reparses_to_the_same_tree() {
        let source = "(define (f x) (if (= x 0) \"done\" (f (- x 1)))) (f 3) 'a b'";
        let first = render(&parse_str(source).unwrap());
        let second = render(&parse_str(&first.join(" ")).unwrap());
        assert_eq!(first, second);
    }
}
