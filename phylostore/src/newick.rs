//! Reading and writing trees in Newick format
//!
//! Supported: nested children, leaf and internal labels, quoted labels with `''` escapes,
//! branch lengths and `[...]` comments. A numeric internal label is read as a support value.
use crate::{
    error::{Error, Result},
    tree::{NodeId, Tree},
};
use std::fmt::Write;

/// characters that end an unquoted label
const DELIMITERS: &[u8] = b"(),:;[]'";

pub fn parse(text: &str) -> Result<Tree> {
    Parser {
        bytes: text.as_bytes(),
        pos: 0,
    }
    .tree()
}

/// Writes a tree as a single Newick line, terminated by `;`.
///
/// Internal nodes are labelled with their name if they have one, otherwise with their
/// support value.
pub fn write(tree: &Tree) -> String {
    enum Step {
        Enter(NodeId),
        Exit(NodeId),
        Comma,
    }
    let mut out = String::new();
    let mut stack = vec![Step::Enter(tree.root())];
    while let Some(step) = stack.pop() {
        match step {
            Step::Enter(id) if tree[id].is_leaf() => write_label(tree, id, &mut out),
            Step::Enter(id) => {
                out.push('(');
                stack.push(Step::Exit(id));
                for (i, child) in tree[id].children().iter().enumerate().rev() {
                    stack.push(Step::Enter(*child));
                    if i > 0 {
                        stack.push(Step::Comma);
                    }
                }
            }
            Step::Exit(id) => {
                out.push(')');
                write_label(tree, id, &mut out);
            }
            Step::Comma => out.push(','),
        }
    }
    out.push(';');
    out
}

fn write_label(tree: &Tree, id: NodeId, out: &mut String) {
    let node = &tree[id];
    if !node.name().is_empty() {
        write_name(node.name(), out);
    } else if let (false, Some(support)) = (node.is_leaf(), node.support()) {
        let _ = write!(out, "{}", support);
    }
    if let Some(dist) = node.dist() {
        let _ = write!(out, ":{}", dist);
    }
}

fn write_name(name: &str, out: &mut String) {
    let needs_quotes = name
        .bytes()
        .any(|b| DELIMITERS.contains(&b) || b.is_ascii_whitespace());
    if needs_quotes {
        out.push('\'');
        out.push_str(&name.replace('\'', "''"));
        out.push('\'');
    } else {
        out.push_str(name);
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &'static str) -> Error {
        Error::Newick {
            position: self.pos,
            reason,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).cloned()
    }

    /// skips whitespace and comments
    fn skip(&mut self) -> Result<()> {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else if b == b'[' {
                let end = self.bytes[self.pos..]
                    .iter()
                    .position(|x| *x == b']')
                    .ok_or_else(|| self.error("unterminated comment"))?;
                self.pos += end + 1;
            } else {
                break;
            }
        }
        Ok(())
    }

    fn tree(mut self) -> Result<Tree> {
        let mut tree = Tree::new();
        let mut current = tree.root();
        let mut open: Vec<NodeId> = Vec::new();
        loop {
            self.skip()?;
            match self.peek() {
                Some(b'(') => {
                    self.pos += 1;
                    open.push(current);
                    current = tree.add_child(current, "");
                }
                Some(b',') => {
                    self.pos += 1;
                    let parent = *open
                        .last()
                        .ok_or_else(|| self.error("',' outside of parentheses"))?;
                    current = tree.add_child(parent, "");
                }
                Some(b')') => {
                    self.pos += 1;
                    current = open.pop().ok_or_else(|| self.error("unbalanced ')'"))?;
                }
                Some(b':') => {
                    self.pos += 1;
                    self.skip()?;
                    let text = self.unquoted();
                    let dist = text
                        .parse::<f64>()
                        .map_err(|_| self.error("invalid branch length"))?;
                    tree.set_dist(current, Some(dist));
                }
                Some(b';') => {
                    self.pos += 1;
                    if !open.is_empty() {
                        return Err(self.error("unbalanced '('"));
                    }
                    self.skip()?;
                    if self.peek().is_some() {
                        return Err(self.error("trailing input after ';'"));
                    }
                    return Ok(tree);
                }
                Some(b']') => return Err(self.error("unexpected ']'")),
                Some(_) => {
                    let label = self.label()?;
                    let node = &tree[current];
                    if !node.name().is_empty() || node.support().is_some() {
                        return Err(self.error("node has two labels"));
                    }
                    let is_leaf = node.is_leaf();
                    match label.parse::<f64>() {
                        Ok(support) if !is_leaf => tree.set_support(current, Some(support)),
                        _ => tree.set_name(current, label),
                    }
                }
                None => return Err(self.error("missing ';'")),
            }
        }
    }

    fn label(&mut self) -> Result<String> {
        if self.peek() != Some(b'\'') {
            return Ok(self.unquoted());
        }
        self.pos += 1;
        let mut label = Vec::new();
        loop {
            match self.peek() {
                Some(b'\'') if self.bytes.get(self.pos + 1) == Some(&b'\'') => {
                    label.push(b'\'');
                    self.pos += 2;
                }
                Some(b'\'') => {
                    self.pos += 1;
                    break;
                }
                Some(b) => {
                    label.push(b);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated quoted label")),
            }
        }
        String::from_utf8(label).map_err(|_| self.error("label is not utf8"))
    }

    fn unquoted(&mut self) -> String {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if DELIMITERS.contains(&b) || b.is_ascii_whitespace() {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }
}
