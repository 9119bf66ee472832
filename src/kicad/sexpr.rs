//! Minimal S-expression reader for KiCad library files.
//!
//! Nodes keep the byte span they were read from so callers can splice
//! single entries out of a library without touching the rest of the file.

use std::ops::Range;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} at byte {offset}")]
pub struct SexprError {
    pub offset: usize,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Open,
    Close,
    Atom(&'a str),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Atom { value: String, quoted: bool, span: Range<usize> },
    List { items: Vec<Sexpr>, span: Range<usize> },
}

impl Sexpr {
    pub fn span(&self) -> Range<usize> {
        match self {
            Sexpr::Atom { span, .. } | Sexpr::List { span, .. } => span.clone(),
        }
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Sexpr::Atom { value, .. } => Some(value),
            Sexpr::List { .. } => None,
        }
    }

    pub fn items(&self) -> &[Sexpr] {
        match self {
            Sexpr::List { items, .. } => items,
            Sexpr::Atom { .. } => &[],
        }
    }

    /// First atom of a list, e.g. `symbol` for `(symbol "X" ...)`.
    pub fn head(&self) -> Option<&str> {
        self.items().first().and_then(Sexpr::as_atom)
    }

    /// Atom at `index` of a list.
    pub fn atom_at(&self, index: usize) -> Option<&str> {
        self.items().get(index).and_then(Sexpr::as_atom)
    }

    /// Child lists whose head is `name`.
    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sexpr> + 'a {
        self.items().iter().filter(move |item| item.head() == Some(name))
    }

    pub fn child<'a>(&'a self, name: &'a str) -> Option<&'a Sexpr> {
        self.children(name).next()
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token<'_>, Range<usize>)>, SexprError> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        match c {
            b'(' => {
                tokens.push((Token::Open, pos..pos + 1));
                pos += 1;
            }
            b')' => {
                tokens.push((Token::Close, pos..pos + 1));
                pos += 1;
            }
            c if c.is_ascii_whitespace() => pos += 1,
            b'"' => {
                let start = pos;
                let mut value = String::new();
                pos += 1;
                loop {
                    let Some(&b) = bytes.get(pos) else {
                        return Err(SexprError { offset: start, reason: "unterminated string" });
                    };
                    match b {
                        b'"' => {
                            pos += 1;
                            break;
                        }
                        b'\\' => {
                            let Some(&next) = bytes.get(pos + 1) else {
                                return Err(SexprError { offset: pos, reason: "dangling escape" });
                            };
                            value.push(match next {
                                b'n' => '\n',
                                b't' => '\t',
                                other => other as char,
                            });
                            pos += 2;
                        }
                        _ => {
                            // Copy a whole UTF-8 sequence at once.
                            let end = text[pos..]
                                .char_indices()
                                .nth(1)
                                .map(|(i, _)| pos + i)
                                .unwrap_or(bytes.len());
                            value.push_str(&text[pos..end]);
                            pos = end;
                        }
                    }
                }
                tokens.push((Token::Str(value), start..pos));
            }
            _ => {
                let start = pos;
                while pos < bytes.len()
                    && !bytes[pos].is_ascii_whitespace()
                    && !matches!(bytes[pos], b'(' | b')' | b'"')
                {
                    pos += 1;
                }
                tokens.push((Token::Atom(&text[start..pos]), start..pos));
            }
        }
    }

    Ok(tokens)
}

/// Parses a document holding exactly one top-level list.
pub fn parse(text: &str) -> Result<Sexpr, SexprError> {
    let tokens = tokenize(text)?;
    let mut stack: Vec<(Vec<Sexpr>, usize)> = Vec::new();
    let mut root = None;

    for (token, span) in tokens {
        if root.is_some() {
            return Err(SexprError { offset: span.start, reason: "trailing data after root list" });
        }
        match token {
            Token::Open => stack.push((Vec::new(), span.start)),
            Token::Close => {
                let (items, start) = stack.pop()
                    .ok_or(SexprError { offset: span.start, reason: "unbalanced ')'" })?;
                let node = Sexpr::List { items, span: start..span.end };
                match stack.last_mut() {
                    Some((parent, _)) => parent.push(node),
                    None => root = Some(node),
                }
            }
            Token::Atom(_) | Token::Str(_) if stack.is_empty() => {
                return Err(SexprError { offset: span.start, reason: "atom outside list" });
            }
            Token::Atom(value) => {
                if let Some((parent, _)) = stack.last_mut() {
                    parent.push(Sexpr::Atom { value: value.to_string(), quoted: false, span });
                }
            }
            Token::Str(value) => {
                if let Some((parent, _)) = stack.last_mut() {
                    parent.push(Sexpr::Atom { value, quoted: true, span });
                }
            }
        }
    }

    match (root, stack.last()) {
        (Some(root), _) => Ok(root),
        (None, Some((_, start))) => Err(SexprError { offset: *start, reason: "unclosed list" }),
        (None, None) => Err(SexprError { offset: 0, reason: "empty document" }),
    }
}

/// Reads `(version N)` from a library or footprint root.
pub fn read_version(root: &Sexpr) -> Option<u32> {
    root.child("version")?.atom_at(1)?.parse().ok()
}

/// A named top-level entry such as `(symbol "NAME" ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub span: Range<usize>,
}

pub fn entries(root: &Sexpr, head: &str) -> Vec<Entry> {
    root.children(head)
        .filter_map(|node| {
            Some(Entry { name: node.atom_at(1)?.to_string(), span: node.span() })
        })
        .collect()
}

/// SHA-256 over the canonical token stream, so formatting never changes it.
///
/// Numeric atoms are normalized (`1.0` and `1` hash the same); quoted
/// strings hash by their unescaped content.
pub fn fingerprint(text: &str) -> Result<String, SexprError> {
    let mut hasher = Sha256::new();
    for (token, _) in tokenize(text)? {
        match token {
            Token::Open => hasher.update(b"("),
            Token::Close => hasher.update(b")"),
            Token::Atom(atom) => {
                hasher.update(b"a:");
                match atom.parse::<f64>() {
                    Ok(number) if atom.bytes().any(|b| b.is_ascii_digit()) => {
                        hasher.update(format!("{}", number).as_bytes())
                    }
                    _ => hasher.update(atom.as_bytes()),
                }
                hasher.update(b"\0");
            }
            Token::Str(value) => {
                hasher.update(b"s:");
                hasher.update(value.as_bytes());
                hasher.update(b"\0");
            }
        }
    }
    Ok(hasher.finalize().iter().map(|b| format!("{:02x}", b)).collect())
}

/// Quotes and escapes a string for KiCad files.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIB: &str = "(kicad_symbol_lib\n  (version 20231120)\n  (generator \"x\")\n  (symbol \"A\" (pin_names (offset 1)))\n  (symbol \"B \\\"q\\\"\"\n    (in_bom yes))\n)\n";

    #[test]
    fn finds_entries_with_spans() {
        let root = parse(LIB).unwrap();
        assert_eq!(read_version(&root), Some(20231120));

        let found = entries(&root, "symbol");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "A");
        assert_eq!(&LIB[found[0].span.clone()], "(symbol \"A\" (pin_names (offset 1)))");
        assert_eq!(found[1].name, "B \"q\"");
        assert!(LIB[found[1].span.clone()].ends_with("(in_bom yes))"));
    }

    #[test]
    fn fingerprint_ignores_formatting() {
        let a = fingerprint("(symbol \"A\"\n    (at 1.0 2 0))").unwrap();
        let b = fingerprint("(symbol \"A\" (at 1 2.00 0))").unwrap();
        let c = fingerprint("(symbol \"A\" (at 1 2.5 0))").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn string_and_atom_hash_differently() {
        assert_ne!(fingerprint("(a yes)").unwrap(), fingerprint("(a \"yes\")").unwrap());
    }

    #[test]
    fn rejects_unbalanced_input() {
        assert!(parse("(kicad_symbol_lib (version 1)").is_err());
        assert!(parse("(a))").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("a\"b\\"), "\"a\\\"b\\\\\"");
    }
}
