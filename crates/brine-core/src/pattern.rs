// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Pattern language: variables, literals, applications, pinned ids.
//!
//! The text syntax is the functional notation used throughout the preset
//! corpus: `*(?x, 1)`, `list(f(a), f(b))`, `?x`, `#12`. An atom is any run of
//! characters other than whitespace, parentheses, and commas; atoms beginning
//! with `?` are variables, atoms beginning with `#` pin a concrete e-node id.
use core::fmt;
use std::collections::BTreeSet;

use thiserror::Error;

use crate::ident::ENodeId;

/// A pattern over e-graph terms.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum Pattern {
    /// A variable `?x`; binds to the canonical id of the matched class.
    Var(String),
    /// A zero-arity operator; matches a class containing a leaf with this op.
    Literal(String),
    /// An operator applied to sub-patterns.
    App {
        /// Operator symbol.
        op: String,
        /// Ordered argument patterns (never empty; zero-arity parses as
        /// [`Pattern::Literal`]).
        args: Vec<Pattern>,
    },
    /// A concrete e-node id; matches exactly the class of that id.
    Pinned(ENodeId),
}

impl Pattern {
    /// Parses a pattern from its text form.
    ///
    /// # Errors
    /// Returns [`PatternError`] describing the first grammar fault.
    pub fn parse(src: &str) -> Result<Self, PatternError> {
        let mut p = Parser { src, pos: 0 };
        p.skip_ws();
        let pat = p.pattern()?;
        p.skip_ws();
        if p.pos != src.len() {
            return Err(PatternError::TrailingInput { at: p.pos });
        }
        Ok(pat)
    }

    /// Collects every variable name occurring in the pattern.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Var(name) => {
                out.insert(name.clone());
            }
            Self::Literal(_) | Self::Pinned(_) => {}
            Self::App { args, .. } => {
                for a in args {
                    a.collect_variables(out);
                }
            }
        }
    }

    /// Returns `true` if the pattern contains no variables.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        match self {
            Self::Var(_) => false,
            Self::Literal(_) | Self::Pinned(_) => true,
            Self::App { args, .. } => args.iter().all(Self::is_concrete),
        }
    }

    /// Returns `true` if the pattern contains a pinned id anywhere.
    #[must_use]
    pub fn has_pins(&self) -> bool {
        match self {
            Self::Pinned(_) => true,
            Self::Var(_) | Self::Literal(_) => false,
            Self::App { args, .. } => args.iter().any(Self::has_pins),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Var(name) => write!(f, "?{name}"),
            Self::Literal(op) => f.write_str(op),
            Self::Pinned(id) => write!(f, "#{id}"),
            Self::App { op, args } => {
                f.write_str(op)?;
                f.write_str("(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{a}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Grammar faults raised while parsing a pattern's text form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The input contained no pattern atom where one was required.
    #[error("expected a pattern atom at byte {at}")]
    ExpectedAtom {
        /// Byte offset of the fault.
        at: usize,
    },
    /// Expected a `,` or `)` inside an argument list.
    #[error("expected ',' or ')' at byte {at}")]
    ExpectedArgDelimiter {
        /// Byte offset of the fault.
        at: usize,
    },
    /// A `?` with no identifier after it.
    #[error("empty variable name at byte {at}")]
    EmptyVariableName {
        /// Byte offset of the fault.
        at: usize,
    },
    /// A `#` pin whose suffix is not a decimal e-node id.
    #[error("invalid pinned id {token:?} at byte {at}")]
    InvalidPinnedId {
        /// Byte offset of the fault.
        at: usize,
        /// The offending atom.
        token: String,
    },
    /// A variable or pinned id used as an operator with arguments.
    #[error("{token:?} cannot take arguments at byte {at}")]
    LeafApplied {
        /// Byte offset of the fault.
        at: usize,
        /// The offending atom.
        token: String,
    },
    /// Input remained after a complete pattern.
    #[error("trailing input at byte {at}")]
    TrailingInput {
        /// Byte offset where the leftover input starts.
        at: usize,
    },
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self, ch: char) {
        self.pos += ch.len_utf8();
    }

    fn atom(&mut self) -> Result<(usize, String), PatternError> {
        let start = self.pos;
        let mut end = self.pos;
        for ch in self.src[self.pos..].chars() {
            if ch.is_whitespace() || matches!(ch, '(' | ')' | ',') {
                break;
            }
            end += ch.len_utf8();
        }
        if end == start {
            return Err(PatternError::ExpectedAtom { at: start });
        }
        self.pos = end;
        Ok((start, self.src[start..end].to_owned()))
    }

    fn pattern(&mut self) -> Result<Pattern, PatternError> {
        let (start, atom) = self.atom()?;
        if self.peek() == Some('(') {
            if atom.starts_with('?') || atom.starts_with('#') {
                return Err(PatternError::LeafApplied {
                    at: start,
                    token: atom,
                });
            }
            self.bump('(');
            self.skip_ws();
            let mut args = Vec::new();
            if self.peek() == Some(')') {
                self.bump(')');
            } else {
                loop {
                    args.push(self.pattern()?);
                    self.skip_ws();
                    match self.peek() {
                        Some(',') => {
                            self.bump(',');
                            self.skip_ws();
                        }
                        Some(')') => {
                            self.bump(')');
                            break;
                        }
                        _ => return Err(PatternError::ExpectedArgDelimiter { at: self.pos }),
                    }
                }
            }
            // `op()` is the same zero-arity operator as a bare `op`.
            if args.is_empty() {
                return Ok(Pattern::Literal(atom));
            }
            return Ok(Pattern::App { op: atom, args });
        }
        if let Some(name) = atom.strip_prefix('?') {
            if name.is_empty() {
                return Err(PatternError::EmptyVariableName { at: start });
            }
            return Ok(Pattern::Var(name.to_owned()));
        }
        if let Some(digits) = atom.strip_prefix('#') {
            return digits.parse::<u32>().map(|n| Pattern::Pinned(ENodeId(n))).map_err(|_| {
                PatternError::InvalidPinnedId {
                    at: start,
                    token: atom,
                }
            });
        }
        Ok(Pattern::Literal(atom))
    }
}
