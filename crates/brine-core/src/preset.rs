// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Preset schema and eager validation.
//!
//! Validation happens once, at load time, and collects *every* violation
//! rather than stopping at the first: a preset editor wants the full list.
//! The matcher and applier never fail on legitimate input afterwards.
use core::fmt;

use thiserror::Error;

use crate::diff::Strategy;
use crate::pattern::{Pattern, PatternError};

/// A named rewrite rule `lhs → rhs`.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rewrite {
    /// Rule name; unique within a preset.
    pub name: String,
    /// Left-hand pattern matched against e-classes.
    pub lhs: Pattern,
    /// Right-hand pattern instantiated into the graph.
    pub rhs: Pattern,
    /// Disabled rules are kept in the preset but never matched.
    pub enabled: bool,
    /// Optional authoring priority. Carried for editors; match ordering is
    /// fixed by rule name, so priority never affects engine semantics.
    pub priority: Option<i32>,
}

impl Rewrite {
    /// Parses both sides from their text form; the rule starts enabled.
    ///
    /// # Errors
    /// Returns the first [`PatternError`] from either side.
    pub fn parse(
        name: impl Into<String>,
        lhs: &str,
        rhs: &str,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            name: name.into(),
            lhs: Pattern::parse(lhs)?,
            rhs: Pattern::parse(rhs)?,
            enabled: true,
            priority: None,
        })
    }
}

/// Optional authoring hints carried by a preset.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImplementationHints {
    /// Strategy the preset was authored against.
    pub default_strategy: Option<Strategy>,
    /// Iteration cap the preset was authored against.
    pub iteration_cap: Option<u32>,
}

/// A root term plus a rewrite list: everything a run needs besides options.
#[derive(Clone, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Preset {
    /// Stable preset identifier; embedded in snapshot ids.
    pub id: String,
    /// Human-readable label.
    pub label: String,
    /// Free-text description.
    pub description: String,
    /// The root term. Must be fully concrete: no variables, no pins.
    pub root: Pattern,
    /// Rewrite rules, applied in stable name order.
    pub rewrites: Vec<Rewrite>,
    /// Optional authoring hints.
    pub implementation_hints: Option<ImplementationHints>,
}

impl Preset {
    /// Creates a preset with no rewrites.
    #[must_use]
    pub fn new(id: impl Into<String>, label: impl Into<String>, root: Pattern) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: String::new(),
            root,
            rewrites: Vec::new(),
            implementation_hints: None,
        }
    }

    /// Appends a rewrite (builder style).
    #[must_use]
    pub fn with_rewrite(mut self, rewrite: Rewrite) -> Self {
        self.rewrites.push(rewrite);
        self
    }

    /// Collects every schema violation in this preset.
    #[must_use]
    pub fn violations(&self) -> Vec<PresetViolation> {
        let mut out = Vec::new();
        if self.id.is_empty() {
            out.push(PresetViolation::EmptyId);
        }
        if !self.root.is_concrete() {
            out.push(PresetViolation::RootNotConcrete);
        }
        if self.root.has_pins() {
            out.push(PresetViolation::RootPinned);
        }
        let mut seen = std::collections::BTreeSet::new();
        for rewrite in &self.rewrites {
            if rewrite.name.is_empty() {
                out.push(PresetViolation::EmptyRuleName);
            } else if !seen.insert(rewrite.name.clone()) {
                out.push(PresetViolation::DuplicateRuleName {
                    name: rewrite.name.clone(),
                });
            }
            let lhs_vars = rewrite.lhs.variables();
            for var in rewrite.rhs.variables() {
                if !lhs_vars.contains(&var) {
                    out.push(PresetViolation::PatternInvalid {
                        rule: rewrite.name.clone(),
                        message: format!("rhs variable ?{var} does not occur in the lhs"),
                    });
                }
            }
        }
        out
    }

    /// Validates the schema, returning all violations at once.
    ///
    /// # Errors
    /// Returns [`PresetError`] when any violation exists.
    pub fn validate(&self) -> Result<(), PresetError> {
        let violations = self.violations();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(PresetError { violations })
        }
    }
}

/// One schema violation found while validating a preset or its options.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresetViolation {
    /// The preset id is empty.
    #[error("preset id must not be empty")]
    EmptyId,
    /// The root pattern contains a variable.
    #[error("root pattern must be fully concrete (no variables)")]
    RootNotConcrete,
    /// The root pattern pins an e-node id, but no ids exist before load.
    #[error("root pattern must not pin e-node ids")]
    RootPinned,
    /// A rewrite has an empty name.
    #[error("rewrite name must not be empty")]
    EmptyRuleName,
    /// Two rewrites share a name.
    #[error("duplicate rewrite name: {name:?}")]
    DuplicateRuleName {
        /// The repeated name.
        name: String,
    },
    /// A rule's patterns are not well-formed as a rewrite.
    #[error("rule {rule:?}: {message}")]
    PatternInvalid {
        /// The offending rule.
        rule: String,
        /// What is wrong with it.
        message: String,
    },
    /// A pattern failed to parse (text-form loading only).
    #[error("rule {rule:?}: {source}")]
    PatternParse {
        /// The offending rule, or `"root"`.
        rule: String,
        /// The underlying grammar fault.
        source: PatternError,
    },
    /// An engine option was outside its documented range.
    #[error("option {option}: {message}")]
    OptionOutOfRange {
        /// Option name as documented.
        option: &'static str,
        /// What is wrong with the value.
        message: String,
    },
}

/// Validation failure listing every violation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresetError {
    /// All violations, in discovery order.
    pub violations: Vec<PresetViolation>,
}

impl std::error::Error for PresetError {}

impl PresetError {
    /// Returns `true` if any violation is a pattern-discipline fault.
    #[must_use]
    pub fn has_pattern_fault(&self) -> bool {
        self.violations.iter().any(|v| {
            matches!(
                v,
                PresetViolation::PatternInvalid { .. } | PresetViolation::PatternParse { .. }
            )
        })
    }
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid preset ({} violations):", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  - {v}")?;
        }
        Ok(())
    }
}
