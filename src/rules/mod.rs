//! Scene classification rules.
//!
//! A rule pairs an expression over group aggregates with the label it
//! assigns, e.g. `avg(seats) > 0.5 && count(people) >= 1` => `"busy"`.
//! Rules are parsed once at configuration load and evaluated in declared
//! order; the first truthy rule names the scene.

mod eval;
mod lexer;
mod parser;

use anyhow::{Context, Result};

use crate::group::Group;

pub use eval::{evaluate, Value};
pub use parser::{parse, BinaryOp, CompareOp, Expr};

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    expression: Expr,
    source: String,
    label: String,
}

impl Rule {
    pub fn parse(expression: &str, label: &str) -> Result<Self> {
        let parsed = parse(expression)
            .with_context(|| format!("invalid classification expression {:?}", expression))?;
        Ok(Self {
            expression: parsed,
            source: expression.to_string(),
            label: label.to_string(),
        })
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Expression as written in configuration.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn matches(&self, groups: &[Group]) -> Result<bool> {
        let value = evaluate(&self.expression, groups)
            .with_context(|| format!("evaluating {:?} failed", self.source))?;
        Ok(value.truthy())
    }
}

/// Label of the first matching rule, or `default` when none match.
pub fn classify_scene(rules: &[Rule], default: &str, groups: &[Group]) -> Result<String> {
    for rule in rules {
        if rule.matches(groups)? {
            log::debug!("scene rule {:?} matched: {}", rule.source, rule.label);
            return Ok(rule.label.clone());
        }
    }
    Ok(default.to_string())
}
