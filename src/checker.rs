//! Include/exclude filters evaluated against relative file paths and symbol names.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use crate::error::{GeneratorError, Result};

lazy_static! {
    /// Splits a wildcard pattern into wildcards and literal runs.
    static ref WILDCARD_SPLIT_RE: Regex = Regex::new(r"[*?]|[^*?]+").unwrap();
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    re: Regex,
}

/// A list of wildcard include and exclude rules.
///
/// A value is included when it matches at least one include rule (or no
/// include rules exist) and matches no exclude rule.
#[derive(Debug, Clone, Default)]
pub struct IncludedChecker {
    include: Vec<Rule>,
    exclude: Vec<Rule>,
}

impl IncludedChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a checker from its JSON form.
    ///
    /// Accepts `["*.h", "-Private/*"]` style arrays, where `-` marks an
    /// exclusion and `+` (or no prefix) an inclusion, or an object with
    /// `include` and `exclude` arrays.
    pub fn from_value(value: &Value) -> Result<Self> {
        let mut checker = Self::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    let pattern = item.as_str().ok_or_else(|| {
                        GeneratorError::Config(format!("checker rule must be a string: {}", item))
                    })?;
                    if let Some(rest) = pattern.strip_prefix('-') {
                        checker.exclude(rest)?;
                    } else {
                        checker.include(pattern.strip_prefix('+').unwrap_or(pattern))?;
                    }
                }
            }
            Value::Object(map) => {
                for (key, target) in [("include", true), ("exclude", false)] {
                    let Some(list) = map.get(key) else {
                        continue;
                    };
                    let list = list.as_array().ok_or_else(|| {
                        GeneratorError::Config(format!("checker '{}' must be an array", key))
                    })?;
                    for item in list {
                        let pattern = item.as_str().ok_or_else(|| {
                            GeneratorError::Config(format!(
                                "checker rule must be a string: {}",
                                item
                            ))
                        })?;
                        if target {
                            checker.include(pattern)?;
                        } else {
                            checker.exclude(pattern)?;
                        }
                    }
                }
            }
            Value::String(pattern) => {
                checker.include(pattern)?;
            }
            other => {
                return Err(GeneratorError::Config(format!(
                    "unsupported checker rules: {}",
                    other
                )))
            }
        }
        Ok(checker)
    }

    pub fn include(&mut self, pattern: &str) -> Result<&mut Self> {
        self.include.push(compile_rule(pattern)?);
        Ok(self)
    }

    pub fn exclude(&mut self, pattern: &str) -> Result<&mut Self> {
        self.exclude.push(compile_rule(pattern)?);
        Ok(self)
    }

    pub fn is_included(&self, value: &str) -> bool {
        let included =
            self.include.is_empty() || self.include.iter().any(|rule| rule.re.is_match(value));
        included && !self.exclude.iter().any(|rule| rule.re.is_match(value))
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = (&str, bool)> {
        self.include
            .iter()
            .map(|r| (r.pattern.as_str(), true))
            .chain(self.exclude.iter().map(|r| (r.pattern.as_str(), false)))
    }
}

fn compile_rule(pattern: &str) -> Result<Rule> {
    let mut source = String::from("^");
    for piece in WILDCARD_SPLIT_RE.find_iter(pattern) {
        match piece.as_str() {
            "*" => source.push_str(".*"),
            "?" => source.push('.'),
            literal => source.push_str(&regex::escape(literal)),
        }
    }
    source.push('$');
    let re = Regex::new(&source)
        .map_err(|e| GeneratorError::InvalidPattern(format!("{}: {}", pattern, e)))?;
    Ok(Rule {
        pattern: pattern.to_string(),
        re,
    })
}
