//! String expressions with request variable placeholders

use headerhook_core::{Error, HttpRequest, Result};
use regex::Regex;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Variable(String),
}

/// A string such as `scripts/$host/filter.rhai` whose `$name` / `${name}`
/// placeholders are replaced with request variables at request time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexValue {
    raw: String,
    parts: Vec<Part>,
}

impl ComplexValue {
    /// Parse an expression
    pub fn parse(raw: &str) -> Result<Self> {
        let re = Regex::new(r"\$(?:\{([A-Za-z0-9_]*)\}|([A-Za-z0-9_]+))")
            .map_err(|e| Error::Config(format!("Invalid regex: {e}")))?;

        let mut parts = Vec::new();
        let mut last = 0;

        for cap in re.captures_iter(raw) {
            let Some(full) = cap.get(0) else { continue };
            let name = cap
                .get(1)
                .or_else(|| cap.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            if name.is_empty() {
                return Err(Error::Config(format!(
                    "Empty variable name in \"{raw}\""
                )));
            }
            if full.start() > last {
                parts.push(Part::Literal(raw[last..full.start()].to_string()));
            }
            parts.push(Part::Variable(name.to_string()));
            last = full.end();
        }

        if last < raw.len() {
            parts.push(Part::Literal(raw[last..].to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// Whether the expression has no placeholders
    pub fn is_constant(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the variables referenced
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|p| match p {
            Part::Variable(name) => Some(name.as_str()),
            Part::Literal(_) => None,
        })
    }

    /// Substitute the request's variables
    ///
    /// A variable the request does not know is an error; a known variable
    /// without a value contributes an empty string.
    pub fn evaluate(&self, req: &HttpRequest) -> Result<String> {
        let mut out = String::with_capacity(self.raw.len());
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Variable(name) => {
                    if !req.has_variable(name) {
                        return Err(Error::Variable(format!(
                            "unknown variable \"{name}\" in \"{}\"",
                            self.raw
                        )));
                    }
                    if let Some(value) = req.variable(name) {
                        out.push_str(&value);
                    }
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for ComplexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
