#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::types::{CatalogError, Result};

/// Placeholders run from `$0` to `$9`.
pub const MAX_PARAMETERS: usize = 10;

/// SQL text with positional `$i` placeholders and a declared parameter count.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(from = "RawTemplate")]
pub struct TemplateQuery {
    query: String,
    parameter_num: usize,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTemplate {
    Text(String),
    Full {
        query: String,
        #[serde(default)]
        parameter_num: usize,
    },
}

impl From<RawTemplate> for TemplateQuery {
    fn from(raw: RawTemplate) -> Self {
        match raw {
            RawTemplate::Text(query) => TemplateQuery::new(query, 0),
            RawTemplate::Full {
                query,
                parameter_num,
            } => TemplateQuery::new(query, parameter_num),
        }
    }
}

impl TemplateQuery {
    /// Creates a template declaring `parameter_num` placeholders.
    pub fn new(query: impl Into<String>, parameter_num: usize) -> Self {
        Self {
            query: query.into(),
            parameter_num,
        }
    }

    /// Raw template text.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Declared number of parameters.
    pub fn parameter_num(&self) -> usize {
        self.parameter_num
    }

    /// Distinct placeholder indices that appear in the text.
    pub fn placeholders(&self) -> BTreeSet<usize> {
        let mut found = BTreeSet::new();
        let bytes = self.query.as_bytes();
        let mut idx = 0;
        while idx < bytes.len() {
            if bytes[idx] == b'$' && idx + 1 < bytes.len() {
                let next = bytes[idx + 1];
                if next.is_ascii_digit() {
                    found.insert(usize::from(next - b'0'));
                }
                idx += 2;
                continue;
            }
            idx += 1;
        }
        found
    }

    /// Substitutes already-bound literals into the template.
    ///
    /// More than [`MAX_PARAMETERS`] literals is an `InvalidArgument` error. A count that
    /// differs from the declared parameter number is a defect in the template catalog and
    /// panics.
    pub fn render(&self, args: &[String]) -> Result<String> {
        if args.len() > MAX_PARAMETERS {
            return Err(CatalogError::InvalidArgument(format!(
                "template queries support at most {MAX_PARAMETERS} parameters, got {}",
                args.len()
            )));
        }
        assert_eq!(
            args.len(),
            self.parameter_num,
            "template declares {} parameters but {} were bound: {}",
            self.parameter_num,
            args.len(),
            self.query
        );
        Ok(substitute(&self.query, args))
    }
}

/// Single left-to-right pass; inserted literals are never rescanned. `$$` yields `$`.
fn substitute(text: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(text.len() + args.iter().map(String::len).sum::<usize>());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '$' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some('$') => {
                chars.next();
                out.push('$');
            }
            Some(digit) if digit.is_ascii_digit() => {
                chars.next();
                let idx = digit as usize - '0' as usize;
                match args.get(idx) {
                    Some(arg) => out.push_str(arg),
                    None => {
                        out.push('$');
                        out.push(digit);
                    }
                }
            }
            _ => out.push('$'),
        }
    }
    out
}
