//! Artifact id templates such as `{index}.data`.

use crate::error::{CacheError, CacheResult};
use std::fmt;

/// A template with exactly one integer placeholder.
///
/// `{{` and `}}` stand for literal braces. Any placeholder other than the
/// index key is rejected, since ids are only ever formatted from an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdTemplate {
    raw: String,
    prefix: String,
    suffix: String,
}

impl IdTemplate {
    pub fn new(template: &str, index_key: &str) -> CacheResult<Self> {
        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut seen_index = false;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let literal = match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    '{'
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    '}'
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(ch) => name.push(ch),
                            None => {
                                return Err(CacheError::Config(format!(
                                    "unclosed placeholder in id template `{template}`"
                                )));
                            }
                        }
                    }
                    if name != index_key {
                        return Err(CacheError::Config(format!(
                            "id template `{template}` has unsupported placeholder `{{{name}}}`"
                        )));
                    }
                    if seen_index {
                        return Err(CacheError::Config(format!(
                            "id template `{template}` repeats placeholder `{{{index_key}}}`"
                        )));
                    }
                    seen_index = true;
                    continue;
                }
                '}' => {
                    return Err(CacheError::Config(format!("unmatched `}}` in id template `{template}`")));
                }
                other => other,
            };

            if seen_index {
                suffix.push(literal);
            } else {
                prefix.push(literal);
            }
        }

        if !seen_index {
            return Err(CacheError::Config(format!(
                "id template `{template}` must contain `{{{index_key}}}`"
            )));
        }

        Ok(Self { raw: template.to_string(), prefix, suffix })
    }

    #[must_use]
    pub fn format(&self, index: u64) -> String {
        format!("{}{index}{}", self.prefix, self.suffix)
    }

    /// Extract the index from an id, or `None` when the id does not follow
    /// the template or its index is not a non-negative integer.
    #[must_use]
    pub fn parse_index(&self, id: &str) -> Option<u64> {
        let rest = id.strip_prefix(self.prefix.as_str())?;
        let digits = rest.strip_suffix(self.suffix.as_str())?;
        digits.trim().parse().ok()
    }
}

impl fmt::Display for IdTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
