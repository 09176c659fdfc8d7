//! Minimal placeholder template rendering
//!
//! Supports `{key}` and zero-padded `{key:02}` placeholders (a trailing `d`
//! in the padding spec is accepted and ignored). Used for destination
//! templates and for season selectors' `value_template` composition.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TemplateError {
    #[error("template references missing key '{0}'")]
    MissingKey(String),
    #[error("unclosed placeholder in template '{0}'")]
    Unclosed(String),
}

/// A template context value: strings render verbatim, integers honor the
/// zero-padding spec.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Str(String),
    Int(i64),
}

impl TemplateValue {
    fn render(&self, pad: Option<usize>) -> String {
        match self {
            Self::Str(s) => match pad {
                // Numeric strings can still be padded ("5" -> "05").
                Some(width) => match s.parse::<i64>() {
                    Ok(n) => format!("{n:0width$}"),
                    Err(_) => s.clone(),
                },
                None => s.clone(),
            },
            Self::Int(n) => match pad {
                Some(width) => format!("{n:0width$}"),
                None => n.to_string(),
            },
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for TemplateValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for TemplateValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

pub type TemplateContext = HashMap<String, TemplateValue>;

/// Render a template against a context. A missing key is an error; `{{` and
/// `}}` escape literal braces.
pub fn render_template(template: &str, context: &TemplateContext) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let mut placeholder = String::new();
                let mut closed = false;
                for inner in chars.by_ref() {
                    if inner == '}' {
                        closed = true;
                        break;
                    }
                    placeholder.push(inner);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(template.to_string()));
                }
                let (key, pad) = parse_placeholder(&placeholder);
                let value = context
                    .get(key)
                    .ok_or_else(|| TemplateError::MissingKey(key.to_string()))?;
                out.push_str(&value.render(pad));
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                }
                out.push('}');
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Split `key:02` into the key and an optional pad width.
fn parse_placeholder(placeholder: &str) -> (&str, Option<usize>) {
    match placeholder.split_once(':') {
        None => (placeholder, None),
        Some((key, spec)) => {
            let spec = spec.strip_suffix('d').unwrap_or(spec);
            if let Some(width) = spec.strip_prefix('0') {
                if let Ok(width) = width.parse::<usize>() {
                    return (key, Some(width));
                }
            }
            (key, None)
        }
    }
}
