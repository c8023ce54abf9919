//! `${NAME}` / `${NAME:-default}` environment substitution.

use crate::error::{ConfigError, Result};

/// Substitute environment references using the process environment.
pub fn substitute_env(input: &str) -> Result<String> {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Substitute environment references using `lookup`.
///
/// `${NAME}` is required: an unset variable is an error naming it.
/// `${NAME:-default}` falls back to `default` (trimmed). A `$` not followed
/// by `{` is kept as is.
pub fn substitute_with<F>(input: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }

        // Consume the '{'
        chars.next();
        let mut reference = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            reference.push(c);
        }
        if !closed {
            return Err(ConfigError::EnvSyntax(format!("unclosed '${{{reference}'")));
        }

        let (name, default) = match reference.split_once(":-") {
            Some((name, default)) => (name.trim(), Some(default.trim())),
            None => (reference.trim(), None),
        };
        if name.is_empty() {
            return Err(ConfigError::EnvSyntax(format!("empty variable name in '${{{reference}}}'")));
        }

        match (lookup(name), default) {
            (Some(value), _) => result.push_str(&value),
            (None, Some(default)) => result.push_str(default),
            (None, None) => return Err(ConfigError::EnvVar(name.to_string())),
        }
    }

    Ok(result)
}
