//! Token substitution of `{{ .labels.<key> }}` placeholders, as the agent performs it.

use crate::errors::GeneratorError;
use std::collections::BTreeMap;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Replaces every label token in `command` with the value from `labels`.
///
/// A token may carry a `| default '<value>'` fallback used when the label is absent.
pub fn render(command: &str, labels: &BTreeMap<String, String>) -> Result<String, GeneratorError> {
    let mut rendered = String::with_capacity(command.len());
    let mut rest = command;

    while let Some(start) = rest.find(OPEN) {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + OPEN.len()..];
        let end = after
            .find(CLOSE)
            .ok_or_else(|| GeneratorError::MalformedToken(rest[start..].to_string()))?;

        rendered.push_str(&substitute(after[..end].trim(), labels)?);
        rest = &after[end + CLOSE.len()..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

fn substitute(token: &str, labels: &BTreeMap<String, String>) -> Result<String, GeneratorError> {
    let (reference, default) = match token.split_once('|') {
        Some((reference, filter)) => (reference.trim(), Some(parse_default(filter.trim(), token)?)),
        None => (token, None),
    };

    let key = reference
        .strip_prefix(".labels.")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| GeneratorError::MalformedToken(token.to_string()))?;

    match (labels.get(key), default) {
        (Some(value), _) => Ok(value.clone()),
        (None, Some(default)) => Ok(default.to_string()),
        (None, None) => Err(GeneratorError::UnmatchedToken(key.to_string())),
    }
}

fn parse_default<'a>(filter: &'a str, token: &str) -> Result<&'a str, GeneratorError> {
    filter
        .strip_prefix("default")
        .map(str::trim)
        .and_then(|quoted| {
            quoted
                .strip_prefix('\'')
                .and_then(|q| q.strip_suffix('\''))
                .or_else(|| quoted.strip_prefix('"').and_then(|q| q.strip_suffix('"')))
        })
        .ok_or_else(|| GeneratorError::MalformedToken(token.to_string()))
}
