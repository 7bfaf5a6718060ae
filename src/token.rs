//! Credential extraction from sign-in and refresh responses.
//!
//! Servers have named the access credential differently over time
//! (`accessToken`, `token`, `jwt`). The accepted names live in
//! `SessionConfig::token_fields`, highest precedence first, and this module is
//! the only place that applies them.

use serde_json::Value;

/// Return the first configured field holding a non-empty string.
///
/// `null`, empty strings and non-string values are skipped so a lower
/// precedence field can still win. Non-object bodies yield `None`.
#[must_use]
pub fn extract_credential<S: AsRef<str>>(body: &Value, fields: &[S]) -> Option<String> {
    let object = body.as_object()?;
    fields
        .iter()
        .filter_map(|field| object.get(field.as_ref()))
        .filter_map(Value::as_str)
        .find(|token| !token.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
