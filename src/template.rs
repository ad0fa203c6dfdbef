//! `${name}` substitution for effect payloads.
//!
//! Substitution is fail-closed: when a required variable is unbound the whole
//! value resolves to empty rather than to a partially substituted string.

use std::collections::BTreeMap;

/// Session variables, keyed by name.
pub type Vars = BTreeMap<String, String>;

/// Substitute `${name}` placeholders in `data`.
///
/// With `needed = Some(names)` exactly those names are substituted, in order.
/// With `needed = None` every bound variable is substituted. If any required
/// name is unbound the result is empty and a warning is logged.
pub fn substitute_bytes(vars: &Vars, data: &[u8], needed: Option<&[String]>) -> Vec<u8> {
    tracing::debug!("Substituting variables in {:?}", String::from_utf8_lossy(data));

    let mut out = data.to_vec();
    let names: Vec<&str> = match needed {
        Some(names) => names.iter().map(String::as_str).collect(),
        None => vars.keys().map(String::as_str).collect(),
    };

    for name in names {
        let Some(value) = vars.get(name) else {
            tracing::warn!("Variable {} is not bound", name);
            return Vec::new();
        };
        let placeholder = placeholder(name);
        if find(&out, &placeholder).is_none() {
            continue;
        }
        tracing::debug!("Replacing ${{{}}} with {:?}", name, value);
        out = replace_all(&out, &placeholder, value.as_bytes());
    }

    out
}

/// String flavour of [`substitute_bytes`].
pub fn substitute_str(vars: &Vars, data: &str, needed: Option<&[String]>) -> String {
    let bytes = substitute_bytes(vars, data.as_bytes(), needed);
    // Inputs and replacements are both valid UTF-8, so the result is too.
    String::from_utf8(bytes).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn placeholder(name: &str) -> Vec<u8> {
    format!("${{{name}}}").into_bytes()
}

/// First occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn replace_all(haystack: &[u8], needle: &[u8], replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(haystack.len());
    let mut rest = haystack;
    while let Some(idx) = find(rest, needle) {
        out.extend_from_slice(&rest[..idx]);
        out.extend_from_slice(replacement);
        rest = &rest[idx + needle.len()..];
    }
    out.extend_from_slice(rest);
    out
}
