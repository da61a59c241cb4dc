//! Return-path sanitization.
//!
//! After a login the browser is sent back to a path chosen before the login
//! started. That path is attacker-influenced, so only same-origin paths
//! survive; everything else collapses to the default.

use url::Url;

/// Reduce `input` to a same-origin path, or return `default`.
///
/// Accepted:
/// - plain paths beginning with a single `/`, returned unchanged
/// - absolute URLs on `site_origin`, reduced to path, query and fragment
///
/// Rejected: foreign origins, scheme-relative `//host` forms, backslashes,
/// control characters and any `..` segment (also percent-encoded).
pub fn sanitize_return_path(input: &str, site_origin: &str, default: &str) -> String {
    let Ok(site) = Url::parse(site_origin) else {
        return default.to_string();
    };

    let candidate = input.trim();
    if candidate.is_empty() || has_forbidden_chars(candidate) || has_traversal(candidate) {
        return default.to_string();
    }

    if candidate.starts_with('/') {
        if candidate.starts_with("//") {
            return default.to_string();
        }
        return match site.join(candidate) {
            Ok(joined) if joined.origin() == site.origin() => candidate.to_string(),
            _ => default.to_string(),
        };
    }

    match Url::parse(candidate) {
        Ok(absolute) if absolute.origin() == site.origin() => {
            let mut path = absolute.path().to_string();
            if let Some(query) = absolute.query() {
                path.push('?');
                path.push_str(query);
            }
            if let Some(fragment) = absolute.fragment() {
                path.push('#');
                path.push_str(fragment);
            }
            path
        }
        _ => default.to_string(),
    }
}

fn has_forbidden_chars(input: &str) -> bool {
    input.chars().any(|c| c == '\\' || c.is_control())
}

fn has_traversal(input: &str) -> bool {
    let lowered = input
        .to_ascii_lowercase()
        .replace("%2e", ".")
        .replace("%2f", "/")
        .replace("%5c", "\\");
    if lowered.contains('\\') {
        return true;
    }
    let path = lowered.split(['?', '#']).next().unwrap_or_default();
    path.contains("..")
}
