//! Browser-facing pages for the end of a login.
//!
//! A popup login answers with a tiny document that posts a structured
//! message to `window.opener` for one explicit origin and closes itself. The
//! opener checks the message origin and performs navigation.

use serde::{Deserialize, Serialize};

/// Message posted from the popup to its opener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupMessage {
    /// `<provider>-oauth-popup`
    pub source: String,

    /// Whether the login completed
    pub success: bool,

    /// Where the opener should navigate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,

    /// Session token for openers that keep it in memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Short reason on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PopupMessage {
    /// Successful login.
    pub fn success(provider: &str, redirect_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            source: Self::source_for(provider),
            success: true,
            redirect_url: Some(redirect_url.into()),
            token,
            error: None,
        }
    }

    /// Failed login.
    pub fn failure(provider: &str, error: impl Into<String>) -> Self {
        Self {
            source: Self::source_for(provider),
            success: false,
            redirect_url: None,
            token: None,
            error: Some(error.into()),
        }
    }

    /// Message source tag for a provider.
    pub fn source_for(provider: &str) -> String {
        format!("{}-oauth-popup", provider.to_lowercase())
    }
}

/// Render the popup document posting `message` to `target_origin`.
pub fn render_popup(message: &PopupMessage, target_origin: &str) -> String {
    let payload = script_json(message);
    let origin = script_json(&target_origin);
    let fallback = script_json(&message.redirect_url.as_deref().unwrap_or("/"));

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Signing in</title></head>
<body>
<script>
(function () {{
  var message = {payload};
  if (window.opener && !window.opener.closed) {{
    window.opener.postMessage(message, {origin});
    window.close();
  }} else {{
    window.location.replace({fallback});
  }}
}})();
</script>
</body>
</html>
"#
    )
}

/// Render the failure page of a browser-navigation login.
pub fn render_failure_page(provider_name: &str, reason: &str) -> String {
    let provider = escape_html(provider_name);
    let reason = escape_html(reason);

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{provider} sign-in failed</title></head>
<body>
<h1>{provider} sign-in failed</h1>
<p>{reason}</p>
<p>Please return to the storefront and try again.</p>
</body>
</html>
"#
    )
}

/// JSON safe to embed in an inline script.
fn script_json<T: Serialize + ?Sized>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    json.replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_shape() {
        let message = PopupMessage::success("Discord", "/us/account", Some("tkn".to_string()));
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["source"], "discord-oauth-popup");
        assert_eq!(json["success"], true);
        assert_eq!(json["redirectUrl"], "/us/account");
        assert_eq!(json["token"], "tkn");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_popup_targets_explicit_origin() {
        let message = PopupMessage::success("google", "/account", None);
        let html = render_popup(&message, "https://shop.example.com");

        assert!(html.contains(r#"postMessage(message, "https://shop.example.com")"#));
        assert!(html.contains("window.close()"));
        assert!(!html.contains("\"*\""));
        assert!(!html.contains("opener.location"));
    }

    #[test]
    fn test_popup_escapes_script_breakout() {
        let message = PopupMessage::failure("google", "</script><script>alert(1)</script>");
        let html = render_popup(&message, "https://shop.example.com");

        assert_eq!(html.matches("</script>").count(), 1);
        assert!(html.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn test_failure_page() {
        let html = render_failure_page("Discord", "account email must be verified");
        assert!(html.contains("Discord sign-in failed"));
        assert!(html.contains("account email must be verified"));
        assert!(html.contains("return to the storefront and try again"));

        let html = render_failure_page("<b>", "x & y");
        assert!(html.contains("&lt;b&gt;"));
        assert!(html.contains("x &amp; y"));
    }
}
