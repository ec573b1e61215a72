//! # Render request model.
//!
//! The JSON shape follows the Puppeteer-style payload callers already send:
//! ```text
//! {
//!   "url": "https://app.example/instance/1",
//!   "options": { "format": "A4", "margin": { "top": "0.75in" }, "printBackground": true },
//!   "waitFor": "#readyForPrint"            // or 1500, or { "selector": ..., "visible": true }
//!   "cookies": [ { "name": "token", "value": "...", "domain": "app.example", "sameSite": "Lax" } ]
//! }
//! ```
//!
//! ## Invariants (checked by [`RenderRequest::validate`])
//! - `url` is an absolute http(s) URL;
//! - `sameSite: None` requires `secure: true`;
//! - `waitFor` is exactly one variant, `visible` and `hidden` are exclusive;
//! - wait timeouts never exceed [`MAX_TIMEOUT_MS`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::error::RenderError;

/// Upper bound for any wait timeout carried by a request (milliseconds).
pub const MAX_TIMEOUT_MS: u32 = 30_000;

/// A request to render one page to PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub url: String,
    #[serde(default)]
    pub options: RenderOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_for: Option<WaitFor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<Cookie>,
}

/// Page layout options forwarded to the print command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub format: String,
    #[serde(default)]
    pub margin: Margin,
    #[serde(default)]
    pub display_header_footer: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub header_template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub footer_template: String,
    #[serde(default)]
    pub print_background: bool,
}

/// CSS-length margins (`"10mm"`, `"0.5in"`, `"40px"`, `"40"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Margin {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub top: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub right: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bottom: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub left: String,
}

/// Condition to satisfy after navigation and before printing.
///
/// Exactly one variant is active; the JSON form decides which one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WaitFor {
    /// Fixed delay in milliseconds.
    Timeout(u32),
    /// Wait until an element matching the selector exists.
    Selector(String),
    /// Selector wait with visibility and timeout controls.
    Options(WaitForOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitForOptions {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
}

/// Cookie injected into the browser before navigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default)]
    pub same_site: SameSite,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Reasons a [`RenderRequest`] is rejected before admission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("url is required")]
    MissingUrl,

    #[error("url {url:?} is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("url scheme {0:?} is not supported (expected http or https)")]
    UnsupportedScheme(String),

    #[error("cookie #{index} has an empty name")]
    EmptyCookieName { index: usize },

    #[error("cookie {name:?} has sameSite=None but is not secure")]
    InsecureSameSiteNone { name: String },

    #[error("waitFor selector must not be empty")]
    EmptySelector,

    #[error("waitFor cannot require both visible and hidden")]
    VisibleAndHidden,

    #[error("waitFor timeout {0}ms exceeds the maximum of {MAX_TIMEOUT_MS}ms")]
    TimeoutTooLarge(u32),
}

impl From<ValidationError> for RenderError {
    fn from(err: ValidationError) -> Self {
        RenderError::invalid(err.to_string())
    }
}

impl RenderRequest {
    /// Creates a request for `url` with default options.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: RenderOptions::default(),
            wait_for: None,
            cookies: Vec::new(),
        }
    }

    /// Checks the request invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.origin()?;

        for (index, cookie) in self.cookies.iter().enumerate() {
            if cookie.name.trim().is_empty() {
                return Err(ValidationError::EmptyCookieName { index });
            }
            if cookie.same_site == SameSite::None && cookie.secure != Some(true) {
                return Err(ValidationError::InsecureSameSiteNone {
                    name: cookie.name.clone(),
                });
            }
        }

        match &self.wait_for {
            None => {}
            Some(WaitFor::Timeout(ms)) => {
                if *ms > MAX_TIMEOUT_MS {
                    return Err(ValidationError::TimeoutTooLarge(*ms));
                }
            }
            Some(WaitFor::Selector(selector)) => {
                if selector.trim().is_empty() {
                    return Err(ValidationError::EmptySelector);
                }
            }
            Some(WaitFor::Options(opts)) => {
                if opts.selector.trim().is_empty() {
                    return Err(ValidationError::EmptySelector);
                }
                if opts.visible == Some(true) && opts.hidden == Some(true) {
                    return Err(ValidationError::VisibleAndHidden);
                }
                if let Some(ms) = opts.timeout {
                    if ms > MAX_TIMEOUT_MS {
                        return Err(ValidationError::TimeoutTooLarge(ms));
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns the `scheme://host[:port]` origin of the target URL.
    pub fn origin(&self) -> Result<String, ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        let parsed = Url::parse(&self.url).map_err(|e| ValidationError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(ValidationError::UnsupportedScheme(other.to_string())),
        }
        Ok(parsed.origin().ascii_serialization())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie(name: &str, same_site: SameSite, secure: Option<bool>) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: "v".to_string(),
            domain: "app.example".to_string(),
            path: String::new(),
            same_site,
            secure,
            http_only: None,
            url: String::new(),
        }
    }

    #[test]
    fn parses_each_wait_variant() {
        let selector: RenderRequest =
            serde_json::from_str(r##"{"url":"https://a.example","waitFor":"#ready"}"##).unwrap();
        assert_eq!(selector.wait_for, Some(WaitFor::Selector("#ready".into())));

        let delay: RenderRequest =
            serde_json::from_str(r#"{"url":"https://a.example","waitFor":1500}"#).unwrap();
        assert_eq!(delay.wait_for, Some(WaitFor::Timeout(1500)));

        let opts: RenderRequest = serde_json::from_str(
            r##"{"url":"https://a.example","waitFor":{"selector":"#x","visible":true,"timeout":500}}"##,
        )
        .unwrap();
        match opts.wait_for {
            Some(WaitFor::Options(o)) => {
                assert_eq!(o.selector, "#x");
                assert_eq!(o.visible, Some(true));
                assert_eq!(o.timeout, Some(500));
            }
            other => panic!("unexpected wait variant: {other:?}"),
        }
    }

    #[test]
    fn parses_camel_case_options_and_cookies() {
        let req: RenderRequest = serde_json::from_str(
            r#"{
                "url": "https://a.example/p",
                "options": {"format": "A4", "printBackground": true, "margin": {"top": "10mm"}},
                "cookies": [{"name": "s", "value": "1", "sameSite": "Strict", "httpOnly": true}]
            }"#,
        )
        .unwrap();
        assert_eq!(req.options.format, "A4");
        assert!(req.options.print_background);
        assert_eq!(req.options.margin.top, "10mm");
        assert_eq!(req.cookies[0].same_site, SameSite::Strict);
        assert_eq!(req.cookies[0].http_only, Some(true));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn same_site_defaults_to_lax() {
        let c: Cookie = serde_json::from_str(r#"{"name":"a","value":"b"}"#).unwrap();
        assert_eq!(c.same_site, SameSite::Lax);
    }

    #[test]
    fn rejects_bad_urls() {
        assert_eq!(
            RenderRequest::new("").validate(),
            Err(ValidationError::MissingUrl)
        );
        assert!(matches!(
            RenderRequest::new("not a url").validate(),
            Err(ValidationError::InvalidUrl { .. })
        ));
        assert_eq!(
            RenderRequest::new("file:///etc/passwd").validate(),
            Err(ValidationError::UnsupportedScheme("file".into()))
        );
    }

    #[test]
    fn same_site_none_requires_secure() {
        let mut req = RenderRequest::new("https://a.example");
        req.cookies.push(cookie("sid", SameSite::None, None));
        assert_eq!(
            req.validate(),
            Err(ValidationError::InsecureSameSiteNone { name: "sid".into() })
        );

        req.cookies[0].secure = Some(true);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn rejects_empty_cookie_name() {
        let mut req = RenderRequest::new("https://a.example");
        req.cookies.push(cookie("ok", SameSite::Lax, None));
        req.cookies.push(cookie(" ", SameSite::Lax, None));
        assert_eq!(
            req.validate(),
            Err(ValidationError::EmptyCookieName { index: 1 })
        );
    }

    #[test]
    fn wait_descriptor_rules() {
        let mut req = RenderRequest::new("https://a.example");
        req.wait_for = Some(WaitFor::Options(WaitForOptions {
            selector: "#x".into(),
            visible: Some(true),
            hidden: Some(true),
            timeout: None,
        }));
        assert_eq!(req.validate(), Err(ValidationError::VisibleAndHidden));

        req.wait_for = Some(WaitFor::Timeout(MAX_TIMEOUT_MS + 1));
        assert_eq!(
            req.validate(),
            Err(ValidationError::TimeoutTooLarge(MAX_TIMEOUT_MS + 1))
        );

        req.wait_for = Some(WaitFor::Selector(String::new()));
        assert_eq!(req.validate(), Err(ValidationError::EmptySelector));
    }

    #[test]
    fn origin_strips_path_and_query() {
        let req = RenderRequest::new("https://app.example:8443/a/b?c=d");
        assert_eq!(req.origin().unwrap(), "https://app.example:8443");
    }

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_value(RenderRequest::new("https://a.example")).unwrap();
        assert_eq!(json["url"], "https://a.example");
        assert!(json.get("waitFor").is_none());
        assert!(json.get("cookies").is_none());
    }
}
