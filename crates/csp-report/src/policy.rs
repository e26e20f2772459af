//! Content-Security-Policy header construction.

use serde::{Deserialize, Serialize};

use crate::error::{ReportError, ReportResult};

/// Path of the ingestion endpoint, used as the default `report-uri`.
pub const DEFAULT_REPORT_URI: &str = "/security/csp-report";

/// Enforcing header name.
pub const HEADER_ENFORCE: &str = "content-security-policy";

/// Report-only header name.
pub const HEADER_REPORT_ONLY: &str = "content-security-policy-report-only";

/// A policy: ordered directives plus an optional reporting endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
    report_uri: Option<String>,
    report_only: bool,
}

impl Default for ContentSecurityPolicy {
    /// `default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:`
    /// reporting to [`DEFAULT_REPORT_URI`].
    fn default() -> Self {
        Self::new()
            .directive("default-src", ["'self'"])
            .directive("script-src", ["'self'"])
            .directive("style-src", ["'self'"])
            .directive("img-src", ["'self'", "data:"])
            .report_uri(DEFAULT_REPORT_URI)
    }
}

impl ContentSecurityPolicy {
    /// Creates an empty, enforcing policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            directives: Vec::new(),
            report_uri: None,
            report_only: false,
        }
    }

    /// Sets `name` to `sources`, replacing an earlier value for the same directive.
    #[must_use]
    pub fn directive<I, S>(mut self, name: impl Into<String>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into().to_ascii_lowercase();
        let sources: Vec<String> = sources.into_iter().map(Into::into).collect();
        if let Some(slot) = self.directives.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = sources;
        } else {
            self.directives.push((name, sources));
        }
        self
    }

    /// Sets the reporting endpoint.
    #[must_use]
    pub fn report_uri(mut self, uri: impl Into<String>) -> Self {
        self.report_uri = Some(uri.into());
        self
    }

    /// Switches between enforcing and report-only delivery.
    #[must_use]
    pub const fn report_only(mut self, report_only: bool) -> Self {
        self.report_only = report_only;
        self
    }

    /// Returns the sources for `name`, if set.
    #[must_use]
    pub fn sources(&self, name: &str) -> Option<&[String]> {
        self.directives
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, s)| s.as_slice())
    }

    /// Returns the header name this policy is delivered under.
    #[must_use]
    pub const fn header_name(&self) -> &'static str {
        if self.report_only {
            HEADER_REPORT_ONLY
        } else {
            HEADER_ENFORCE
        }
    }

    /// Renders the header value.
    #[must_use]
    pub fn header_value(&self) -> String {
        let mut parts: Vec<String> = self
            .directives
            .iter()
            .map(|(name, sources)| {
                if sources.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {}", sources.join(" "))
                }
            })
            .collect();
        if let Some(uri) = &self.report_uri {
            parts.push(format!("report-uri {uri}"));
        }
        parts.join("; ")
    }

    /// Checks that the policy renders to a well-formed header.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidPolicy`] for empty or malformed directive
    /// names, sources containing separators or whitespace, or an empty report URI.
    pub fn validate(&self) -> ReportResult<()> {
        if self.directives.is_empty() {
            return Err(ReportError::InvalidPolicy("policy has no directives".into()));
        }
        for (name, sources) in &self.directives {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_lowercase() || c == '-') {
                return Err(ReportError::InvalidPolicy(format!(
                    "invalid directive name '{name}'"
                )));
            }
            if let Some(bad) = sources.iter().find(|s| !is_token(s)) {
                return Err(ReportError::InvalidPolicy(format!(
                    "invalid source '{bad}' in {name}"
                )));
            }
        }
        if let Some(uri) = &self.report_uri {
            if !is_token(uri) {
                return Err(ReportError::InvalidPolicy(format!(
                    "invalid report-uri '{uri}'"
                )));
            }
        }
        Ok(())
    }
}

fn is_token(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_graphic() && c != ';' && c != ',')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_header() {
        let policy = ContentSecurityPolicy::default();
        assert_eq!(policy.header_name(), "content-security-policy");
        assert_eq!(
            policy.header_value(),
            concat!(
                "default-src 'self'; script-src 'self'; style-src 'self'; img-src 'self' data:; ",
                "report-uri /security/csp-report"
            )
        );
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn report_only_changes_header_name() {
        let policy = ContentSecurityPolicy::default().report_only(true);
        assert_eq!(policy.header_name(), "content-security-policy-report-only");
    }

    #[test]
    fn directive_replaces_existing() {
        let policy = ContentSecurityPolicy::default()
            .directive("Script-Src", ["'self'", "https://cdn.example.com"]);
        assert_eq!(
            policy.sources("script-src"),
            Some(&["'self'".to_string(), "https://cdn.example.com".to_string()][..])
        );
        assert_eq!(policy.header_value().matches("script-src").count(), 1);
    }

    #[test]
    fn valueless_directive_renders_bare() {
        let policy = ContentSecurityPolicy::new()
            .directive("default-src", ["'none'"])
            .directive("upgrade-insecure-requests", Vec::<String>::new());
        assert_eq!(
            policy.header_value(),
            "default-src 'none'; upgrade-insecure-requests"
        );
    }

    #[test]
    fn validate_rejects_bad_policies() {
        assert!(ContentSecurityPolicy::new().validate().is_err());

        let bad_source = ContentSecurityPolicy::new().directive("script-src", ["'self'; evil"]);
        assert!(matches!(
            bad_source.validate(),
            Err(ReportError::InvalidPolicy(_))
        ));

        let bad_name = ContentSecurityPolicy::new().directive("script src", ["'self'"]);
        assert!(bad_name.validate().is_err());

        let bad_uri = ContentSecurityPolicy::default().report_uri("");
        assert!(bad_uri.validate().is_err());
    }
}
