//! Severity classification for normalized reports.
//!
//! Classification walks an ordered rule table and returns the severity of the
//! first rule that matches; if none does, the report is [`Severity::Info`].
//!
//! | # | Rule | Matches when | Severity |
//! |---|------|--------------|----------|
//! | 1 | `script-src-remote` | violated-directive contains `script-src` and not `inline` | HIGH |
//! | 2 | `inline-violation` | blocked-uri or violated-directive contains `inline` | MEDIUM |
//! | 3 | `cosmetic-resource` | violated-directive contains `style-src`, `img-src` or `font-src` | LOW |
//! | - | fallback | otherwise | INFO |
//!
//! Matching is ASCII case-insensitive.

use std::fmt;

use csp_audit::Severity;

use crate::normalize::NormalizedReport;

/// Severity assigned when no rule matches.
pub const FALLBACK_SEVERITY: Severity = Severity::Info;

/// A classification predicate.
pub type RulePredicate = fn(&NormalizedReport) -> bool;

/// One entry of the rule table.
#[derive(Clone, Copy)]
pub struct Rule {
    /// Stable rule name, used in logs.
    pub name: &'static str,
    /// Severity assigned on match.
    pub severity: Severity,
    predicate: RulePredicate,
}

impl Rule {
    /// Creates a rule.
    #[must_use]
    pub const fn new(name: &'static str, severity: Severity, predicate: RulePredicate) -> Self {
        Self {
            name,
            severity,
            predicate,
        }
    }

    /// Returns true if this rule applies to `report`.
    #[must_use]
    pub fn matches(&self, report: &NormalizedReport) -> bool {
        (self.predicate)(report)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("severity", &self.severity)
            .finish_non_exhaustive()
    }
}

/// The default rule table, in evaluation order.
pub const DEFAULT_RULES: [Rule; 3] = [
    Rule::new("script-src-remote", Severity::High, is_remote_script),
    Rule::new("inline-violation", Severity::Medium, is_inline_violation),
    Rule::new("cosmetic-resource", Severity::Low, is_cosmetic_resource),
];

/// Outcome of classifying one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Resolved severity.
    pub severity: Severity,
    /// Name of the matching rule, `None` for the fallback.
    pub rule: Option<&'static str>,
}

/// Ordered rule evaluator.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
    fallback: Severity,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec(), FALLBACK_SEVERITY)
    }
}

impl Classifier {
    /// Creates a classifier over `rules`, evaluated in order.
    #[must_use]
    pub fn new(rules: Vec<Rule>, fallback: Severity) -> Self {
        Self { rules, fallback }
    }

    /// Returns the rule table in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns the severity of the first matching rule, or the fallback.
    #[must_use]
    pub fn classify(&self, report: &NormalizedReport) -> Severity {
        self.explain(report).severity
    }

    /// Classifies `report` and names the rule that decided it.
    #[must_use]
    pub fn explain(&self, report: &NormalizedReport) -> Classification {
        self.rules
            .iter()
            .find(|rule| rule.matches(report))
            .map_or(
                Classification {
                    severity: self.fallback,
                    rule: None,
                },
                |rule| Classification {
                    severity: rule.severity,
                    rule: Some(rule.name),
                },
            )
    }
}

/// Classifies `report` with the default rule table.
#[must_use]
pub fn classify(report: &NormalizedReport) -> Severity {
    DEFAULT_RULES
        .iter()
        .find(|rule| rule.matches(report))
        .map_or(FALLBACK_SEVERITY, |rule| rule.severity)
}

fn contains(field: Option<&String>, token: &str) -> bool {
    field.is_some_and(|value| value.to_ascii_lowercase().contains(token))
}

fn is_remote_script(report: &NormalizedReport) -> bool {
    let directive = report.violated_directive.as_ref();
    contains(directive, "script-src") && !contains(directive, "inline")
}

fn is_inline_violation(report: &NormalizedReport) -> bool {
    contains(report.blocked_uri.as_ref(), "inline")
        || contains(report.violated_directive.as_ref(), "inline")
}

fn is_cosmetic_resource(report: &NormalizedReport) -> bool {
    let directive = report.violated_directive.as_ref();
    ["style-src", "img-src", "font-src"]
        .iter()
        .any(|token| contains(directive, token))
}
