//! Web request classification.
//!
//! Attack signatures are an ordered `(pattern, label)` table checked before
//! any status-code bucket, so an XSS probe that also 404s is still reported
//! as `XSS_ATTEMPT`. The table can be replaced at runtime; the rest of the
//! cascade is fixed.

use std::borrow::Cow;
use std::sync::Arc;

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

pub const PATH_TRAVERSAL: &str = "PATH_TRAVERSAL_ATTEMPT";
pub const SQL_INJECTION: &str = "SQL_INJECTION_ATTEMPT";
pub const XSS: &str = "XSS_ATTEMPT";
pub const COMMAND_INJECTION: &str = "COMMAND_INJECTION_ATTEMPT";
pub const PHP_INJECTION: &str = "PHP_INJECTION_ATTEMPT";

/// Most specific first. Order is part of the contract.
pub const DEFAULT_SIGNATURES: [(&str, &str); 11] = [
    (r"\.\./", PATH_TRAVERSAL),
    (r"etc/passwd", PATH_TRAVERSAL),
    (r"'", SQL_INJECTION),
    (r"or\s+'1'\s*=\s*'1", SQL_INJECTION),
    (r"union\s+select", SQL_INJECTION),
    (r"--", SQL_INJECTION),
    (r"<script", XSS),
    (r"javascript:", XSS),
    (r"cmd=", COMMAND_INJECTION),
    (r"exec\(", COMMAND_INJECTION),
    (r"\.php\?", PHP_INJECTION),
];

fn case_insensitive(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .expect("built-in classification pattern")
}

static SCANNER_AGENTS: Lazy<Regex> =
    Lazy::new(|| case_insensitive(r"(sqlmap|nikto|nmap|masscan|burp|zap|acunetix|nessus)"));
static AUTH_PATHS: Lazy<Regex> = Lazy::new(|| case_insensitive(r"/(login|signin|auth|authenticate|session)"));
static ADMIN_PATHS: Lazy<Regex> = Lazy::new(|| case_insensitive(r"/(admin|dashboard)"));
static FILE_EXTENSIONS: Lazy<Regex> = Lazy::new(|| case_insensitive(r"\.(pdf|xlsx|doc|csv|zip|tar|gz)$"));
static USER_PATHS: Lazy<Regex> = Lazy::new(|| case_insensitive(r"/(user|account|profile)"));

static DEFAULT_CLASSIFIER: Lazy<Arc<EventClassifier>> = Lazy::new(|| {
    let signatures = DEFAULT_SIGNATURES
        .iter()
        .map(|(pattern, label)| (case_insensitive(pattern), label.to_string()))
        .collect();
    Arc::new(EventClassifier { signatures })
});

/// One row of a signature table, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub pattern: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct EventClassifier {
    signatures: Vec<(Regex, String)>,
}

impl EventClassifier {
    /// Shared instance using [`DEFAULT_SIGNATURES`].
    pub fn shared() -> Arc<EventClassifier> {
        Arc::clone(&DEFAULT_CLASSIFIER)
    }

    /// Build from a custom signature table. Patterns are case-insensitive.
    pub fn with_signatures(signatures: &[Signature]) -> Result<Self, regex::Error> {
        let signatures = signatures
            .iter()
            .map(|s| {
                RegexBuilder::new(&s.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (re, s.label.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { signatures })
    }

    /// Labels in evaluation order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.signatures.iter().map(|(_, label)| label.as_str())
    }

    /// Return the first signature label matching `path`, checking the raw
    /// path and then its percent-decoded form.
    pub fn match_signature(&self, path: &str) -> Option<&str> {
        if path.is_empty() {
            return None;
        }
        let decoded = decode_path(path);
        self.signatures
            .iter()
            .find(|(re, _)| {
                re.is_match(path) || matches!(&decoded, Cow::Owned(d) if re.is_match(d))
            })
            .map(|(_, label)| label.as_str())
    }

    /// Priority cascade over the request's characteristics.
    pub fn classify(&self, method: &str, path: &str, status: u16, user_agent: &str) -> &str {
        if path.is_empty() && method.is_empty() && user_agent.is_empty() {
            return "LOG_ENTRY";
        }

        if let Some(label) = self.match_signature(path) {
            return label;
        }

        if !user_agent.is_empty() && SCANNER_AGENTS.is_match(user_agent) {
            return "SCANNER_DETECTED";
        }

        if !path.is_empty() && AUTH_PATHS.is_match(path) {
            match (status, method) {
                (401 | 403, _) => return "LOGIN_FAILURE",
                (200, "POST") => return "LOGIN_SUCCESS",
                _ => {}
            }
        }

        match status {
            403 => return "ACCESS_DENIED",
            401 => return "UNAUTHORIZED",
            _ => {}
        }

        if !path.is_empty() && ADMIN_PATHS.is_match(path) {
            return "ADMIN_ACCESS";
        }

        if method == "DELETE" {
            return "DELETE_OPERATION";
        }

        if matches!(method, "POST" | "PUT" | "PATCH") && USER_PATHS.is_match(path) {
            return "USER_MODIFICATION";
        }

        if FILE_EXTENSIONS.is_match(path) {
            return "FILE_ACCESS";
        }

        if status >= 500 {
            return "SERVER_ERROR";
        }
        if status >= 400 {
            return "CLIENT_ERROR";
        }

        if !method.is_empty() || status != 0 {
            "WEB_ACCESS"
        } else {
            "LOG_ENTRY"
        }
    }
}

impl Default for EventClassifier {
    fn default() -> Self {
        EventClassifier::clone(&DEFAULT_CLASSIFIER)
    }
}

/// Percent-decode a request path, treating `+` as a space. Borrowed when
/// nothing changed.
fn decode_path(path: &str) -> Cow<'_, str> {
    if !path.contains('%') && !path.contains('+') {
        return Cow::Borrowed(path);
    }
    let spaced = path.replace('+', " ");
    let decoded = percent_decode_str(&spaced).decode_utf8_lossy().into_owned();
    if decoded == path {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(decoded)
    }
}
