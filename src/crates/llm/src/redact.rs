//! Credential scrubbing for provider error bodies.
//!
//! Providers sometimes echo the rejected key back ("Incorrect API key
//! provided: sk-..."). Anything that ends up in logs or checkpoint metadata
//! goes through [`redact_secrets`] first.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

const REDACTED: &str = "[REDACTED]";

fn patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(?i)bearer\s+[A-Za-z0-9._\-]+",
            r"\bsk-[A-Za-z0-9_\-]{8,}",
            r"\bgsk_[A-Za-z0-9]{8,}",
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Replace API keys and bearer tokens with `[REDACTED]`.
pub fn redact_secrets(text: &str) -> Cow<'_, str> {
    let mut out = Cow::Borrowed(text);
    for pattern in patterns() {
        if pattern.is_match(&out) {
            out = Cow::Owned(pattern.replace_all(&out, REDACTED).into_owned());
        }
    }
    out
}
