// SPDX-License-Identifier: MIT OR Apache-2.0

//! Markup scrubbing for string values.
//!
//! Both functions run to a fixed point, so scrubbing their own output is a
//! no-op.

use once_cell::sync::Lazy;
use regex::Regex;

/// Upper bound on scrub passes; real input converges in two or three.
const MAX_PASSES: usize = 16;

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("valid regex")
});

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style\s*>").expect("valid regex"));

static DANGEROUS_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</?(script|style|iframe|frame|frameset|object|embed|applet|form|input|button|link|meta|base|svg|math)\b[^>]*>")
        .expect("valid regex")
});

static EVENT_HANDLER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\s+on[a-z]+\s*=\s*("[^"]*"|'[^']*'|[^\s>]+)"#).expect("valid regex")
});

static SCRIPT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(javascript|vbscript)\s*:").expect("valid regex"));

fn is_unsafe_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\n' | '\r' | '\t')
}

fn to_fixed_point(input: &str, pass: impl Fn(&str) -> String) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_PASSES {
        let next = pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Removes every tag, stray angle bracket and control character.
///
/// ```
/// use trustcfg::service::markup::strip_markup;
///
/// assert_eq!(strip_markup("<b>Acme</b> Corp\u{0007}"), "Acme Corp");
/// ```
pub fn strip_markup(input: &str) -> String {
    to_fixed_point(input, |s| {
        TAG.replace_all(s, "")
            .chars()
            .filter(|&c| c != '<' && c != '>' && !is_unsafe_control(c))
            .collect()
    })
}

/// Keeps harmless formatting markup but removes script and style blocks,
/// active-content tags, inline event handlers and script URLs.
///
/// ```
/// use trustcfg::service::markup::clean_markup;
///
/// let cleaned = clean_markup(r#"<p onclick="steal()">Hi<script>x()</script></p>"#);
/// assert_eq!(cleaned, "<p>Hi</p>");
/// ```
pub fn clean_markup(input: &str) -> String {
    to_fixed_point(input, |s| {
        let s = SCRIPT_BLOCK.replace_all(s, "");
        let s = STYLE_BLOCK.replace_all(&s, "");
        let s = DANGEROUS_TAG.replace_all(&s, "");
        let s = EVENT_HANDLER.replace_all(&s, "");
        let s = SCRIPT_URL.replace_all(&s, "");
        s.chars().filter(|&c| !is_unsafe_control(c)).collect()
    })
}
