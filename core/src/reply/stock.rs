use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::task::PluginSpec;

const STOCK_PATTERNS: &[(&str, &str)] = &[
    ("Email", r"[\w.-]+@(?:[\w-]+\.)+[\w-]{2,4}"),
    ("Domain", r"(?:[\w-]+\.)+[\w-]{2,4}"),
    ("OTP", r"\d{6}"),
    (
        "IPaddr",
        r"(?:(?:0|1[0-9]{0,2}|2[0-9]?|2[0-4][0-9]|25[0-5]|[3-9][0-9]?)\.){3}(?:0|1[0-9]{0,2}|2[0-9]?|2[0-4][0-9]|25[0-5]|[3-9][0-9]?)",
    ),
    ("SimpleString", r#"[-\w .,_'"?!]+"#),
    ("YesNo", r"(?i:yes|no|Y|N)"),
];

lazy_static! {
    static ref STOCK_REPLIES: HashMap<&'static str, Regex> = STOCK_PATTERNS
        .iter()
        .map(|(tag, re)| {
            let re = Regex::new(&format!(r"^\s*{re}\s*$")).expect("stock reply pattern is valid");
            (*tag, re)
        })
        .collect();
}

/// Capitalized tags name stock patterns; anything else is looked up in the
/// plugin's own reply matchers.
pub fn resolve_reply_pattern(tag: &str, plugin: Option<&PluginSpec>) -> Option<Regex> {
    if tag.starts_with(|c: char| c.is_ascii_uppercase()) {
        return STOCK_REPLIES.get(tag).cloned();
    }
    plugin
        .and_then(|p| p.reply_matcher(tag))
        .map(|m| m.re.clone())
}
