use lazy_static::lazy_static;
use regex::Regex;

use super::def::MatcherDef;

lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[\w-]+$").expect("IDENTIFIER_RE is valid");
    static ref BRACKET_SPACE_RE: Regex =
        Regex::new(r"\[([^\]]*) ([^\]]*)\]").expect("BRACKET_SPACE_RE is valid");
}

/// Names of tasks, handlers and parameters.
pub fn is_identifier(s: &str) -> bool {
    IDENTIFIER_RE.is_match(s)
}

/// Lets a space match any run of whitespace so pasted commands still match.
pub fn massage_regex(r: &str) -> String {
    let regex = BRACKET_SPACE_RE.replace_all(r, r"[${1}\x20${2}]");
    regex.replace(" ?", r"\s*").replace(' ', r"\s+")
}

/// A compiled command, message, reply or trigger matcher.
#[derive(Debug, Clone)]
pub struct InputMatcher {
    pub regex: String,
    pub command: String,
    pub label: String,
    pub user: String,
    pub parameters: Vec<String>,
    pub re: Regex,
}

impl InputMatcher {
    /// Command and reply matchers must match the whole message.
    pub fn anchored(def: &MatcherDef) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!(r"(?i)^\s*{}\s*$", massage_regex(&def.regex)))?;
        Ok(Self::from_def(def, re))
    }

    /// Ambient message matchers and job triggers can match anywhere.
    pub fn unanchored(def: &MatcherDef) -> Result<Self, regex::Error> {
        let re = Regex::new(&format!("(?i){}", massage_regex(&def.regex)))?;
        Ok(Self::from_def(def, re))
    }

    fn from_def(def: &MatcherDef, re: Regex) -> Self {
        Self {
            regex: def.regex.clone(),
            command: def.command.clone(),
            label: def.label.clone(),
            user: def.user.clone(),
            parameters: def.parameters.clone(),
            re,
        }
    }

    /// Capture groups, in order; unmatched optional groups become "".
    pub fn captures(&self, text: &str) -> Option<Vec<String>> {
        let caps = self.re.captures(text)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}
