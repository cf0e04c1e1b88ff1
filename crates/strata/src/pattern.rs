// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Glob matching for key enumeration.

use std::fmt::Debug;

use regex::Regex;
use strata_tier::{Error, Result};

/// A glob pattern over cache keys.
///
/// `*` matches any run of characters, including none, and `?` matches exactly one
/// character. Everything else matches itself and the whole key must match.
///
/// # Examples
///
/// ```
/// use strata::KeyPattern;
///
/// let pattern = KeyPattern::new("user:*:name")?;
/// assert!(pattern.matches("user:42:name"));
/// assert!(!pattern.matches("user:42:email"));
///
/// let pattern = KeyPattern::new("a?c")?;
/// assert!(pattern.matches("abc"));
/// assert!(!pattern.matches("ac"));
/// # Ok::<(), strata::Error>(())
/// ```
#[derive(Clone)]
pub struct KeyPattern {
    source: String,
    matcher: Matcher,
}

#[derive(Clone, Debug)]
enum Matcher {
    Exact(String),
    Any,
    Prefix(String),
    Suffix(String),
    Contains(String),
    PrefixSuffix(String, String),
    SingleChars(Vec<Option<char>>),
    Regex(Regex),
}

impl KeyPattern {
    /// Parses a glob pattern.
    ///
    /// # Errors
    ///
    /// Returns an invalid-argument error if `pattern` is empty.
    pub fn new(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::invalid_argument("key pattern must not be empty"));
        }

        Ok(Self {
            source: pattern.to_owned(),
            matcher: classify(&collapse_stars(pattern))?,
        })
    }

    /// Returns `true` if `key` matches the whole pattern.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(text) => key == text,
            Matcher::Any => true,
            Matcher::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Matcher::Suffix(suffix) => key.ends_with(suffix.as_str()),
            Matcher::Contains(infix) => key.contains(infix.as_str()),
            Matcher::PrefixSuffix(prefix, suffix) => {
                key.len() >= prefix.len() + suffix.len() && key.starts_with(prefix.as_str()) && key.ends_with(suffix.as_str())
            }
            Matcher::SingleChars(chars) => {
                key.chars().count() == chars.len()
                    && key.chars().zip(chars).all(|(actual, expected)| expected.is_none_or(|c| c == actual))
            }
            Matcher::Regex(regex) => regex.is_match(key),
        }
    }

    /// Returns the pattern as given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Debug for KeyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyPattern").field(&self.source).finish()
    }
}

fn collapse_stars(pattern: &str) -> String {
    let mut collapsed = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if c != '*' || !collapsed.ends_with('*') {
            collapsed.push(c);
        }
    }
    collapsed
}

fn classify(pattern: &str) -> Result<Matcher> {
    let stars = pattern.matches('*').count();
    let has_single = pattern.contains('?');

    if !has_single {
        let matcher = match (stars, pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            (0, _, _) => Some(Matcher::Exact(pattern.to_owned())),
            (1, Some(""), _) => Some(Matcher::Any),
            (1, Some(suffix), _) => Some(Matcher::Suffix(suffix.to_owned())),
            (1, None, Some(prefix)) => Some(Matcher::Prefix(prefix.to_owned())),
            (1, None, None) => pattern
                .split_once('*')
                .map(|(prefix, suffix)| Matcher::PrefixSuffix(prefix.to_owned(), suffix.to_owned())),
            (2, Some(rest), Some(_)) => rest.strip_suffix('*').map(|infix| Matcher::Contains(infix.to_owned())),
            _ => None,
        };
        if let Some(matcher) = matcher {
            return Ok(matcher);
        }
    } else if stars == 0 {
        return Ok(Matcher::SingleChars(pattern.chars().map(|c| (c != '?').then_some(c)).collect()));
    }

    translate(pattern).map(Matcher::Regex)
}

/// Translates a glob into an anchored regex: `*` becomes `.*` and `?` becomes `.`.
fn translate(pattern: &str) -> Result<Regex> {
    let mut expression = String::from("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => expression.push_str(".*"),
            '?' => expression.push('.'),
            c => expression.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    expression.push('$');

    Regex::new(&expression).map_err(|e| Error::invalid_argument(format!("invalid key pattern '{pattern}': {e}")))
}
