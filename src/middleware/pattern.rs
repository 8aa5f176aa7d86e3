//! URL patterns used to register middleware on a subset of paths.
//!
//! Patterns follow servlet mapping rules:
//!
//! | Pattern     | Matches                                  |
//! |-------------|------------------------------------------|
//! | `/*`        | every path                               |
//! | `/api/*`    | `/api` and everything below `/api/`      |
//! | `*.json`    | paths whose last segment ends in `.json` |
//! | `/status`   | exactly `/status`                        |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("url pattern is empty")]
    Empty,
    #[error("invalid url pattern `{0}`: must start with `/` or `*.`")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlPattern {
    Any,
    Prefix(String),
    Extension(String),
    Exact(String),
}

impl UrlPattern {
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        if raw == "/*" {
            return Ok(Self::Any);
        }
        if let Some(prefix) = raw.strip_suffix("/*") {
            if prefix.starts_with('/') && !prefix.contains('*') {
                return Ok(Self::Prefix(prefix.to_string()));
            }
            return Err(PatternError::Invalid(raw.to_string()));
        }
        if let Some(ext) = raw.strip_prefix("*.") {
            if !ext.is_empty() && !ext.contains(['/', '*']) {
                return Ok(Self::Extension(ext.to_string()));
            }
            return Err(PatternError::Invalid(raw.to_string()));
        }
        if raw.starts_with('/') && !raw.contains('*') {
            return Ok(Self::Exact(raw.to_string()));
        }

        Err(PatternError::Invalid(raw.to_string()))
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Prefix(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
            Self::Extension(ext) => {
                let last = path.rsplit('/').next().unwrap_or(path);
                last.strip_suffix(ext.as_str())
                    .is_some_and(|stem| stem.ends_with('.') && stem.len() > 1)
            }
            Self::Exact(exact) => path == exact,
        }
    }
}

impl FromStr for UrlPattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UrlPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("/*"),
            Self::Prefix(prefix) => write!(f, "{prefix}/*"),
            Self::Extension(ext) => write!(f, "*.{ext}"),
            Self::Exact(exact) => f.write_str(exact),
        }
    }
}

/// The set of patterns a middleware is registered on. A path is observed
/// when any pattern matches it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct UrlPatterns(Vec<UrlPattern>);

impl UrlPatterns {
    pub fn new(patterns: Vec<UrlPattern>) -> Self {
        Self(patterns)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|pattern| pattern.matches(path))
    }
}

impl TryFrom<Vec<String>> for UrlPatterns {
    type Error = PatternError;

    fn try_from(raw: Vec<String>) -> Result<Self, Self::Error> {
        raw.iter()
            .map(|p| UrlPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl From<UrlPatterns> for Vec<String> {
    fn from(patterns: UrlPatterns) -> Self {
        patterns.0.iter().map(ToString::to_string).collect()
    }
}
