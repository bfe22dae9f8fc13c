//! Structured container image references.
//!
//! A reference has the shape `repository[:tag][@digest]`, where the
//! repository may carry a registry host with a port
//! (`localhost:5000/app:v1`). The tag separator is the last `:` after
//! the last `/`, so a registry port is never mistaken for a tag.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Image reference parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("invalid image reference {raw:?}: {reason}")]
    Invalid { raw: String, reason: &'static str },
}

impl ReferenceError {
    fn invalid(raw: &str, reason: &'static str) -> Self {
        Self::Invalid {
            raw: raw.to_string(),
            reason,
        }
    }
}

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Whether this expected reference protects the given image from
    /// garbage collection.
    ///
    /// Requires a repository match plus either equal tags or equal
    /// digests. A repository match alone, or a mismatched tag/digest,
    /// protects nothing.
    pub fn protects(&self, image: &ImageReference) -> bool {
        if self.repository != image.repository {
            return false;
        }

        if let (Some(expected), Some(actual)) = (&self.tag, &image.tag) {
            if expected == actual {
                return true;
            }
        }

        if let (Some(expected), Some(actual)) = (&self.digest, &image.digest) {
            if expected == actual {
                return true;
            }
        }

        false
    }
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn valid_digest(digest: &str) -> bool {
    match digest.split_once(':') {
        Some((algorithm, encoded)) => {
            !algorithm.is_empty()
                && algorithm.chars().all(|c| c.is_ascii_alphanumeric())
                && !encoded.is_empty()
                && encoded.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

impl FromStr for ImageReference {
    type Err = ReferenceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.is_empty() {
            return Err(ReferenceError::invalid(raw, "empty reference"));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ReferenceError::invalid(raw, "whitespace in reference"));
        }

        let (name, digest) = match raw.split_once('@') {
            Some((name, digest)) => {
                if !valid_digest(digest) {
                    return Err(ReferenceError::invalid(raw, "malformed digest"));
                }
                (name, Some(digest.to_string()))
            }
            None => (raw, None),
        };

        // The tag separator is the last ':' after the last '/'.
        let name_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (repository, tag) = match name[name_start..].rfind(':') {
            Some(rel) => {
                let sep = name_start + rel;
                let tag = &name[sep + 1..];
                if !valid_tag(tag) {
                    return Err(ReferenceError::invalid(raw, "malformed tag"));
                }
                (&name[..sep], Some(tag.to_string()))
            }
            None => (name, None),
        };

        if repository.is_empty() {
            return Err(ReferenceError::invalid(raw, "empty repository"));
        }

        Ok(Self {
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
