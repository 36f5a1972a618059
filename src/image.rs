//! Image reference normalization.
//!
//! Docker Hub addresses repositories as `namespace/repository`. Official
//! images are published under the `library` namespace, so a bare `nginx`
//! is rewritten to `library/nginx`. A reference without a tag resolves to
//! `latest`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Namespace Docker Hub uses for official images.
pub const DEFAULT_NAMESPACE: &str = "library";

/// Tag assumed when a reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Registry host prefixes that refer to Docker Hub itself.
const HUB_PREFIXES: &[&str] = &["docker.io/", "index.docker.io/", "registry-1.docker.io/"];

/// A normalized `(image, tag)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageRef {
    pub image: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Parse and normalize a reference such as `nginx`, `myrepo/app:v2` or
    /// `docker.io/library/redis:7@sha256:...`.
    pub fn parse(reference: &str) -> Self {
        let mut rest = reference.trim();

        // A pinned digest is not part of the tag.
        if let Some((name, _digest)) = rest.split_once('@') {
            rest = name;
        }

        for prefix in HUB_PREFIXES {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
                break;
            }
        }

        // The tag separator is the last ':' that comes after the last '/',
        // so `registry:5000/app` keeps its port.
        let (name, tag) = match rest.rfind(':') {
            Some(idx) if !rest[idx..].contains('/') => (&rest[..idx], &rest[idx + 1..]),
            _ => (rest, ""),
        };

        let image = if name.contains('/') {
            name.to_string()
        } else {
            format!("{}/{}", DEFAULT_NAMESPACE, name)
        };
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };

        Self {
            image,
            tag: tag.to_string(),
        }
    }

    /// Full `image:tag` reference, suitable for pulling.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

impl FromStr for ImageRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err("image reference is empty".to_string());
        }
        if is_digest(s) {
            return Err(format!(
                "'{}' is a content digest, only tagged images can be watched",
                s
            ));
        }
        Ok(Self::parse(s))
    }
}

/// True when the reference names image content by digest instead of by a
/// human tag (`sha256:...` image ids and `name@sha256:...` pins).
pub fn is_digest(reference: &str) -> bool {
    reference.contains("sha256:")
}
