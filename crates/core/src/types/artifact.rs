use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Opaque handle to a built binary, as reported by the compile collaborator.
///
/// Tasks hold it behind an `Arc` so every task that resolves through the same
/// build-cache entry observes the same artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the collaborator put the image (a path for command builds)
    pub location: String,
    /// SHA-256 of the image contents, when the collaborator could read it
    pub image_checksum: Option<String>,
}

impl Artifact {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            image_checksum: None,
        }
    }

    #[must_use]
    pub fn with_image_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.image_checksum = Some(checksum.into());
        self
    }
}

impl Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location)
    }
}
