//! Download URL resolution.
//!
//! The orchestrator never builds URLs itself; it asks a `UrlResolver` to map
//! `(source_root, filename)` to the location of the file.

/// Maps a source root and physical filename to a download URL.
///
/// Implementations must be pure: the same inputs always produce the same URL.
pub trait UrlResolver: Send + Sync {
    /// Resolve the URL of `filename` within `source_root`.
    fn resolve(&self, source_root: &str, filename: &str) -> String;
}

/// Default file host base URL.
pub const DEFAULT_BASE_URL: &str = "https://huggingface.co";

/// Default repository revision.
pub const DEFAULT_REVISION: &str = "main";

/// Resolver for Hugging Face style hosts:
/// `<base>/<repo>/resolve/<revision>/<filename>`.
#[derive(Debug, Clone)]
pub struct HubResolver {
    base_url: String,
    revision: String,
}

impl Default for HubResolver {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_REVISION)
    }
}

impl HubResolver {
    /// Create a resolver for the given host and revision.
    pub fn new(base_url: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            revision: revision.into(),
        }
    }

    /// Get the base URL (without trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl UrlResolver for HubResolver {
    fn resolve(&self, source_root: &str, filename: &str) -> String {
        let path = filename
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!(
            "{}/{}/resolve/{}/{}",
            self.base_url,
            source_root.trim_matches('/'),
            self.revision,
            path
        )
    }
}
