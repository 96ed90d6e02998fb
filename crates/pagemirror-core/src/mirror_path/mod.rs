//! Destination path derivation: mirror a URL's path under the clone root.
//!
//! `https://example.com/img/logo.png` lands at `<root>/img/logo.png`;
//! directory-style paths (trailing slash, or a final segment with no dot)
//! get an `index.html` appended so the local tree stays browsable.

mod sanitize;

pub use sanitize::sanitize_segment;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Filename used for root and extensionless URL paths.
const INDEX_FILENAME: &str = "index.html";

/// The URL could not be parsed; the transfer is settled as failed without
/// ever reaching the executor.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a valid URL: {0}")]
pub struct InvalidUrl(pub String);

/// Derives the local destination path for `url` under `root`.
///
/// The URL's path component is mirrored segment by segment, each segment
/// sanitized for Linux filesystems. If the path ends in `/` or its final
/// segment contains no `.`, an `index.html` segment is appended. Query and
/// fragment are ignored.
///
/// # Examples
///
/// - `https://example.com/` → `<root>/index.html`
/// - `https://example.com/css/app` → `<root>/css/app/index.html`
/// - `https://example.com/img/logo.png` → `<root>/img/logo.png`
pub fn mirror_path(url: &str, root: &Path) -> Result<PathBuf, InvalidUrl> {
    let parsed = url::Url::parse(url).map_err(|_| InvalidUrl(url.to_string()))?;
    let path = parsed.path();

    let mut segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(sanitize_segment)
        .collect();

    let directory_like = path.ends_with('/') || segments.last().map_or(true, |s| !s.contains('.'));
    if directory_like {
        segments.push(INDEX_FILENAME.to_string());
    }

    let mut out = root.to_path_buf();
    for segment in segments {
        out.push(segment);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mirrored(url: &str) -> String {
        mirror_path(url, Path::new("cloned-project"))
            .unwrap()
            .to_string_lossy()
            .into_owned()
    }

    #[test]
    fn root_url_maps_to_index() {
        assert_eq!(mirrored("https://example.com/"), "cloned-project/index.html");
        assert_eq!(mirrored("https://example.com"), "cloned-project/index.html");
    }

    #[test]
    fn extensionless_path_gets_index_segment() {
        assert_eq!(
            mirrored("https://example.com/css/app"),
            "cloned-project/css/app/index.html"
        );
    }

    #[test]
    fn file_path_is_mirrored_as_is() {
        assert_eq!(
            mirrored("https://example.com/img/logo.png"),
            "cloned-project/img/logo.png"
        );
    }

    #[test]
    fn trailing_slash_gets_index() {
        assert_eq!(
            mirrored("https://example.com/assets/"),
            "cloned-project/assets/index.html"
        );
    }

    #[test]
    fn query_and_fragment_ignored() {
        assert_eq!(
            mirrored("https://example.com/app.js?v=3#frag"),
            "cloned-project/app.js"
        );
    }

    #[test]
    fn malformed_url_is_rejected() {
        assert!(mirror_path("not a url", Path::new("cloned-project")).is_err());
        assert!(mirror_path("", Path::new("cloned-project")).is_err());
    }

    #[test]
    fn dot_segments_cannot_escape_root() {
        // The url crate normalizes `..` away during parsing.
        assert_eq!(
            mirrored("https://example.com/a/../../etc/passwd.txt"),
            "cloned-project/etc/passwd.txt"
        );
    }
}
