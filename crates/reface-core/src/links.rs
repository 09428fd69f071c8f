//! Share-link resolution for the file-sharing host.
//!
//! Inputs arrive as browser share links (`…/file/d/<ID>/view`); downloads
//! need the direct form (`…/uc?id=<ID>`). Resolution is pure string work so
//! a malformed link fails before any network I/O.

use thiserror::Error;

const DIRECT_DOWNLOAD_BASE: &str = "https://drive.google.com/uc?id=";

/// Marker segment that precedes the embedded file identifier.
const ID_SEGMENT: &str = "/d/";

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("no embedded file identifier in share link: {0}")]
    MissingIdentifier(String),
    #[error("empty file identifier in share link: {0}")]
    EmptyIdentifier(String),
}

/// Extract the embedded file identifier from a share link.
///
/// Accepts the canonical `…/file/d/<ID>/view?…` form as well as links that
/// end right after the identifier (`…/d/<ID>`).
pub fn extract_file_id(url: &str) -> Result<&str, LinkError> {
    let (_, rest) = url
        .split_once(ID_SEGMENT)
        .ok_or_else(|| LinkError::MissingIdentifier(url.to_string()))?;

    // The identifier runs to the next path or query separator.
    let id = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();

    if id.is_empty() {
        return Err(LinkError::EmptyIdentifier(url.to_string()));
    }
    Ok(id)
}

/// Resolve a share link to its direct-download URL.
pub fn direct_download_url(url: &str) -> Result<String, LinkError> {
    direct_download_url_with_base(DIRECT_DOWNLOAD_BASE, url)
}

/// Resolve a share link against a non-default download endpoint.
pub fn direct_download_url_with_base(base: &str, url: &str) -> Result<String, LinkError> {
    let id = extract_file_id(url)?;
    Ok(format!("{base}{id}"))
}
