// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document fetching for Print-URI and Send-URI.
//
// Only `file:`, `http:` and `https:` schemes are followed.  File URIs must
// name a regular file under one of the configured spool-side directories
// and may not contain `.` or `..` path components.  HTTP fetches follow a
// bounded number of redirects with a 30 second connect timeout and an
// `Accept-Language: en` request header.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use platen_core::error::Result;
use platen_core::{PlatenError, ServerConfig};

/// Redirect hop bound for http/https document fetches.
const MAX_REDIRECTS: usize = 10;

/// Connect timeout for http/https document fetches.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of a document fetch.
#[derive(Debug)]
pub struct FetchedDocument {
    pub bytes: u64,
    /// First 8 bytes, for format auto-detection.
    pub header: Vec<u8>,
}

/// Whether a `file:` resource path is structurally acceptable: absolute,
/// and free of `.` / `..` components.
pub fn valid_filename(path: &str) -> bool {
    let path = Path::new(path);
    if !path.is_absolute() {
        return false;
    }
    path.components()
        .all(|c| !matches!(c, Component::CurDir | Component::ParentDir))
}

/// Whether a file path falls under one of the allow-listed directories.
pub fn file_allowed(config: &ServerConfig, path: &Path) -> bool {
    config
        .file_directories
        .iter()
        .any(|dir| path.starts_with(dir))
}

/// Split a URI into scheme and remainder.
fn split_scheme(uri: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = uri.split_once(':')?;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some((scheme, rest))
}

/// Resource path of a `file:` URI (`file:///path` or `file:/path`).
fn file_uri_path(rest: &str) -> Option<PathBuf> {
    let path = rest.strip_prefix("///").map(|p| format!("/{p}")).or_else(|| {
        // file://host/path is not supported; file:/path is.
        rest.strip_prefix('/')
            .filter(|p| !p.starts_with('/'))
            .map(|p| format!("/{p}"))
    })?;
    Some(PathBuf::from(path))
}

/// Fetch the document named by `uri` into `dest`.
pub async fn fetch_document_uri(
    config: &ServerConfig,
    uri: &str,
    dest: &Path,
) -> Result<FetchedDocument> {
    let (scheme, rest) = split_scheme(uri)
        .ok_or_else(|| PlatenError::BadRequest(format!("bad document-uri \"{uri}\"")))?;

    match scheme {
        "file" => fetch_file(config, uri, rest, dest).await,
        "http" | "https" => fetch_http(uri, dest).await,
        other => Err(PlatenError::BadRequest(format!(
            "URI scheme \"{other}\" not supported"
        ))),
    }
}

async fn fetch_file(
    config: &ServerConfig,
    uri: &str,
    rest: &str,
    dest: &Path,
) -> Result<FetchedDocument> {
    let path = file_uri_path(rest)
        .ok_or_else(|| PlatenError::DocumentAccess(format!("unusable file URI \"{uri}\"")))?;

    let path_str = path.to_string_lossy();
    if !valid_filename(&path_str) || !file_allowed(config, &path) {
        return Err(PlatenError::DocumentAccess(format!(
            "file URI \"{uri}\" is outside the allowed directories"
        )));
    }

    let meta = tokio::fs::symlink_metadata(&path)
        .await
        .map_err(|e| PlatenError::DocumentAccess(format!("unable to access \"{uri}\": {e}")))?;
    if !meta.is_file() {
        return Err(PlatenError::DocumentAccess(format!(
            "\"{uri}\" is not a regular file"
        )));
    }

    let bytes = tokio::fs::copy(&path, dest)
        .await
        .map_err(|e| PlatenError::DocumentAccess(format!("unable to copy \"{uri}\": {e}")))?;

    let header = read_header(dest).await?;
    info!(uri, bytes, "fetched file document");
    Ok(FetchedDocument { bytes, header })
}

async fn fetch_http(uri: &str, dest: &Path) -> Result<FetchedDocument> {
    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| PlatenError::Server(format!("http client: {e}")))?;

    debug!(uri, "fetching document over http");
    let mut response = client
        .get(uri)
        .header(reqwest::header::ACCEPT_LANGUAGE, "en")
        .send()
        .await
        .map_err(|e| PlatenError::DocumentAccess(format!("GET {uri}: {e}")))?;

    if !response.status().is_success() {
        return Err(PlatenError::DocumentAccess(format!(
            "GET {uri}: status {}",
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut bytes = 0u64;
    let mut header = Vec::with_capacity(8);
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PlatenError::DocumentAccess(format!("read {uri}: {e}")))?
    {
        if header.len() < 8 {
            let take = (8 - header.len()).min(chunk.len());
            header.extend_from_slice(&chunk[..take]);
        }
        file.write_all(&chunk).await?;
        bytes += chunk.len() as u64;
    }
    file.flush().await?;

    info!(uri, bytes, "fetched http document");
    Ok(FetchedDocument { bytes, header })
}

async fn read_header(path: &Path) -> Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;
    let mut file = tokio::fs::File::open(path).await?;
    let mut header = [0u8; 8];
    let n = file.read(&mut header).await?;
    Ok(header[..n].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_validation_rejects_traversal() {
        assert!(valid_filename("/srv/docs/report.pdf"));
        assert!(!valid_filename("/srv/docs/../etc/passwd"));
        assert!(!valid_filename("/srv/./docs/report.pdf"));
        assert!(!valid_filename("relative/path.pdf"));
    }

    #[test]
    fn allow_list_is_prefix_based() {
        let mut config = ServerConfig::default();
        config.file_directories = vec![PathBuf::from("/srv/docs")];
        assert!(file_allowed(&config, Path::new("/srv/docs/a.pdf")));
        assert!(file_allowed(&config, Path::new("/srv/docs/sub/b.pdf")));
        assert!(!file_allowed(&config, Path::new("/srv/other/a.pdf")));
        assert!(!file_allowed(&config, Path::new("/etc/passwd")));
    }

    #[test]
    fn file_uri_paths() {
        assert_eq!(
            file_uri_path("///srv/docs/a.pdf"),
            Some(PathBuf::from("/srv/docs/a.pdf"))
        );
        assert_eq!(file_uri_path("/srv/a.pdf"), Some(PathBuf::from("/srv/a.pdf")));
        assert_eq!(file_uri_path("//host/share/a.pdf"), None);
    }

    #[test]
    fn scheme_splitting() {
        assert_eq!(split_scheme("http://h/x"), Some(("http", "//h/x")));
        assert_eq!(split_scheme("file:///x"), Some(("file", "///x")));
        assert_eq!(split_scheme("no-colon"), None);
        assert_eq!(split_scheme(":missing"), None);
    }

    #[tokio::test]
    async fn fetch_rejects_unknown_schemes() {
        let config = ServerConfig::default();
        let dir = tempfile::tempdir().expect("tempdir");
        let dest = dir.path().join("out.prn");
        let err = fetch_document_uri(&config, "ftp://host/file", &dest)
            .await
            .expect_err("ftp must fail");
        assert!(matches!(err, PlatenError::BadRequest(_)));
    }

    #[tokio::test]
    async fn fetch_file_honors_allow_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("doc.pdf");
        tokio::fs::write(&source, b"%PDF-1.7 test").await.expect("write");

        let mut config = ServerConfig::default();
        let dest_dir = tempfile::tempdir().expect("tempdir");
        let dest = dest_dir.path().join("spool.pdf");

        // Not in the allow list.
        let uri = format!("file://{}", source.display());
        assert!(fetch_document_uri(&config, &uri, &dest).await.is_err());

        // In the allow list.
        config.file_directories = vec![dir.path().to_path_buf()];
        let fetched = fetch_document_uri(&config, &uri, &dest).await.expect("fetch");
        assert_eq!(fetched.bytes, 13);
        assert_eq!(&fetched.header, b"%PDF-1.7");
    }
}
