//! Input Resolution for Compliance Scanning
//!
//! Resolves a definitions or tailoring URI (`file://`, `http://`,
//! `https://`; `.xml` or `.bz2`) to a local decompressed file in the
//! invocation working directory. Scheme and extension are validated before
//! any network or file access; payloads are hashed as they stream to disk.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use scap_core::{validate_source_uri, DefinitionsFetcher, FetchedFile, ScanError, ScanResult};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;

/// A source resolved into the working directory.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    /// Local, decompressed file path.
    pub path: PathBuf,
    /// SHA-256 of the payload as fetched (before decompression).
    pub sha256: String,
}

/// Resolves definitions/tailoring URIs to local files.
pub struct UriFetcher {
    client: reqwest::blocking::Client,
}

impl UriFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }

    /// Fetch `uri` into `dest_dir`, decompressing `.bz2` payloads.
    ///
    /// Callers are expected to have validated the URI already; this only
    /// performs the transfer.
    pub fn resolve(&self, uri: &str, dest_dir: &Path) -> FetchResult<ResolvedSource> {
        fs::create_dir_all(dest_dir)?;

        let file_name = uri.rsplit('/').next().unwrap_or(uri);
        let fetched_path = dest_dir.join(file_name);

        let sha256 = if let Some(local_path) = uri.strip_prefix("file://") {
            debug!("copying local definitions {local_path}");
            copy_and_hash(File::open(local_path)?, &fetched_path)?
        } else {
            debug!("downloading {uri}");
            let response = self.client.get(uri).send()?.error_for_status()?;
            copy_and_hash(response, &fetched_path)?
        };

        let path = if fetched_path.extension().is_some_and(|ext| ext == "bz2") {
            decompress_bz2(&fetched_path)?
        } else {
            fetched_path
        };

        info!("resolved {uri} to {} (sha256 {sha256})", path.display());
        Ok(ResolvedSource { path, sha256 })
    }
}

impl Default for UriFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl DefinitionsFetcher for UriFetcher {
    fn fetch(&self, uri: &str, dest_dir: &Path) -> ScanResult<FetchedFile> {
        validate_source_uri(uri)?;
        let resolved = self.resolve(uri, dest_dir).map_err(|fetch_error| {
            ScanError::Fetch(format!(
                "error downloading OpenSCAP input file ({uri}): {fetch_error}"
            ))
        })?;
        Ok(FetchedFile {
            path: resolved.path,
            sha256: resolved.sha256,
        })
    }
}

/// Stream `reader` to `dest`, returning the SHA-256 of the bytes written.
fn copy_and_hash<R: Read>(mut reader: R, dest: &Path) -> FetchResult<String> {
    let mut file = File::create(dest)?;
    let mut hasher = Sha256::new();
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
        file.write_all(&chunk[..read])?;
    }
    file.flush()?;
    Ok(hex::encode(hasher.finalize()))
}

/// Decompress a `.bz2` payload next to itself, dropping the suffix.
fn decompress_bz2(compressed_path: &Path) -> FetchResult<PathBuf> {
    let target_path = compressed_path.with_extension("");
    debug!(
        "decompressing {} to {}",
        compressed_path.display(),
        target_path.display()
    );

    let mut decoder = BzDecoder::new(File::open(compressed_path)?);
    let mut target = File::create(&target_path)?;
    io::copy(&mut decoder, &mut target)
        .map_err(|decode_error| FetchError::Decompression(format!("bzip2: {decode_error}")))?;

    Ok(target_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;

    const DEFINITIONS: &str = r#"<?xml version="1.0"?><oval_definitions/>"#;

    fn file_uri(path: &Path) -> String {
        format!("file://{}", path.display())
    }

    #[test]
    fn test_resolve_local_xml() {
        let source_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("defs.xml");
        fs::write(&source, DEFINITIONS).unwrap();

        let fetcher = UriFetcher::new();
        let resolved = fetcher
            .resolve(&file_uri(&source), work_dir.path())
            .unwrap();

        assert_eq!(resolved.path, work_dir.path().join("defs.xml"));
        assert_eq!(fs::read_to_string(&resolved.path).unwrap(), DEFINITIONS);
        assert_eq!(resolved.sha256.len(), 64);
    }

    #[test]
    fn test_resolve_local_bz2_decompresses() {
        let source_dir = tempfile::tempdir().unwrap();
        let work_dir = tempfile::tempdir().unwrap();
        let source = source_dir.path().join("defs.xml.bz2");

        let mut encoder = BzEncoder::new(File::create(&source).unwrap(), Compression::default());
        encoder.write_all(DEFINITIONS.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let fetcher = UriFetcher::new();
        let resolved = fetcher
            .resolve(&file_uri(&source), work_dir.path())
            .unwrap();

        assert_eq!(resolved.path, work_dir.path().join("defs.xml"));
        assert_eq!(fs::read_to_string(&resolved.path).unwrap(), DEFINITIONS);
    }

    #[test]
    fn test_fetch_validates_before_any_access() {
        let work_dir = tempfile::tempdir().unwrap();
        let fetcher = UriFetcher::new();

        let err = fetcher
            .fetch("ftp://example.com/defs.xml", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));

        let err = fetcher
            .fetch("file:///tmp/defs.tar.gz", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, ScanError::Validation(_)));

        // nothing may have been written to the working directory
        assert_eq!(fs::read_dir(work_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_fetch_missing_local_file_is_fetch_error() {
        let work_dir = tempfile::tempdir().unwrap();
        let fetcher = UriFetcher::new();

        let err = fetcher
            .fetch("file:///nonexistent/defs.xml", work_dir.path())
            .unwrap_err();
        assert!(matches!(err, ScanError::Fetch(_)));
    }
}
