//! Model cache (§6): ensures `models/ggml-<name>.bin` exists and matches
//! its configured checksum, downloading it over TLS if not.

use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use stt_core::error::{Result, SttError};
use tracing::{info, warn};

use crate::config::ModelSource;

/// Resolve the cache path for a named model under `cache_dir`.
pub fn cache_path(cache_dir: &Path, name: &str) -> PathBuf {
    cache_dir.join(format!("ggml-{name}.bin"))
}

/// Ensure the model file at `cache_path` exists and is valid, fetching it
/// from `source.url` if missing or checksum-mismatched. Blocking —
/// callers run this via `spawn_blocking` or before starting the async
/// runtime.
pub fn ensure_model(cache_dir: &Path, name: &str, source: &ModelSource) -> Result<PathBuf> {
    std::fs::create_dir_all(cache_dir)
        .map_err(|e| SttError::InitError(format!("failed to create model cache dir: {e}")))?;

    let path = cache_path(cache_dir, name);

    if path.exists() {
        if let Some(expected) = &source.sha256 {
            match sha256_of(&path) {
                Ok(actual) if actual.eq_ignore_ascii_case(expected) => {
                    info!(model = name, "cached model checksum verified");
                    return Ok(path);
                }
                Ok(_) => {
                    warn!(model = name, "cached model checksum mismatch, re-downloading");
                }
                Err(e) => {
                    warn!(model = name, "failed to hash cached model, re-downloading: {e}");
                }
            }
        } else {
            return Ok(path);
        }
    }

    download(&path, source)?;

    if let Some(expected) = &source.sha256 {
        let actual = sha256_of(&path)?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(SttError::InitError(format!(
                "downloaded model '{name}' checksum mismatch: expected {expected}, got {actual}"
            )));
        }
    }

    Ok(path)
}

fn download(dest: &Path, source: &ModelSource) -> Result<()> {
    info!(url = source.url.as_str(), "downloading model");
    let client = reqwest::blocking::Client::builder()
        .min_tls_version(reqwest::tls::Version::TLS_1_2)
        .build()
        .map_err(|e| SttError::InitError(format!("failed to build HTTP client: {e}")))?;

    let response = client
        .get(&source.url)
        .send()
        .map_err(|e| SttError::InitError(format!("model download request failed: {e}")))?
        .error_for_status()
        .map_err(|e| SttError::InitError(format!("model download returned error status: {e}")))?;

    let bytes = response
        .bytes()
        .map_err(|e| SttError::InitError(format!("failed to read model response body: {e}")))?;

    let tmp_path = dest.with_extension("tmp");
    {
        let mut tmp_file = std::fs::File::create(&tmp_path)
            .map_err(|e| SttError::InitError(format!("failed to create temp model file: {e}")))?;
        tmp_file
            .write_all(&bytes)
            .map_err(|e| SttError::InitError(format!("failed to write temp model file: {e}")))?;
    }

    std::fs::rename(&tmp_path, dest)
        .map_err(|e| SttError::InitError(format!("failed to rename temp model file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o644);
        std::fs::set_permissions(dest, perms)
            .map_err(|e| SttError::InitError(format!("failed to chmod model file: {e}")))?;
    }

    Ok(())
}

fn sha256_of(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_uses_ggml_naming_convention() {
        let dir = Path::new("/tmp/models");
        assert_eq!(
            cache_path(dir, "base.en"),
            PathBuf::from("/tmp/models/ggml-base.en.bin")
        );
    }

    #[test]
    fn sha256_of_known_bytes() {
        let tmp = std::env::temp_dir().join(format!("stt-model-cache-test-{}", std::process::id()));
        std::fs::write(&tmp, b"hello").unwrap();
        let digest = sha256_of(&tmp).unwrap();
        std::fs::remove_file(&tmp).ok();
        assert_eq!(
            digest,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
