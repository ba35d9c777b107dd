//! Content-addressable naming and publishing of cached artifacts.
//!
//! An artifact identity is `sha1(text)-sha1(engine + options)`. A file named
//! after an identity is never rewritten in place: writers render into a
//! private temporary file in the cache directory and rename it over the
//! final name, so concurrent writers of the same identity never expose a
//! partial file and the last rename wins.

use crate::error::SynthError;
use sha1::{Digest, Sha1};
use std::path::{Path, PathBuf};

/// Extension of the raw engine output every encoder starts from.
pub const RAW_EXTENSION: &str = "wav";

fn sha1_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha1::digest(bytes))
}

pub fn content_hash(text: &str) -> String {
    sha1_hex(text.as_bytes())
}

/// Renders effective engine options as `["a", "b"]`, the canonical form
/// hashed into the parameter half of an identity.
pub fn canonical_options(options: &[String]) -> String {
    let quoted: Vec<String> = options.iter().map(|o| format!("{:?}", o)).collect();
    format!("[{}]", quoted.join(", "))
}

pub fn param_hash(engine: &str, options: &[String]) -> String {
    sha1_hex(format!("{}{}", engine, canonical_options(options)).as_bytes())
}

pub fn identity(content_hash: &str, param_hash: &str) -> String {
    format!("{}-{}", content_hash, param_hash)
}

/// Path of `identity` with `extension` (with or without a leading dot).
pub fn artifact_path(cache_dir: &Path, identity: &str, extension: &str) -> PathBuf {
    cache_dir.join(format!(
        "{}.{}",
        identity,
        extension.trim_start_matches('.')
    ))
}

/// Lets `write` produce the artifact at a temporary path next to `target`,
/// then atomically moves it into place. On error nothing is left behind.
pub fn publish<F>(cache_dir: &Path, target: &Path, write: F) -> Result<(), SynthError>
where
    F: FnOnce(&Path) -> Result<(), SynthError>,
{
    let suffix = target
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let temp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(&suffix)
        .tempfile_in(cache_dir)?
        .into_temp_path();

    write(&temp)?;

    temp.persist(target).map_err(|e| SynthError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_sha1_hex() {
        assert_eq!(
            content_hash("hello"),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
        assert_eq!(content_hash(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn test_canonical_options() {
        let options = vec!["200".to_string(), "50".to_string(), "en+f1".to_string()];
        assert_eq!(canonical_options(&options), r#"["200", "50", "en+f1"]"#);
        assert_eq!(canonical_options(&[]), "[]");
    }

    #[test]
    fn test_param_hash_depends_on_engine_and_order() {
        let a = vec!["200".to_string(), "default".to_string()];
        let b = vec!["default".to_string(), "200".to_string()];
        assert_eq!(param_hash("espeak", &a), param_hash("espeak", &a));
        assert_ne!(param_hash("espeak", &a), param_hash("piper", &a));
        assert_ne!(param_hash("espeak", &a), param_hash("espeak", &b));
    }

    #[test]
    fn test_artifact_path_accepts_dotted_extension() {
        let dir = Path::new("/cache");
        assert_eq!(
            artifact_path(dir, "ab-cd", ".ogg"),
            PathBuf::from("/cache/ab-cd.ogg")
        );
        assert_eq!(
            artifact_path(dir, "ab-cd", "wav"),
            PathBuf::from("/cache/ab-cd.wav")
        );
    }

    #[test]
    fn test_publish_moves_file_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ab-cd.wav");

        publish(dir.path(), &target, |tmp| {
            std::fs::write(tmp, b"RIFF")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"RIFF");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_publish_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ab-cd.wav");

        let result = publish(dir.path(), &target, |_| {
            Err(SynthError::Synthesis("engine crashed".to_string()))
        });

        assert!(result.is_err());
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_publish_error_does_not_leak_cache_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("gone");
        let target = missing.join("ab-cd.wav");

        let err = publish(&missing, &target, |_| Ok(())).unwrap_err();
        let description = err.to_string();
        assert_eq!(description, "cache i/o error: entity not found");
        assert!(!description.contains(&*dir.path().to_string_lossy()));
    }
}
