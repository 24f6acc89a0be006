use crate::Error;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Resume positions stored as one small file per media path.
///
/// Entry name is the uppercase hex of the first 16 bytes of the SHA-256 of
/// the media path. Contents:
///
/// ```text
/// # /path/to/media.mkv
/// start=12.500000
/// ```
#[derive(Debug, Clone)]
pub struct WatchLater {
    dir: PathBuf,
}

impl WatchLater {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn entry_path(&self, media: &str) -> PathBuf {
        let digest = Sha256::digest(media.as_bytes());
        self.dir.join(hex::encode_upper(&digest[..16]))
    }

    /// Stored position for `media`, if any.
    pub fn load(&self, media: &str) -> Option<f64> {
        let path = self.entry_path(media);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("failed to read {}: {err}", path.display());
                }
                return None;
            }
        };

        let start = contents
            .lines()
            .filter_map(|line| line.trim().strip_prefix("start="))
            .filter_map(|value| value.trim().parse::<f64>().ok())
            .find(|start| start.is_finite() && *start >= 0.0);
        if start.is_none() {
            log::warn!("ignoring malformed resume entry {}", path.display());
        }
        start
    }

    pub fn save(&self, media: &str, position: f64) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        let position = if position.is_finite() { position.max(0.0) } else { 0.0 };
        fs::write(
            self.entry_path(media),
            format!("# {media}\nstart={position:.6}\n"),
        )?;
        Ok(())
    }

    /// Removes the entry for `media`. Returns whether one existed.
    pub fn remove(&self, media: &str) -> Result<bool, Error> {
        match fs::remove_file(self.entry_path(media)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}
