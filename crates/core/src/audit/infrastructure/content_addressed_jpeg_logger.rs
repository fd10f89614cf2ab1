use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use sha2::{Digest, Sha256};

use crate::audit::domain::image_logger::ImageLogger;
use crate::shared::constants::LOGGED_IMAGE_QUALITY;
use crate::shared::frame::Frame;
use crate::shared::BoxError;

/// Writes crops as JPEG files named by the SHA-256 of their encoded bytes.
///
/// Identical pixels encode to identical bytes, so re-logging the same crop
/// resolves to the same file and is not written twice.
pub struct ContentAddressedJpegLogger {
    directory: PathBuf,
    quality: u8,
}

impl ContentAddressedJpegLogger {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            quality: LOGGED_IMAGE_QUALITY,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

/// Encodes an RGB frame as JPEG at the given quality.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, BoxError> {
    let img = frame.to_rgb_image().ok_or_else(|| {
        format!(
            "cannot encode {}-channel frame as JPEG, expected RGB",
            frame.channels()
        )
    })?;
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&img)?;
    Ok(buf)
}

/// File name for encoded image bytes: hex SHA-256 digest plus `.jpg`.
pub fn content_file_name(encoded: &[u8]) -> String {
    format!("{}.jpg", hex::encode(Sha256::digest(encoded)))
}

impl ImageLogger for ContentAddressedJpegLogger {
    fn log_image(&self, frame: &Frame) -> Result<PathBuf, BoxError> {
        let encoded = encode_jpeg(frame, self.quality)?;
        let name = content_file_name(&encoded);
        let path = self.directory.join(&name);
        if already_logged(&path, &encoded) {
            log::debug!("Crop already logged at {}", path.display());
            return Ok(path);
        }

        fs::create_dir_all(&self.directory)?;
        write_atomically(&self.directory, &path, &encoded)?;
        log::debug!("Logged crop to {}", path.display());
        Ok(path)
    }
}

/// True only when `path` holds exactly `encoded`; a truncated or otherwise
/// damaged file under the same name gets rewritten.
fn already_logged(path: &Path, encoded: &[u8]) -> bool {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == encoded.len() as u64 => {
            fs::read(path).map(|on_disk| on_disk == encoded).unwrap_or(false)
        }
        _ => false,
    }
}

/// Writes through a uniquely named temporary file in the same directory, so
/// the final name never holds a partial image, even with concurrent writers.
fn write_atomically(directory: &Path, path: &Path, bytes: &[u8]) -> Result<(), BoxError> {
    let mut temp = tempfile::Builder::new()
        .suffix(".part")
        .tempfile_in(directory)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
