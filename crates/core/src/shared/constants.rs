/// JPEG quality used when persisting crops for audit.
pub const LOGGED_IMAGE_QUALITY: u8 = 90;

/// Results requested from a classifier per crop when not configured.
pub const DEFAULT_CLASSIFIER_COUNT: usize = 1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
