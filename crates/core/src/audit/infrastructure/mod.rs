pub mod content_addressed_jpeg_logger;
