//! Image payloads and downloader constructors

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use webimage_dl::{Config, ImageDownloader};

/// PNG-encoded `width x height` image filled with a single colour
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encoding a PNG in memory cannot fail");
    out.into_inner()
}

/// Downloader over the real HTTP transport with test-friendly timeouts
pub fn http_downloader() -> ImageDownloader {
    let mut config = Config::default();
    config.transport.connect_timeout = Some(std::time::Duration::from_secs(2));
    config.transport.request_timeout = Some(std::time::Duration::from_secs(10));
    ImageDownloader::new(config, None).expect("default downloader should build")
}
