use crate::error::QrGenerationError;
use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Luma, imageops};
use qrcode::QrCode;
use std::io::Cursor;

/// Rendering options for QR images
///
/// This structure controls the pixel geometry of generated codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QrOptions {
    /// Width and height of a single module in pixels
    pub box_size: u32,

    /// Width of the white border around the code, in modules
    pub border: u32,
}

impl Default for QrOptions {
    /// 6-pixel modules with a 2-module border
    fn default() -> Self {
        Self {
            box_size: 6,
            border: 2,
        }
    }
}

/// Creates a PNG QR code for a link
///
/// The link is encoded as-is; nothing checks that it is a well-formed URL.
/// Every call renders a new image.
///
/// # Arguments
/// * `link` - Text to encode
///
/// # Returns
/// * A Result containing the PNG image data as bytes or an error
///
/// # Errors
/// * Returns an error if the link is too long to fit in a QR code
///
/// # Examples
/// ```
/// use grocerz::qr::generate_qr;
///
/// let png = generate_qr("http://127.0.0.1:5000/product/A1").unwrap();
/// assert!(png.starts_with(b"\x89PNG"));
/// ```
pub fn generate_qr(link: &str) -> Result<Vec<u8>, QrGenerationError> {
    generate_qr_with(link, &QrOptions::default())
}

/// Creates a PNG QR code for a link with explicit rendering options
pub fn generate_qr_with(link: &str, options: &QrOptions) -> Result<Vec<u8>, QrGenerationError> {
    let code = QrCode::new(link.as_bytes())?;

    let modules = code
        .render::<Luma<u8>>()
        .quiet_zone(false)
        .module_dimensions(options.box_size, options.box_size)
        .dark_color(Luma([0u8]))
        .light_color(Luma([255u8]))
        .build();

    let pad = options.border * options.box_size;
    let mut canvas = ImageBuffer::from_pixel(
        modules.width() + 2 * pad,
        modules.height() + 2 * pad,
        Luma([255u8]),
    );
    imageops::overlay(&mut canvas, &modules, i64::from(pad), i64::from(pad));

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(canvas).write_to(&mut buffer, ImageOutputFormat::Png)?;

    Ok(buffer.into_inner())
}
