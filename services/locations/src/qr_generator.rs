use crate::error::QrCodeError;
use image::{imageops, DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use tracing::{debug, instrument};

/// Side length of the QR code rendered for a location, in pixels
pub const LOCATION_QR_SIZE: u32 = 100;

const LIGHT: Luma<u8> = Luma([255u8]);

/// Render `data` as a QR code and return the PNG-encoded image.
///
/// The symbol uses error correction level L and a 4-module quiet zone. Modules
/// are square, scaled by the largest whole number of pixels that fits inside
/// `width x height`, and the symbol is centred on a white canvas of exactly
/// that size. A symbol that cannot fit even at one pixel per module is
/// returned at its natural size.
#[instrument(skip(data), fields(data_len = data.len()))]
pub fn generate_qr_code(data: &str, width: u32, height: u32) -> Result<Vec<u8>, QrCodeError> {
    if width == 0 || height == 0 {
        return Err(QrCodeError::InvalidDimensions { width, height });
    }

    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)?;
    let side = width.min(height);
    let symbol = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .max_dimensions(side, side)
        .build();

    let canvas = center_on_canvas(&symbol, width, height);

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(canvas).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;

    debug!(
        version = ?code.version(),
        symbol_px = symbol.width(),
        size_bytes = png.len(),
        "QR code rendered"
    );

    Ok(png)
}

fn center_on_canvas(symbol: &GrayImage, width: u32, height: u32) -> GrayImage {
    let canvas_width = width.max(symbol.width());
    let canvas_height = height.max(symbol.height());

    if canvas_width == symbol.width() && canvas_height == symbol.height() {
        return symbol.clone();
    }

    let mut canvas = GrayImage::from_pixel(canvas_width, canvas_height, LIGHT);
    let x = (canvas_width - symbol.width()) / 2;
    let y = (canvas_height - symbol.height()) / 2;
    imageops::overlay(&mut canvas, symbol, i64::from(x), i64::from(y));
    canvas
}
