//! QR code rendering for pairing.

use wagate_core::error::GatewayError;

/// Render a compact QR code for the terminal using Unicode half-blocks.
///
/// Two rows of modules share one line of text (`▀`, `▄`, `█`, space).
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, GatewayError> {
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| GatewayError::Channel(format!("QR generation failed: {e}")))?;

    let width = code.width();
    let colors: Vec<Color> = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

/// Render a QR code as PNG bytes, with a two-module white border.
pub fn generate_qr_image(qr_data: &str) -> Result<Vec<u8>, GatewayError> {
    use image::{ImageBuffer, Luma};
    use qrcode::{Color, EcLevel, QrCode};

    const MODULE_PX: u32 = 10;
    const QUIET: u32 = 2;

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| GatewayError::Channel(format!("QR generation failed: {e}")))?;

    let modules = code.width() as u32;
    let size = (modules + QUIET * 2) * MODULE_PX;

    let img = ImageBuffer::from_fn(size, size, |x, y| {
        let (cx, cy) = (x / MODULE_PX, y / MODULE_PX);
        let span = QUIET..QUIET + modules;
        let inside = span.contains(&cx) && span.contains(&cy);
        if inside && code[((cx - QUIET) as usize, (cy - QUIET) as usize)] == Color::Dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| GatewayError::Channel(format!("PNG encoding failed: {e}")))?;
    Ok(buf.into_inner())
}
