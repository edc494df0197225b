//! SVG QR rendering
//!
//! Implements [`QrRenderer`] with the `qrcode` crate. Output is a standalone
//! SVG document sized for printing on a work order.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

use lims_core::{LimsError, LimsResult, QrRenderer};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

/// Renders QR codes as SVG
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SvgQrRenderer {
    /// Minimum edge length in pixels
    min_size: u32,
    /// Error correction level
    ec_level: EcLevel,
}

impl SvgQrRenderer {
    /// Create renderer with default size (220px) and medium error correction
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            min_size: 220,
            ec_level: EcLevel::M,
        }
    }

    /// With error correction level
    #[inline]
    #[must_use]
    pub fn with_ec_level(mut self, ec_level: EcLevel) -> Self {
        self.ec_level = ec_level;
        self
    }
}

impl Default for SvgQrRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl QrRenderer for SvgQrRenderer {
    fn render(&self, payload: &str) -> LimsResult<String> {
        let code = QrCode::with_error_correction_level(payload.as_bytes(), self.ec_level)
            .map_err(|e| LimsError::validation(format!("cannot encode QR payload: {e}")))?;
        Ok(code
            .render::<svg::Color<'_>>()
            .min_dimensions(self.min_size, self.min_size)
            .dark_color(svg::Color("#000000"))
            .light_color(svg::Color("#ffffff"))
            .build())
    }
}
