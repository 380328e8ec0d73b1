//! Source-to-view coordinate rescaling.

use crate::error::{FieldmarkError, InputError};
use crate::layout::BBox;
use crate::models::config::NormalizeConfig;
use crate::models::template::Coordinates;

/// Rescales layout boxes (e.g. 72 dpi points) into annotation view units
/// (e.g. 96 dpi pixels) by a constant factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateNormalizer {
    scale: f64,
}

impl CoordinateNormalizer {
    pub fn new(scale: f64) -> Result<Self, FieldmarkError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(FieldmarkError::Config(format!(
                "scale factor must be positive, got {}",
                scale
            )));
        }
        Ok(Self { scale })
    }

    pub fn from_config(config: &NormalizeConfig) -> Result<Self, FieldmarkError> {
        Self::new(config.scale_factor())
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale
    }

    /// Rescale a source box; font attributes of `style` pass through.
    pub fn normalize(&self, bbox: &BBox, style: Option<&Coordinates>) -> Result<Coordinates, InputError> {
        let coords = Coordinates::new(
            bbox.x0 * self.scale,
            bbox.y0 * self.scale,
            bbox.width() * self.scale,
            bbox.height() * self.scale,
        );
        if !coords.is_finite() {
            return Err(InputError::InvalidBBox(format!(
                "normalization overflow for {:?}",
                bbox
            )));
        }
        Ok(match style {
            Some(style) => coords.with_style_of(style),
            None => coords,
        })
    }

    /// Rescale an already-built coordinate block.
    pub fn normalize_coordinates(&self, coords: &Coordinates) -> Coordinates {
        Coordinates {
            x: coords.x * self.scale,
            y: coords.y * self.scale,
            width: coords.width * self.scale,
            height: coords.height * self.scale,
            ..coords.clone()
        }
    }

    /// Inverse of [`normalize`](Self::normalize).
    pub fn denormalize(&self, coords: &Coordinates) -> BBox {
        let x0 = coords.x / self.scale;
        let y0 = coords.y / self.scale;
        BBox::new(
            x0,
            y0,
            x0 + coords.width / self.scale,
            y0 + coords.height / self.scale,
        )
    }
}

impl Default for CoordinateNormalizer {
    fn default() -> Self {
        Self {
            scale: NormalizeConfig::default().scale_factor(),
        }
    }
}
