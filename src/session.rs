//! One watermarking pass over one image.

use crate::channels::ChannelMask;
use crate::config::WatermarkConfig;
use crate::error::Result;
use crate::grid::{self, GridGeometry};
use crate::text;
use crate::{COMPOSE_MIDPOINT, MASK_AMPLITUDE, MASK_BASE, TIMESTAMP_AMPLITUDE};
use chrono::{DateTime, FixedOffset, Utc};
use image::{Rgba, RgbaImage};
use log::{debug, info};

/// Borrows the original image and owns a same-sized mask that paint calls
/// draw into. [`compose`](Self::compose) consumes the session and returns
/// the watermarked copy.
///
/// Every paint takes its own [`ChannelMask`]; there is no "current channel"
/// carried between calls.
pub struct WatermarkSession<'a> {
    original: &'a RgbaImage,
    mask: RgbaImage,
    geometry: GridGeometry,
    config: WatermarkConfig,
}

impl<'a> WatermarkSession<'a> {
    pub fn new(original: &'a RgbaImage) -> Result<Self> {
        Self::with_config(original, WatermarkConfig::default())
    }

    pub fn with_config(original: &'a RgbaImage, config: WatermarkConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = original.dimensions();
        let geometry = GridGeometry::for_size(width, height)?;
        debug!(
            "New watermark session for {}x{} image ({}x{} cells)",
            width, height, geometry.cell_width, geometry.cell_height
        );
        Ok(Self {
            original,
            mask: RgbaImage::from_pixel(width, height, Rgba([MASK_BASE; 4])),
            geometry,
            config,
        })
    }

    pub fn mask(&self) -> &RgbaImage {
        &self.mask
    }

    /// Paints the id and its checksum onto the 4x5 grid.
    pub fn paint_id(&mut self, id: u16, channels: ChannelMask) -> &mut Self {
        debug!("Painting id {} on channels '{}'", id, channels);
        grid::paint_id(&mut self.mask, &self.geometry, id, MASK_AMPLITUDE, channels);
        self
    }

    /// Tiles the repeated, wrapped label from the top-left corner.
    pub fn paint_label(&mut self, label: &str, channels: ChannelMask) -> &mut Self {
        debug!(
            "Painting label ({} chars) on channels '{}'",
            label.chars().count(),
            channels
        );
        let lines = text::label_lines(
            label,
            self.config.label_repeat,
            self.config.label_wrap_width,
        );
        let scale = text::font_scale(
            self.mask.width(),
            self.mask.height(),
            self.config.label_font_divisor,
        );
        text::paint_label(&mut self.mask, &lines, scale, MASK_AMPLITUDE, channels);
        self
    }

    /// Stamps the current time in the configured UTC offset.
    pub fn paint_timestamp(&mut self, channels: ChannelMask) -> Result<&mut Self> {
        let now = Utc::now().with_timezone(&self.config.utc_offset()?);
        Ok(self.paint_timestamp_at(&now, channels))
    }

    /// Stamps `at` into the bottom-right corner at the timestamp amplitude.
    pub fn paint_timestamp_at(
        &mut self,
        at: &DateTime<FixedOffset>,
        channels: ChannelMask,
    ) -> &mut Self {
        let stamp = text::format_timestamp(at);
        debug!("Painting timestamp '{}' on channels '{}'", stamp, channels);
        let scale = text::font_scale(
            self.mask.width(),
            self.mask.height(),
            self.config.timestamp_font_divisor,
        );
        text::paint_bottom_right(&mut self.mask, &stamp, scale, TIMESTAMP_AMPLITUDE, channels);
        self
    }

    /// Applies the mask to a copy of the original: values below the midpoint
    /// get the mask added, the rest get it subtracted, so the result never
    /// leaves 0..=255 and `|out - original|` gives the mask back.
    pub fn compose(self) -> RgbaImage {
        let (width, height) = self.original.dimensions();
        let mut out = self.original.clone();
        for (px, m) in out.pixels_mut().zip(self.mask.pixels()) {
            for (v, &delta) in px.0.iter_mut().zip(m.0.iter()) {
                *v = apply_delta(*v, delta);
            }
        }
        info!("Composed watermark into {}x{} image", width, height);
        out
    }
}

fn apply_delta(value: u8, delta: u8) -> u8 {
    if value < COMPOSE_MIDPOINT {
        value.saturating_add(delta)
    } else {
        value.saturating_sub(delta)
    }
}
