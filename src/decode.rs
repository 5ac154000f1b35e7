//! Recovering the mask from a watermarked image and reading the id back.

use crate::bits;
use crate::channels::ChannelMask;
use crate::error::{Result, WatermarkError};
use crate::grid::GridGeometry;
use crate::{MASK_AMPLITUDE, PAYLOAD_BITS};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use log::{debug, info, warn};

/// Relative aspect-ratio difference tolerated before resizing.
const ASPECT_TOLERANCE: f64 = 0.01;
const KMEANS_MAX_ITERATIONS: usize = 32;
/// Cell means above this read as painted when there is no clear two-level split.
const CELL_THRESHOLD: f64 = 0.5;

/// Per-channel absolute difference between a watermarked image and its original.
#[derive(Debug, Clone)]
pub struct RecoveredMask {
    difference: RgbaImage,
    geometry: GridGeometry,
}

/// Takes the pixelwise difference of `watermarked` against `original`.
///
/// Both images are normalized to RGBA8. If the watermarked copy was resized
/// it is scaled back (bilinear) to the original's size first, as long as the
/// aspect ratio still matches.
pub fn recover_mask(watermarked: &DynamicImage, original: &DynamicImage) -> Result<RecoveredMask> {
    let original = original.to_rgba8();
    let (ow, oh) = original.dimensions();
    let geometry = GridGeometry::for_size(ow, oh)?;

    let mut watermarked = watermarked.to_rgba8();
    let (ww, wh) = watermarked.dimensions();
    GridGeometry::for_size(ww, wh)?;

    if (ww, wh) != (ow, oh) {
        let lhs = ww as f64 * oh as f64;
        let rhs = ow as f64 * wh as f64;
        if (lhs - rhs).abs() > lhs.max(rhs) * ASPECT_TOLERANCE {
            return Err(WatermarkError::DimensionMismatch {
                watermarked: (ww, wh),
                original: (ow, oh),
            });
        }
        debug!("Resizing watermarked image {}x{} -> {}x{}", ww, wh, ow, oh);
        watermarked = imageops::resize(&watermarked, ow, oh, FilterType::Triangle);
    }

    let difference = RgbaImage::from_fn(ow, oh, |x, y| {
        let a = watermarked.get_pixel(x, y).0;
        let b = original.get_pixel(x, y).0;
        Rgba([
            a[0].abs_diff(b[0]),
            a[1].abs_diff(b[1]),
            a[2].abs_diff(b[2]),
            a[3].abs_diff(b[3]),
        ])
    });

    Ok(RecoveredMask { difference, geometry })
}

impl RecoveredMask {
    /// The raw, unclipped difference.
    pub fn difference(&self) -> &RgbaImage {
        &self.difference
    }

    /// Difference clipped to the id amplitude and stretched to 0/255.
    pub fn normalized(&self) -> RgbaImage {
        let mut out = self.difference.clone();
        for px in out.pixels_mut() {
            for v in px.0.iter_mut() {
                *v = stretch(*v);
            }
        }
        out
    }

    /// One channel of [`normalized`](Self::normalized) as a grayscale plane.
    pub fn channel_plane(&self, channel: usize) -> GrayImage {
        let (w, h) = self.difference.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            Luma([stretch(self.difference.get_pixel(x, y).0[channel])])
        })
    }

    /// Diagnostic sheet: `[R, G] / [B, A] / [RGB, RGBA]`.
    pub fn inspection_sheet(&self) -> RgbaImage {
        let normalized = self.normalized();
        let mut rgb = normalized.clone();
        for px in rgb.pixels_mut() {
            px.0[3] = u8::MAX;
        }
        let [r, g, b, a] = [0, 1, 2, 3].map(|c| gray_to_rgba(&self.channel_plane(c)));
        tile(&[vec![r, g], vec![b, a], vec![rgb, normalized]])
    }

    /// Mean of the clipped difference inside each grid cell, over the
    /// selected channels. Values are in `0.0..=1.0`.
    pub fn cell_means(&self, channels: ChannelMask) -> Result<[f64; PAYLOAD_BITS]> {
        if channels.is_empty() {
            return Err(WatermarkError::EmptyChannelMask);
        }
        let mut means = [0.0; PAYLOAD_BITS];
        for (mean, cell) in means.iter_mut().zip(self.geometry.cells()) {
            let mut sum = 0u64;
            for y in cell.y..cell.y + cell.height {
                for x in cell.x..cell.x + cell.width {
                    let px = self.difference.get_pixel(x, y);
                    sum += channels
                        .enabled()
                        .map(|c| u64::from(px.0[c].min(MASK_AMPLITUDE)))
                        .sum::<u64>();
                }
            }
            let samples = u64::from(cell.width) * u64::from(cell.height) * channels.count() as u64;
            *mean = sum as f64 / (samples as f64 * f64::from(MASK_AMPLITUDE));
        }
        Ok(means)
    }

    /// Reads the id painted on `channels`.
    pub fn decode_id(&self, channels: ChannelMask) -> Result<u16> {
        let means = self.cell_means(channels)?;
        decode_grid(&means)
    }

    /// Whether any grid cell on `channels` reads as painted.
    ///
    /// A blank grid decodes as id 0 (zero bits, checksum 0), which is also
    /// what an unwatermarked copy of the original produces, so a blank
    /// grid alone can't attribute an image.
    pub fn has_id_signal(&self, channels: ChannelMask) -> Result<bool> {
        let means = self.cell_means(channels)?;
        Ok(means.iter().any(|&m| m > CELL_THRESHOLD))
    }
}

/// Splits the 20 cell means into "painted" and "blank" and verifies the
/// checksum of the resulting bits.
///
/// Means that all sit within half an amplitude of each other are compared
/// against the fixed midpoint threshold; otherwise a 1-D two-means split is
/// used and the higher cluster reads as set bits.
pub fn decode_grid(means: &[f64; PAYLOAD_BITS]) -> Result<u16> {
    let bits = classify(means);
    match bits::verify_checksum(&bits) {
        Ok(id) => {
            info!("Decoded id {}", id);
            Ok(id)
        }
        Err(e) => {
            warn!("Grid decode failed: {}", e);
            Err(e)
        }
    }
}

fn classify(means: &[f64; PAYLOAD_BITS]) -> [bool; PAYLOAD_BITS] {
    let lo = means.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = means.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let threshold = if hi - lo < CELL_THRESHOLD {
        CELL_THRESHOLD
    } else {
        two_means_split(means, lo, hi)
    };
    debug!("Cell means {:?}, threshold {:.3}", means, threshold);

    let mut bits = [false; PAYLOAD_BITS];
    for (bit, &m) in bits.iter_mut().zip(means) {
        *bit = m > threshold;
    }
    bits
}

/// Midpoint between the two cluster centres once assignment stops changing.
fn two_means_split(values: &[f64], lo: f64, hi: f64) -> f64 {
    let (mut low, mut high) = (lo, hi);
    for _ in 0..KMEANS_MAX_ITERATIONS {
        let split = (low + high) / 2.0;
        let (mut low_sum, mut low_n, mut high_sum, mut high_n) = (0.0, 0usize, 0.0, 0usize);
        for &v in values {
            if v > split {
                high_sum += v;
                high_n += 1;
            } else {
                low_sum += v;
                low_n += 1;
            }
        }
        let next_low = if low_n > 0 { low_sum / low_n as f64 } else { low };
        let next_high = if high_n > 0 { high_sum / high_n as f64 } else { high };
        if next_low == low && next_high == high {
            break;
        }
        low = next_low;
        high = next_high;
    }
    (low + high) / 2.0
}

fn stretch(v: u8) -> u8 {
    (v.min(MASK_AMPLITUDE) as u32 * u8::MAX as u32 / MASK_AMPLITUDE as u32) as u8
}

fn gray_to_rgba(plane: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(plane.width(), plane.height(), |x, y| {
        let v = plane.get_pixel(x, y).0[0];
        Rgba([v, v, v, u8::MAX])
    })
}

/// Pastes images onto a transparent sheet, each in a slot as large as the
/// largest image.
pub fn tile(rows: &[Vec<RgbaImage>]) -> RgbaImage {
    let slot_w = rows.iter().flatten().map(|i| i.width()).max().unwrap_or(0);
    let slot_h = rows.iter().flatten().map(|i| i.height()).max().unwrap_or(0);
    let columns = rows.iter().map(|r| r.len()).max().unwrap_or(0) as u32;

    let mut sheet = RgbaImage::new(slot_w * columns, slot_h * rows.len() as u32);
    for (i, row) in rows.iter().enumerate() {
        for (j, img) in row.iter().enumerate() {
            let x = i64::from(slot_w) * j as i64;
            let y = i64::from(slot_h) * i as i64;
            imageops::replace(&mut sheet, img, x, y);
        }
    }
    sheet
}
