//! The 4x5 block grid that carries the id payload.

use crate::bits;
use crate::channels::ChannelMask;
use crate::error::{Result, WatermarkError};
use crate::{GRID_COLUMNS, GRID_ROWS, PAYLOAD_BITS};
use image::RgbaImage;

/// Pixel rectangle of one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Cell layout for an image of a given size. Cells are
/// `floor(width / 4)` by `floor(height / 5)`; leftover pixels on the right
/// and bottom edges belong to no cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    pub cell_width: u32,
    pub cell_height: u32,
}

impl GridGeometry {
    pub fn for_size(width: u32, height: u32) -> Result<Self> {
        let cell_width = width / GRID_COLUMNS;
        let cell_height = height / GRID_ROWS;
        if cell_width == 0 || cell_height == 0 {
            return Err(WatermarkError::ImageTooSmall { width, height });
        }
        Ok(Self { cell_width, cell_height })
    }

    /// The cell that holds payload bit `index`, row-major.
    pub fn cell(&self, index: usize) -> Cell {
        let column = index as u32 % GRID_COLUMNS;
        let row = index as u32 / GRID_COLUMNS;
        Cell {
            x: column * self.cell_width,
            y: row * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = Cell> + '_ {
        (0..PAYLOAD_BITS).map(move |i| self.cell(i))
    }
}

/// Fills the cell of every set payload bit with `amplitude` in the enabled
/// channels. Cells of clear bits, and disabled channels, are left alone.
pub fn paint_id(
    mask: &mut RgbaImage,
    geometry: &GridGeometry,
    id: u16,
    amplitude: u8,
    channels: ChannelMask,
) {
    let payload = bits::id_payload(id);
    for (index, _) in payload.iter().enumerate().filter(|(_, &bit)| bit) {
        fill_cell(mask, geometry.cell(index), amplitude, channels);
    }
}

fn fill_cell(mask: &mut RgbaImage, cell: Cell, amplitude: u8, channels: ChannelMask) {
    for y in cell.y..cell.y + cell.height {
        for x in cell.x..cell.x + cell.width {
            let pixel = mask.get_pixel_mut(x, y);
            for c in channels.enabled() {
                pixel.0[c] = amplitude;
            }
        }
    }
}
