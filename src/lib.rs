//! Per-user forensic watermarking for RGBA images.
//!
//! A [`WatermarkSession`] paints a numeric id, a repeated text label and an
//! audit timestamp onto a mask, then composes the mask into a copy of the
//! original image. Given the original, [`decode::recover_mask`] pulls the
//! mask back out and [`decode::RecoveredMask::decode_id`] reads the id.

pub mod bits;
pub mod channels;
pub mod config;
pub mod decode;
pub mod error;
pub mod grid;
pub mod identity;
pub mod session;
pub mod text;

pub use channels::ChannelMask;
pub use config::{ChannelPlan, WatermarkConfig};
pub use decode::{decode_grid, recover_mask, RecoveredMask};
pub use error::{Result, WatermarkError};
pub use identity::IdentityTable;
pub use session::WatermarkSession;

/// Grid cells across the image.
pub const GRID_COLUMNS: u32 = 4;
/// Grid cells down the image.
pub const GRID_ROWS: u32 = 5;

/// Width of the id payload in bits.
pub const ID_BITS: usize = 16;
/// Width of the population-count checksum appended to the id.
pub const CHECKSUM_BITS: usize = 4;
/// Id bits plus checksum bits; one grid cell per bit.
pub const PAYLOAD_BITS: usize = ID_BITS + CHECKSUM_BITS;

// Changing the grid shape means changing the payload layout, and vice versa.
const _: () = assert!((GRID_COLUMNS * GRID_ROWS) as usize == PAYLOAD_BITS);

/// Value every mask pixel starts at.
pub const MASK_BASE: u8 = 0;
/// Delta used for the id grid and the label.
pub const MASK_AMPLITUDE: u8 = 1;
/// Delta used for the timestamp, high enough to be faintly visible.
pub const TIMESTAMP_AMPLITUDE: u8 = 64;

/// Channel values below this get the mask added, the rest get it subtracted.
pub const COMPOSE_MIDPOINT: u8 = 128;
