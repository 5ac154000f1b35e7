use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("value {value} does not fit in {width} bits")]
    ValueOutOfRange { value: u32, width: usize },

    #[error(
        "checksum mismatch: payload {payload} has {computed} set bits, stored checksum says {stored}"
    )]
    ChecksumMismatch { payload: u16, stored: u32, computed: u32 },

    #[error(
        "watermarked image is {watermarked:?} but original is {original:?}; aspect ratios differ"
    )]
    DimensionMismatch {
        watermarked: (u32, u32),
        original: (u32, u32),
    },

    #[error("image is {width}x{height}, the id grid needs at least 4x5 pixels")]
    ImageTooSmall { width: u32, height: u32 },

    #[error("channel mask selects no channels")]
    EmptyChannelMask,

    #[error("unknown channel '{0}', expected one of r, g, b, a")]
    InvalidChannel(char),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("all 65536 internal ids are allocated")]
    IdSpaceExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("identity table encoding: {0}")]
    Persist(#[from] bincode::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WatermarkError>;
