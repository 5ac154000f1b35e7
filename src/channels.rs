//! Per-paint selection of the R, G, B and A channels.

use crate::error::WatermarkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const CHANNEL_NAMES: [char; 4] = ['r', 'g', 'b', 'a'];

/// Which of R, G, B, A a paint operation writes to.
///
/// Parses from and prints as a channel string such as `"ra"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelMask([bool; 4]);

impl ChannelMask {
    pub const NONE: ChannelMask = ChannelMask([false; 4]);
    pub const ALL: ChannelMask = ChannelMask([true; 4]);

    pub const fn new(r: bool, g: bool, b: bool, a: bool) -> Self {
        ChannelMask([r, g, b, a])
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|&c| c)
    }

    /// Indices of the enabled channels, in RGBA order.
    pub fn enabled(&self) -> impl Iterator<Item = usize> + '_ {
        (0..4).filter(move |&c| self.0[c])
    }

    pub fn count(&self) -> usize {
        self.0.iter().filter(|&&c| c).count()
    }

    pub fn is_disjoint(&self, other: &ChannelMask) -> bool {
        !self.0.iter().zip(other.0).any(|(&a, b)| a && b)
    }
}

impl FromStr for ChannelMask {
    type Err = WatermarkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mask = [false; 4];
        for ch in s.trim().chars() {
            let lower = ch.to_ascii_lowercase();
            match CHANNEL_NAMES.iter().position(|&n| n == lower) {
                Some(idx) => mask[idx] = true,
                None => return Err(WatermarkError::InvalidChannel(ch)),
            }
        }
        Ok(ChannelMask(mask))
    }
}

impl TryFrom<String> for ChannelMask {
    type Error = WatermarkError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChannelMask> for String {
    fn from(mask: ChannelMask) -> Self {
        mask.to_string()
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.enabled() {
            write!(f, "{}", CHANNEL_NAMES[c])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_strings() {
        let mask: ChannelMask = "ra".parse().unwrap();
        assert_eq!(mask, ChannelMask::new(true, false, false, true));
        assert_eq!(mask.to_string(), "ra");
        assert_eq!("AGB".parse::<ChannelMask>().unwrap().to_string(), "gba");
        assert!("".parse::<ChannelMask>().unwrap().is_empty());
    }

    #[test]
    fn rejects_unknown_channels() {
        assert!(matches!(
            "rx".parse::<ChannelMask>(),
            Err(WatermarkError::InvalidChannel('x'))
        ));
    }

    #[test]
    fn disjoint_masks() {
        let ra: ChannelMask = "ra".parse().unwrap();
        let gb: ChannelMask = "gb".parse().unwrap();
        assert!(ra.is_disjoint(&gb));
        assert!(ra.is_disjoint(&ChannelMask::NONE));
        assert!(!ra.is_disjoint(&"rgb".parse().unwrap()));
        assert!(!ChannelMask::ALL.is_disjoint(&gb));
    }
}
