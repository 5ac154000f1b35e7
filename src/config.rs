use crate::channels::ChannelMask;
use crate::error::{Result, WatermarkError};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default channels for each mark. Id and label sit in disjoint channels so
/// both can be read back independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelPlan {
    pub id: ChannelMask,
    pub label: ChannelMask,
    pub timestamp: ChannelMask,
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self {
            id: ChannelMask::new(true, false, false, true),
            label: ChannelMask::new(false, true, true, false),
            timestamp: ChannelMask::new(false, true, true, false),
        }
    }
}

/// Layout and timezone settings for the text marks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkConfig {
    /// Offset from UTC, in hours, the timestamp is rendered in.
    pub utc_offset_hours: i32,
    /// How many copies of the label are tiled.
    pub label_repeat: usize,
    /// Characters per label line.
    pub label_wrap_width: usize,
    /// Label glyph height is about `min(width, height) / label_font_divisor`.
    pub label_font_divisor: u32,
    pub timestamp_font_divisor: u32,
    pub channels: ChannelPlan,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            label_repeat: 60,
            label_wrap_width: 25,
            label_font_divisor: 15,
            timestamp_font_divisor: 30,
            channels: ChannelPlan::default(),
        }
    }
}

impl WatermarkConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: WatermarkConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(-23..=23).contains(&self.utc_offset_hours) {
            return Err(WatermarkError::InvalidConfig(format!(
                "utc_offset_hours must be within -23..=23, got {}",
                self.utc_offset_hours
            )));
        }
        if self.label_wrap_width == 0 {
            return Err(WatermarkError::InvalidConfig(
                "label_wrap_width must be positive".to_string(),
            ));
        }
        if self.label_font_divisor == 0 || self.timestamp_font_divisor == 0 {
            return Err(WatermarkError::InvalidConfig(
                "font divisors must be positive".to_string(),
            ));
        }
        self.channels.validate()
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            WatermarkError::InvalidConfig(format!(
                "utc offset of {} hours is out of range",
                self.utc_offset_hours
            ))
        })
    }
}

impl ChannelPlan {
    /// The id must have channels of its own: label or timestamp paint in
    /// the same channels would corrupt the grid cell means.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(WatermarkError::InvalidConfig(
                "id channels must not be empty".to_string(),
            ));
        }
        for (name, other) in [("label", self.label), ("timestamp", self.timestamp)] {
            if !self.id.is_disjoint(&other) {
                return Err(WatermarkError::InvalidConfig(format!(
                    "id channels '{}' overlap {} channels '{}'",
                    self.id, name, other
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: WatermarkConfig =
            serde_json::from_str(r#"{ "utc_offset_hours": 0, "channels": { "id": "r" } }"#)
                .unwrap();
        assert_eq!(config.utc_offset_hours, 0);
        assert_eq!(config.label_repeat, 60);
        assert_eq!(config.channels.id, "r".parse::<ChannelMask>().unwrap());
        assert_eq!(config.channels.label, ChannelPlan::default().label);
    }

    #[test]
    fn bad_channel_string_fails_to_parse() {
        let parsed: std::result::Result<WatermarkConfig, _> =
            serde_json::from_str(r#"{ "channels": { "id": "rq" } }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = WatermarkConfig::default();
        assert!(config.validate().is_ok());
        config.utc_offset_hours = 30;
        assert!(config.validate().is_err());
        config.utc_offset_hours = -5;
        config.label_wrap_width = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlapping_channel_plan_is_rejected() {
        let config: WatermarkConfig =
            serde_json::from_str(r#"{ "channels": { "label": "ra" } }"#).unwrap();
        assert!(matches!(
            config.validate(),
            Err(WatermarkError::InvalidConfig(_))
        ));

        let config: WatermarkConfig =
            serde_json::from_str(r#"{ "channels": { "timestamp": "rgb" } }"#).unwrap();
        assert!(config.validate().is_err());

        let config: WatermarkConfig =
            serde_json::from_str(r#"{ "channels": { "id": "" } }"#).unwrap();
        assert!(config.validate().is_err());

        let config: WatermarkConfig = serde_json::from_str(
            r#"{ "channels": { "id": "b", "label": "rg", "timestamp": "a" } }"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_offset_is_plus_nine() {
        let offset = WatermarkConfig::default().utc_offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 9 * 3600);
    }
}
