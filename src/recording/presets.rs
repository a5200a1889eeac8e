//! Quality presets and container/codec pairs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Recording quality: frame rate plus a resolution scale applied to the capture rectangle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum QualityPreset {
    #[serde(rename = "360p")]
    #[value(name = "360p")]
    P360,
    #[serde(rename = "720p")]
    #[value(name = "720p")]
    P720,
    #[default]
    #[serde(rename = "1080p30")]
    #[value(name = "1080p30")]
    P1080,
    #[serde(rename = "1080p60")]
    #[value(name = "1080p60")]
    P1080Fps60,
    #[serde(rename = "4k")]
    #[value(name = "4k")]
    K4,
}

impl QualityPreset {
    pub fn fps(self) -> u32 {
        match self {
            Self::P1080Fps60 => 60,
            Self::P360 | Self::P720 | Self::P1080 | Self::K4 => 30,
        }
    }

    pub fn scale(self) -> f64 {
        match self {
            Self::P360 => 0.5,
            Self::P720 => 0.75,
            Self::P1080 | Self::P1080Fps60 | Self::K4 => 1.0,
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::P360 => write!(f, "360p"),
            Self::P720 => write!(f, "720p"),
            Self::P1080 => write!(f, "1080p30"),
            Self::P1080Fps60 => write!(f, "1080p60"),
            Self::K4 => write!(f, "4k"),
        }
    }
}

/// Video codec, chosen for decoder compatibility rather than compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// MPEG-4 Part 2 with the `mp4v` tag.
    Mp4v,
    /// MPEG-4 Part 2 with the `XVID` tag.
    Xvid,
}

impl VideoCodec {
    /// ffmpeg output arguments selecting this codec.
    pub fn ffmpeg_args(self) -> &'static [&'static str] {
        match self {
            Self::Mp4v => &["-c:v", "mpeg4"],
            Self::Xvid => &["-c:v", "mpeg4", "-vtag", "xvid"],
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Mp4,
    Avi,
    Mkv,
}

impl Container {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Avi => "avi",
            Self::Mkv => "mkv",
        }
    }

    pub fn codec(self) -> VideoCodec {
        match self {
            Self::Mp4 => VideoCodec::Mp4v,
            Self::Avi | Self::Mkv => VideoCodec::Xvid,
        }
    }

    /// Every extension the recorder writes, for directory listings.
    pub fn all_extensions() -> [&'static str; 3] {
        [Self::Mp4.extension(), Self::Avi.extension(), Self::Mkv.extension()]
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.extension())
    }
}
