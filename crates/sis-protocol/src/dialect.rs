//! Protocol dialects
//!
//! Matrix switchers in this family share one line grammar but differ in a few
//! tokens and in which state they can report. Rather than one driver per
//! model, every difference is captured in a [`DialectDescriptor`] table that
//! the classifier, encoder and session engine consult.

/// Escape byte that prefixes extended SIS commands
pub const ESCAPE: char = '\x1B';

/// Identifies which member of the switcher family a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Dialect {
    /// Compact AV matrix switchers (verbose firmware query, no audio level reporting)
    #[default]
    AvMatrix,
    /// Modular XTP-style matrix frames with per-output volume and mute
    Xtp,
}

impl Dialect {
    /// Returns a human-readable name for the dialect
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::AvMatrix => "AV Matrix",
            Dialect::Xtp => "XTP Matrix",
        }
    }

    /// Returns the token table for this dialect
    pub fn descriptor(&self) -> &'static DialectDescriptor {
        match self {
            Dialect::AvMatrix => &AV_MATRIX,
            Dialect::Xtp => &XTP,
        }
    }
}

/// Token table for one dialect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialectDescriptor {
    /// Suffix for video-only ties and video tie queries
    pub video_tag: &'static str,
    /// Suffix for audio-only ties and audio tie queries
    pub audio_tag: &'static str,
    /// Suffix for audio+video ties
    pub all_tag: &'static str,
    /// Prefix of the input sync bitmap feedback line
    pub sync_tag: &'static str,
    /// Literal command that requests the sync bitmap
    pub sync_poll: &'static str,
    /// Literal command that requests the firmware banner
    pub firmware_poll: &'static str,
    /// Optional literal command for the general information report
    pub info_poll: Option<&'static str>,
    /// Whether per-output volume and mute are polled during route discovery
    pub polls_audio_levels: bool,
    /// Verbose level used while discovering initial state
    pub discovery_verbose_level: u8,
    /// Verbose level used in steady state
    pub steady_verbose_level: u8,
    /// Markers that identify a password prompt
    pub password_markers: &'static [&'static str],
    /// Markers that identify a username prompt
    pub username_markers: &'static [&'static str],
    /// Markers that identify the vendor banner sent on connect
    pub banner_markers: &'static [&'static str],
    /// Multiplier applied to device volume levels at the feedback boundary
    pub volume_scale: i32,
}

static AV_MATRIX: DialectDescriptor = DialectDescriptor {
    video_tag: "%",
    audio_tag: "$",
    all_tag: "!",
    sync_tag: "Frq",
    sync_poll: "0LS",
    firmware_poll: "0Q",
    info_poll: Some("I"),
    polls_audio_levels: false,
    discovery_verbose_level: 3,
    steady_verbose_level: 1,
    password_markers: &["Password:"],
    username_markers: &["Username:", "Login:"],
    banner_markers: &["Extron Electronics"],
    volume_scale: 1024,
};

static XTP: DialectDescriptor = DialectDescriptor {
    video_tag: "%",
    audio_tag: "$",
    all_tag: "!",
    sync_tag: "Frq",
    sync_poll: "0LS",
    firmware_poll: "Q",
    info_poll: None,
    polls_audio_levels: true,
    discovery_verbose_level: 3,
    steady_verbose_level: 1,
    password_markers: &["Password:"],
    username_markers: &["Username:", "Login:"],
    banner_markers: &["Extron Electronics"],
    volume_scale: 1024,
};

impl DialectDescriptor {
    /// Scale a raw device volume level to the feedback range
    pub fn scale_volume(&self, level: u16) -> i32 {
        (i32::from(level) * self.volume_scale - 1).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_tokens() {
        let av = Dialect::AvMatrix.descriptor();
        assert_eq!(av.video_tag, "%");
        assert_eq!(av.audio_tag, "$");
        assert_eq!(av.all_tag, "!");
        assert_eq!(av.firmware_poll, "0Q");
        assert!(!av.polls_audio_levels);

        let xtp = Dialect::Xtp.descriptor();
        assert_eq!(xtp.firmware_poll, "Q");
        assert!(xtp.polls_audio_levels);
        assert!(xtp.info_poll.is_none());
    }

    #[test]
    fn test_scale_volume() {
        let d = Dialect::Xtp.descriptor();
        assert_eq!(d.scale_volume(0), 0);
        assert_eq!(d.scale_volume(1), 1023);
        assert_eq!(d.scale_volume(50), 51_199);
    }
}
