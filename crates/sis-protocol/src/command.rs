//! Outbound SIS commands
//!
//! Commands are built through validating constructors and encoded against a
//! [`Dialect`]. The same grammar is parsed back by [`SisCommand::parse`],
//! which is what a device (or the simulator) does with the bytes we send.

use crate::dialect::{Dialect, ESCAPE};
use crate::error::{ParseError, ProtocolError};
use crate::scan::Cursor;

/// Outbound command terminator
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// Highest output/input/preset number the wire format can carry
pub const MAX_SLOT: u16 = 99;

/// Highest verbose level
pub const MAX_VERBOSE_LEVEL: u8 = 3;

/// Highest volume level in device units
pub const MAX_VOLUME: u16 = 100;

/// Which signal(s) a tie or route report concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SignalKind {
    Video,
    Audio,
    /// Both video and audio
    AudioVideo,
}

impl SignalKind {
    /// Token used in route feedback lines (`Vid`, `Aud`, `All`)
    pub fn feedback_token(&self) -> &'static str {
        match self {
            SignalKind::Video => "Vid",
            SignalKind::Audio => "Aud",
            SignalKind::AudioVideo => "All",
        }
    }

    /// Parse a feedback token, ignoring case
    pub fn from_feedback_token(token: &str) -> Option<Self> {
        [SignalKind::Video, SignalKind::Audio, SignalKind::AudioVideo]
            .into_iter()
            .find(|k| k.feedback_token().eq_ignore_ascii_case(token))
    }

    /// Command suffix for this kind in the given dialect
    pub fn tag(&self, dialect: Dialect) -> &'static str {
        let d = dialect.descriptor();
        match self {
            SignalKind::Video => d.video_tag,
            SignalKind::Audio => d.audio_tag,
            SignalKind::AudioVideo => d.all_tag,
        }
    }

    pub fn includes_video(&self) -> bool {
        matches!(self, SignalKind::Video | SignalKind::AudioVideo)
    }

    pub fn includes_audio(&self) -> bool {
        matches!(self, SignalKind::Audio | SignalKind::AudioVideo)
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Video => write!(f, "video"),
            SignalKind::Audio => write!(f, "audio"),
            SignalKind::AudioVideo => write!(f, "audio+video"),
        }
    }
}

/// A command sent to the switcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SisCommand {
    /// Route `input` to `output` for `kind` (`4*2%`)
    Tie {
        input: u16,
        output: u16,
        kind: SignalKind,
    },
    /// Ask which input feeds `output` (`2%` / `2$`)
    QueryTie { output: u16, kind: SignalKind },
    /// Set feedback verbosity (`ESC 3CV`)
    SetVerbose(u8),
    /// Ask for the input sync bitmap
    PollSync,
    /// Ask for the firmware banner
    PollFirmware,
    /// Ask for the general information report
    PollInformation,
    /// Recall a global preset (`ESC R5PRST`)
    RecallPreset(u16),
    /// Ask for an output's volume (`2V`)
    QueryVolume(u16),
    /// Step an output's volume up (`2+V`)
    VolumeUp(u16),
    /// Step an output's volume down (`2-V`)
    VolumeDown(u16),
    /// Set an output's volume (`2+50V`)
    SetVolume { output: u16, level: u16 },
    /// Ask for an output's mute state (`2Z`)
    QueryMute(u16),
    /// Mute or unmute an output (`2*3Z` / `2*0Z`)
    Mute { output: u16, muted: bool },
    /// Login credential, sent in reply to a prompt
    Credential(String),
    /// Arbitrary text, sent as-is
    Raw(String),
}

fn check(what: &'static str, value: u16, min: u16, max: u16) -> Result<u16, ProtocolError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ProtocolError::InvalidArgument {
            what,
            value: u32::from(value),
            min: u32::from(min),
            max: u32::from(max),
        })
    }
}

fn check_output(output: u16) -> Result<u16, ProtocolError> {
    check("output", output, 1, MAX_SLOT)
}

impl SisCommand {
    /// Tie `input` to `output`; input 0 clears the output
    pub fn tie(input: u16, output: u16, kind: SignalKind) -> Result<Self, ProtocolError> {
        Ok(SisCommand::Tie {
            input: check("input", input, 0, MAX_SLOT)?,
            output: check_output(output)?,
            kind,
        })
    }

    /// Query the current tie of one output; `AudioVideo` is not a valid query kind
    pub fn query_tie(output: u16, kind: SignalKind) -> Result<Self, ProtocolError> {
        if kind == SignalKind::AudioVideo {
            return Err(ProtocolError::InvalidArgument {
                what: "query kind",
                value: 2,
                min: 0,
                max: 1,
            });
        }
        Ok(SisCommand::QueryTie {
            output: check_output(output)?,
            kind,
        })
    }

    pub fn set_verbose(level: u8) -> Result<Self, ProtocolError> {
        check("verbose level", u16::from(level), 0, u16::from(MAX_VERBOSE_LEVEL))?;
        Ok(SisCommand::SetVerbose(level))
    }

    pub fn recall_preset(preset: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::RecallPreset(check("preset", preset, 1, MAX_SLOT)?))
    }

    pub fn query_volume(output: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::QueryVolume(check_output(output)?))
    }

    pub fn volume_up(output: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::VolumeUp(check_output(output)?))
    }

    pub fn volume_down(output: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::VolumeDown(check_output(output)?))
    }

    pub fn set_volume(output: u16, level: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::SetVolume {
            output: check_output(output)?,
            level: check("volume", level, 0, MAX_VOLUME)?,
        })
    }

    pub fn query_mute(output: u16) -> Result<Self, ProtocolError> {
        Ok(SisCommand::QueryMute(check_output(output)?))
    }

    pub fn mute(output: u16, muted: bool) -> Result<Self, ProtocolError> {
        Ok(SisCommand::Mute {
            output: check_output(output)?,
            muted,
        })
    }

    /// Whether this command changes routing and so must wait for route-ready
    pub fn is_tie(&self) -> bool {
        matches!(self, SisCommand::Tie { .. })
    }

    /// Wire text without the terminator
    pub fn to_wire_string(&self, dialect: Dialect) -> String {
        let d = dialect.descriptor();
        match self {
            SisCommand::Tie {
                input,
                output,
                kind,
            } => format!("{}*{}{}", input, output, kind.tag(dialect)),
            SisCommand::QueryTie { output, kind } => format!("{}{}", output, kind.tag(dialect)),
            SisCommand::SetVerbose(level) => format!("{ESCAPE}{level}CV"),
            SisCommand::PollSync => d.sync_poll.to_string(),
            SisCommand::PollFirmware => d.firmware_poll.to_string(),
            SisCommand::PollInformation => d.info_poll.unwrap_or("I").to_string(),
            SisCommand::RecallPreset(preset) => format!("{ESCAPE}R{preset}PRST"),
            SisCommand::QueryVolume(output) => format!("{output}V"),
            SisCommand::VolumeUp(output) => format!("{output}+V"),
            SisCommand::VolumeDown(output) => format!("{output}-V"),
            SisCommand::SetVolume { output, level } => format!("{output}+{level}V"),
            SisCommand::QueryMute(output) => format!("{output}Z"),
            SisCommand::Mute { output, muted } => {
                format!("{}*{}Z", output, if *muted { 3 } else { 0 })
            }
            SisCommand::Credential(text) | SisCommand::Raw(text) => text.clone(),
        }
    }

    /// Encode to wire bytes, terminator included
    pub fn encode(&self, dialect: Dialect) -> Vec<u8> {
        let mut bytes = self.to_wire_string(dialect).into_bytes();
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }

    /// Feedback line a device emits after executing a tie
    ///
    /// Returns `None` for everything that is not a tie.
    pub fn tie_feedback(&self) -> Option<String> {
        match self {
            SisCommand::Tie {
                input,
                output,
                kind,
            } => Some(format!("Out{} In{} {}", output, input, kind.feedback_token())),
            _ => None,
        }
    }

    /// Parse command text (terminator already removed) as a device would
    ///
    /// Credentials cannot be told apart from other text, so anything that is
    /// not a known command is an error.
    pub fn parse(text: &str, dialect: Dialect) -> Result<Self, ParseError> {
        let text = text.trim_matches(|c| c == '\r' || c == '\n');
        if text.is_empty() {
            return Err(ParseError::Empty);
        }
        let d = dialect.descriptor();

        if let Some(rest) = text.strip_prefix(ESCAPE) {
            return Self::parse_escaped(rest);
        }
        if text == d.sync_poll {
            return Ok(SisCommand::PollSync);
        }
        if text == "Q" || text == "0Q" {
            return Ok(SisCommand::PollFirmware);
        }
        if text == "I" {
            return Ok(SisCommand::PollInformation);
        }

        let mut c = Cursor::new(text);
        let first = number(c.digits(), "command")?;

        if c.eat("*") {
            let second = number(c.digits(), "command")?;
            let suffix = c.rest();
            if suffix == "Z" {
                return Ok(SisCommand::Mute {
                    output: first,
                    muted: second != 0,
                });
            }
            let kind = tag_kind(suffix, dialect)
                .ok_or_else(|| ParseError::malformed("tie", text))?;
            return Ok(SisCommand::Tie {
                input: first,
                output: second,
                kind,
            });
        }

        match c.rest() {
            "V" => return Ok(SisCommand::QueryVolume(first)),
            "Z" => return Ok(SisCommand::QueryMute(first)),
            "+V" => return Ok(SisCommand::VolumeUp(first)),
            "-V" => return Ok(SisCommand::VolumeDown(first)),
            _ => {}
        }

        if c.eat("+") {
            let level = number(c.digits(), "volume")?;
            if c.rest() == "V" {
                return Ok(SisCommand::SetVolume {
                    output: first,
                    level,
                });
            }
            return Err(ParseError::malformed("volume", text));
        }

        match tag_kind(c.rest(), dialect) {
            Some(kind) if kind != SignalKind::AudioVideo => Ok(SisCommand::QueryTie {
                output: first,
                kind,
            }),
            _ => Err(ParseError::malformed("command", text)),
        }
    }

    fn parse_escaped(rest: &str) -> Result<Self, ParseError> {
        let mut c = Cursor::new(rest);
        if c.eat("R") {
            let preset = number(c.digits(), "preset")?;
            if c.rest() == "PRST" {
                return Ok(SisCommand::RecallPreset(preset));
            }
            return Err(ParseError::malformed("preset", rest));
        }
        let level = number(c.digits(), "verbose")?;
        if c.rest().eq_ignore_ascii_case("CV") {
            let level = u8::try_from(level).map_err(|_| ParseError::InvalidNumber(rest.into()))?;
            return Ok(SisCommand::SetVerbose(level));
        }
        Err(ParseError::malformed("escape", rest))
    }
}

fn number(digits: &str, shape: &'static str) -> Result<u16, ParseError> {
    if digits.is_empty() {
        return Err(ParseError::malformed(shape, "missing number"));
    }
    digits
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidNumber(digits.into()))
}

fn tag_kind(suffix: &str, dialect: Dialect) -> Option<SignalKind> {
    [SignalKind::Video, SignalKind::Audio, SignalKind::AudioVideo]
        .into_iter()
        .find(|k| k.tag(dialect) == suffix)
}
