//! Feedback classification
//!
//! Every line received from a switcher is classified into exactly one
//! [`Feedback`] value. Message shapes overlap by substring (a firmware banner
//! can contain `Out`, a route report contains digits), so the checks run in a
//! fixed order:
//!
//! 1. device error code (`E12`)
//! 2. firmware banner
//! 3. route report (`Out3 In5 Vid`)
//! 4. sync bitmap (`Frq00 01100110`)
//! 5. output volume (`Out2 Vol50`)
//! 6. output mute (`Amt2 1`)
//! 7. login prompt or vendor banner
//! 8. anything else is [`Feedback::Unrecognized`]
//!
//! Classification is a pure function of the line and dialect. A line that
//! starts like a known shape but fails to parse is logged with the parser
//! name and classified as unrecognized.

use crate::command::SignalKind;
use crate::dialect::Dialect;
use crate::error::ParseError;
use crate::firmware::{parse_banner, DeviceInfo};
use crate::scan::{find_all_ignore_case, Cursor};

/// What kind of login text the device sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PromptKind {
    /// Device wants the password
    Password,
    /// Device wants a user name
    Username,
    /// Vendor identification banner sent on connect
    Banner,
}

/// A classified feedback line
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Feedback {
    /// Output now takes its signal from input (0 = no source)
    RouteChanged {
        output: u16,
        input: u16,
        kind: SignalKind,
    },
    /// Sync detected per input, index 0 is input 1
    SyncStatus { bits: Vec<bool> },
    /// Firmware banner
    FirmwareInfo(DeviceInfo),
    /// Output volume in device units
    VolumeLevel { output: u16, level: u16 },
    /// Output mute state
    MuteState { output: u16, muted: bool },
    /// Device rejected a command
    ErrorCode(u16),
    /// Login prompt or vendor banner
    LoginPrompt(PromptKind),
    /// Anything else
    Unrecognized(String),
}

impl Feedback {
    /// Whether this feedback carries routing state
    pub fn is_route(&self) -> bool {
        matches!(self, Feedback::RouteChanged { .. })
    }
}

/// Classify one received line (delimiter already stripped)
pub fn classify(line: &str, dialect: Dialect) -> Feedback {
    let trimmed = line.trim();

    if let Some(code) = parse_error_code(trimmed) {
        return Feedback::ErrorCode(code);
    }

    if let Some(info) = parse_banner(trimmed) {
        return Feedback::FirmwareInfo(info);
    }

    let parsers: [(&str, fn(&str, Dialect) -> Result<Option<Feedback>, ParseError>); 4] = [
        ("route", parse_route),
        ("sync", parse_sync),
        ("volume", parse_volume),
        ("mute", parse_mute),
    ];
    for (name, parser) in parsers {
        match parser(trimmed, dialect) {
            Ok(Some(feedback)) => return feedback,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("{} parser rejected {:?}: {}", name, trimmed, e);
                return Feedback::Unrecognized(trimmed.to_string());
            }
        }
    }

    if let Some(kind) = parse_prompt(trimmed, dialect) {
        return Feedback::LoginPrompt(kind);
    }

    Feedback::Unrecognized(trimmed.to_string())
}

/// `E` followed only by digits
fn parse_error_code(line: &str) -> Option<u16> {
    let digits = line.strip_prefix('E')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `Out<N> In<M> <All|Vid|Aud>` anywhere in the line, ignoring case
///
/// N and M are one or two digits. A line that mentions `Out` and ends in a
/// kind token but never yields a complete report is malformed.
fn parse_route(line: &str, _dialect: Dialect) -> Result<Option<Feedback>, ParseError> {
    for at in find_all_ignore_case(line, "out") {
        if let Some(feedback) = route_at(&line[at..]) {
            return Ok(Some(feedback));
        }
    }

    let ends_with_kind = line
        .get(line.len().saturating_sub(3)..)
        .and_then(SignalKind::from_feedback_token)
        .is_some();
    let mentions_route = find_all_ignore_case(line, "out").next().is_some()
        && find_all_ignore_case(line, "in").next().is_some();
    if ends_with_kind && mentions_route {
        return Err(ParseError::malformed("route", line));
    }
    Ok(None)
}

fn route_at(text: &str) -> Option<Feedback> {
    let mut c = Cursor::new(text);
    if !c.eat_ignore_case("out") {
        return None;
    }
    let output = c.digits_bounded(1, 2)?;
    if c.skip_ws() == 0 || !c.eat_ignore_case("in") {
        return None;
    }
    let input = c.digits_bounded(1, 2)?;
    if c.skip_ws() == 0 {
        return None;
    }
    let token = c.rest().get(..3)?;
    let kind = SignalKind::from_feedback_token(token)?;
    Some(Feedback::RouteChanged {
        output: output.parse().ok()?,
        input: input.parse().ok()?,
        kind,
    })
}

/// `Frq<digits> <0|1...>`
fn parse_sync(line: &str, dialect: Dialect) -> Result<Option<Feedback>, ParseError> {
    let mut c = Cursor::new(line);
    if !c.eat(dialect.descriptor().sync_tag) {
        return Ok(None);
    }
    if c.digits().is_empty() {
        return Err(ParseError::malformed("sync", "missing tag number"));
    }
    if c.skip_ws() == 0 {
        return Err(ParseError::malformed("sync", "missing separator"));
    }
    let bits = c.take_while(|b| b == b'0' || b == b'1');
    if bits.is_empty() {
        return Err(ParseError::malformed("sync", "missing bitmap"));
    }
    Ok(Some(Feedback::SyncStatus {
        bits: bits.bytes().map(|b| b == b'1').collect(),
    }))
}

/// `Out<N> Vol<level>` (the space is optional)
fn parse_volume(line: &str, _dialect: Dialect) -> Result<Option<Feedback>, ParseError> {
    let mut c = Cursor::new(line);
    if !c.eat("Out") {
        return Ok(None);
    }
    let output = c.digits();
    if output.is_empty() {
        return Ok(None);
    }
    c.skip_ws();
    if !c.eat("Vol") {
        return Ok(None);
    }
    let level = c.digits();
    if level.is_empty() {
        return Err(ParseError::malformed("volume", "missing level"));
    }
    Ok(Some(Feedback::VolumeLevel {
        output: parse_u16(output)?,
        level: parse_u16(level)?,
    }))
}

/// `Amt<N> <state>`, any nonzero state is muted
fn parse_mute(line: &str, _dialect: Dialect) -> Result<Option<Feedback>, ParseError> {
    let mut c = Cursor::new(line);
    if !c.eat("Amt") {
        return Ok(None);
    }
    let output = c.digits();
    if output.is_empty() {
        return Err(ParseError::malformed("mute", "missing output"));
    }
    c.skip_ws();
    let state = c.digits();
    if state.is_empty() {
        return Err(ParseError::malformed("mute", "missing state"));
    }
    Ok(Some(Feedback::MuteState {
        output: parse_u16(output)?,
        muted: parse_u16(state)? != 0,
    }))
}

fn parse_prompt(line: &str, dialect: Dialect) -> Option<PromptKind> {
    let d = dialect.descriptor();
    let contains = |markers: &[&str]| markers.iter().any(|m| line.contains(m));
    if contains(d.password_markers) {
        Some(PromptKind::Password)
    } else if contains(d.username_markers) {
        Some(PromptKind::Username)
    } else if contains(d.banner_markers) {
        Some(PromptKind::Banner)
    } else {
        None
    }
}

fn parse_u16(digits: &str) -> Result<u16, ParseError> {
    digits
        .parse()
        .map_err(|_| ParseError::InvalidNumber(digits.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SisCommand;
    use proptest::prelude::*;

    fn av(line: &str) -> Feedback {
        classify(line, Dialect::AvMatrix)
    }

    #[test]
    fn test_route_reports() {
        assert_eq!(
            av("Out3 In5 Vid"),
            Feedback::RouteChanged {
                output: 3,
                input: 5,
                kind: SignalKind::Video
            }
        );
        assert_eq!(
            av("out12  in07 aud"),
            Feedback::RouteChanged {
                output: 12,
                input: 7,
                kind: SignalKind::Audio
            }
        );
        assert_eq!(
            av("Qik Out1 In2 All"),
            Feedback::RouteChanged {
                output: 1,
                input: 2,
                kind: SignalKind::AudioVideo
            }
        );
        assert_eq!(
            av("Out2 In0 Aud"),
            Feedback::RouteChanged {
                output: 2,
                input: 0,
                kind: SignalKind::Audio
            }
        );
    }

    #[test]
    fn test_route_zero_output_still_classified() {
        // Suppression happens in the store, not the classifier
        assert!(av("Out0 In4 Vid").is_route());
    }

    #[test]
    fn test_malformed_route_is_unrecognized() {
        assert_eq!(
            av("Out In5 Vid"),
            Feedback::Unrecognized("Out In5 Vid".into())
        );
        assert_eq!(
            av("Out123 In5 Vid"),
            Feedback::Unrecognized("Out123 In5 Vid".into())
        );
    }

    #[test]
    fn test_sync_bitmap() {
        assert_eq!(
            av("Frq00 01100110"),
            Feedback::SyncStatus {
                bits: vec![false, true, true, false, false, true, true, false]
            }
        );
        assert_eq!(av("Frq00"), Feedback::Unrecognized("Frq00".into()));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(av("E12"), Feedback::ErrorCode(12));
        assert_eq!(av("  E01 "), Feedback::ErrorCode(1));
        // Vendor banner starts with E but is not an error
        assert_eq!(
            av("Extron Electronics"),
            Feedback::LoginPrompt(PromptKind::Banner)
        );
    }

    #[test]
    fn test_firmware_precedes_route() {
        let line = "1.23-1.00(1.81LX-DTPCP108 -Fri)-1.00*(2.03LX-DTPCP108 -Fri)";
        assert!(matches!(av(line), Feedback::FirmwareInfo(_)));
    }

    #[test]
    fn test_volume_and_mute() {
        assert_eq!(
            av("Out2 Vol50"),
            Feedback::VolumeLevel {
                output: 2,
                level: 50
            }
        );
        assert_eq!(
            av("Out2Vol7"),
            Feedback::VolumeLevel {
                output: 2,
                level: 7
            }
        );
        assert_eq!(
            av("Amt4 1"),
            Feedback::MuteState {
                output: 4,
                muted: true
            }
        );
        assert_eq!(
            av("Amt4 0"),
            Feedback::MuteState {
                output: 4,
                muted: false
            }
        );
        assert_eq!(av("Out2 Vol"), Feedback::Unrecognized("Out2 Vol".into()));
    }

    #[test]
    fn test_prompts() {
        assert_eq!(av("Password:"), Feedback::LoginPrompt(PromptKind::Password));
        assert_eq!(
            classify("Login:", Dialect::Xtp),
            Feedback::LoginPrompt(PromptKind::Username)
        );
        assert_eq!(
            av("(c) Copyright 2019, Extron Electronics, XTP CP 4i"),
            Feedback::LoginPrompt(PromptKind::Banner)
        );
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(av("Vrb3"), Feedback::Unrecognized("Vrb3".into()));
    }

    fn arb_line() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u16..100, 0u16..100, prop_oneof!["Vid", "Aud", "All"])
                .prop_map(|(o, i, k)| format!("Out{o} In{i} {k}")),
            proptest::collection::vec(any::<bool>(), 1..32).prop_map(|bits| {
                let s: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
                format!("Frq00 {s}")
            }),
            (1u16..100, 0u16..101).prop_map(|(o, l)| format!("Out{o} Vol{l}")),
            (1u16..100, 0u8..4).prop_map(|(o, m)| format!("Amt{o} {m}")),
            (0u16..100).prop_map(|c| format!("E{c:02}")),
            "[ -~]{0,40}",
        ]
    }

    proptest! {
        #[test]
        fn classification_is_pure(line in arb_line()) {
            let first = classify(&line, Dialect::AvMatrix);
            let second = classify(&line, Dialect::AvMatrix);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn tie_feedback_classifies_back(
            input in 0u16..100,
            output in 1u16..100,
            kind in prop_oneof![
                Just(SignalKind::Video),
                Just(SignalKind::Audio),
                Just(SignalKind::AudioVideo),
            ],
        ) {
            let cmd = SisCommand::tie(input, output, kind).unwrap();
            let line = cmd.tie_feedback().unwrap();
            prop_assert_eq!(
                classify(&line, Dialect::AvMatrix),
                Feedback::RouteChanged { output, input, kind }
            );
        }
    }
}
