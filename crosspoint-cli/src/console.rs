//! Interactive console commands and event formatting

use anyhow::{anyhow, bail};
use sis_matrix::{MatrixEvent, MatrixSnapshot};
use sis_protocol::SignalKind;

/// What to do with a volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeAction {
    Up,
    Down,
    Set(u16),
}

/// What to do with a mute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteAction {
    On,
    Off,
    Toggle,
}

/// One line typed at the console
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Route {
        input: u16,
        output: u16,
        kind: SignalKind,
    },
    Poll,
    PollRoutes,
    PollSync,
    Preset(u16),
    Volume { output: u16, action: VolumeAction },
    Mute { output: u16, action: MuteAction },
    Verbose(u8),
    Raw(String),
    Status,
    /// Front-panel route change on the simulator
    SimRoute {
        input: u16,
        output: u16,
        kind: SignalKind,
    },
    /// Sync change on the simulator
    SimSync { input: u16, detected: bool },
    SimReboot,
    Save,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  route <in> <out> [video|audio|all]   tie an input to an output (in 0 clears)
  poll | routes | sync                 query firmware, routes or sync
  preset <n>                           recall a global preset
  vol <out> <0-100|up|down>            set or step an output's volume
  mute <out> [on|off|toggle]           change an output's mute
  verbose <0-3>                        set the feedback level
  raw <text>                           send text as-is
  status                               print the current routing table
  sim route <in> <out> [kind]          change a route on the simulator
  sim sync <in> on|off                 change an input's sync on the simulator
  sim reboot                           restart the simulator
  save                                 write the settings file
  help | quit";

fn number<T: std::str::FromStr>(word: Option<&str>, what: &str) -> anyhow::Result<T> {
    let word = word.ok_or_else(|| anyhow!("missing {}", what))?;
    word.parse().map_err(|_| anyhow!("invalid {} {:?}", what, word))
}

fn kind(word: Option<&str>) -> anyhow::Result<SignalKind> {
    match word.map(str::to_ascii_lowercase).as_deref() {
        None | Some("all") | Some("av") => Ok(SignalKind::AudioVideo),
        Some("video") | Some("vid") => Ok(SignalKind::Video),
        Some("audio") | Some("aud") => Ok(SignalKind::Audio),
        Some(other) => bail!("unknown signal kind {:?}", other),
    }
}

fn switch(word: Option<&str>) -> anyhow::Result<bool> {
    match word {
        Some("on") | Some("1") => Ok(true),
        Some("off") | Some("0") => Ok(false),
        other => bail!("expected on or off, got {:?}", other.unwrap_or("")),
    }
}

impl ConsoleCommand {
    /// Parse one console line; `Ok(None)` for a blank line
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let line = line.trim();
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "route" | "tie" => ConsoleCommand::Route {
                input: number(words.next(), "input")?,
                output: number(words.next(), "output")?,
                kind: kind(words.next())?,
            },
            "poll" => ConsoleCommand::Poll,
            "routes" => ConsoleCommand::PollRoutes,
            "sync" => ConsoleCommand::PollSync,
            "preset" => ConsoleCommand::Preset(number(words.next(), "preset")?),
            "vol" | "volume" => {
                let output = number(words.next(), "output")?;
                let action = match words.next() {
                    Some("up") | Some("+") => VolumeAction::Up,
                    Some("down") | Some("-") => VolumeAction::Down,
                    level => VolumeAction::Set(number(level, "level")?),
                };
                ConsoleCommand::Volume { output, action }
            }
            "mute" => {
                let output = number(words.next(), "output")?;
                let action = match words.next() {
                    None | Some("toggle") => MuteAction::Toggle,
                    word => {
                        if switch(word)? {
                            MuteAction::On
                        } else {
                            MuteAction::Off
                        }
                    }
                };
                ConsoleCommand::Mute { output, action }
            }
            "verbose" => ConsoleCommand::Verbose(number(words.next(), "level")?),
            "raw" => {
                let text = line[verb.len()..].trim_start();
                if text.is_empty() {
                    bail!("raw needs some text");
                }
                ConsoleCommand::Raw(text.to_string())
            }
            "status" => ConsoleCommand::Status,
            "sim" => match words.next() {
                Some("route") => ConsoleCommand::SimRoute {
                    input: number(words.next(), "input")?,
                    output: number(words.next(), "output")?,
                    kind: kind(words.next())?,
                },
                Some("sync") => ConsoleCommand::SimSync {
                    input: number(words.next(), "input")?,
                    detected: switch(words.next())?,
                },
                Some("reboot") => ConsoleCommand::SimReboot,
                other => bail!("unknown sim command {:?}", other.unwrap_or("")),
            },
            "save" => ConsoleCommand::Save,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => bail!("unknown command {:?}, type help for a list", other),
        };
        Ok(Some(command))
    }
}

/// One-line description of an event, `None` for traffic when it is hidden
pub fn format_event(event: &MatrixEvent, show_traffic: bool) -> Option<String> {
    let text = match event {
        MatrixEvent::VideoRouteChanged { output, input } => {
            format!("output {} video <- input {}", output, input)
        }
        MatrixEvent::AudioRouteChanged { output, input } => {
            format!("output {} audio <- input {}", output, input)
        }
        MatrixEvent::RouteNameChanged { .. } => return None,
        MatrixEvent::SyncChanged { input, detected } => format!(
            "input {} sync {}",
            input,
            if *detected { "detected" } else { "lost" }
        ),
        MatrixEvent::VolumeChanged {
            output,
            level,
            scaled,
        } => format!("output {} volume {} ({})", output, level, scaled),
        MatrixEvent::MuteChanged { output, muted } => format!(
            "output {} {}",
            output,
            if *muted { "muted" } else { "unmuted" }
        ),
        MatrixEvent::DeviceInfoChanged(info) => match &info.model {
            Some(model) => format!("device {} firmware {}", model, info.firmware_version),
            None => format!("device firmware {}", info.firmware_version),
        },
        MatrixEvent::SessionStateChanged { from, to } => format!("session {} -> {}", from, to),
        MatrixEvent::RouteReadyChanged { ready } => {
            if *ready {
                "ready for routing".to_string()
            } else {
                "routing disabled".to_string()
            }
        }
        MatrixEvent::LineIn { line } if show_traffic => format!("<< {}", line.escape_debug()),
        MatrixEvent::LineOut { line } if show_traffic => format!(">> {}", line.escape_debug()),
        MatrixEvent::LineIn { .. } | MatrixEvent::LineOut { .. } => return None,
        MatrixEvent::DeviceError { code, description } => {
            format!("device error E{:02}: {}", code, description)
        }
        MatrixEvent::Error { source, message } => format!("{} error: {}", source, message),
    };
    Some(text)
}

/// Routing table as printed by `status`
pub fn format_status(snapshot: &MatrixSnapshot) -> String {
    let mut out = format!(
        "session: {}{}\n",
        snapshot.session,
        if snapshot.route_ready { " (ready)" } else { "" }
    );
    if let Some(info) = snapshot.device_info() {
        out.push_str(&format!("firmware: {}\n", info.firmware_version));
    }
    for output in snapshot.routing.outputs() {
        out.push_str(&format!(
            "{:>3} {:<16} video: {:<20} audio: {:<20}",
            output.slot,
            output.name,
            snapshot.source_name(output.slot, SignalKind::Video),
            snapshot.source_name(output.slot, SignalKind::Audio),
        ));
        if let Some(level) = output.volume {
            out.push_str(&format!(" vol {}", level));
        }
        if output.muted {
            out.push_str(" muted");
        }
        out.push('\n');
    }
    let synced: Vec<String> = snapshot
        .routing
        .inputs()
        .filter(|i| i.sync_detected)
        .map(|i| i.slot.to_string())
        .collect();
    out.push_str(&format!(
        "sync: {}",
        if synced.is_empty() {
            "none".to_string()
        } else {
            synced.join(", ")
        }
    ));
    out
}
