//! Virtual matrix switcher
//!
//! Answers SIS commands the way a real switcher does: ties are executed and
//! echoed as route feedback, queries are answered from the current state and
//! anything it does not understand gets an `E10`. Front-panel style changes
//! (`set_route`, `set_sync`) produce unsolicited feedback.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use sis_protocol::{Dialect, DeviceErrorCode, SignalKind, SisCommand};
use tracing::{debug, warn};

/// Line ending the device puts on every reply
pub const REPLY_TERMINATOR: &str = "\r\n";

/// Copyright line sent on connect
const COPYRIGHT: &str = "(c) Copyright 2015, Extron Electronics";

/// Volume change per step command
const VOLUME_STEP: u16 = 1;

/// Configuration for a virtual matrix switcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualMatrixConfig {
    pub dialect: Dialect,
    /// Physical input count
    pub inputs: u16,
    /// Physical output count
    pub outputs: u16,
    /// Require this password before accepting commands
    pub password: Option<String>,
    /// Model shown in the banner
    pub model: String,
    /// Firmware line returned by the firmware query
    pub firmware: String,
}

impl Default for VirtualMatrixConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::AvMatrix,
            inputs: 8,
            outputs: 4,
            password: None,
            model: "DXP 84 HDMI".to_string(),
            firmware: "1.23-1.00(1.81LX-DTPCP108 -Fri, 31 Jul 2015 00:00:00 UTC)-1.00*(2.03LX-DTPCP108 -Fri, 30 Nov 2018 16:39:21 UTC)".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct OutputSlot {
    video: u16,
    audio: u16,
    volume: u16,
    muted: bool,
}

/// Simulated matrix switcher
pub struct VirtualMatrix {
    id: String,
    config: VirtualMatrixConfig,
    outputs: Vec<OutputSlot>,
    sync: Vec<bool>,
    verbose: u8,
    authenticated: bool,
    /// Partial command bytes not yet terminated
    buffer: Vec<u8>,
    /// Pending reply bytes
    output: VecDeque<Vec<u8>>,
    /// Commands received (for test verification)
    received: Vec<String>,
}

impl VirtualMatrix {
    pub fn new(id: impl Into<String>, config: VirtualMatrixConfig) -> Self {
        let outputs = vec![
            OutputSlot {
                volume: 50,
                ..Default::default()
            };
            usize::from(config.outputs)
        ];
        let sync = vec![false; usize::from(config.inputs)];
        Self {
            id: id.into(),
            authenticated: config.password.is_none(),
            config,
            outputs,
            sync,
            verbose: 0,
            buffer: Vec::new(),
            output: VecDeque::new(),
            received: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    pub fn verbose(&self) -> u8 {
        self.verbose
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Input currently feeding `output` (0 = none)
    pub fn route(&self, output: u16, kind: SignalKind) -> Option<u16> {
        let slot = self.slot(output)?;
        Some(match kind {
            SignalKind::Audio => slot.audio,
            _ => slot.video,
        })
    }

    pub fn volume(&self, output: u16) -> Option<u16> {
        self.slot(output).map(|s| s.volume)
    }

    pub fn muted(&self, output: u16) -> Option<bool> {
        self.slot(output).map(|s| s.muted)
    }

    /// Command lines received so far, terminator removed
    pub fn received_commands(&self) -> &[String] {
        &self.received
    }

    pub fn clear_received(&mut self) {
        self.received.clear();
    }

    fn slot(&self, output: u16) -> Option<&OutputSlot> {
        let index = usize::from(output).checked_sub(1)?;
        self.outputs.get(index)
    }

    fn slot_mut(&mut self, output: u16) -> Option<&mut OutputSlot> {
        let index = usize::from(output).checked_sub(1)?;
        self.outputs.get_mut(index)
    }

    fn reply(&mut self, line: impl Into<String>) {
        let mut line = line.into();
        debug!("Virtual matrix {} reply {:?}", self.id, line);
        line.push_str(REPLY_TERMINATOR);
        self.output.push_back(line.into_bytes());
    }

    fn reply_error(&mut self, code: DeviceErrorCode) {
        self.reply(format!("E{:02}", code.code()));
    }

    /// Take the next pending reply
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.output.is_empty()
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// A client connected: send the banner and, if required, a password prompt
    pub fn connect(&mut self) {
        self.authenticated = self.config.password.is_none();
        self.buffer.clear();
        self.reply(format!("{}, {}", COPYRIGHT, self.config.model));
        if self.config.password.is_some() {
            self.reply("Password:");
        }
    }

    /// Simulate a device reboot behind an open connection
    pub fn reboot(&mut self) {
        self.verbose = 0;
        self.connect();
    }

    // -------------------------------------------------------------------------
    // Front panel
    // -------------------------------------------------------------------------

    /// Change a route locally; the change is reported unsolicited
    pub fn set_route(&mut self, input: u16, output: u16, kind: SignalKind) -> bool {
        if input > self.config.inputs {
            return false;
        }
        let Some(slot) = self.slot_mut(output) else {
            return false;
        };
        if kind.includes_video() {
            slot.video = input;
        }
        if kind.includes_audio() {
            slot.audio = input;
        }
        self.reply(format!("Out{} In{} {}", output, input, kind.feedback_token()));
        true
    }

    /// Change an input's sync state; the bitmap is reported unsolicited
    pub fn set_sync(&mut self, input: u16, detected: bool) -> bool {
        let Some(index) = usize::from(input).checked_sub(1) else {
            return false;
        };
        let Some(bit) = self.sync.get_mut(index) else {
            return false;
        };
        *bit = detected;
        self.reply_sync();
        true
    }

    fn reply_sync(&mut self) {
        let bits: String = self.sync.iter().map(|&s| if s { '1' } else { '0' }).collect();
        let tag = self.config.dialect.descriptor().sync_tag;
        self.reply(format!("{tag}00 {bits}"));
    }

    // -------------------------------------------------------------------------
    // Command processing
    // -------------------------------------------------------------------------

    /// Feed bytes received from the controller
    ///
    /// Returns the number of complete command lines processed.
    pub fn push_bytes(&mut self, data: &[u8]) -> usize {
        self.buffer.extend_from_slice(data);
        let mut processed = 0;
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\r') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1])
                .trim_matches('\n')
                .to_string();
            if text.is_empty() {
                continue;
            }
            self.process_line(&text);
            processed += 1;
        }
        processed
    }

    /// Process one command line (terminator removed)
    pub fn process_line(&mut self, text: &str) {
        self.received.push(text.to_string());

        if !self.authenticated {
            if self.config.password.as_deref() == Some(text) {
                debug!("Virtual matrix {} login accepted", self.id);
                self.authenticated = true;
                self.reply("Login Administrator");
            } else {
                self.reply("Password:");
            }
            return;
        }

        let command = match SisCommand::parse(text, self.config.dialect) {
            Ok(command) => command,
            Err(e) => {
                warn!("Virtual matrix {} rejected {:?}: {}", self.id, text, e);
                self.reply_error(DeviceErrorCode::InvalidCommand);
                return;
            }
        };
        self.execute(command);
    }

    fn execute(&mut self, command: SisCommand) {
        let inputs = self.config.inputs;
        match command {
            SisCommand::Tie {
                input,
                output,
                kind,
            } => {
                if input > inputs {
                    self.reply_error(DeviceErrorCode::InvalidInput);
                } else if !self.set_route(input, output, kind) {
                    self.reply_error(DeviceErrorCode::InvalidOutput);
                }
            }
            SisCommand::QueryTie { output, kind } => match self.route(output, kind) {
                Some(input) => self.reply(format!(
                    "Out{} In{} {}",
                    output,
                    input,
                    kind.feedback_token()
                )),
                None => self.reply_error(DeviceErrorCode::InvalidOutput),
            },
            SisCommand::SetVerbose(level) => {
                self.verbose = level;
                self.reply(format!("Vrb{level}"));
            }
            SisCommand::PollSync => self.reply_sync(),
            SisCommand::PollFirmware => {
                let firmware = self.config.firmware.clone();
                self.reply(firmware);
            }
            SisCommand::PollInformation => {
                let info = format!("V{0}X{1} A{0}X{1}", inputs, self.config.outputs);
                self.reply(info);
            }
            SisCommand::RecallPreset(preset) => {
                if preset == 0 {
                    self.reply_error(DeviceErrorCode::InvalidPreset);
                } else {
                    self.reply(format!("Rpr{preset}"));
                }
            }
            SisCommand::QueryVolume(output) => self.adjust_volume(output, |v| v),
            SisCommand::VolumeUp(output) => {
                self.adjust_volume(output, |v| (v + VOLUME_STEP).min(100))
            }
            SisCommand::VolumeDown(output) => {
                self.adjust_volume(output, |v| v.saturating_sub(VOLUME_STEP))
            }
            SisCommand::SetVolume { output, level } => {
                if level > 100 {
                    self.reply_error(DeviceErrorCode::InvalidValue);
                } else {
                    self.adjust_volume(output, |_| level);
                }
            }
            SisCommand::QueryMute(output) => match self.muted(output) {
                Some(muted) => self.reply(format!("Amt{} {}", output, u8::from(muted))),
                None => self.reply_error(DeviceErrorCode::InvalidOutput),
            },
            SisCommand::Mute { output, muted } => match self.slot_mut(output) {
                Some(slot) => {
                    slot.muted = muted;
                    self.reply(format!("Amt{} {}", output, u8::from(muted)));
                }
                None => self.reply_error(DeviceErrorCode::InvalidOutput),
            },
            SisCommand::Credential(_) | SisCommand::Raw(_) => {
                self.reply_error(DeviceErrorCode::InvalidCommand)
            }
        }
    }

    fn adjust_volume(&mut self, output: u16, f: impl FnOnce(u16) -> u16) {
        match self.slot_mut(output) {
            Some(slot) => {
                slot.volume = f(slot.volume);
                let level = slot.volume;
                self.reply(format!("Out{output} Vol{level}"));
            }
            None => self.reply_error(DeviceErrorCode::InvalidOutput),
        }
    }
}
