//! Routing state store
//!
//! One aggregate per input and per output, indexed by slot number. Every
//! mutator returns the events the change produced; the caller publishes them.

use std::collections::BTreeMap;

use serde::Serialize;
use sis_protocol::{DeviceInfo, SignalKind};
use tracing::{debug, warn};

use crate::config::{EndpointConfig, MatrixConfig};
use crate::events::MatrixEvent;

/// Current state of one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputState {
    pub slot: u16,
    pub name: String,
    pub video_name: String,
    pub audio_name: String,
    /// Video sync detected on this input
    pub sync_detected: bool,
}

/// Current state of one output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputState {
    pub slot: u16,
    pub name: String,
    pub video_name: String,
    pub audio_name: String,
    /// Input feeding this output's video (0 = none)
    pub video_source: u16,
    /// Input feeding this output's audio (0 = none)
    pub audio_source: u16,
    /// Volume in device units, once reported
    pub volume: Option<u16>,
    pub muted: bool,
}

impl InputState {
    fn new(config: &EndpointConfig) -> Self {
        Self {
            slot: config.slot,
            name: config.name.clone(),
            video_name: config.video_display_name(),
            audio_name: config.audio_display_name(),
            sync_detected: false,
        }
    }
}

impl OutputState {
    fn new(config: &EndpointConfig) -> Self {
        Self {
            slot: config.slot,
            name: config.name.clone(),
            video_name: config.video_display_name(),
            audio_name: config.audio_display_name(),
            video_source: 0,
            audio_source: 0,
            volume: None,
            muted: false,
        }
    }

    /// Source for one signal kind (`AudioVideo` reads the video source)
    pub fn source(&self, kind: SignalKind) -> u16 {
        match kind {
            SignalKind::Audio => self.audio_source,
            SignalKind::Video | SignalKind::AudioVideo => self.video_source,
        }
    }
}

/// Canonical routing state for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingState {
    inputs: BTreeMap<u16, InputState>,
    outputs: BTreeMap<u16, OutputState>,
    device_info: Option<DeviceInfo>,
    no_route_text: String,
    volume_scale: i32,
}

impl RoutingState {
    /// Build the store from configuration; every output starts unrouted
    pub fn new(config: &MatrixConfig) -> Self {
        Self {
            inputs: config
                .inputs
                .iter()
                .map(|c| (c.slot, InputState::new(c)))
                .collect(),
            outputs: config
                .outputs
                .iter()
                .map(|c| (c.slot, OutputState::new(c)))
                .collect(),
            device_info: None,
            no_route_text: config.no_route_text.clone(),
            volume_scale: config.dialect.descriptor().volume_scale,
        }
    }

    pub fn input(&self, slot: u16) -> Option<&InputState> {
        self.inputs.get(&slot)
    }

    pub fn output(&self, slot: u16) -> Option<&OutputState> {
        self.outputs.get(&slot)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &InputState> {
        self.inputs.values()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputState> {
        self.outputs.values()
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.device_info.as_ref()
    }

    /// Display name of the input currently feeding `output`
    ///
    /// Falls back to the no-route text when the output is unrouted, routed
    /// to an input that is not configured, or not configured itself.
    pub fn source_name(&self, output: u16, kind: SignalKind) -> String {
        let source = match self.outputs.get(&output) {
            Some(o) => o.source(kind),
            None => return self.no_route_text.clone(),
        };
        match (self.inputs.get(&source), kind) {
            (Some(input), SignalKind::Audio) => input.audio_name.clone(),
            (Some(input), _) => input.video_name.clone(),
            (None, _) => self.no_route_text.clone(),
        }
    }

    /// Record a route report
    ///
    /// Output 0 and unconfigured outputs are ignored. The input number is
    /// stored as reported, even when it is 0 or not configured.
    pub fn apply_route(&mut self, output: u16, input: u16, kind: SignalKind) -> Vec<MatrixEvent> {
        if output == 0 {
            debug!("Ignoring route report for output 0");
            return Vec::new();
        }
        let Some(state) = self.outputs.get_mut(&output) else {
            warn!("Route report for unconfigured output {}", output);
            return Vec::new();
        };
        if input != 0 && !self.inputs.contains_key(&input) {
            warn!("Output {} routed to unconfigured input {}", output, input);
        }

        let mut changed = Vec::with_capacity(2);
        if kind.includes_video() {
            state.video_source = input;
            changed.push(SignalKind::Video);
        }
        if kind.includes_audio() {
            state.audio_source = input;
            changed.push(SignalKind::Audio);
        }

        let mut events = Vec::with_capacity(4);
        for k in changed {
            events.push(match k {
                SignalKind::Audio => MatrixEvent::AudioRouteChanged { output, input },
                _ => MatrixEvent::VideoRouteChanged { output, input },
            });
            events.push(MatrixEvent::RouteNameChanged {
                output,
                kind: k,
                name: self.source_name(output, k),
            });
        }
        events
    }

    /// Record a sync bitmap; position `i` is input `i + 1`
    ///
    /// Only inputs whose flag actually changes produce an event.
    pub fn apply_sync_bitmap(&mut self, bits: &[bool]) -> Vec<MatrixEvent> {
        let mut events = Vec::new();
        for (i, &detected) in bits.iter().enumerate() {
            let Ok(slot) = u16::try_from(i + 1) else {
                break;
            };
            let Some(input) = self.inputs.get_mut(&slot) else {
                continue;
            };
            if input.sync_detected != detected {
                input.sync_detected = detected;
                events.push(MatrixEvent::SyncChanged {
                    input: slot,
                    detected,
                });
            }
        }
        events
    }

    /// Record a volume report
    pub fn apply_volume(&mut self, output: u16, level: u16) -> Vec<MatrixEvent> {
        let scale = self.volume_scale;
        let Some(state) = self.outputs.get_mut(&output) else {
            return Vec::new();
        };
        if state.volume == Some(level) {
            return Vec::new();
        }
        state.volume = Some(level);
        vec![MatrixEvent::VolumeChanged {
            output,
            level,
            scaled: scale_level(level, scale),
        }]
    }

    /// Record a mute report
    pub fn apply_mute(&mut self, output: u16, muted: bool) -> Vec<MatrixEvent> {
        let Some(state) = self.outputs.get_mut(&output) else {
            return Vec::new();
        };
        if state.muted == muted {
            return Vec::new();
        }
        state.muted = muted;
        vec![MatrixEvent::MuteChanged { output, muted }]
    }

    /// Merge newly parsed device info; a missing model keeps the last known one
    pub fn set_device_info(&mut self, info: DeviceInfo) -> Vec<MatrixEvent> {
        let model = info
            .model
            .or_else(|| self.device_info.as_ref().and_then(|d| d.model.clone()));
        let merged = DeviceInfo {
            firmware_version: info.firmware_version,
            model,
        };
        if self.device_info.as_ref() == Some(&merged) {
            return Vec::new();
        }
        self.device_info = Some(merged.clone());
        vec![MatrixEvent::DeviceInfoChanged(merged)]
    }

    /// Events describing every current value, for a full refresh
    pub fn refresh_all(&self) -> Vec<MatrixEvent> {
        let mut events = Vec::new();
        for input in self.inputs.values() {
            events.push(MatrixEvent::SyncChanged {
                input: input.slot,
                detected: input.sync_detected,
            });
        }
        for output in self.outputs.values() {
            let slot = output.slot;
            events.push(MatrixEvent::VideoRouteChanged {
                output: slot,
                input: output.video_source,
            });
            events.push(MatrixEvent::RouteNameChanged {
                output: slot,
                kind: SignalKind::Video,
                name: self.source_name(slot, SignalKind::Video),
            });
            events.push(MatrixEvent::AudioRouteChanged {
                output: slot,
                input: output.audio_source,
            });
            events.push(MatrixEvent::RouteNameChanged {
                output: slot,
                kind: SignalKind::Audio,
                name: self.source_name(slot, SignalKind::Audio),
            });
            if let Some(level) = output.volume {
                events.push(MatrixEvent::VolumeChanged {
                    output: slot,
                    level,
                    scaled: scale_level(level, self.volume_scale),
                });
            }
            events.push(MatrixEvent::MuteChanged {
                output: slot,
                muted: output.muted,
            });
        }
        if let Some(info) = &self.device_info {
            events.push(MatrixEvent::DeviceInfoChanged(info.clone()));
        }
        events
    }
}

fn scale_level(level: u16, scale: i32) -> i32 {
    i32::from(level).saturating_mul(scale).saturating_sub(1).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sis_protocol::Dialect;

    fn store(inputs: u16, outputs: u16) -> RoutingState {
        RoutingState::new(&MatrixConfig::with_counts(Dialect::AvMatrix, inputs, outputs))
    }

    #[test]
    fn test_initial_state_unrouted() {
        let s = store(4, 2);
        for output in s.outputs() {
            assert_eq!(output.video_source, 0);
            assert_eq!(output.audio_source, 0);
        }
        assert_eq!(s.source_name(1, SignalKind::Video), "No Source");
    }

    #[test]
    fn test_output_zero_is_ignored() {
        let mut s = store(4, 4);
        let before = s.clone();
        assert!(s.apply_route(0, 3, SignalKind::Video).is_empty());
        assert_eq!(s, before);
    }

    #[test]
    fn test_all_fans_out_once_each() {
        let mut s = store(8, 4);
        let events = s.apply_route(3, 5, SignalKind::AudioVideo);
        assert_eq!(s.output(3).unwrap().video_source, 5);
        assert_eq!(s.output(3).unwrap().audio_source, 5);

        let video = events
            .iter()
            .filter(|e| matches!(e, MatrixEvent::VideoRouteChanged { output: 3, input: 5 }))
            .count();
        let audio = events
            .iter()
            .filter(|e| matches!(e, MatrixEvent::AudioRouteChanged { output: 3, input: 5 }))
            .count();
        assert_eq!((video, audio), (1, 1));
        assert!(events.contains(&MatrixEvent::RouteNameChanged {
            output: 3,
            kind: SignalKind::Video,
            name: "Input 5-Video".into()
        }));
        assert!(events.contains(&MatrixEvent::RouteNameChanged {
            output: 3,
            kind: SignalKind::Audio,
            name: "Input 5-Audio".into()
        }));
    }

    #[test]
    fn test_single_kind_leaves_other_alone() {
        let mut s = store(8, 4);
        s.apply_route(2, 1, SignalKind::AudioVideo);
        let events = s.apply_route(2, 6, SignalKind::Audio);
        assert_eq!(s.output(2).unwrap().video_source, 1);
        assert_eq!(s.output(2).unwrap().audio_source, 6);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_input_zero_stored_and_reported() {
        let mut s = store(4, 4);
        s.apply_route(2, 3, SignalKind::Audio);
        let events = s.apply_route(2, 0, SignalKind::Audio);
        assert_eq!(s.output(2).unwrap().audio_source, 0);
        assert!(events.contains(&MatrixEvent::AudioRouteChanged {
            output: 2,
            input: 0
        }));
        assert_eq!(s.source_name(2, SignalKind::Audio), "No Source");
    }

    #[test]
    fn test_unknown_input_name_falls_back() {
        let mut s = store(4, 4);
        let events = s.apply_route(1, 42, SignalKind::Video);
        assert_eq!(s.output(1).unwrap().video_source, 42);
        assert!(events.contains(&MatrixEvent::RouteNameChanged {
            output: 1,
            kind: SignalKind::Video,
            name: "No Source".into()
        }));
    }

    #[test]
    fn test_unconfigured_output_ignored() {
        let mut s = store(4, 4);
        assert!(s.apply_route(9, 1, SignalKind::Video).is_empty());
        assert_eq!(s.source_name(9, SignalKind::Video), "No Source");
    }

    #[test]
    fn test_sync_bitmap_mapping() {
        let mut s = store(8, 1);
        let bits: Vec<bool> = "01100110".chars().map(|c| c == '1').collect();
        let events = s.apply_sync_bitmap(&bits);

        let synced: Vec<u16> = s.inputs().filter(|i| i.sync_detected).map(|i| i.slot).collect();
        assert_eq!(synced, vec![2, 3, 6, 7]);
        assert_eq!(events.len(), 4);
    }

    #[test]
    fn test_sync_is_edge_triggered() {
        let mut s = store(4, 1);
        assert_eq!(s.apply_sync_bitmap(&[true, false, false, false]).len(), 1);
        assert!(s.apply_sync_bitmap(&[true, false, false, false]).is_empty());
        assert_eq!(
            s.apply_sync_bitmap(&[false, false, false, false]),
            vec![MatrixEvent::SyncChanged {
                input: 1,
                detected: false
            }]
        );
    }

    #[test]
    fn test_sync_bits_beyond_inputs_ignored() {
        let mut s = store(2, 1);
        let events = s.apply_sync_bitmap(&[true, true, true, true, true]);
        assert_eq!(events.len(), 2);
        assert!(s.input(3).is_none());
    }

    #[test]
    fn test_volume_and_mute() {
        let mut s = store(1, 2);
        assert_eq!(
            s.apply_volume(2, 50),
            vec![MatrixEvent::VolumeChanged {
                output: 2,
                level: 50,
                scaled: 51_199
            }]
        );
        assert!(s.apply_volume(2, 50).is_empty());
        assert_eq!(
            s.apply_volume(1, 0),
            vec![MatrixEvent::VolumeChanged {
                output: 1,
                level: 0,
                scaled: 0
            }]
        );
        assert_eq!(
            s.apply_mute(2, true),
            vec![MatrixEvent::MuteChanged {
                output: 2,
                muted: true
            }]
        );
        assert!(s.apply_mute(2, true).is_empty());
        assert!(s.apply_mute(7, true).is_empty());
    }

    #[test]
    fn test_device_info_keeps_model() {
        let mut s = store(1, 1);
        s.set_device_info(DeviceInfo {
            firmware_version: "Main: 1.23".into(),
            model: Some("LX-DTPCP108".into()),
        });
        let events = s.set_device_info(DeviceInfo {
            firmware_version: "1.24 loose".into(),
            model: None,
        });
        assert_eq!(events.len(), 1);
        let info = s.device_info().unwrap();
        assert_eq!(info.firmware_version, "1.24 loose");
        assert_eq!(info.model.as_deref(), Some("LX-DTPCP108"));
    }

    #[test]
    fn test_refresh_all_covers_every_output() {
        let s = store(2, 3);
        let events = s.refresh_all();
        for slot in 1..=3 {
            assert!(events.contains(&MatrixEvent::VideoRouteChanged {
                output: slot,
                input: 0
            }));
            assert!(events.contains(&MatrixEvent::AudioRouteChanged {
                output: slot,
                input: 0
            }));
        }
        assert!(events.contains(&MatrixEvent::SyncChanged {
            input: 2,
            detected: false
        }));
    }

    fn arb_kind() -> impl Strategy<Value = SignalKind> {
        prop_oneof![
            Just(SignalKind::Video),
            Just(SignalKind::Audio),
            Just(SignalKind::AudioVideo),
        ]
    }

    proptest! {
        #[test]
        fn last_report_wins(
            reports in proptest::collection::vec((0u16..6, 0u16..10, arb_kind()), 0..40)
        ) {
            let mut s = store(8, 4);
            let mut expected = BTreeMap::new();
            for &(output, input, kind) in &reports {
                s.apply_route(output, input, kind);
                if (1..=4).contains(&output) {
                    let entry = expected.entry(output).or_insert((0u16, 0u16));
                    if kind.includes_video() {
                        entry.0 = input;
                    }
                    if kind.includes_audio() {
                        entry.1 = input;
                    }
                }
            }
            prop_assert_eq!(s.outputs().count(), 4);
            for output in s.outputs() {
                let (video, audio) = expected.get(&output.slot).copied().unwrap_or((0, 0));
                prop_assert_eq!(output.video_source, video);
                prop_assert_eq!(output.audio_source, audio);
            }
        }
    }
}
