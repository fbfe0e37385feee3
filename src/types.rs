use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CodecError;

// ── Machine state ────────────────────────────────────────────────────────────

/// Operating state reported by the machine on the StateInfo characteristic.
///
/// The firmware tags each state with a single byte.  Codes this crate does not
/// know about decode to [`MachineState::Unknown`] carrying the raw byte, so a
/// newer firmware never turns a state notification into a decode failure.
///
/// | Code | State | Code | State |
/// |---|---|---|---|
/// | 0x00 | Sleep | 0x0B | FatalError |
/// | 0x01 | GoingToSleep | 0x0C | Init |
/// | 0x02 | Idle | 0x0D | NoRequest |
/// | 0x03 | Busy | 0x0E | SkipToNext |
/// | 0x04 | Espresso | 0x0F | HotWaterRinse |
/// | 0x05 | Steam | 0x10 | SteamRinse |
/// | 0x06 | HotWater | 0x11 | Refill |
/// | 0x07 | ShortCal | 0x12 | Clean |
/// | 0x08 | SelfTest | 0x13 | InBootLoader |
/// | 0x09 | LongCal | 0x14 | AirPurge |
/// | 0x0A | Descale | 0x15 | SchedIdle |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Sleep,
    GoingToSleep,
    Idle,
    Busy,
    Espresso,
    Steam,
    HotWater,
    ShortCal,
    SelfTest,
    LongCal,
    Descale,
    FatalError,
    Init,
    NoRequest,
    SkipToNext,
    HotWaterRinse,
    SteamRinse,
    Refill,
    Clean,
    InBootLoader,
    AirPurge,
    SchedIdle,
    /// A state code outside the known table, preserved verbatim.
    Unknown(u8),
}

impl MachineState {
    /// Wire code for this state.
    pub fn code(self) -> u8 {
        match self {
            Self::Sleep => 0x00,
            Self::GoingToSleep => 0x01,
            Self::Idle => 0x02,
            Self::Busy => 0x03,
            Self::Espresso => 0x04,
            Self::Steam => 0x05,
            Self::HotWater => 0x06,
            Self::ShortCal => 0x07,
            Self::SelfTest => 0x08,
            Self::LongCal => 0x09,
            Self::Descale => 0x0A,
            Self::FatalError => 0x0B,
            Self::Init => 0x0C,
            Self::NoRequest => 0x0D,
            Self::SkipToNext => 0x0E,
            Self::HotWaterRinse => 0x0F,
            Self::SteamRinse => 0x10,
            Self::Refill => 0x11,
            Self::Clean => 0x12,
            Self::InBootLoader => 0x13,
            Self::AirPurge => 0x14,
            Self::SchedIdle => 0x15,
            Self::Unknown(code) => code,
        }
    }

    /// `true` while the machine is dispensing: Espresso, Steam, HotWater or
    /// HotWaterRinse.
    ///
    /// Membership in this set, not the specific variant, drives the
    /// recording lifecycle in [`crate::recorder::ShotRecorder`].
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Espresso | Self::Steam | Self::HotWater | Self::HotWaterRinse
        )
    }
}

impl From<u8> for MachineState {
    fn from(code: u8) -> Self {
        match code {
            0x00 => Self::Sleep,
            0x01 => Self::GoingToSleep,
            0x02 => Self::Idle,
            0x03 => Self::Busy,
            0x04 => Self::Espresso,
            0x05 => Self::Steam,
            0x06 => Self::HotWater,
            0x07 => Self::ShortCal,
            0x08 => Self::SelfTest,
            0x09 => Self::LongCal,
            0x0A => Self::Descale,
            0x0B => Self::FatalError,
            0x0C => Self::Init,
            0x0D => Self::NoRequest,
            0x0E => Self::SkipToNext,
            0x0F => Self::HotWaterRinse,
            0x10 => Self::SteamRinse,
            0x11 => Self::Refill,
            0x12 => Self::Clean,
            0x13 => Self::InBootLoader,
            0x14 => Self::AirPurge,
            0x15 => Self::SchedIdle,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(code) => write!(f, "Unknown(0x{code:02x})"),
            known => write!(f, "{known:?}"),
        }
    }
}

/// A decoded StateInfo notification (2 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateNotification {
    pub state: MachineState,
    /// Firmware substate (heating, preinfusion, pouring, …), kept raw.
    pub substate: u8,
}

// ── Telemetry ─────────────────────────────────────────────────────────────────

/// One ShotSample telemetry notification (19 bytes on the wire).
///
/// Emitted at up to ~120 Hz while the machine is active.  All values are
/// already scaled to physical units; see [`crate::parse::decode_sample`]
/// for the fixed-point layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRecord {
    /// Free-running machine clock in raw ticks.
    pub sample_time_ticks: u16,
    /// Pressure at the group head in bar.
    pub group_pressure_bar: f64,
    /// Flow through the group head in ml/s.
    pub group_flow_ml_s: f64,
    /// Water mix temperature in °C.
    pub mix_temp_c: f64,
    /// Group head temperature in °C.
    pub head_temp_c: f64,
    /// Mix temperature target in °C.
    pub set_mix_temp_c: f64,
    /// Head temperature target in °C.
    pub set_head_temp_c: f64,
    /// Pressure target in bar.
    pub set_group_pressure_bar: f64,
    /// Flow target in ml/s.
    pub set_group_flow_ml_s: f64,
    /// Index of the profile frame currently executing.
    pub frame_number: u8,
    /// Steam heater temperature in whole °C.
    pub steam_temp_c: f64,
}

// ── Profiles ──────────────────────────────────────────────────────────────────

/// How the machine moves from the previous step's targets to this step's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Fast,
    Smooth,
}

/// Measured quantity an [`ExitCondition`] watches.  The discriminant is
/// the frame's exit-kind byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Seconds elapsed in the step.
    Time = 0,
    /// Group pressure in bar.
    Pressure = 1,
    /// Group flow in ml/s.
    Flow = 2,
    /// Beverage weight in grams.
    Weight = 3,
}

impl ExitKind {
    /// Every kind in code order.
    pub const ALL: [ExitKind; 4] = [Self::Time, Self::Pressure, Self::Flow, Self::Weight];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ExitKind {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(CodecError::UnknownExitKind(code))
    }
}

/// Terminates a step when the named quantity crosses `value`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitCondition {
    pub kind: ExitKind,
    pub value: f64,
}

/// Caps the non-controlling quantity of a step: a pressure-controlled step
/// limits flow and vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limiter {
    pub value: f64,
    pub range: f64,
}

/// One phase of a brewing profile.
///
/// By convention exactly one of `pressure_bar` / `flow_ml_s` is the target
/// and the other is zero.  Both being non-zero is representable and is
/// written to the wire verbatim; the firmware's resolution of that case is
/// not known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileStep {
    pub name: String,
    pub temperature_c: f64,
    #[serde(default)]
    pub pressure_bar: f64,
    #[serde(default)]
    pub flow_ml_s: f64,
    #[serde(default)]
    pub transition: Transition,
    pub exit: ExitCondition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limiter: Option<Limiter>,
}

impl ProfileStep {
    /// `true` when the step targets flow rather than pressure.
    pub fn is_flow_controlled(&self) -> bool {
        self.flow_ml_s > 0.0 && self.pressure_bar == 0.0
    }
}

/// A brewing profile (recipe).
///
/// Only `steps`, `target_weight_g` and `target_time_s` reach the wire; the
/// identity fields belong to the application and are carried through to
/// recordings as `profile_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_weight_g: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_time_s: Option<f64>,
    pub steps: Vec<ProfileStep>,
}

// ── Recordings ────────────────────────────────────────────────────────────────

/// One point of a recorded extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Milliseconds since the recording started (arrival time based).
    pub elapsed_ms: u64,
    pub pressure_bar: f64,
    pub flow_ml_s: f64,
    pub mix_temp_c: f64,
    pub head_temp_c: f64,
    pub frame_number: u8,
}

/// A shot recording.
///
/// Built by [`crate::recorder::ShotRecorder`] while the machine is active;
/// `ended_at` stays `None` until the recording is finalized, after which the
/// value is handed to a [`crate::storage::Storage`] and never mutated again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub data_points: Vec<DataPoint>,
}

impl Recording {
    pub(crate) fn start(profile_id: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            profile_id,
            started_at: at,
            ended_at: None,
            data_points: Vec::new(),
        }
    }

    /// Wall-clock span between the start and end transitions.
    ///
    /// `None` while the recording is still open.
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Highest group pressure seen, or `None` for an empty recording.
    pub fn peak_pressure(&self) -> Option<f64> {
        self.data_points
            .iter()
            .map(|p| p.pressure_bar)
            .fold(None, |acc, p| Some(acc.map_or(p, |a: f64| a.max(p))))
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// Characteristic a raw notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    State,
    Sample,
}

/// Undecoded notification bytes plus their arrival time.
///
/// Decoding happens on the consumer side (see [`crate::session::ShotSession`])
/// so test harnesses can inject arbitrary byte buffers into the channel.
#[derive(Debug, Clone)]
pub struct RawNotification {
    pub kind: NotificationKind,
    pub value: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

impl RawNotification {
    pub fn new(kind: NotificationKind, value: Vec<u8>) -> Self {
        Self {
            kind,
            value,
            received_at: Utc::now(),
        }
    }
}

/// Everything delivered through the event channel returned by
/// [`crate::client::De1Client::connect`].
#[derive(Debug, Clone)]
pub enum MachineEvent {
    /// The link is up; carries the advertised device name.
    Connected(String),
    /// A StateInfo or ShotSample notification, not yet decoded.
    Notification(RawNotification),
    /// The link dropped.  No further events follow.
    Disconnected,
}
