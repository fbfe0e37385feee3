//! GATT UUIDs, wire layouts, fixed-point scale table and encoders for the
//! DE1 machine protocol.
//!
//! All UUIDs live in the Bluetooth SIG base namespace
//! `0000XXXX-0000-1000-8000-00805f9b34fb` with vendor short ids `a0xx`.
//! Every multi-byte integer on the wire is big-endian.
//!
//! Decoding lives in [`crate::parse`]; both halves read their field offsets
//! and scale factors from the same [`Field`] constants so an encoder is always
//! the exact reciprocal of its decoder.

use uuid::Uuid;

use crate::error::CodecError;
use crate::types::{ExitKind, Profile, ProfileStep, SampleRecord, Transition};

// ── Service ──────────────────────────────────────────────────────────────────

/// Primary GATT service advertised by the machine.
pub const DE1_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000a000_0000_1000_8000_00805f9b34fb);

// ── Characteristics ───────────────────────────────────────────────────────────

/// Command channel.  The host writes one [`RequestedState`] byte.
pub const REQUESTED_STATE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000a002_0000_1000_8000_00805f9b34fb);

/// Telemetry channel, one 19-byte sample per notification at up to ~120 Hz.
pub const SHOT_SAMPLE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000a00d_0000_1000_8000_00805f9b34fb);

/// State channel, one 2-byte `[state, substate]` notification per change.
pub const STATE_INFO_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000a00e_0000_1000_8000_00805f9b34fb);

/// Profile header write target (one [`HEADER_LEN`]-byte record per upload).
pub const HEADER_WRITE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000a00f_0000_1000_8000_00805f9b34fb);

/// Profile frame write target (one [`FRAME_LEN`]-byte record per step).
pub const FRAME_WRITE_CHARACTERISTIC: Uuid =
    Uuid::from_u128(0x0000a010_0000_1000_8000_00805f9b34fb);

// ── Record sizes ──────────────────────────────────────────────────────────────

pub const COMMAND_LEN: usize = 1;
pub const STATE_LEN: usize = 2;
pub const SAMPLE_LEN: usize = 19;
pub const HEADER_LEN: usize = 6;
pub const FRAME_LEN: usize = 11;

/// Profile header layout version written in byte 0.
pub const HEADER_VERSION: u8 = 1;

/// Number of frame slots the machine holds.
pub const MAX_FRAMES: usize = 20;

// ── Scale table ───────────────────────────────────────────────────────────────

/// Location and fixed-point scale of one wire field.
///
/// `physical = raw / scale`, `raw = round(physical × scale)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub offset: usize,
    /// Width in bytes (1, 2 or 3).
    pub width: usize,
    pub scale: f64,
}

impl Field {
    const fn new(name: &'static str, offset: usize, width: usize, scale: f64) -> Self {
        Self {
            name,
            offset,
            width,
            scale,
        }
    }

    /// Largest raw value the field can hold.
    pub const fn max_raw(&self) -> u32 {
        (1u32 << (8 * self.width as u32)) - 1
    }

    /// Smallest representable step in physical units.
    pub fn resolution(&self) -> f64 {
        1.0 / self.scale
    }
}

/// ShotSample notification layout.
///
/// | Offset | Width | Field | Scale |
/// |---|---|---|---|
/// | 0 | 2 | sample time | raw ticks |
/// | 2 | 2 | group pressure | ÷ 4096 → bar |
/// | 4 | 2 | group flow | ÷ 4096 → ml/s |
/// | 6 | 2 | mix temp | ÷ 256 → °C |
/// | 8 | 3 | head temp | ÷ 256 → °C |
/// | 11 | 2 | set mix temp | ÷ 256 → °C |
/// | 13 | 2 | set head temp | ÷ 256 → °C |
/// | 15 | 1 | set group pressure | ÷ 16 → bar |
/// | 16 | 1 | set group flow | ÷ 16 → ml/s |
/// | 17 | 1 | frame number | raw |
/// | 18 | 1 | steam temp | raw °C |
///
/// With the `head-temp-u16` feature the head temperature is read from a
/// 16-bit field at offset 8 instead (byte 10 is then ignored).
pub mod sample_field {
    use super::Field;

    pub const SAMPLE_TIME: Field = Field::new("sample_time", 0, 2, 1.0);
    pub const GROUP_PRESSURE: Field = Field::new("group_pressure", 2, 2, 4096.0);
    pub const GROUP_FLOW: Field = Field::new("group_flow", 4, 2, 4096.0);
    pub const MIX_TEMP: Field = Field::new("mix_temp", 6, 2, 256.0);
    #[cfg(not(feature = "head-temp-u16"))]
    pub const HEAD_TEMP: Field = Field::new("head_temp", 8, 3, 256.0);
    #[cfg(feature = "head-temp-u16")]
    pub const HEAD_TEMP: Field = Field::new("head_temp", 8, 2, 256.0);
    pub const SET_MIX_TEMP: Field = Field::new("set_mix_temp", 11, 2, 256.0);
    pub const SET_HEAD_TEMP: Field = Field::new("set_head_temp", 13, 2, 256.0);
    pub const SET_GROUP_PRESSURE: Field = Field::new("set_group_pressure", 15, 1, 16.0);
    pub const SET_GROUP_FLOW: Field = Field::new("set_group_flow", 16, 1, 16.0);
    pub const FRAME_NUMBER: Field = Field::new("frame_number", 17, 1, 1.0);
    pub const STEAM_TEMP: Field = Field::new("steam_temp", 18, 1, 1.0);
}

/// Profile header layout.
pub mod header_field {
    use super::Field;

    pub const VERSION: Field = Field::new("version", 0, 1, 1.0);
    pub const FRAME_COUNT: Field = Field::new("frame_count", 1, 1, 1.0);
    pub const TARGET_WEIGHT: Field = Field::new("target_weight", 2, 2, 16.0);
    pub const TARGET_TIME: Field = Field::new("target_time", 4, 2, 16.0);
}

/// Profile frame layout.
///
/// Pressure and flow targets use the same one-byte ÷16 field as the
/// `set_group_*` read-back in a sample; pressure/flow exit thresholds use the
/// same two-byte ÷4096 field as the measured `group_*` values.
pub mod frame_field {
    use super::Field;

    pub const INDEX: Field = Field::new("index", 0, 1, 1.0);
    pub const FLAGS: Field = Field::new("flags", 1, 1, 1.0);
    pub const TEMPERATURE: Field = Field::new("temperature", 2, 2, 256.0);
    pub const PRESSURE: Field = Field::new("pressure", 4, 1, 16.0);
    pub const FLOW: Field = Field::new("flow", 5, 1, 16.0);
    pub const EXIT_KIND: Field = Field::new("exit_kind", 6, 1, 1.0);
    pub const EXIT_PRESSURE_FLOW: Field = Field::new("exit_value", 7, 2, 4096.0);
    pub const EXIT_TIME_WEIGHT: Field = Field::new("exit_value", 7, 2, 16.0);
    pub const LIMITER_VALUE: Field = Field::new("limiter_value", 9, 1, 16.0);
    pub const LIMITER_RANGE: Field = Field::new("limiter_range", 10, 1, 16.0);
}

/// Bits of [`frame_field::FLAGS`].
pub mod frame_flag {
    pub const FLOW_CONTROLLED: u8 = 0x01;
    pub const SMOOTH_TRANSITION: u8 = 0x02;
    pub const LIMITER: u8 = 0x04;
}

/// Scale field used for an exit threshold of the given kind.
pub fn exit_value_field(kind: ExitKind) -> Field {
    match kind {
        ExitKind::Pressure | ExitKind::Flow => frame_field::EXIT_PRESSURE_FLOW,
        ExitKind::Time | ExitKind::Weight => frame_field::EXIT_TIME_WEIGHT,
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// State the host asks the machine to enter; the single byte written to
/// [`REQUESTED_STATE_CHARACTERISTIC`].
///
/// Codes are one-to-one with [`crate::types::MachineState`]
/// (`Sleep = 0x00` … `SchedIdle = 0x15`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestedState {
    Sleep = 0x00,
    GoingToSleep = 0x01,
    Idle = 0x02,
    Busy = 0x03,
    Espresso = 0x04,
    Steam = 0x05,
    HotWater = 0x06,
    ShortCal = 0x07,
    SelfTest = 0x08,
    LongCal = 0x09,
    Descale = 0x0A,
    FatalError = 0x0B,
    Init = 0x0C,
    NoRequest = 0x0D,
    SkipToNext = 0x0E,
    HotWaterRinse = 0x0F,
    SteamRinse = 0x10,
    Refill = 0x11,
    Clean = 0x12,
    InBootLoader = 0x13,
    AirPurge = 0x14,
    SchedIdle = 0x15,
}

impl RequestedState {
    /// Every command in code order.
    pub const ALL: [RequestedState; 22] = [
        Self::Sleep,
        Self::GoingToSleep,
        Self::Idle,
        Self::Busy,
        Self::Espresso,
        Self::Steam,
        Self::HotWater,
        Self::ShortCal,
        Self::SelfTest,
        Self::LongCal,
        Self::Descale,
        Self::FatalError,
        Self::Init,
        Self::NoRequest,
        Self::SkipToNext,
        Self::HotWaterRinse,
        Self::SteamRinse,
        Self::Refill,
        Self::Clean,
        Self::InBootLoader,
        Self::AirPurge,
        Self::SchedIdle,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RequestedState {
    type Error = CodecError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(code as usize)
            .copied()
            .ok_or(CodecError::UnknownCommand(code))
    }
}

/// Encode a command for the RequestedState characteristic.
///
/// ```
/// # use de1_rs::protocol::{encode_command, RequestedState};
/// assert_eq!(encode_command(RequestedState::Espresso), [0x04]);
/// ```
pub fn encode_command(cmd: RequestedState) -> [u8; COMMAND_LEN] {
    [cmd.code()]
}

// ── Fixed-point helpers ───────────────────────────────────────────────────────

/// Convert a physical value to the raw integer for `field`.
///
/// Fails with [`CodecError::OutOfRange`] for negative, non-finite or
/// too-large values; nothing is clamped.
fn to_raw(field: Field, value: f64) -> Result<u32, CodecError> {
    let raw = (value * field.scale).round();
    if !raw.is_finite() || raw < 0.0 || raw > field.max_raw() as f64 {
        return Err(CodecError::OutOfRange {
            field: field.name,
            value,
        });
    }
    Ok(raw as u32)
}

fn put(buf: &mut [u8], field: Field, raw: u32) {
    let be = raw.to_be_bytes();
    buf[field.offset..field.offset + field.width].copy_from_slice(&be[4 - field.width..]);
}

fn put_scaled(buf: &mut [u8], field: Field, value: f64) -> Result<(), CodecError> {
    put(buf, field, to_raw(field, value)?);
    Ok(())
}

// ── Encoders ──────────────────────────────────────────────────────────────────

/// Encode a sample exactly as the machine would send it.
///
/// Inverse of [`crate::parse::decode_sample`]; used by simulators and tests.
pub fn encode_sample(s: &SampleRecord) -> Result<[u8; SAMPLE_LEN], CodecError> {
    use sample_field::*;

    let mut buf = [0u8; SAMPLE_LEN];
    put(&mut buf, SAMPLE_TIME, s.sample_time_ticks as u32);
    put_scaled(&mut buf, GROUP_PRESSURE, s.group_pressure_bar)?;
    put_scaled(&mut buf, GROUP_FLOW, s.group_flow_ml_s)?;
    put_scaled(&mut buf, MIX_TEMP, s.mix_temp_c)?;
    put_scaled(&mut buf, HEAD_TEMP, s.head_temp_c)?;
    put_scaled(&mut buf, SET_MIX_TEMP, s.set_mix_temp_c)?;
    put_scaled(&mut buf, SET_HEAD_TEMP, s.set_head_temp_c)?;
    put_scaled(&mut buf, SET_GROUP_PRESSURE, s.set_group_pressure_bar)?;
    put_scaled(&mut buf, SET_GROUP_FLOW, s.set_group_flow_ml_s)?;
    put(&mut buf, FRAME_NUMBER, s.frame_number as u32);
    put_scaled(&mut buf, STEAM_TEMP, s.steam_temp_c)?;
    Ok(buf)
}

/// Encode the profile header record.
///
/// Wire layout ([`HEADER_LEN`] bytes):
/// ```text
/// byte 0     : layout version (= 1)
/// byte 1     : number of frames that follow
/// bytes 2..4 : target weight, u16 × 16 (g; 0 = none)
/// bytes 4..6 : target time,   u16 × 16 (s; 0 = none)
/// ```
pub fn encode_profile_header(profile: &Profile) -> Result<[u8; HEADER_LEN], CodecError> {
    use header_field::*;

    let frame_count = u8::try_from(profile.steps.len()).map_err(|_| CodecError::OutOfRange {
        field: FRAME_COUNT.name,
        value: profile.steps.len() as f64,
    })?;

    let mut buf = [0u8; HEADER_LEN];
    put(&mut buf, VERSION, HEADER_VERSION as u32);
    put(&mut buf, FRAME_COUNT, frame_count as u32);
    put_scaled(&mut buf, TARGET_WEIGHT, profile.target_weight_g.unwrap_or(0.0))?;
    put_scaled(&mut buf, TARGET_TIME, profile.target_time_s.unwrap_or(0.0))?;
    Ok(buf)
}

/// Encode one profile step as frame number `index`.
///
/// Wire layout ([`FRAME_LEN`] bytes):
/// ```text
/// byte 0     : frame index
/// byte 1     : flags (bit0 flow-controlled, bit1 smooth, bit2 limiter)
/// bytes 2..4 : temperature, u16 × 256 (°C)
/// byte 4     : pressure target, u8 × 16 (bar)
/// byte 5     : flow target, u8 × 16 (ml/s)
/// byte 6     : exit kind (0 time, 1 pressure, 2 flow, 3 weight)
/// bytes 7..9 : exit value, u16 × 4096 (pressure/flow) or × 16 (time/weight)
/// byte 9     : limiter value, u8 × 16
/// byte 10    : limiter range, u8 × 16
/// ```
pub fn encode_profile_frame(step: &ProfileStep, index: usize) -> Result<[u8; FRAME_LEN], CodecError> {
    use frame_field::*;

    let index = u8::try_from(index).map_err(|_| CodecError::OutOfRange {
        field: INDEX.name,
        value: index as f64,
    })?;

    let mut flags = 0u8;
    if step.is_flow_controlled() {
        flags |= frame_flag::FLOW_CONTROLLED;
    }
    if step.transition == Transition::Smooth {
        flags |= frame_flag::SMOOTH_TRANSITION;
    }
    if step.limiter.is_some() {
        flags |= frame_flag::LIMITER;
    }

    let mut buf = [0u8; FRAME_LEN];
    put(&mut buf, INDEX, index as u32);
    put(&mut buf, FLAGS, flags as u32);
    put_scaled(&mut buf, TEMPERATURE, step.temperature_c)?;
    put_scaled(&mut buf, PRESSURE, step.pressure_bar)?;
    put_scaled(&mut buf, FLOW, step.flow_ml_s)?;
    put(&mut buf, EXIT_KIND, step.exit.kind.code() as u32);
    put_scaled(&mut buf, exit_value_field(step.exit.kind), step.exit.value)?;
    if let Some(limiter) = step.limiter {
        put_scaled(&mut buf, LIMITER_VALUE, limiter.value)?;
        put_scaled(&mut buf, LIMITER_RANGE, limiter.range)?;
    }
    Ok(buf)
}
