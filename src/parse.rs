//! Binary decoders for DE1 BLE notification payloads and profile records.
//!
//! All public functions in this module are pure (no I/O, no shared state) and
//! are safe to call from any async or sync context.  Each decoder checks the
//! exact record length first and returns [`CodecError::Length`] on mismatch;
//! callers are expected to drop that one buffer and carry on.
//!
//! | Function | Record | Size |
//! |---|---|---|
//! | [`decode_state`] | StateInfo notification | 2 B |
//! | [`decode_sample`] | ShotSample notification | 19 B |
//! | [`decode_command`] | RequestedState write | 1 B |
//! | [`decode_profile_header`] | profile header | 6 B |
//! | [`decode_profile_frame`] | profile frame | 11 B |

use crate::error::CodecError;
use crate::protocol::{
    exit_value_field, frame_field, frame_flag, header_field, sample_field, Field,
    RequestedState, COMMAND_LEN, FRAME_LEN, HEADER_LEN, HEADER_VERSION, SAMPLE_LEN, STATE_LEN,
};
use crate::types::{
    ExitCondition, ExitKind, Limiter, MachineState, SampleRecord, StateNotification, Transition,
};

// ── Field readers ─────────────────────────────────────────────────────────────

fn check_len(record: &'static str, data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() != expected {
        return Err(CodecError::Length {
            record,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Read a big-endian unsigned integer of `field.width` bytes.
///
/// Three-byte fields combine as `(b0 << 16) | (b1 << 8) | b2`.
///
/// # Panics
/// Panics if the field extends past `data`; callers check the record length
/// first.
fn read_raw(data: &[u8], field: Field) -> u32 {
    data[field.offset..field.offset + field.width]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn read_scaled(data: &[u8], field: Field) -> f64 {
    read_raw(data, field) as f64 / field.scale
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// Decode a StateInfo notification: `[state, substate]`.
///
/// Unmapped state codes come back as [`MachineState::Unknown`].
pub fn decode_state(data: &[u8]) -> Result<StateNotification, CodecError> {
    check_len("state", data, STATE_LEN)?;
    Ok(StateNotification {
        state: MachineState::from(data[0]),
        substate: data[1],
    })
}

/// Decode a ShotSample notification into physical units.
///
/// See [`crate::protocol::sample_field`] for the layout and scale factors.
pub fn decode_sample(data: &[u8]) -> Result<SampleRecord, CodecError> {
    use sample_field::*;

    check_len("sample", data, SAMPLE_LEN)?;
    Ok(SampleRecord {
        sample_time_ticks: read_raw(data, SAMPLE_TIME) as u16,
        group_pressure_bar: read_scaled(data, GROUP_PRESSURE),
        group_flow_ml_s: read_scaled(data, GROUP_FLOW),
        mix_temp_c: read_scaled(data, MIX_TEMP),
        head_temp_c: read_scaled(data, HEAD_TEMP),
        set_mix_temp_c: read_scaled(data, SET_MIX_TEMP),
        set_head_temp_c: read_scaled(data, SET_HEAD_TEMP),
        set_group_pressure_bar: read_scaled(data, SET_GROUP_PRESSURE),
        set_group_flow_ml_s: read_scaled(data, SET_GROUP_FLOW),
        frame_number: read_raw(data, FRAME_NUMBER) as u8,
        steam_temp_c: read_scaled(data, STEAM_TEMP),
    })
}

/// Decode a command byte as written to the RequestedState characteristic.
pub fn decode_command(data: &[u8]) -> Result<RequestedState, CodecError> {
    check_len("command", data, COMMAND_LEN)?;
    RequestedState::try_from(data[0])
}

// ── Profile records ───────────────────────────────────────────────────────────

/// Wire view of a profile header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileHeader {
    pub frame_count: u8,
    pub target_weight_g: Option<f64>,
    pub target_time_s: Option<f64>,
}

/// Wire view of a profile frame.  Step names do not travel over the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileFrame {
    pub index: u8,
    pub flow_controlled: bool,
    pub transition: Transition,
    pub temperature_c: f64,
    pub pressure_bar: f64,
    pub flow_ml_s: f64,
    pub exit: ExitCondition,
    pub limiter: Option<Limiter>,
}

fn non_zero(v: f64) -> Option<f64> {
    (v != 0.0).then_some(v)
}

pub fn decode_profile_header(data: &[u8]) -> Result<ProfileHeader, CodecError> {
    use header_field::*;

    check_len("profile header", data, HEADER_LEN)?;
    let version = read_raw(data, VERSION) as u8;
    if version != HEADER_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(ProfileHeader {
        frame_count: read_raw(data, FRAME_COUNT) as u8,
        target_weight_g: non_zero(read_scaled(data, TARGET_WEIGHT)),
        target_time_s: non_zero(read_scaled(data, TARGET_TIME)),
    })
}

pub fn decode_profile_frame(data: &[u8]) -> Result<ProfileFrame, CodecError> {
    use frame_field::*;

    check_len("profile frame", data, FRAME_LEN)?;
    let flags = read_raw(data, FLAGS) as u8;
    let kind = ExitKind::try_from(read_raw(data, EXIT_KIND) as u8)?;
    let limiter = (flags & frame_flag::LIMITER != 0).then(|| Limiter {
        value: read_scaled(data, LIMITER_VALUE),
        range: read_scaled(data, LIMITER_RANGE),
    });

    Ok(ProfileFrame {
        index: read_raw(data, INDEX) as u8,
        flow_controlled: flags & frame_flag::FLOW_CONTROLLED != 0,
        transition: if flags & frame_flag::SMOOTH_TRANSITION != 0 {
            Transition::Smooth
        } else {
            Transition::Fast
        },
        temperature_c: read_scaled(data, TEMPERATURE),
        pressure_bar: read_scaled(data, PRESSURE),
        flow_ml_s: read_scaled(data, FLOW),
        exit: ExitCondition {
            kind,
            value: read_scaled(data, exit_value_field(kind)),
        },
        limiter,
    })
}
