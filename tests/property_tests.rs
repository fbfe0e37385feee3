//! Property tests for the wire codec and the recorder state machine.

mod common;

use common::at;
use proptest::prelude::*;

use de1_rs::error::CodecError;
use de1_rs::parse::{decode_profile_frame, decode_sample, decode_state};
use de1_rs::protocol::{encode_profile_frame, encode_sample, SAMPLE_LEN, STATE_LEN};
use de1_rs::recorder::{RecorderPhase, ShotRecorder};
use de1_rs::storage::MemoryStore;
use de1_rs::types::{
    ExitCondition, ExitKind, Limiter, MachineState, ProfileStep, StateNotification, Transition,
};

// ── Telemetry decoding ──────────────────────────────────────────────────────

proptest! {
    /// Every 19-byte buffer is a valid sample, with fixed-point ranges
    /// bounding the decoded values.
    #[test]
    fn any_sample_buffer_decodes(
        bytes in proptest::collection::vec(any::<u8>(), SAMPLE_LEN),
    ) {
        let s = decode_sample(&bytes).unwrap();
        prop_assert!((0.0..16.0).contains(&s.group_pressure_bar));
        prop_assert!((0.0..16.0).contains(&s.group_flow_ml_s));
        prop_assert!((0.0..256.0).contains(&s.mix_temp_c));
        prop_assert!((0.0..16.0).contains(&s.set_group_pressure_bar));
        prop_assert_eq!(s.frame_number, bytes[17]);
    }

    #[test]
    fn wrong_sample_length_is_a_length_error(
        bytes in proptest::collection::vec(any::<u8>(), 0..64),
    ) {
        prop_assume!(bytes.len() != SAMPLE_LEN);
        let expected = Err(CodecError::Length {
            record: "sample",
            expected: SAMPLE_LEN,
            actual: bytes.len(),
        });
        prop_assert_eq!(decode_sample(&bytes), expected);
    }

    #[test]
    fn wrong_state_length_is_a_length_error(
        bytes in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        prop_assume!(bytes.len() != STATE_LEN);
        prop_assert!(
            matches!(decode_state(&bytes), Err(CodecError::Length { .. })),
            "{} bytes must not decode",
            bytes.len()
        );
    }

    #[test]
    fn any_state_pair_decodes(state in any::<u8>(), substate in any::<u8>()) {
        let n = decode_state(&[state, substate]).unwrap();
        prop_assert_eq!(n.state.code(), state);
        prop_assert_eq!(n.substate, substate);
    }
}

#[cfg(not(feature = "head-temp-u16"))]
proptest! {
    /// Decoded values sit exactly on the fixed-point grid, so re-encoding
    /// reproduces the original bytes.
    #[test]
    fn sample_reencodes_bit_exact(
        bytes in proptest::collection::vec(any::<u8>(), SAMPLE_LEN),
    ) {
        let s = decode_sample(&bytes).unwrap();
        prop_assert_eq!(encode_sample(&s).unwrap().to_vec(), bytes);
    }
}

// ── Profile frames ────────────────────────────────────────────────────────────

fn arb_exit() -> impl Strategy<Value = ExitCondition> {
    prop_oneof![
        (0.0f64..4000.0).prop_map(|value| ExitCondition { kind: ExitKind::Time, value }),
        (0.0f64..4000.0).prop_map(|value| ExitCondition { kind: ExitKind::Weight, value }),
        (0.0f64..15.9).prop_map(|value| ExitCondition { kind: ExitKind::Pressure, value }),
        (0.0f64..15.9).prop_map(|value| ExitCondition { kind: ExitKind::Flow, value }),
    ]
}

fn arb_step() -> impl Strategy<Value = ProfileStep> {
    (
        0.0f64..105.0,
        0.0f64..15.9,
        0.0f64..15.9,
        any::<bool>(),
        arb_exit(),
        proptest::option::of((0.0f64..15.9, 0.0f64..15.9)),
    )
        .prop_map(|(temperature_c, pressure_bar, flow_ml_s, smooth, exit, limiter)| ProfileStep {
            name: "step".into(),
            temperature_c,
            pressure_bar,
            flow_ml_s,
            transition: if smooth { Transition::Smooth } else { Transition::Fast },
            exit,
            limiter: limiter.map(|(value, range)| Limiter { value, range }),
        })
}

proptest! {
    /// In-range steps survive the wire within half a quantisation step.
    #[test]
    fn frame_read_back_within_resolution(step in arb_step(), index in 0usize..20) {
        let bytes = encode_profile_frame(&step, index).unwrap();
        let frame = decode_profile_frame(&bytes).unwrap();

        prop_assert_eq!(frame.index as usize, index);
        prop_assert_eq!(frame.transition, step.transition);
        prop_assert_eq!(frame.exit.kind, step.exit.kind);
        prop_assert!((frame.temperature_c - step.temperature_c).abs() <= 0.5 / 256.0);
        prop_assert!((frame.pressure_bar - step.pressure_bar).abs() <= 0.5 / 16.0);
        prop_assert!((frame.flow_ml_s - step.flow_ml_s).abs() <= 0.5 / 16.0);
        prop_assert_eq!(frame.limiter.is_some(), step.limiter.is_some());

        let exit_resolution = match step.exit.kind {
            ExitKind::Pressure | ExitKind::Flow => 1.0 / 4096.0,
            ExitKind::Time | ExitKind::Weight => 1.0 / 16.0,
        };
        prop_assert!((frame.exit.value - step.exit.value).abs() <= exit_resolution / 2.0);
    }
}

// ── Recorder state machine ──────────────────────────────────────────────────

proptest! {
    /// For any sequence of state codes, one recording is stored per
    /// active → inactive edge, and the recorder is open exactly when the
    /// last state was active.
    #[test]
    fn one_recording_per_completed_active_run(
        codes in proptest::collection::vec(0u8..=0x18, 0..64),
    ) {
        let store = MemoryStore::new();
        let mut recorder = ShotRecorder::new(store.clone());
        let mut was_active = false;
        let mut expected = 0usize;

        for (i, code) in codes.iter().enumerate() {
            let state = MachineState::from(*code);
            if was_active && !state.is_active() {
                expected += 1;
            }
            was_active = state.is_active();
            recorder
                .on_state(StateNotification { state, substate: 0 }, at(i as i64 * 100))
                .unwrap();
        }

        prop_assert_eq!(store.len(), expected);
        let phase = if was_active { RecorderPhase::Active } else { RecorderPhase::Idle };
        prop_assert_eq!(recorder.phase(), phase);
        prop_assert!(store.recordings().iter().all(|r| r.is_finalized()));
    }
}
