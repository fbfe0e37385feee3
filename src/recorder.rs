//! Shot recording state machine.
//!
//! ```text
//!            active state                      inactive state
//!   Idle ─────────────────▶ Active ───────────────────────────▶ (Finalizing) ──▶ Idle
//!    ▲  samples dropped       │ samples appended                  set end time,
//!    │                        │ active→active: same recording     persist
//!    └──────── abort() ───────┘
//! ```
//!
//! Only membership in the active set ([`MachineState::is_active`]) matters:
//! Espresso → Steam with no idle in between is one continuous recording.
//! The recorder never reorders events; it relies on the transport delivering
//! each characteristic's notifications in order.

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::Storage;
use crate::types::{DataPoint, MachineState, Recording, SampleRecord, StateNotification};

/// Observable recorder state.  Finalizing is transient and never observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderPhase {
    Idle,
    Active,
}

/// Lifecycle change caused by a state notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    Started {
        id: Uuid,
        state: MachineState,
    },
    /// One active state replaced another; the recording carries on.
    Continued {
        id: Uuid,
        from: MachineState,
        to: MachineState,
    },
    Finalized {
        id: Uuid,
        duration: Duration,
        data_points: usize,
    },
}

pub struct ShotRecorder<S> {
    storage: S,
    active: Option<Recording>,
    active_state: Option<MachineState>,
    profile_id: Option<String>,
}

impl<S: Storage> ShotRecorder<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            active: None,
            active_state: None,
            profile_id: None,
        }
    }

    /// Tag subsequent recordings with the profile that was last uploaded.
    pub fn set_profile_id(&mut self, profile_id: Option<String>) {
        self.profile_id = profile_id;
    }

    pub fn phase(&self) -> RecorderPhase {
        if self.active.is_some() {
            RecorderPhase::Active
        } else {
            RecorderPhase::Idle
        }
    }

    /// The recording in progress, if any.
    pub fn current(&self) -> Option<&Recording> {
        self.active.as_ref()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Feed a state notification that arrived at `at`.
    ///
    /// A storage failure is returned after the recorder has already gone
    /// back to idle; the failed recording is not retained.
    pub fn on_state(
        &mut self,
        notification: StateNotification,
        at: DateTime<Utc>,
    ) -> Result<Option<RecorderEvent>, StorageError> {
        let state = notification.state;
        if !state.is_active() {
            self.active_state = None;
            return match self.active.take() {
                Some(recording) => self.finalize(recording, at).map(Some),
                None => Ok(None),
            };
        }

        match self.active.as_ref() {
            None => {
                let recording = Recording::start(self.profile_id.clone(), at);
                let id = recording.id;
                info!("recording {id} started ({state})");
                self.active = Some(recording);
                self.active_state = Some(state);
                Ok(Some(RecorderEvent::Started { id, state }))
            }
            Some(recording) => {
                let id = recording.id;
                let from = self.active_state.replace(state).unwrap_or(state);
                if from == state {
                    return Ok(None);
                }
                debug!("recording {id} continues: {from} → {state}");
                Ok(Some(RecorderEvent::Continued { id, from, to: state }))
            }
        }
    }

    /// Feed a sample that arrived at `at`.
    ///
    /// Returns `false` when no recording is open and the sample was dropped.
    pub fn on_sample(&mut self, sample: &SampleRecord, at: DateTime<Utc>) -> bool {
        let Some(recording) = self.active.as_mut() else {
            return false;
        };
        let elapsed_ms = (at - recording.started_at).num_milliseconds().max(0) as u64;
        recording.data_points.push(DataPoint {
            elapsed_ms,
            pressure_bar: sample.group_pressure_bar,
            flow_ml_s: sample.group_flow_ml_s,
            mix_temp_c: sample.mix_temp_c,
            head_temp_c: sample.head_temp_c,
            frame_number: sample.frame_number,
        });
        true
    }

    /// Discard the open recording without persisting it.
    ///
    /// Returns the id of the discarded recording, if there was one.
    pub fn abort(&mut self) -> Option<Uuid> {
        self.active_state = None;
        let recording = self.active.take()?;
        info!(
            "recording {} aborted after {} data points",
            recording.id,
            recording.data_points.len()
        );
        Some(recording.id)
    }

    fn finalize(
        &mut self,
        mut recording: Recording,
        at: DateTime<Utc>,
    ) -> Result<RecorderEvent, StorageError> {
        recording.ended_at = Some(at);
        let id = recording.id;
        let duration = at - recording.started_at;
        let data_points = recording.data_points.len();
        info!(
            "recording {id} finished: {:.1} s, {data_points} data points",
            duration.num_milliseconds() as f64 / 1000.0
        );
        if let Err(e) = self.storage.persist(recording) {
            error!("recording {id} could not be stored: {e}");
            return Err(e);
        }
        Ok(RecorderEvent::Finalized {
            id,
            duration,
            data_points,
        })
    }
}
