//! Single consumer of the notification channel: raw bytes → codec → recorder.
//!
//! Notifications are handled one at a time, in channel order, and nothing in
//! here awaits between decoding an event and applying it to the recorder.
//! A malformed buffer is logged and dropped; the stream carries on.

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::parse::{decode_sample, decode_state};
use crate::recorder::{RecorderEvent, ShotRecorder};
use crate::storage::Storage;
use crate::types::{
    MachineEvent, NotificationKind, RawNotification, SampleRecord, StateNotification,
};

/// A successfully decoded notification, returned for display purposes.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    State(StateNotification),
    Sample(SampleRecord),
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub states: u64,
    pub samples: u64,
    /// Notifications dropped because they failed to decode.
    pub malformed: u64,
    /// Samples that decoded but arrived with no recording open.
    pub idle_samples: u64,
    pub recordings: u64,
    pub aborted: u64,
    pub storage_failures: u64,
}

pub struct ShotSession<S> {
    recorder: ShotRecorder<S>,
    stats: SessionStats,
}

impl<S: Storage> ShotSession<S> {
    pub fn new(recorder: ShotRecorder<S>) -> Self {
        Self {
            recorder,
            stats: SessionStats::default(),
        }
    }

    pub fn recorder(&self) -> &ShotRecorder<S> {
        &self.recorder
    }

    pub fn recorder_mut(&mut self) -> &mut ShotRecorder<S> {
        &mut self.recorder
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Apply one event.  Returns the decoded record, if the event was a
    /// well-formed notification.
    pub fn handle(&mut self, event: MachineEvent) -> Option<Decoded> {
        match event {
            MachineEvent::Connected(name) => {
                info!("session: connected to {name}");
                None
            }
            MachineEvent::Disconnected => {
                self.abort("disconnected");
                None
            }
            MachineEvent::Notification(n) => self.handle_notification(n),
        }
    }

    /// Drop any open recording without storing it.
    pub fn abort(&mut self, reason: &str) {
        if let Some(id) = self.recorder.abort() {
            warn!("session: recording {id} abandoned ({reason})");
            self.stats.aborted += 1;
        }
    }

    fn handle_notification(&mut self, n: RawNotification) -> Option<Decoded> {
        match n.kind {
            NotificationKind::State => {
                let notification = match decode_state(&n.value) {
                    Ok(s) => s,
                    Err(e) => {
                        self.stats.malformed += 1;
                        warn!("session: dropping state notification {:02x?}: {e}", n.value);
                        return None;
                    }
                };
                self.stats.states += 1;
                debug!(
                    "state {} substate {}",
                    notification.state, notification.substate
                );
                match self.recorder.on_state(notification, n.received_at) {
                    Ok(Some(RecorderEvent::Finalized { .. })) => self.stats.recordings += 1,
                    Ok(_) => {}
                    Err(_) => self.stats.storage_failures += 1,
                }
                Some(Decoded::State(notification))
            }
            NotificationKind::Sample => {
                let sample = match decode_sample(&n.value) {
                    Ok(s) => s,
                    Err(e) => {
                        self.stats.malformed += 1;
                        warn!("session: dropping sample {:02x?}: {e}", n.value);
                        return None;
                    }
                };
                self.stats.samples += 1;
                if !self.recorder.on_sample(&sample, n.received_at) {
                    self.stats.idle_samples += 1;
                }
                if self.stats.samples <= 3 || self.stats.samples % 500 == 0 {
                    debug!(
                        "sample #{}: {:.2} bar {:.2} ml/s frame {}",
                        self.stats.samples,
                        sample.group_pressure_bar,
                        sample.group_flow_ml_s,
                        sample.frame_number
                    );
                }
                Some(Decoded::Sample(sample))
            }
        }
    }

    /// Consume `rx` until the link drops or every sender is gone.
    ///
    /// An open recording is abandoned in both cases.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<MachineEvent>) -> SessionStats {
        while let Some(event) = rx.recv().await {
            let disconnected = matches!(event, MachineEvent::Disconnected);
            self.handle(event);
            if disconnected {
                break;
            }
        }
        self.abort("event stream closed");
        info!("session finished: {:?}", self.stats);
        self.stats
    }
}
