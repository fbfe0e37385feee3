//! In-memory transport for driving the protocol core without a BLE stack.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use de1_rs::error::TransportError;
use de1_rs::transport::Transport;
use de1_rs::types::{ExitCondition, ExitKind, Profile, ProfileStep, Transition};

#[derive(Default)]
struct Inner {
    /// Every write attempt, including the one that failed.
    writes: Vec<(Uuid, Vec<u8>)>,
    /// 0-based write attempt that should be rejected.
    fail_at: Option<usize>,
    notifications: HashMap<Uuid, Vec<Vec<u8>>>,
}

#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
    connected: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn connected() -> Self {
        Self {
            inner: Arc::default(),
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn disconnected() -> Self {
        let t = Self::connected();
        t.set_connected(false);
        t
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
    }

    pub fn fail_write_at(&self, attempt: usize) {
        self.inner.lock().unwrap().fail_at = Some(attempt);
    }

    pub fn clear_failure(&self) {
        self.inner.lock().unwrap().fail_at = None;
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.inner.lock().unwrap().writes.clone()
    }

    /// Characteristic of each write, in wire order.
    pub fn wire_order(&self) -> Vec<Uuid> {
        self.writes().into_iter().map(|(id, _)| id).collect()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().unwrap().writes.clear();
    }

    /// Queue values to be delivered by a later `subscribe(id)`.
    pub fn script_notifications(&self, id: Uuid, values: Vec<Vec<u8>>) {
        self.inner.lock().unwrap().notifications.insert(id, values);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn write_characteristic(&self, id: Uuid, bytes: &[u8]) -> Result<(), TransportError> {
        // Give other tasks a chance to run, as a real acknowledged write does.
        tokio::task::yield_now().await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let mut inner = self.inner.lock().unwrap();
        let attempt = inner.writes.len();
        inner.writes.push((id, bytes.to_vec()));
        if inner.fail_at == Some(attempt) {
            return Err(TransportError::Write {
                characteristic: id,
                reason: "GATT error 0x0e".into(),
            });
        }
        Ok(())
    }

    async fn subscribe(&self, id: Uuid) -> Result<BoxStream<'static, Vec<u8>>, TransportError> {
        let values = self
            .inner
            .lock()
            .unwrap()
            .notifications
            .remove(&id)
            .unwrap_or_default();
        Ok(futures::stream::iter(values).boxed())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub fn step(name: &str, pressure: f64, flow: f64, exit: ExitCondition) -> ProfileStep {
    ProfileStep {
        name: name.into(),
        temperature_c: 93.0,
        pressure_bar: pressure,
        flow_ml_s: flow,
        transition: Transition::Fast,
        exit,
        limiter: None,
    }
}

/// Five-step profile used across the upload tests.
pub fn five_step_profile() -> Profile {
    let time = |s| ExitCondition {
        kind: ExitKind::Time,
        value: s,
    };
    Profile {
        id: "blooming".into(),
        name: "Blooming espresso".into(),
        target_weight_g: Some(40.0),
        target_time_s: None,
        steps: vec![
            step("fill", 0.0, 8.0, ExitCondition { kind: ExitKind::Pressure, value: 3.0 }),
            step("bloom", 0.0, 0.0, time(30.0)),
            step("ramp", 9.0, 0.0, time(4.0)),
            step("pour", 0.0, 2.2, ExitCondition { kind: ExitKind::Weight, value: 36.0 }),
            step("decline", 6.0, 0.0, time(20.0)),
        ],
    }
}

pub fn at(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap() + Duration::milliseconds(ms)
}
