mod common;

use common::{at, FakeTransport};
use futures::StreamExt;
use tokio::sync::mpsc;

use de1_rs::protocol::{encode_sample, SHOT_SAMPLE_CHARACTERISTIC, STATE_INFO_CHARACTERISTIC};
use de1_rs::recorder::{RecorderPhase, ShotRecorder};
use de1_rs::session::{Decoded, ShotSession};
use de1_rs::storage::MemoryStore;
use de1_rs::transport::Transport;
use de1_rs::types::{MachineEvent, MachineState, NotificationKind, RawNotification, SampleRecord};

fn sample_bytes(pressure: f64, frame: u8) -> Vec<u8> {
    let sample = SampleRecord {
        sample_time_ticks: 100,
        group_pressure_bar: pressure,
        group_flow_ml_s: 2.0,
        mix_temp_c: 92.5,
        head_temp_c: 91.0,
        set_mix_temp_c: 93.0,
        set_head_temp_c: 93.0,
        set_group_pressure_bar: 9.0,
        set_group_flow_ml_s: 0.0,
        frame_number: frame,
        steam_temp_c: 140.0,
    };
    encode_sample(&sample).unwrap().to_vec()
}

fn state_bytes(state: MachineState) -> Vec<u8> {
    vec![state.code(), 0]
}

fn notification(kind: NotificationKind, value: Vec<u8>, ms: i64) -> MachineEvent {
    MachineEvent::Notification(RawNotification {
        kind,
        value,
        received_at: at(ms),
    })
}

fn state_event(state: MachineState, ms: i64) -> MachineEvent {
    notification(NotificationKind::State, state_bytes(state), ms)
}

fn sample_event(pressure: f64, ms: i64) -> MachineEvent {
    notification(NotificationKind::Sample, sample_bytes(pressure, 1), ms)
}

#[tokio::test]
async fn one_extraction_becomes_one_recording() {
    let store = MemoryStore::new();
    let mut session = ShotSession::new(ShotRecorder::new(store.clone()));
    let (tx, rx) = mpsc::channel(64);

    tx.send(MachineEvent::Connected("DE1".into())).await.unwrap();
    tx.send(state_event(MachineState::Idle, 0)).await.unwrap();
    tx.send(sample_event(0.0, 10)).await.unwrap();
    tx.send(state_event(MachineState::Espresso, 1_000)).await.unwrap();
    for i in 0..12 {
        tx.send(sample_event(i as f64 * 0.5, 1_000 + i * 250)).await.unwrap();
    }
    tx.send(state_event(MachineState::Idle, 31_000)).await.unwrap();
    drop(tx);

    let stats = session.run(rx).await;
    assert_eq!(stats.recordings, 1);
    assert_eq!(stats.samples, 13);
    assert_eq!(stats.idle_samples, 1);
    assert_eq!(stats.aborted, 0);

    let recordings = store.recordings();
    assert_eq!(recordings.len(), 1);
    let rec = &recordings[0];
    assert_eq!(rec.data_points.len(), 12);
    assert_eq!(rec.data_points[0].elapsed_ms, 0);
    assert_eq!(rec.data_points[11].elapsed_ms, 2_750);
    assert_eq!(rec.duration().unwrap().num_seconds(), 30);
    assert_eq!(rec.peak_pressure(), Some(5.5));
}

#[tokio::test]
async fn malformed_buffers_are_dropped_and_the_stream_continues() {
    let store = MemoryStore::new();
    let mut session = ShotSession::new(ShotRecorder::new(store.clone()));
    let (tx, rx) = mpsc::channel(16);

    tx.send(state_event(MachineState::Espresso, 0)).await.unwrap();
    tx.send(sample_event(3.0, 100)).await.unwrap();
    tx.send(notification(NotificationKind::Sample, vec![0u8; 18], 200))
        .await
        .unwrap();
    tx.send(notification(NotificationKind::State, vec![0x04], 300))
        .await
        .unwrap();
    tx.send(sample_event(4.0, 400)).await.unwrap();
    tx.send(state_event(MachineState::Idle, 500)).await.unwrap();
    drop(tx);

    let stats = session.run(rx).await;
    assert_eq!(stats.malformed, 2);
    assert_eq!(stats.recordings, 1);
    assert_eq!(store.recordings()[0].data_points.len(), 2);
}

#[tokio::test]
async fn disconnect_mid_shot_discards_the_recording() {
    let store = MemoryStore::new();
    let mut session = ShotSession::new(ShotRecorder::new(store.clone()));
    let (tx, rx) = mpsc::channel(16);

    tx.send(state_event(MachineState::Espresso, 0)).await.unwrap();
    tx.send(sample_event(8.0, 100)).await.unwrap();
    tx.send(MachineEvent::Disconnected).await.unwrap();
    // Anything after the disconnect is never read.
    tx.send(state_event(MachineState::Idle, 200)).await.unwrap();

    let stats = session.run(rx).await;
    assert_eq!(stats.aborted, 1);
    assert_eq!(stats.recordings, 0);
    assert!(store.is_empty());
    assert_eq!(session.recorder().phase(), RecorderPhase::Idle);
}

#[test]
fn espresso_into_steam_is_a_single_recording() {
    let store = MemoryStore::new();
    let mut session = ShotSession::new(ShotRecorder::new(store.clone()));

    session.handle(state_event(MachineState::Espresso, 0));
    session.handle(sample_event(9.0, 100));
    session.handle(state_event(MachineState::Steam, 200));
    session.handle(sample_event(1.0, 300));
    session.handle(state_event(MachineState::Sleep, 400));

    let recordings = store.recordings();
    assert_eq!(recordings.len(), 1);
    assert_eq!(recordings[0].data_points.len(), 2);
}

#[test]
fn handle_returns_decoded_records() {
    let mut session = ShotSession::new(ShotRecorder::new(MemoryStore::new()));

    match session.handle(state_event(MachineState::HotWater, 0)) {
        Some(Decoded::State(s)) => assert_eq!(s.state, MachineState::HotWater),
        other => panic!("expected state, got {other:?}"),
    }
    match session.handle(sample_event(4.0, 10)) {
        Some(Decoded::Sample(s)) => assert_eq!(s.group_pressure_bar, 4.0),
        other => panic!("expected sample, got {other:?}"),
    }
    assert!(session
        .handle(notification(NotificationKind::Sample, vec![], 20))
        .is_none());
}

#[tokio::test]
async fn subscribed_notifications_feed_the_session() {
    let transport = FakeTransport::connected();
    transport.script_notifications(
        STATE_INFO_CHARACTERISTIC,
        vec![state_bytes(MachineState::Espresso)],
    );
    transport.script_notifications(
        SHOT_SAMPLE_CHARACTERISTIC,
        vec![sample_bytes(2.0, 0), sample_bytes(6.0, 1), sample_bytes(9.0, 2)],
    );

    let states = transport
        .subscribe(STATE_INFO_CHARACTERISTIC)
        .await
        .unwrap()
        .map(|v| RawNotification::new(NotificationKind::State, v));
    let samples = transport
        .subscribe(SHOT_SAMPLE_CHARACTERISTIC)
        .await
        .unwrap()
        .map(|v| RawNotification::new(NotificationKind::Sample, v));
    let mut pump = states.chain(samples);

    let (tx, rx) = mpsc::channel(8);
    while let Some(n) = pump.next().await {
        tx.send(MachineEvent::Notification(n)).await.unwrap();
    }
    tx.send(MachineEvent::Notification(RawNotification::new(
        NotificationKind::State,
        state_bytes(MachineState::Idle),
    )))
    .await
    .unwrap();
    drop(tx);

    let store = MemoryStore::new();
    let mut session = ShotSession::new(ShotRecorder::new(store.clone()));
    let stats = session.run(rx).await;

    assert_eq!(stats.recordings, 1);
    let recordings = store.recordings();
    let rec = &recordings[0];
    let frames: Vec<u8> = rec.data_points.iter().map(|p| p.frame_number).collect();
    assert_eq!(frames, vec![0, 1, 2]);
    assert_eq!(rec.peak_pressure(), Some(9.0));
}
