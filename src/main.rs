use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};

use de1_rs::client::{De1Client, De1ClientConfig};
use de1_rs::dispatcher::MachineCommand;
use de1_rs::recorder::{RecorderPhase, ShotRecorder};
use de1_rs::session::{Decoded, ShotSession};
use de1_rs::storage::JsonDirStore;
use de1_rs::types::{MachineEvent, Profile};

fn load_profile(path: &str) -> Result<Profile> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&text).with_context(|| format!("parsing profile {path}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG=de1_rs=debug for per-notification detail.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let shots_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("shots"));
    let store = JsonDirStore::open(&shots_dir)
        .with_context(|| format!("opening shot directory {}", shots_dir.display()))?;

    // ── Connect ───────────────────────────────────────────────────────────────
    let client = De1Client::new(De1ClientConfig::default());
    info!("Connecting to DE1 …");
    let (mut rx, handle) = client.connect().await?;
    let handle = Arc::new(handle);

    info!("Recording shots into {}", shots_dir.display());
    info!("Commands (type + Enter):");
    info!("  e  – espresso      s  – steam       w  – hot water");
    info!("  f  – flush         x  – stop        z  – sleep");
    info!("  u <profile.json>   – upload profile");
    info!("  q  – quit\n");

    // ── Stdin command loop ────────────────────────────────────────────────────
    // Lines are read on a dedicated OS thread (StdinLock is not Send) and
    // relayed to an async task.
    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if line_tx.send(l.trim().to_owned()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    // Profile ids of successful uploads, so new recordings are tagged.
    let (profile_tx, mut profile_rx) = tokio::sync::mpsc::unbounded_channel::<String>();

    let handle_cmd = Arc::clone(&handle);
    tokio::spawn(async move {
        while let Some(line) = line_rx.recv().await {
            let cmd = match line.as_str() {
                "" => continue,
                "q" => {
                    info!("Quit requested.");
                    handle_cmd.disconnect().await.ok();
                    std::process::exit(0);
                }
                "e" => MachineCommand::StartEspresso,
                "s" => MachineCommand::StartSteam,
                "w" => MachineCommand::StartHotWater,
                "f" => MachineCommand::StartFlush,
                "x" | "i" => MachineCommand::Stop,
                "z" => MachineCommand::Sleep,
                other => {
                    if let Some(path) = other.strip_prefix("u ") {
                        match load_profile(path.trim()) {
                            Ok(profile) => match handle_cmd.upload_profile(&profile).await {
                                Ok(()) => {
                                    let _ = profile_tx.send(profile.id.clone());
                                }
                                Err(e) => error!("Upload error: {e}"),
                            },
                            Err(e) => error!("{e:#}"),
                        }
                    } else {
                        error!("Unknown command: '{other}'");
                    }
                    continue;
                }
            };
            if let Err(e) = handle_cmd.send(cmd).await {
                error!("Command error: {e}");
            }
        }
    });

    // ── Main event loop ───────────────────────────────────────────────────────
    let mut session = ShotSession::new(ShotRecorder::new(store));
    loop {
        tokio::select! {
            Some(id) = profile_rx.recv() => {
                session.recorder_mut().set_profile_id(Some(id));
            }
            event = rx.recv() => {
                let Some(event) = event else { break };
                let disconnected = matches!(event, MachineEvent::Disconnected);
                match session.handle(event) {
                    Some(Decoded::State(s)) => {
                        println!("[STATE] {} (substate {})", s.state, s.substate);
                    }
                    Some(Decoded::Sample(s)) if session.recorder().phase() == RecorderPhase::Active => {
                        println!(
                            "[SHOT] frame={:2}  {:5.2} bar  {:5.2} ml/s  mix={:5.1}°C  head={:5.1}°C",
                            s.frame_number,
                            s.group_pressure_bar,
                            s.group_flow_ml_s,
                            s.mix_temp_c,
                            s.head_temp_c
                        );
                    }
                    _ => {}
                }
                if disconnected {
                    info!("Disconnected from device.");
                    break;
                }
            }
        }
    }

    session.abort("exiting");
    info!("Event loop finished: {:?}", session.stats());
    Ok(())
}
