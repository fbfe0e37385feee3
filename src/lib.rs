//! # de1-rs
//!
//! Async Rust client for [Decent](https://decentespresso.com/) DE1 espresso
//! machines over Bluetooth Low Energy: the binary command/telemetry codec,
//! profile upload and shot recording.
//!
//! ## Data flow
//!
//! ```text
//!  StateInfo / ShotSample notifications
//!        │  (raw bytes + arrival time, bounded mpsc channel)
//!        ▼
//!  session::ShotSession ──▶ parse (decode) ──▶ recorder::ShotRecorder ──▶ storage::Storage
//!
//!  controller::MachineController ──▶ dispatcher / upload ──▶ protocol (encode) ──▶ Transport
//! ```
//!
//! ## Quick start
//!
//! With the `ble` feature enabled:
//!
//! ```ignore
//! use de1_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = De1Client::new(De1ClientConfig::default());
//!     let (rx, handle) = client.connect().await?;
//!     handle.start_espresso().await?;
//!
//!     let mut session = ShotSession::new(ShotRecorder::new(JsonDirStore::open("shots")?));
//!     session.run(rx).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Cargo features
//!
//! | Feature | Effect |
//! |---|---|
//! | `ble` | btleplug-backed [`client`] module and the `de1-rs` binary |
//! | `head-temp-u16` | read head temperature from the 16-bit field at offset 8 instead of the 24-bit one |
//!
//! Without `ble` the crate is the transport-agnostic protocol core; plug in
//! any [`transport::Transport`].
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`protocol`] | GATT UUIDs, wire layouts, scale table and encoders |
//! | [`parse`] | Decoders for notifications and profile records |
//! | [`types`] | Machine state, telemetry, profile and recording types |
//! | [`dispatcher`] | Semantic commands → RequestedState writes |
//! | [`upload`] | Ordered, acknowledged profile upload |
//! | [`controller`] | Dispatcher + uploader with the no-start-after-broken-upload rule |
//! | [`recorder`] | Shot recording state machine |
//! | [`session`] | Channel consumer feeding decoded notifications to the recorder |
//! | [`storage`] | Where finalized recordings go |

#[cfg(feature = "ble")]
pub mod client;
pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod parse;
pub mod protocol;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod transport;
pub mod types;
pub mod upload;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    #[cfg(feature = "ble")]
    pub use crate::client::{De1Client, De1ClientConfig, De1Device, De1Handle};

    // ── Control ───────────────────────────────────────────────────────────────
    pub use crate::controller::{MachineController, ProfileSlot};
    pub use crate::dispatcher::{CommandDispatcher, MachineCommand};
    pub use crate::transport::Transport;
    pub use crate::upload::ProfileUploader;

    // ── Recording ─────────────────────────────────────────────────────────────
    pub use crate::recorder::{RecorderEvent, RecorderPhase, ShotRecorder};
    pub use crate::session::{Decoded, SessionStats, ShotSession};
    pub use crate::storage::{JsonDirStore, MemoryStore, Storage};

    // ── Data types and errors ─────────────────────────────────────────────────
    pub use crate::error::{CodecError, CommandError, StorageError, TransportError, UploadError};
    pub use crate::protocol::RequestedState;
    pub use crate::types::{
        DataPoint, ExitCondition, ExitKind, Limiter, MachineEvent, MachineState, Profile,
        ProfileStep, Recording, SampleRecord, StateNotification, Transition,
    };
}
