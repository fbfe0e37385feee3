//! Profile upload: one header record followed by one frame per step.
//!
//! The machine assigns frames to slots by arrival order, not by an index it
//! echoes back, so every write is awaited (acknowledged) before the next one
//! is issued and the first failure ends the sequence.  Concurrent uploads
//! through one uploader queue behind each other.  There is no way to resume
//! from a frame: after a [`UploadError::PartialUpload`] the caller must
//! resend from the header and must not start an extraction.

use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::error::UploadError;
use crate::protocol::{
    encode_profile_frame, encode_profile_header, FRAME_LEN, FRAME_WRITE_CHARACTERISTIC,
    HEADER_LEN, HEADER_WRITE_CHARACTERISTIC, MAX_FRAMES,
};
use crate::transport::Transport;
use crate::types::Profile;

/// Fully encoded upload, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedProfile {
    pub header: [u8; HEADER_LEN],
    pub frames: Vec<[u8; FRAME_LEN]>,
}

impl EncodedProfile {
    /// Encode every record up front so that an unrepresentable value is
    /// reported before anything reaches the machine.
    pub fn new(profile: &Profile) -> Result<Self, UploadError> {
        let n = profile.steps.len();
        if n == 0 || n > MAX_FRAMES {
            return Err(UploadError::StepCount(n));
        }
        let header = encode_profile_header(profile)?;
        let frames = profile
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| encode_profile_frame(step, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { header, frames })
    }
}

pub struct ProfileUploader<T> {
    transport: T,
    in_flight: Mutex<()>,
}

impl<T: Transport> ProfileUploader<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            in_flight: Mutex::new(()),
        }
    }

    /// Encode and upload `profile`.
    ///
    /// Returns once the header and every frame have been acknowledged.
    pub async fn upload(&self, profile: &Profile) -> Result<(), UploadError> {
        let encoded = EncodedProfile::new(profile)?;
        self.upload_encoded(&encoded).await
    }

    /// Write a pre-encoded profile, strictly in order.
    ///
    /// Waits for any upload already running through this uploader.
    pub async fn upload_encoded(&self, encoded: &EncodedProfile) -> Result<(), UploadError> {
        let _in_flight = self.in_flight.lock().await;
        if !self.transport.is_connected().await {
            return Err(UploadError::NotConnected);
        }
        info!("uploading profile ({} frames)", encoded.frames.len());

        if let Err(source) = self
            .transport
            .write_characteristic(HEADER_WRITE_CHARACTERISTIC, &encoded.header)
            .await
        {
            warn!("profile header write failed: {source}");
            return Err(UploadError::PartialUpload {
                last_successful: None,
                header_written: false,
                source,
            });
        }
        debug!("header acknowledged: {:02x?}", encoded.header);

        let mut last_successful = None;
        for (i, frame) in encoded.frames.iter().enumerate() {
            if let Err(source) = self
                .transport
                .write_characteristic(FRAME_WRITE_CHARACTERISTIC, frame)
                .await
            {
                warn!("profile frame {i} write failed: {source}");
                return Err(UploadError::PartialUpload {
                    last_successful,
                    header_written: true,
                    source,
                });
            }
            debug!("frame {i} acknowledged: {frame:02x?}");
            last_successful = Some(i);
        }
        info!("profile upload complete");
        Ok(())
    }
}
