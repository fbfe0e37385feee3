//! Command dispatcher and profile uploader behind one handle, plus the rule
//! tying them together: no espresso unless the last upload completed.

use std::sync::Mutex;

use log::{info, warn};

use crate::dispatcher::{CommandDispatcher, MachineCommand};
use crate::error::{CommandError, UploadError};
use crate::transport::Transport;
use crate::types::Profile;
use crate::upload::{EncodedProfile, ProfileUploader};

/// What the machine's profile slots are known to hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileSlot {
    /// Nothing uploaded this connection; the machine keeps its own profile.
    Untouched,
    /// An upload has written to the wire and has not reported back.  Also
    /// left behind when an upload future is dropped part-way.
    Uploading,
    /// Last upload completed; carries the profile id.
    Loaded(String),
    /// Last upload broke part-way.
    Incomplete,
}

pub struct MachineController<T> {
    dispatcher: CommandDispatcher<T>,
    uploader: ProfileUploader<T>,
    slot: Mutex<ProfileSlot>,
    /// Held for a whole upload, and for the slot check plus write of an
    /// espresso start.
    wire: tokio::sync::Mutex<()>,
}

impl<T: Transport + Clone> MachineController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            dispatcher: CommandDispatcher::new(transport.clone()),
            uploader: ProfileUploader::new(transport),
            slot: Mutex::new(ProfileSlot::Untouched),
            wire: tokio::sync::Mutex::new(()),
        }
    }
}

impl<T: Transport> MachineController<T> {
    pub fn profile_slot(&self) -> ProfileSlot {
        self.lock_slot().clone()
    }

    /// Send a command.
    ///
    /// [`MachineCommand::StartEspresso`] waits for any upload in flight and
    /// is refused with [`CommandError::ProfileIncomplete`] unless the last
    /// upload finished.
    pub async fn send(&self, cmd: MachineCommand) -> Result<(), CommandError> {
        if cmd != MachineCommand::StartEspresso {
            return self.dispatcher.send(cmd).await;
        }

        let _wire = self.wire.lock().await;
        let slot = self.profile_slot();
        if matches!(slot, ProfileSlot::Incomplete | ProfileSlot::Uploading) {
            warn!("espresso start refused: profile slot {slot:?}");
            return Err(CommandError::ProfileIncomplete);
        }
        self.dispatcher.send(cmd).await
    }

    /// Upload `profile` and record the outcome.
    ///
    /// Uploads run one at a time.  A profile rejected before the first write
    /// leaves the slot as it was; a failure on the wire marks it incomplete.
    pub async fn upload(&self, profile: &Profile) -> Result<(), UploadError> {
        let encoded = EncodedProfile::new(profile)?;

        let _wire = self.wire.lock().await;
        info!("uploading profile {:?} ({})", profile.name, profile.id);
        let previous = std::mem::replace(&mut *self.lock_slot(), ProfileSlot::Uploading);
        let result = self.uploader.upload_encoded(&encoded).await;

        let mut slot = self.lock_slot();
        *slot = match &result {
            Ok(()) => ProfileSlot::Loaded(profile.id.clone()),
            Err(UploadError::PartialUpload { .. }) => ProfileSlot::Incomplete,
            Err(_) => previous,
        };
        result
    }

    pub async fn is_connected(&self) -> bool {
        self.dispatcher.transport().is_connected().await
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, ProfileSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
