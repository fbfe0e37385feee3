//! Semantic machine commands and the dispatcher that writes them.

use log::{debug, info, warn};

use crate::error::CommandError;
use crate::protocol::{encode_command, RequestedState, REQUESTED_STATE_CHARACTERISTIC};
use crate::transport::Transport;

/// Operations a user can ask of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineCommand {
    StartEspresso,
    /// Stop whatever is running and return to idle.
    Stop,
    StartSteam,
    StartHotWater,
    /// Rinse the group head (hot water rinse).
    StartFlush,
    Sleep,
    /// Wake from sleep into idle.
    Wake,
    Descale,
    SelfTest,
    Clean,
    AirPurge,
    /// Advance the running profile to its next frame.
    SkipToNext,
    /// Any entry of the command table, for operations not listed above.
    Raw(RequestedState),
}

impl MachineCommand {
    pub fn requested_state(self) -> RequestedState {
        match self {
            Self::StartEspresso => RequestedState::Espresso,
            Self::Stop | Self::Wake => RequestedState::Idle,
            Self::StartSteam => RequestedState::Steam,
            Self::StartHotWater => RequestedState::HotWater,
            Self::StartFlush => RequestedState::HotWaterRinse,
            Self::Sleep => RequestedState::Sleep,
            Self::Descale => RequestedState::Descale,
            Self::SelfTest => RequestedState::SelfTest,
            Self::Clean => RequestedState::Clean,
            Self::AirPurge => RequestedState::AirPurge,
            Self::SkipToNext => RequestedState::SkipToNext,
            Self::Raw(state) => state,
        }
    }
}

/// Writes [`MachineCommand`]s to the RequestedState characteristic.
///
/// Exactly one characteristic write per [`send`](Self::send); there is no
/// retry.  A caller that wants one wraps the call itself.
pub struct CommandDispatcher<T> {
    transport: T,
}

impl<T: Transport> CommandDispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn send(&self, cmd: MachineCommand) -> Result<(), CommandError> {
        if !self.transport.is_connected().await {
            warn!("command {cmd:?} dropped: not connected");
            return Err(CommandError::NotConnected);
        }
        let state = cmd.requested_state();
        let payload = encode_command(state);
        debug!("command {cmd:?} → {state:?} ({:02x?})", payload);
        self.transport
            .write_characteristic(REQUESTED_STATE_CHARACTERISTIC, &payload)
            .await
            .map_err(|e| {
                warn!("command {cmd:?} write failed: {e}");
                CommandError::from(e)
            })?;
        info!("requested state {state:?}");
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn semantic_commands_map_to_table_entries() {
        assert_eq!(MachineCommand::StartEspresso.requested_state().code(), 0x04);
        assert_eq!(MachineCommand::Stop.requested_state(), RequestedState::Idle);
        assert_eq!(MachineCommand::Wake.requested_state(), RequestedState::Idle);
        assert_eq!(MachineCommand::StartFlush.requested_state().code(), 0x0F);
        assert_eq!(MachineCommand::Sleep.requested_state().code(), 0x00);
        assert_eq!(
            MachineCommand::Raw(RequestedState::SchedIdle).requested_state().code(),
            0x15
        );
    }
}
