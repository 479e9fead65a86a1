//! Cloud-speaker pairing and the observable connection state

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

use super::runner::CommandRunner;
use super::ServiceResult;

const SERVICE: &str = "speaker pairing service";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

pub trait SpeakerPairingService {
    /// Resolves once the connection is established
    fn pair(&self, device_name: &str) -> impl Future<Output = ServiceResult<()>> + Send;
}

/// Runs `<command> DEVICE_NAME`; exit status 0 means paired
#[derive(Debug, Clone)]
pub struct CommandPairing {
    runner: CommandRunner,
}

impl CommandPairing {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            runner: CommandRunner::new(SERVICE, command, timeout),
        }
    }
}

impl SpeakerPairingService for CommandPairing {
    async fn pair(&self, device_name: &str) -> ServiceResult<()> {
        self.runner.run(&[device_name.to_string()]).await?;
        Ok(())
    }
}

/// Tracks Disconnected → Connecting → Connected for one speaker link
pub struct SpeakerLink<S> {
    service: S,
    state: watch::Sender<ConnectionState>,
    device: parking_lot::Mutex<Option<String>>,
}

impl<S: SpeakerPairingService> SpeakerLink<S> {
    pub fn new(service: S) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            service,
            state,
            device: parking_lot::Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn device(&self) -> Option<String> {
        self.device.lock().clone()
    }

    /// Pair with `device_name`. A failure returns the link to Disconnected.
    pub async fn connect(&self, device_name: &str) -> ServiceResult<ConnectionState> {
        if self.state() == ConnectionState::Connected
            && self.device().as_deref() == Some(device_name)
        {
            return Ok(ConnectionState::Connected);
        }

        self.state.send_replace(ConnectionState::Connecting);
        log::info!("Pairing with speaker {:?}", device_name);

        match self.service.pair(device_name).await {
            Ok(()) => {
                *self.device.lock() = Some(device_name.to_string());
                self.state.send_replace(ConnectionState::Connected);
                log::info!("Speaker {:?} connected", device_name);
                Ok(ConnectionState::Connected)
            }
            Err(e) => {
                *self.device.lock() = None;
                self.state.send_replace(ConnectionState::Disconnected);
                log::warn!("Speaker pairing with {:?} failed: {}", device_name, e);
                Err(e)
            }
        }
    }

    pub fn disconnect(&self) {
        *self.device.lock() = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }
}
