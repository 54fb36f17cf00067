//! Best-effort bridge to a relay attached over a serial line.
//!
//! Each accepted command is written as a single ASCII byte, `'1'` for on and
//! `'0'` for off. The line itself (baud rate, parity) must already be set up,
//! e.g. with `stty`. Nothing is read back from the device.

use std::path::Path;
use std::path::PathBuf;

use tokio::fs::File;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::relay::RelayState;

/// Handle used by request handlers to queue states for the device.
///
/// Sending never blocks and never fails from the caller's point of view.
#[derive(Debug, Clone)]
pub struct SerialBridge {
    tx: mpsc::UnboundedSender<RelayState>,
}

impl SerialBridge {
    /// Start the writer task for `device`.
    ///
    /// The task exits once every `SerialBridge` clone has been dropped.
    pub fn spawn(device: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(device, rx));
        (Self { tx }, handle)
    }

    pub fn send(&self, state: RelayState) {
        if self.tx.send(state).is_err() {
            tracing::warn!("Serial bridge is not running, dropping state {}", state);
        }
    }
}

async fn run(device: PathBuf, mut rx: mpsc::UnboundedReceiver<RelayState>) {
    tracing::info!("Serial bridge writing to {}", device.display());

    let mut port: Option<File> = None;
    while let Some(state) = rx.recv().await {
        if port.is_none() {
            match open(&device).await {
                Ok(file) => port = Some(file),
                Err(e) => {
                    tracing::warn!("Failed to open serial device {}: {}", device.display(), e);
                    continue;
                }
            }
        }

        if let Some(file) = port.as_mut() {
            match write_state(file, state).await {
                Ok(()) => tracing::debug!("Wrote {} to {}", state, device.display()),
                Err(e) => {
                    tracing::warn!("Failed to write to serial device {}: {}", device.display(), e);
                    // Reopen on the next command
                    port = None;
                }
            }
        }
    }

    tracing::info!("Serial bridge stopped");
}

async fn open(device: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).open(device).await
}

async fn write_state(file: &mut File, state: RelayState) -> std::io::Result<()> {
    file.write_all(&[state.serial_byte()]).await?;
    file.flush().await
}
