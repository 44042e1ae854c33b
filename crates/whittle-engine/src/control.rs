//! Interactive control: a non-blocking key watcher.
//!
//! A background task reads stdin and publishes discrete signals onto an
//! unbounded channel; the coordinator polls it between ordinal
//! resolutions and never blocks on it.

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// A signal from the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Abandon the rest of the current pass.
    SkipPass,
    /// Toggle diff printing for committed transformations.
    ToggleDiff,
}

/// Watches stdin for the `s` and `d` shortcuts.
///
/// Terminals deliver input line-buffered, so a key press is registered
/// once the line reaches us; the signals themselves are processed at the
/// coordinator's next safe point either way.
pub struct InteractiveControl {
    rx: Option<mpsc::UnboundedReceiver<ControlSignal>>,
    task: Option<JoinHandle<()>>,
}

impl InteractiveControl {
    /// A control that never produces signals.
    pub fn disabled() -> Self {
        Self {
            rx: None,
            task: None,
        }
    }

    /// Spawn the stdin watcher.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut buf = [0u8; 64];
            loop {
                let n = match stdin.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for &byte in &buf[..n] {
                    let signal = match byte {
                        b's' | b'S' => Some(ControlSignal::SkipPass),
                        b'd' | b'D' => Some(ControlSignal::ToggleDiff),
                        _ => None,
                    };
                    if let Some(signal) = signal {
                        debug!(?signal, "key press");
                        if tx.send(signal).is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Self {
            rx: Some(rx),
            task: Some(task),
        }
    }

    /// Poll for the next pending signal without blocking.
    pub fn try_recv(&mut self) -> Option<ControlSignal> {
        self.rx.as_mut()?.try_recv().ok()
    }
}

impl Drop for InteractiveControl {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
