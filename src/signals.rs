//! Stop propagation for graceful shutdown.
//!
//! One watch channel fans a stop request out to every watch task. SIGINT
//! (Ctrl-C) and SIGTERM both flip the channel; tasks observe it at their next
//! suspension point rather than being killed preemptively. The listener stays
//! armed after the first request, and a second signal ends the process
//! without waiting for the tasks.

use crate::console::Console;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Shared handle that can request a stop. Clones all feed the same channel.
#[derive(Clone)]
pub struct StopController {
    tx: Arc<watch::Sender<bool>>,
}

impl StopController {
    pub fn new() -> StopController {
        let (tx, _rx) = watch::channel(false);
        StopController { tx: Arc::new(tx) }
    }

    /// Ask every subscribed task to stop. Idempotent.
    pub fn request_stop(&self) {
        self.tx.send_replace(true);
    }

    /// Create a token for one task.
    pub fn subscribe(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Per-task view of the stop channel.
///
/// A dropped controller counts as a stop request, so tasks never hang on a
/// channel nobody can flip anymore.
#[derive(Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    /// Non-blocking check, for use between suspension points.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once a stop has been requested.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Listen for SIGINT/SIGTERM. The first signal asks every task to stop; a
/// second one ends the process without waiting for them.
pub fn install_signal_handlers(controller: StopController, console: Console) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interrupt = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                return;
            }
        };
        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = interrupt.recv() => {}
            _ = term.recv() => {}
        }
        console.note("stop requested, terminating watchers");
        controller.request_stop();

        tokio::select! {
            _ = interrupt.recv() => {}
            _ = term.recv() => {}
        }
        tracing::warn!("second stop request, exiting immediately");
        std::process::exit(1);
    })
}
