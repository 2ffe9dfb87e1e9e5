use std::sync::Weak;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::RuntimeShared;
use crate::block::{BlockError, Result};
use crate::memory::PressureLevel;

/// Handle to a running memory monitor.
///
/// The monitor stops when [`stop`](Self::stop) is called or the handle is
/// dropped.
#[derive(Debug)]
pub struct MonitorHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops the monitor.
    pub fn stop(mut self) {
        self.signal_stop();
    }

    /// Returns true until the monitor task has exited.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    fn signal_stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

pub(super) fn spawn(shared: Weak<RuntimeShared>, period: Duration) -> Result<MonitorHandle> {
    let handle = tokio::runtime::Handle::try_current().map_err(|_| BlockError::NoRuntime)?;
    let (stop_tx, mut stop_rx) = oneshot::channel();

    let task = handle.spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::debug!("Memory monitor started (every {:?})", period);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    let Some(shared) = shared.upgrade() else {
                        break;
                    };
                    let level = shared.refresh_pressure();
                    if level >= PressureLevel::Low {
                        shared.tracker.perform_cleanup(false);
                    }
                }
            }
        }

        tracing::debug!("Memory monitor stopped");
    });

    Ok(MonitorHandle {
        stop_tx: Some(stop_tx),
        task,
    })
}
