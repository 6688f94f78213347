//! Scheduler thread for periodic mirror refresh.
//!
//! Refreshes once as soon as it starts, then on every tick of the configured
//! interval until told to shut down.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded, select, tick};

use crate::daemon::refresh::RefreshCoordinator;

/// Background scheduler driving `RefreshCoordinator::trigger_refresh`.
pub struct Scheduler {
    coordinator: Arc<RefreshCoordinator>,
    interval: Duration,
    shutdown: Receiver<()>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(
        coordinator: Arc<RefreshCoordinator>,
        interval: Duration,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            coordinator,
            interval,
            shutdown,
        }
    }

    /// Run the scheduler loop.
    pub fn run(self) {
        log::info!(
            "Scheduler thread started (every {}s)",
            self.interval.as_secs()
        );

        let ticker = tick(self.interval);
        self.refresh();

        loop {
            select! {
                recv(ticker) -> _ => self.refresh(),
                // A send or a dropped handle both mean stop.
                recv(self.shutdown) -> _ => {
                    log::info!("Scheduler shutting down");
                    return;
                }
            }
        }
    }

    fn refresh(&self) {
        log::debug!("Scheduled refresh");
        if let Err(e) = self.coordinator.trigger_refresh() {
            log::warn!("Scheduled refresh failed: {}", e);
        }
    }
}

/// Handle for managing the scheduler thread.
pub struct SchedulerHandle {
    thread: Option<JoinHandle<()>>,
    shutdown: Option<Sender<()>>,
}

impl SchedulerHandle {
    /// Spawn the scheduler thread.
    pub fn spawn(
        coordinator: Arc<RefreshCoordinator>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = bounded(1);
        let scheduler = Scheduler::new(coordinator, interval, rx);

        let thread = thread::Builder::new()
            .name("metamirror-scheduler".to_string())
            .spawn(move || scheduler.run())?;

        Ok(Self {
            thread: Some(thread),
            shutdown: Some(tx),
        })
    }

    /// Signal shutdown and wait for thread to exit.
    ///
    /// A refresh already running finishes first.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.try_send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
