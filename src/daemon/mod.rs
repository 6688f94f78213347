//! Daemon: background refresh plus the socket server answering the CLI.

pub mod find;
pub mod refresh;
mod scheduler;
mod socket;

use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::bounded;

use crate::cache::PathCache;
use crate::config::Config;
use crate::mirror::{GitMirror, MirrorPaths, MirrorStore};
use crate::project::ProjectLoader;

pub use find::{FindError, FindQuery, find};
pub use refresh::{RefreshCoordinator, RefreshReport};
pub use scheduler::SchedulerHandle;
pub use socket::{SocketServerHandle, socket_path};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon already running at {0}")]
    AlreadyRunning(PathBuf),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One mirror, its cache and the coordinator refreshing them.
pub struct Service {
    paths: MirrorPaths,
    cache: Arc<PathCache>,
    coordinator: Arc<RefreshCoordinator>,
}

impl Service {
    pub fn new(store: Arc<dyn MirrorStore>, paths: MirrorPaths) -> Self {
        let cache = Arc::new(PathCache::new(ProjectLoader::new(paths.clone())));
        let coordinator = Arc::new(RefreshCoordinator::new(store, Arc::clone(&cache)));
        Self {
            paths,
            cache,
            coordinator,
        }
    }

    /// Build a service backed by a git mirror as configured.
    pub fn from_config(config: &Config) -> Self {
        let paths = config.paths();
        let store = Arc::new(
            GitMirror::new(paths.clone(), config.remote.clone())
                .with_lock_timeout(config.lock_timeout()),
        );
        Self::new(store, paths)
    }

    pub fn paths(&self) -> &MirrorPaths {
        &self.paths
    }

    pub fn cache(&self) -> &Arc<PathCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }
}

/// Check whether a daemon answers on the socket.
pub fn is_daemon_running() -> bool {
    std::os::unix::net::UnixStream::connect(socket_path()).is_ok()
}

/// Run the daemon in the foreground until Ctrl-C or a `stop` request.
pub fn start(config: &Config) -> Result<(), DaemonError> {
    if is_daemon_running() {
        return Err(DaemonError::AlreadyRunning(socket_path()));
    }

    let service = Arc::new(Service::from_config(config));
    log::info!(
        "Starting metamirror daemon for {} in {}",
        config.remote,
        service.paths().root().display()
    );

    service.coordinator().check_revision();

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let signal_tx = shutdown_tx.clone();
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })?;

    let mut socket = SocketServerHandle::spawn(
        socket_path(),
        Arc::clone(&service),
        config.poll_cooldown(),
        shutdown_tx,
    )?;
    let mut scheduler =
        SchedulerHandle::spawn(Arc::clone(service.coordinator()), config.refresh_interval())?;

    let _ = shutdown_rx.recv();
    log::info!("Shutting down");

    socket.shutdown();
    scheduler.shutdown();

    log::info!("Daemon stopped");
    Ok(())
}
