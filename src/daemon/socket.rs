//! Unix socket server for handling JSON-RPC requests from the CLI.

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::daemon::Service;
use crate::daemon::find::{FindError, FindQuery, find};
use crate::project::LoadError;
use crate::protocol::{
    FindResult, PollResult, ProjectResult, Request, Response, RpcError, RpcErrorResponse,
    RpcResponse, StatusResult, VersionResult, read_request, write_message,
};

/// Get the socket path for the daemon.
///
/// Uses `$XDG_RUNTIME_DIR/metamirror.sock` on Linux.
/// Falls back to `/tmp/metamirror-$UID.sock`.
pub fn socket_path() -> PathBuf {
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("metamirror.sock");
    }

    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/metamirror-{}.sock", uid))
}

/// Context shared by request handlers.
pub struct Context {
    pub service: Arc<Service>,
    pub start_time: Instant,
    pub poll_cooldown: Duration,
    pub shutdown: Sender<()>,
}

/// Paths trying to climb out of the project tree.
fn is_traversal(path: &str) -> bool {
    path == ".." || path.contains("/..") || path.contains("../")
}

fn load_error(e: LoadError) -> RpcError {
    match e {
        LoadError::InvalidPath(_) | LoadError::ProjectNotFound(_) => RpcError::not_found(e.to_string()),
        LoadError::MetadataMalformed { .. } | LoadError::Io { .. } => {
            RpcError::internal(e.to_string())
        }
    }
}

fn find_error(e: FindError) -> RpcError {
    match e {
        FindError::Load(e) => load_error(e),
        FindError::Io { .. } => RpcError::internal(e.to_string()),
    }
}

/// Handle a single JSON-RPC request.
fn handle_request(ctx: &Context, request: Request) -> Result<Response, RpcError> {
    log::debug!("Handling {:?}", request);
    let service = &ctx.service;

    match request {
        Request::Status => {
            let coordinator = service.coordinator();
            let stats = service.cache().stats();

            Ok(Response::Status(StatusResult {
                running: true,
                pid: std::process::id(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: ctx.start_time.elapsed().as_secs(),
                mirror_path: service.paths().mirror_dir().display().to_string(),
                revision: coordinator.known_revision(),
                last_refresh_secs: coordinator
                    .last_refresh_at()
                    .map(|at| at.elapsed().as_secs()),
                cached_entries: service.cache().len(),
                cache_hits: stats.hits,
                cache_loads: stats.loads,
                cache_wipes: stats.wipes,
            }))
        }

        Request::Poll => {
            let age = service.coordinator().age();
            if age < ctx.poll_cooldown {
                return Err(RpcError::too_many_requests(format!(
                    "Not updating. Last update was {}s ago.",
                    age.as_secs()
                )));
            }

            let report = service
                .coordinator()
                .trigger_refresh()
                .map_err(|e| RpcError::internal(e.to_string()))?;

            Ok(Response::Poll(PollResult {
                output: report.output,
                revision: report.revision,
                cache_reset: report.cache_reset,
            }))
        }

        Request::Project { path } => {
            if is_traversal(&path) {
                return Err(RpcError::forbidden(format!("path escapes project tree: {}", path)));
            }

            let record = service.cache().get(&path).map_err(load_error)?;
            let record =
                serde_json::to_value(&*record).map_err(|e| RpcError::internal(e.to_string()))?;

            Ok(Response::Project(ProjectResult { path, record }))
        }

        Request::Find { id, repopath } => {
            let query = FindQuery { id, repopath };
            let projects = find(service.cache(), &query).map_err(find_error)?;
            if projects.is_empty() {
                return Err(RpcError::not_found("no matching projects"));
            }

            Ok(Response::Find(FindResult { projects }))
        }

        Request::Version => Ok(Response::Version(VersionResult {
            version: env!("CARGO_PKG_VERSION").to_string(),
            pid: std::process::id(),
        })),

        Request::Stop => {
            let _ = ctx.shutdown.try_send(());
            Ok(Response::Ok(()))
        }
    }
}

/// Handle a connected client, reading requests and writing responses.
fn handle_client(ctx: &Context, stream: UnixStream) {
    let mut reader = BufReader::new(&stream);
    let mut writer = &stream;

    loop {
        let rpc_req = match read_request(&mut reader) {
            Ok(Some(req)) => req,
            Ok(None) => break, // Client disconnected
            Err(e) => {
                log::warn!("Failed to read request: {}", e);
                break;
            }
        };

        let id = rpc_req.id.clone();

        let written = match handle_request(ctx, rpc_req.request) {
            Ok(result) => write_message(&mut writer, &RpcResponse::new(result, id)),
            Err(error) => {
                log::debug!("Request failed: {}", error.message);
                write_message(&mut writer, &RpcErrorResponse::new(error, id))
            }
        };
        if let Err(e) = written {
            log::warn!("Failed to write response: {}", e);
            break;
        }
    }
}

/// Handle for managing the socket server thread.
pub struct SocketServerHandle {
    path: PathBuf,
    thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl SocketServerHandle {
    /// Bind `path` and spawn the accept loop.
    ///
    /// A `stop` request is forwarded to `shutdown`; the owner decides when
    /// to actually call [`SocketServerHandle::shutdown`].
    pub fn spawn(
        path: PathBuf,
        service: Arc<Service>,
        poll_cooldown: Duration,
        shutdown: Sender<()>,
    ) -> std::io::Result<Self> {
        // Remove stale socket file
        if path.exists() {
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        log::info!("Socket server listening on {}", path.display());

        let ctx = Arc::new(Context {
            service,
            start_time: Instant::now(),
            poll_cooldown,
            shutdown,
        });

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let socket_file = path.clone();
        let thread = thread::Builder::new()
            .name("metamirror-socket".to_string())
            .spawn(move || {
                for stream in listener.incoming() {
                    if stop_flag.load(Ordering::SeqCst) {
                        break;
                    }

                    match stream {
                        Ok(stream) => {
                            let ctx = Arc::clone(&ctx);
                            thread::spawn(move || handle_client(&ctx, stream));
                        }
                        Err(e) => {
                            if stop_flag.load(Ordering::SeqCst) {
                                break;
                            }
                            log::warn!("Failed to accept connection: {}", e);
                        }
                    }
                }

                let _ = std::fs::remove_file(&socket_file);
                log::info!("Socket server stopped");
            })?;

        Ok(Self {
            path,
            thread: Some(thread),
            shutdown: stop,
        })
    }

    /// Signal shutdown and wait for thread to exit.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        if let Some(thread) = self.thread.take() {
            // Connect to the socket to unblock accept()
            let _ = UnixStream::connect(&self.path);
            let _ = thread.join();
        }
    }
}

impl Drop for SocketServerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
