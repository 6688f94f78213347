use serde::{Deserialize, Serialize};
use serde_json::Value;

/// All RPC methods supported by the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    /// Get daemon status
    Status,

    /// Refresh the mirror now
    Poll,

    /// Get one project's record
    Project { path: String },

    /// Search projects by directory name and/or repopath
    Find {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        repopath: Option<String>,
    },

    /// Get daemon version
    Version,

    /// Stop the daemon
    Stop,
}

/// Status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub running: bool,
    pub pid: u32,
    pub version: String,
    pub uptime_secs: u64,
    pub mirror_path: String,
    /// Revision the cached records were built against
    pub revision: Option<String>,
    /// Seconds since the last successful refresh, if any
    pub last_refresh_secs: Option<u64>,
    pub cached_entries: usize,
    #[serde(default)]
    pub cache_hits: u64,
    #[serde(default)]
    pub cache_loads: u64,
    #[serde(default)]
    pub cache_wipes: u64,
}

/// Poll response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollResult {
    pub output: String,
    pub revision: Option<String>,
    pub cache_reset: bool,
}

/// Project response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResult {
    pub path: String,
    pub record: Value,
}

/// Find response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResult {
    pub projects: Vec<String>,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResult {
    pub version: String,
    pub pid: u32,
}

/// All possible success responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusResult),
    Poll(PollResult),
    Project(ProjectResult),
    Find(FindResult),
    Version(VersionResult),
    Ok(()), // For stop - unit type serializes as null
}

/// RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(-32603, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(-1, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(-2, msg)
    }

    pub fn too_many_requests(msg: impl Into<String>) -> Self {
        Self::new(-3, msg)
    }
}
