//! Line-delimited JSON-RPC spoken between the CLI and the daemon.

mod messages;
mod rpc;

pub use messages::{
    FindResult, PollResult, ProjectResult, Request, Response, RpcError, StatusResult,
    VersionResult,
};
pub use rpc::{RpcErrorResponse, RpcRequest, RpcResponse, read_request, read_response, write_message};
