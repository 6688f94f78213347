//! JSON-RPC 2.0 envelopes, one JSON document per line.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};

use super::messages::{Request, Response, RpcError};

const JSONRPC_VERSION: &str = "2.0";

/// A call from the CLI: the method/params pair plus the caller's id.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub request: Request,
    pub id: Value,
}

/// Successful reply carrying the method's result.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub result: Response,
    pub id: Value,
}

/// Failed reply; `id` is null when the request could not be parsed.
#[derive(Debug, Serialize, Deserialize)]
pub struct RpcErrorResponse {
    pub jsonrpc: String,
    pub error: RpcError,
    pub id: Value,
}

impl RpcRequest {
    pub fn new(request: Request, id: impl Into<Value>) -> Self {
        let jsonrpc = JSONRPC_VERSION.to_owned();
        Self { jsonrpc, request, id: id.into() }
    }
}

impl RpcResponse {
    pub fn new(result: Response, id: Value) -> Self {
        let jsonrpc = JSONRPC_VERSION.to_owned();
        Self { jsonrpc, result, id }
    }
}

impl RpcErrorResponse {
    pub fn new(error: RpcError, id: Value) -> Self {
        let jsonrpc = JSONRPC_VERSION.to_owned();
        Self { jsonrpc, error, id }
    }
}

fn invalid_data(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Next non-blank line decoded as `T`, or `None` at end of stream.
fn read_json_line<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            return serde_json::from_str(&line).map(Some).map_err(invalid_data);
        }
    }
}

/// Serialize `msg` onto one line and flush it.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let mut bytes = serde_json::to_vec(msg).map_err(invalid_data)?;
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()
}

/// Read the next request; `None` once the client hung up.
pub fn read_request<R: BufRead>(reader: &mut R) -> io::Result<Option<RpcRequest>> {
    read_json_line(reader)
}

/// Read the next reply, telling success and error apart by the `error` key.
pub fn read_response<R: BufRead>(
    reader: &mut R,
) -> io::Result<Result<RpcResponse, RpcErrorResponse>> {
    let reply: Value = read_json_line(reader)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed"))?;

    if reply.get("error").is_some() {
        serde_json::from_value(reply).map(Err).map_err(invalid_data)
    } else if reply.get("result").is_some() {
        serde_json::from_value(reply).map(Ok).map_err(invalid_data)
    } else {
        Err(invalid_data("reply has neither result nor error"))
    }
}
