use std::io::{BufReader, BufWriter, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::daemon::socket_path;
use crate::protocol::{
    FindResult, PollResult, ProjectResult, Request, Response, RpcError, RpcRequest,
    StatusResult, VersionResult, read_response, write_message,
};

/// Blocking connection to the daemon's socket.
pub struct Client {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
    next_id: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("daemon is not running")]
    NotRunning,
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("{} (code {})", .0.message, .0.code)]
    Rpc(RpcError),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors meaning nobody is listening on the socket, or the daemon went away
/// mid-call.
fn daemon_gone(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        err.kind(),
        ConnectionRefused
            | NotFound
            | NotConnected
            | ConnectionAborted
            | ConnectionReset
            | BrokenPipe
            | UnexpectedEof
    )
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        if daemon_gone(&e) {
            ClientError::NotRunning
        } else {
            ClientError::Io(e)
        }
    }
}

fn unexpected<T>(response: Response) -> Result<T, ClientError> {
    Err(ClientError::InvalidResponse(format!("{:?}", response)))
}

impl Client {
    /// Connect to the daemon at its default socket.
    pub fn connect() -> Result<Self, ClientError> {
        Self::connect_to(&socket_path())
    }

    /// Connect to a daemon listening on `path`
    pub fn connect_to(path: &Path) -> Result<Self, ClientError> {
        let stream = UnixStream::connect(path)?;
        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: BufWriter::new(stream),
            next_id: 1,
        })
    }

    /// Send one request and block for its reply.
    pub fn call(&mut self, request: Request) -> Result<Response, ClientError> {
        let id = self.next_id;
        self.next_id += 1;

        write_message(&mut self.writer, &RpcRequest::new(request, id))?;
        self.writer.flush()?;

        read_response(&mut self.reader)?
            .map(|reply| reply.result)
            .map_err(|reply| ClientError::Rpc(reply.error))
    }

    pub fn status(&mut self) -> Result<StatusResult, ClientError> {
        match self.call(Request::Status)? {
            Response::Status(status) => Ok(status),
            other => unexpected(other),
        }
    }

    /// Refresh the mirror now, subject to the daemon's rate limit.
    pub fn poll(&mut self) -> Result<PollResult, ClientError> {
        match self.call(Request::Poll)? {
            Response::Poll(poll) => Ok(poll),
            other => unexpected(other),
        }
    }

    pub fn project(&mut self, path: &str) -> Result<ProjectResult, ClientError> {
        let path = path.to_string();
        match self.call(Request::Project { path })? {
            Response::Project(project) => Ok(project),
            other => unexpected(other),
        }
    }

    /// Projects matching a directory name, a repopath, or both.
    pub fn find(
        &mut self,
        id: Option<String>,
        repopath: Option<String>,
    ) -> Result<FindResult, ClientError> {
        match self.call(Request::Find { id, repopath })? {
            Response::Find(found) => Ok(found),
            other => unexpected(other),
        }
    }

    pub fn version(&mut self) -> Result<VersionResult, ClientError> {
        match self.call(Request::Version)? {
            Response::Version(version) => Ok(version),
            other => unexpected(other),
        }
    }

    pub fn stop(&mut self) -> Result<(), ClientError> {
        match self.call(Request::Stop)? {
            Response::Ok(()) => Ok(()),
            other => unexpected(other),
        }
    }
}
