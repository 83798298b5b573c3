//! Client Module
//!
//! Blocking unix-socket client for the daemon. The dispatcher serves
//! exactly one request per connection, so the client connects fresh for
//! every call and correlates the response by its echoed sequence id.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::protocol::{read_response, write_request, Request, Response};

/// Client for a running blockkv daemon
pub struct Client {
    socket_path: PathBuf,
    sequence: u32,
}

impl Client {
    /// Create a client for the daemon at the given socket path
    ///
    /// No connection is made until the first request.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            sequence: 1,
        }
    }

    /// Store a value under a key
    pub fn put(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let request = Request::Put {
            key: key.to_string(),
            value: value.to_vec(),
        };

        match self.roundtrip(&request)? {
            Response::Put { result: 0 } => Ok(()),
            Response::Put { result } => Err(StoreError::from_result_code(result)),
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch a value by key
    pub fn get(&mut self, key: &str) -> Result<Vec<u8>> {
        let request = Request::Get {
            key: key.to_string(),
        };

        match self.roundtrip(&request)? {
            Response::Get {
                result: 0,
                value: Some(value),
            } => Ok(value),
            Response::Get { result, .. } if result != 0 => {
                Err(StoreError::from_result_code(result))
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Remove a key
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let request = Request::Delete {
            key: key.to_string(),
        };

        match self.roundtrip(&request)? {
            Response::Delete { result: 0 } => Ok(()),
            Response::Delete { result } => Err(StoreError::from_result_code(result)),
            other => Err(unexpected(&other)),
        }
    }

    /// The daemon socket path this client targets
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Send one request on a fresh connection and read its response
    fn roundtrip(&mut self, request: &Request) -> Result<Response> {
        let sequence_id = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let mut stream = UnixStream::connect(&self.socket_path)?;
        write_request(&mut stream, request, sequence_id)?;

        let (response, response_seq) = read_response(&mut stream)?;
        if response_seq != sequence_id {
            return Err(StoreError::Protocol(format!(
                "sequence mismatch: sent {}, got {}",
                sequence_id, response_seq
            )));
        }

        Ok(response)
    }
}

/// A response whose type or shape does not answer the request
fn unexpected(response: &Response) -> StoreError {
    match response {
        Response::Error { code, message } => {
            StoreError::Protocol(format!("daemon rejected request ({}): {}", code, message))
        }
        other => StoreError::Protocol(format!(
            "unexpected response type: {:?}",
            other.message_type()
        )),
    }
}
