//! Connection Handler
//!
//! One framed request per accepted connection: read header then
//! payload, validate, execute under the engine mutex, write one framed
//! response, close. A failure here terminates this connection only.

use std::io::{BufReader, BufWriter, Read};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::protocol::{
    decode_request, write_response, Request, Response, HEADER_SIZE, MAX_MESSAGE_SIZE,
};
use crate::store::StorageEngine;

/// Handle one accepted connection to completion
pub fn handle(
    stream: UnixStream,
    engine: &Mutex<StorageEngine>,
    config: &Config,
) -> Result<()> {
    set_timeouts(&stream, config)?;

    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    // Read the header first so the sequence id is available for an
    // ERROR frame even when the rest of the request is malformed
    let mut header = [0u8; HEADER_SIZE];
    match reader.read_exact(&mut header) {
        Ok(()) => {}
        Err(ref e) if connection_gone(e) => {
            tracing::debug!("Client disconnected before sending a request");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let payload_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
    let sequence_id = u32::from_le_bytes(header[8..12].try_into().unwrap());

    // Oversized frames are refused before any payload allocation
    if payload_size > MAX_MESSAGE_SIZE {
        let message = format!(
            "payload too large: {} bytes (max {})",
            payload_size, MAX_MESSAGE_SIZE
        );
        tracing::warn!("{}", message);
        return send_error(&mut writer, sequence_id, message);
    }

    let mut frame = vec![0u8; HEADER_SIZE + payload_size as usize];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;

    let request = match decode_request(&frame) {
        Ok((request, _seq)) => request,
        Err(StoreError::Protocol(message)) => {
            tracing::warn!("Rejected request: {}", message);
            return send_error(&mut writer, sequence_id, message);
        }
        Err(e) => return Err(e),
    };

    let response = execute_request(engine, &request);
    tracing::debug!(
        sequence_id,
        result = response.result(),
        "Handled {:?} request",
        request.message_type()
    );

    write_response(&mut writer, &response, sequence_id)
}

/// Execute a request with the engine mutex held for the whole operation
fn execute_request(engine: &Mutex<StorageEngine>, request: &Request) -> Response {
    let mut engine = engine.lock();

    match request {
        Request::Put { key, value } => match engine.put(key, value) {
            Ok(()) => Response::Put { result: 0 },
            Err(e) => Response::Put {
                result: fail(key, "PUT", e),
            },
        },
        Request::Get { key } => match engine.get(key) {
            Ok(value) => Response::Get {
                result: 0,
                value: Some(value),
            },
            Err(e) => Response::Get {
                result: fail(key, "GET", e),
                value: None,
            },
        },
        Request::Delete { key } => match engine.delete(key) {
            Ok(()) => Response::Delete { result: 0 },
            Err(e) => Response::Delete {
                result: fail(key, "DELETE", e),
            },
        },
    }
}

/// Log an engine failure and return its wire result code
fn fail(key: &str, what: &str, e: StoreError) -> i32 {
    match &e {
        StoreError::NotFound => tracing::debug!(key, "{} miss", what),
        _ => tracing::warn!(key, "{} failed: {}", what, e),
    }
    e.result_code()
}

/// Best-effort ERROR frame for a request that never decoded
fn send_error<W: std::io::Write>(writer: &mut W, sequence_id: u32, message: String) -> Result<()> {
    let error = StoreError::Protocol(message);
    let response = Response::Error {
        code: error.result_code(),
        message: error.to_string(),
    };
    write_response(writer, &response, sequence_id)
}

/// Apply the configured read/write timeouts (0 disables)
fn set_timeouts(stream: &UnixStream, config: &Config) -> Result<()> {
    if config.read_timeout_ms > 0 {
        stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
    }
    if config.write_timeout_ms > 0 {
        stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
    }
    Ok(())
}

/// io errors that just mean the peer went away
fn connection_gone(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}
