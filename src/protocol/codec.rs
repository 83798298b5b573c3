//! Protocol codec
//!
//! Explicit field-by-field encoding and decoding of protocol frames,
//! plus blocking stream helpers. Nothing here trusts a declared size
//! beyond `MAX_MESSAGE_SIZE`; oversized frames are rejected before any
//! payload allocation.

use std::io::{Read, Write};

use crate::error::{Result, StoreError};
use crate::store::MAX_KEY_SIZE;

use super::{MessageType, Request, Response};

/// Header size: type (4) + payload_size (4) + sequence_id (4) + reserved (4)
pub const HEADER_SIZE: usize = 16;

/// Maximum payload size accepted from the transport (16 MiB)
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Fixed part of a PUT request payload: key field + value_size
const PUT_FIXED_SIZE: usize = MAX_KEY_SIZE + 4;

/// Error message field size (NUL-padded)
const ERROR_MESSAGE_SIZE: usize = 256;

// =============================================================================
// Field Codecs
// =============================================================================

/// Encode a key into its fixed NUL-padded wire field
///
/// Keys must be strictly shorter than the field so at least one NUL
/// terminator remains, and must not contain interior NULs.
fn encode_key_field(key: &str) -> Result<[u8; MAX_KEY_SIZE]> {
    if key.len() >= MAX_KEY_SIZE {
        return Err(StoreError::KeyTooLong);
    }
    if key.as_bytes().contains(&0) {
        return Err(StoreError::Protocol("key contains NUL byte".to_string()));
    }

    let mut field = [0u8; MAX_KEY_SIZE];
    field[..key.len()].copy_from_slice(key.as_bytes());
    Ok(field)
}

/// Decode a fixed NUL-padded key field
fn decode_key_field(field: &[u8]) -> Result<String> {
    let len = field
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| StoreError::Protocol("unterminated key field".to_string()))?;

    std::str::from_utf8(&field[..len])
        .map(|s| s.to_string())
        .map_err(|_| StoreError::Protocol("key is not valid UTF-8".to_string()))
}

fn encode_header(msg_type: MessageType, payload_size: u32, sequence_id: u32) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&(msg_type as u32).to_le_bytes());
    header[4..8].copy_from_slice(&payload_size.to_le_bytes());
    header[8..12].copy_from_slice(&sequence_id.to_le_bytes());
    // reserved field stays zero
    header
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request frame (header + payload)
pub fn encode_request(request: &Request, sequence_id: u32) -> Result<Vec<u8>> {
    let payload = match request {
        Request::Put { key, value } => {
            let mut payload = Vec::with_capacity(PUT_FIXED_SIZE + value.len());
            payload.extend_from_slice(&encode_key_field(key)?);
            payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
            payload.extend_from_slice(value);
            payload
        }
        Request::Get { key } | Request::Delete { key } => encode_key_field(key)?.to_vec(),
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&encode_header(
        request.message_type(),
        payload.len() as u32,
        sequence_id,
    ));
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode a request frame, returning the request and its sequence id
pub fn decode_request(bytes: &[u8]) -> Result<(Request, u32)> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Protocol(format!(
            "incomplete header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let raw_type = read_u32(bytes, 0);
    let payload_size = read_u32(bytes, 4) as usize;
    let sequence_id = read_u32(bytes, 8);

    if payload_size > MAX_MESSAGE_SIZE as usize {
        return Err(StoreError::Protocol(format!(
            "payload too large: {} bytes (max {})",
            payload_size, MAX_MESSAGE_SIZE
        )));
    }

    let total = HEADER_SIZE + payload_size;
    if bytes.len() < total {
        return Err(StoreError::Protocol(format!(
            "incomplete payload: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }
    let payload = &bytes[HEADER_SIZE..total];

    let request = match MessageType::from_u32(raw_type) {
        Some(MessageType::PutRequest) => decode_put_request(payload)?,
        Some(MessageType::GetRequest) => Request::Get {
            key: decode_key_request(payload, "GET")?,
        },
        Some(MessageType::DeleteRequest) => Request::Delete {
            key: decode_key_request(payload, "DELETE")?,
        },
        _ => {
            return Err(StoreError::Protocol(format!(
                "unexpected message type: {}",
                raw_type
            )))
        }
    };

    Ok((request, sequence_id))
}

/// Decode a PUT request payload
///
/// The declared value size must account for the whole remainder of the
/// payload, or the frame is rejected.
fn decode_put_request(payload: &[u8]) -> Result<Request> {
    if payload.len() < PUT_FIXED_SIZE {
        return Err(StoreError::Protocol(format!(
            "truncated PUT request: {} bytes (fixed part is {})",
            payload.len(),
            PUT_FIXED_SIZE
        )));
    }

    let key = decode_key_field(&payload[..MAX_KEY_SIZE])?;
    let value_size = read_u32(payload, MAX_KEY_SIZE) as usize;

    if value_size != payload.len() - PUT_FIXED_SIZE {
        return Err(StoreError::Protocol(format!(
            "PUT value size mismatch: declared {}, payload carries {}",
            value_size,
            payload.len() - PUT_FIXED_SIZE
        )));
    }

    Ok(Request::Put {
        key,
        value: payload[PUT_FIXED_SIZE..].to_vec(),
    })
}

/// Decode a GET/DELETE request payload (key field only)
fn decode_key_request(payload: &[u8], what: &str) -> Result<String> {
    if payload.len() != MAX_KEY_SIZE {
        return Err(StoreError::Protocol(format!(
            "invalid {} request size: {} bytes (expected {})",
            what,
            payload.len(),
            MAX_KEY_SIZE
        )));
    }
    decode_key_field(payload)
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response frame (header + payload)
pub fn encode_response(response: &Response, sequence_id: u32) -> Vec<u8> {
    let payload = match response {
        Response::Put { result } | Response::Delete { result } => result.to_le_bytes().to_vec(),
        Response::Get { result, value } => {
            let value = value.as_deref().unwrap_or(&[]);
            let mut payload = Vec::with_capacity(8 + value.len());
            payload.extend_from_slice(&result.to_le_bytes());
            payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
            payload.extend_from_slice(value);
            payload
        }
        Response::Error { code, message } => {
            let mut payload = Vec::with_capacity(4 + ERROR_MESSAGE_SIZE);
            payload.extend_from_slice(&code.to_le_bytes());

            let mut field = [0u8; ERROR_MESSAGE_SIZE];
            let len = message.len().min(ERROR_MESSAGE_SIZE - 1);
            field[..len].copy_from_slice(&message.as_bytes()[..len]);
            payload.extend_from_slice(&field);
            payload
        }
    };

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&encode_header(
        response.message_type(),
        payload.len() as u32,
        sequence_id,
    ));
    frame.extend_from_slice(&payload);
    frame
}

/// Decode a response frame, returning the response and its sequence id
pub fn decode_response(bytes: &[u8]) -> Result<(Response, u32)> {
    if bytes.len() < HEADER_SIZE {
        return Err(StoreError::Protocol(format!(
            "incomplete response header: expected {} bytes, got {}",
            HEADER_SIZE,
            bytes.len()
        )));
    }

    let raw_type = read_u32(bytes, 0);
    let payload_size = read_u32(bytes, 4) as usize;
    let sequence_id = read_u32(bytes, 8);

    if payload_size > MAX_MESSAGE_SIZE as usize {
        return Err(StoreError::Protocol(format!(
            "response payload too large: {} bytes (max {})",
            payload_size, MAX_MESSAGE_SIZE
        )));
    }

    let total = HEADER_SIZE + payload_size;
    if bytes.len() < total {
        return Err(StoreError::Protocol(format!(
            "incomplete response payload: expected {} bytes, got {}",
            total,
            bytes.len()
        )));
    }
    let payload = &bytes[HEADER_SIZE..total];

    let response = match MessageType::from_u32(raw_type) {
        Some(MessageType::PutResponse) => Response::Put {
            result: decode_result_payload(payload, "PUT")?,
        },
        Some(MessageType::DeleteResponse) => Response::Delete {
            result: decode_result_payload(payload, "DELETE")?,
        },
        Some(MessageType::GetResponse) => decode_get_response(payload)?,
        Some(MessageType::Error) => decode_error_response(payload)?,
        _ => {
            return Err(StoreError::Protocol(format!(
                "unexpected response type: {}",
                raw_type
            )))
        }
    };

    Ok((response, sequence_id))
}

/// Decode a bare-result payload (PUT/DELETE responses)
fn decode_result_payload(payload: &[u8], what: &str) -> Result<i32> {
    if payload.len() != 4 {
        return Err(StoreError::Protocol(format!(
            "invalid {} response size: {} bytes (expected 4)",
            what,
            payload.len()
        )));
    }
    Ok(read_i32(payload, 0))
}

/// Decode a GET response payload
fn decode_get_response(payload: &[u8]) -> Result<Response> {
    if payload.len() < 8 {
        return Err(StoreError::Protocol(format!(
            "truncated GET response: {} bytes",
            payload.len()
        )));
    }

    let result = read_i32(payload, 0);
    let value_size = read_u32(payload, 4) as usize;

    if result == 0 {
        if value_size != payload.len() - 8 {
            return Err(StoreError::Protocol(format!(
                "GET response size mismatch: declared {}, payload carries {}",
                value_size,
                payload.len() - 8
            )));
        }
        Ok(Response::Get {
            result,
            value: Some(payload[8..].to_vec()),
        })
    } else {
        if payload.len() != 8 {
            return Err(StoreError::Protocol(
                "GET error response carries a value".to_string(),
            ));
        }
        Ok(Response::Get {
            result,
            value: None,
        })
    }
}

/// Decode an ERROR payload
fn decode_error_response(payload: &[u8]) -> Result<Response> {
    if payload.len() != 4 + ERROR_MESSAGE_SIZE {
        return Err(StoreError::Protocol(format!(
            "invalid ERROR response size: {} bytes",
            payload.len()
        )));
    }

    let code = read_i32(payload, 0);
    let field = &payload[4..];
    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    let message = String::from_utf8_lossy(&field[..len]).into_owned();

    Ok(Response::Error { code, message })
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + payload) from a stream
///
/// The payload bound is checked before the payload is allocated.
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let payload_size = read_u32(&header, 4);
    if payload_size > MAX_MESSAGE_SIZE {
        return Err(StoreError::Protocol(format!(
            "payload too large: {} bytes (max {})",
            payload_size, MAX_MESSAGE_SIZE
        )));
    }

    let mut frame = vec![0u8; HEADER_SIZE + payload_size as usize];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut frame[HEADER_SIZE..])?;
    Ok(frame)
}

/// Read one complete request from a stream
pub fn read_request<R: Read>(reader: &mut R) -> Result<(Request, u32)> {
    decode_request(&read_frame(reader)?)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request, sequence_id: u32) -> Result<()> {
    writer.write_all(&encode_request(request, sequence_id)?)?;
    writer.flush()?;
    Ok(())
}

/// Read one complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<(Response, u32)> {
    decode_response(&read_frame(reader)?)
}

/// Write a response to a stream
pub fn write_response<W: Write>(
    writer: &mut W,
    response: &Response,
    sequence_id: u32,
) -> Result<()> {
    writer.write_all(&encode_response(response, sequence_id))?;
    writer.flush()?;
    Ok(())
}
