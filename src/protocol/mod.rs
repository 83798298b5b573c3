//! Protocol Module
//!
//! Defines the length-framed wire protocol between clients and the
//! daemon. All integers are little-endian, encoded field by field.
//!
//! ## Frame Format
//! ```text
//! ┌───────────┬──────────────┬─────────────┬──────────┬─────────┐
//! │ Type (4)  │ PayloadSz(4) │ SeqId (4)   │ Rsvd (4) │ Payload │
//! └───────────┴──────────────┴─────────────┴──────────┴─────────┘
//! ```
//!
//! ### Message Types
//! - 1: PUT_REQUEST   - key[256] + value_size:u32 + value
//! - 2: PUT_RESPONSE  - result:i32
//! - 3: GET_REQUEST   - key[256]
//! - 4: GET_RESPONSE  - result:i32 + value_size:u32 + value (if result==0)
//! - 5: DEL_REQUEST   - key[256]
//! - 6: DEL_RESPONSE  - result:i32
//! - 7: ERROR         - error_code:i32 + message[256] NUL-padded
//!
//! Key fields are fixed 256 bytes, NUL-padded; a key must be strictly
//! shorter than 256 bytes and free of interior NULs. `sequence_id` is
//! echoed from request to response for correlation and not otherwise
//! interpreted. `reserved` encodes as zero and is ignored on decode.
//!
//! Result codes: 0 = success, negative = error (see `StoreError`).

mod message;
mod codec;

pub use message::{MessageType, Request, Response};
pub use codec::{
    decode_request, decode_response, encode_request, encode_response, read_request,
    read_response, write_request, write_response, HEADER_SIZE, MAX_MESSAGE_SIZE,
};
