//! JSON-lines request/response envelope for driving the service from
//! another process.

mod handler;
mod messages;

pub use handler::{run_session, ControlHandler};
pub use messages::{
    decode_request, encode_response, CheckpointView, ControlRequest, ControlResponse,
    ProtocolError, QueryView, ResponseData, MAX_LINE_BYTES,
};
