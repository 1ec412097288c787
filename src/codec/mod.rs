//! Wire codec shared by the client and the stub server
//!
//! Frames are length-prefixed so a reader can reassemble them from partial
//! reads. Arguments and results are MessagePack; event payloads are raw bytes.

mod frame;
mod value;

pub use frame::{
    CommandOptions, Frame, FrameDecoder, Invocation, MAX_FRAME_LEN, RemoteFault, decode_body,
    encode_event, encode_request, encode_response,
};
pub use value::Value;
