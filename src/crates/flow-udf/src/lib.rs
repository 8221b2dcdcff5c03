//! Out-of-process UDF wire protocol and subprocess management (spec §4.11).
//!
//! A hand-written, length-prefixed protobuf framing rather than a `tonic`
//! gRPC service: the protocol is a point/batch pipe, not a request/response
//! RPC surface, and there's no `.proto` source worth generating from.

pub mod framing;
pub mod process;
pub mod wire;

pub use framing::{Frame, FrameType, FramingError};
pub use process::{OptionArg, UdfError, UdfProcess};
