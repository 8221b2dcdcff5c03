//! Data model and edge protocol for the flowd pipeline engine.
//!
//! This is the leaf crate of the dependency order named in spec §2: data
//! model → edge protocol → clock → operator kernels → alert state machine →
//! task master. Everything here is pure/sync except `edge`, which wraps a
//! `tokio::sync::mpsc` channel.

pub mod batch;
pub mod edge;
pub mod group;
pub mod lineproto;
pub mod message;
pub mod point;
pub mod value;

pub use batch::Batch;
pub use edge::{edge, EdgeError, EdgeKind, EdgeReceiver, EdgeSender};
pub use group::{GroupBySpec, GroupId};
pub use message::{Barrier, BufferedBatchPart, Message};
pub use point::{Fields, Point, Tags};
pub use value::Value;
