//! The sum type carried by every edge.

use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::point::Point;

/// One chunk of a streamed (`begin`/`point`/`end`) batch. A receiver MUST
/// accept either a materialized `Message::Batch` or this framed form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BufferedBatchPart {
    Begin {
        name: String,
        tags: crate::point::Tags,
        tmax: i64,
        byname: bool,
    },
    Point(Point),
    End,
}

/// A timing-only message: promises no subsequent message on this edge will
/// carry a timestamp less than `time`. Used by joins to close a wait window
/// even when one side has gone quiet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Barrier {
    pub time: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Point(Point),
    Batch(Batch),
    Barrier(Barrier),
    BufferedBatch(BufferedBatchPart),
}

impl Message {
    /// The logical timestamp this message advances the edge to, for nodes
    /// that only care about progress (e.g. join's advance rule).
    pub fn time(&self) -> i64 {
        match self {
            Message::Point(p) => p.time,
            Message::Batch(b) => b.tmax,
            Message::Barrier(b) => b.time,
            Message::BufferedBatch(BufferedBatchPart::Point(p)) => p.time,
            Message::BufferedBatch(BufferedBatchPart::Begin { tmax, .. }) => *tmax,
            Message::BufferedBatch(BufferedBatchPart::End) => i64::MIN,
        }
    }

    pub fn is_barrier(&self) -> bool {
        matches!(self, Message::Barrier(_))
    }
}

impl From<Point> for Message {
    fn from(p: Point) -> Self {
        Message::Point(p)
    }
}
impl From<Batch> for Message {
    fn from(b: Batch) -> Self {
        Message::Batch(b)
    }
}
impl From<Barrier> for Message {
    fn from(b: Barrier) -> Self {
        Message::Barrier(b)
    }
}
