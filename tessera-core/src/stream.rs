//! Change-capture records and processor traits
//!
//! Stream-enabled tables emit one [`StreamRecord`] per item mutation, in
//! partition order. Records are pumped into a [`RecordProcessor`] created by
//! a [`RecordProcessorFactory`]; the pump itself (shard leasing, polling) is
//! the backend worker's concern, not this crate's.

use crate::error::Result;
use crate::value::Item;
use async_trait::async_trait;

/// Kind of mutation a stream record captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Insert,
    Modify,
    Remove,
}

/// One captured item mutation
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRecord {
    pub event_id: String,
    pub event: StreamEvent,
    pub sequence_number: u64,
    /// Primary-key attributes of the mutated item
    pub keys: Item,
    pub old_image: Option<Item>,
    pub new_image: Option<Item>,
}

/// Reason a processor is being shut down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The shard is exhausted; processing completed normally
    Terminate,
    /// The lease was lost or the worker is aborting
    Abort,
}

/// Consumer of stream records for one shard
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// Called once before the first batch, with the stream's label
    fn initialize(&self, _stream_label: &str) {}

    /// Process one batch of records, in order
    async fn process_records(&self, records: Vec<StreamRecord>) -> Result<()>;

    /// Called once after the last batch
    fn shutdown(&self, _reason: ShutdownReason) {}
}

/// Factory of per-shard processors
pub trait RecordProcessorFactory: Send + Sync {
    fn create_processor(&self) -> Box<dyn RecordProcessor>;
}
