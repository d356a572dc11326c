mod aggregate;
pub mod domain;
mod parser;
mod snapshot;

pub use aggregate::{load_aggregate, AggregateError, DailyStatusCounts, SnapshotAggregate};
pub use parser::{parse_status_text, StatusParseError};
pub use snapshot::{LoadedSnapshot, SnapshotError, SnapshotFile, SnapshotStore, SnapshotWriter};
