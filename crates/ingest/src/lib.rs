pub mod error;
pub mod producer;
pub mod synthetic;
pub mod uci;

pub use error::IngestError;
pub use producer::{spawn_reader, Producer, ProducerOptions, ProducerStats, RowReceiver};
pub use synthetic::SyntheticSource;
pub use uci::{open_uci_file, parse_timestamp, parse_value, UciRecord};
