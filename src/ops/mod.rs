//! Batch operations against a selection
//!
//! - `batch`: chunked runner, counters, message sets, reports
//! - `transfer`: copy / move / delete
//! - `convert`: BIN/IMG/MDF/NRG to ISO through external converters

pub mod batch;
pub mod convert;
pub mod transfer;

pub use batch::{BatchCounters, BatchReport, MessageSets, OperationKind, ProgressTask};
pub use convert::{convert_batch, output_path, Converter, ExternalConverter, ImageFormat};
pub use transfer::{execute_transfer, parse_destinations, total_size, TransferRequest, COPY_BUFFER_SIZE};
