//! Storage access: location parsing, whole-object fetches and range reads.

mod block_cache;
mod fetch;
mod location;
mod range_reader;
mod s3_reader;
mod singleflight;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use fetch::{create_s3_client, ObjectFetcher};
pub use location::Location;
pub use range_reader::{HttpRangeReader, LocalRangeReader, MemoryRangeReader, RangeReader};
pub use s3_reader::S3RangeReader;

pub(crate) use singleflight::SingleFlight;
