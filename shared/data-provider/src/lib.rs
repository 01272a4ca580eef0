mod error;
mod filter;
mod loader;
mod stream;
mod table;

pub use error::LoadError;
pub use filter::{by_config, by_config_and_split, by_split};
pub use loader::{load, LoadOptions, Loaded, DEFAULT_BATCH_SIZE};
pub use stream::{Batches, RowStream};
pub use table::{
    read_csv, read_jsonl, read_parquet, read_table, FileFormat, HttpRangeReader, LazyParquet,
    Row, Table,
};
