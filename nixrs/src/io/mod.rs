mod async_bytes_read;
mod async_sink;
mod async_source;
mod bytes_reader;
mod collection_size;
#[cfg(feature = "nixrs-derive")]
mod compat;
mod framed;
mod lending;
mod offset_reader;
mod read_u64;
mod state_display;
mod state_parse;
mod state_print;
#[cfg(feature = "nixrs-derive")]
mod taken;
mod taken_stream;
mod tee;
mod try_read_bytes_limited;

pub const DEFAULT_BUF_SIZE: usize = 8 * 1024;
pub const RESERVED_BUF_SIZE: usize = 8 * 1024;

pub use async_bytes_read::AsyncBytesRead;
pub use async_sink::AsyncSink;
pub use async_source::AsyncSource;
pub use bytes_reader::{BytesReader, DEFAULT_MAX_BUF_SIZE, DEFAULT_RESERVED_BUF_SIZE};
pub use collection_size::{CollectionRead, CollectionSize};
#[cfg(feature = "nixrs-derive")]
pub use compat::AsyncBufReadCompat;
pub use framed::{FramedSink, FramedSource};
pub use lending::{DrainInto, Lending, LentReader};
pub use offset_reader::OffsetReader;
pub use read_u64::TryReadU64;
pub use state_display::StateDisplay;
pub use state_parse::StateParse;
pub use state_print::StatePrint;
#[cfg(feature = "nixrs-derive")]
pub use taken::TakenReader;
pub use taken_stream::{TakenGuard, Taker, TakenStream};
pub use tee::TeeWriter;
pub use try_read_bytes_limited::TryReadBytesLimited;
