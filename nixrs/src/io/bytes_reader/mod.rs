mod buffer;
mod reader;

pub use reader::{BytesReader, BytesReaderBuilder, DEFAULT_MAX_BUF_SIZE, DEFAULT_RESERVED_BUF_SIZE};
