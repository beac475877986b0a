mod framed_sink;
mod framed_source;

pub use framed_sink::FramedSink;
pub use framed_source::FramedSource;
