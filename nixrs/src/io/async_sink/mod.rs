use std::future::Future;
use std::io;
use std::time::{Duration, SystemTime};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{CollectionSize, StatePrint};

const ZERO_PAD: [u8; 8] = [0u8; 8];

fn padding_len(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Extension trait with the wire primitives used to encode the daemon and
/// legacy ssh-serve protocols.
pub trait AsyncSink: AsyncWrite + Unpin {
    fn write_u64_le(&mut self, v: u64) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        async move {
            self.write_all(&v.to_le_bytes()).await?;
            Ok(())
        }
    }

    fn write_usize(&mut self, v: usize) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        self.write_u64_le(v as u64)
    }

    fn write_bool(&mut self, v: bool) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        self.write_u64_le(v as u64)
    }

    fn write_flag<F>(&mut self, v: F) -> impl Future<Output = io::Result<()>> + Send
    where
        F: Into<bool>,
        Self: Send,
    {
        self.write_bool(v.into())
    }

    fn write_enum<T>(&mut self, v: T) -> impl Future<Output = io::Result<()>> + Send
    where
        T: Into<u64>,
        Self: Send,
    {
        self.write_u64_le(v.into())
    }

    fn write_seconds(&mut self, v: Duration) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        self.write_u64_le(v.as_secs())
    }

    fn write_time(&mut self, v: SystemTime) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        let secs = v
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.write_u64_le(secs)
    }

    fn write_bytes<'a>(&'a mut self, buf: &'a [u8]) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        async move {
            self.write_u64_le(buf.len() as u64).await?;
            self.write_all(buf).await?;
            let padding = padding_len(buf.len());
            if padding > 0 {
                self.write_all(&ZERO_PAD[..padding]).await?;
            }
            Ok(())
        }
    }

    fn write_str<'a>(&'a mut self, s: &'a str) -> impl Future<Output = io::Result<()>> + Send
    where
        Self: Send,
    {
        self.write_bytes(s.as_bytes())
    }

    fn write_string<S>(&mut self, s: S) -> impl Future<Output = io::Result<()>> + Send
    where
        S: AsRef<str> + Send,
        Self: Send,
    {
        async move { self.write_str(s.as_ref()).await }
    }

    fn write_string_coll<'a, C>(&'a mut self, coll: &'a C) -> impl Future<Output = io::Result<()>> + Send
    where
        &'a C: IntoIterator<Item = &'a String>,
        C: CollectionSize,
        Self: Send,
    {
        async move {
            self.write_usize(coll.len()).await?;
            for item in coll {
                self.write_str(item).await?;
            }
            Ok(())
        }
    }

    fn write_printed<'a, S, T>(
        &'a mut self,
        state: &'a S,
        item: &'a T,
    ) -> impl Future<Output = io::Result<()>> + Send
    where
        S: StatePrint<T> + Sync,
        T: Sync,
        Self: Send,
    {
        async move {
            let printed = state.print(item);
            self.write_str(&printed).await
        }
    }

    fn write_printed_coll<'a, S, C, T>(
        &'a mut self,
        state: &'a S,
        coll: &'a C,
    ) -> impl Future<Output = io::Result<()>> + Send
    where
        S: StatePrint<T> + Sync,
        &'a C: IntoIterator<Item = &'a T>,
        C: CollectionSize,
        T: Sync + 'a,
        Self: Send,
    {
        async move {
            self.write_usize(coll.len()).await?;
            for item in coll {
                self.write_printed(state, item).await?;
            }
            Ok(())
        }
    }
}

impl<W> AsyncSink for W where W: AsyncWrite + Unpin {}
