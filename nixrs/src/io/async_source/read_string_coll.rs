use std::future::Future;
use std::io;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncRead;

use super::read_int::ReadUsize;
use super::read_string::ReadString;
use crate::io::CollectionRead;

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub enum ReadStringColl<R, C> {
    Invalid,
    ReadSize(ReadUsize<R>),
    ReadItem(C, usize, ReadString<R>),
    Done(R),
}

impl<R, C> ReadStringColl<R, C> {
    pub fn new(src: R) -> Self {
        Self::ReadSize(ReadUsize::new(src))
    }
}

impl<R, C> Future for ReadStringColl<R, C>
where
    R: AsyncRead + Unpin,
    C: CollectionRead<String> + Unpin,
{
    type Output = io::Result<C>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match mem::replace(&mut *self, Self::Invalid) {
                Self::Invalid => panic!("invalid state"),
                Self::Done(_) => panic!("polling completed future"),
                Self::ReadSize(mut reader) => {
                    let len = match Pin::new(&mut reader).poll(cx) {
                        Poll::Pending => {
                            *self = Self::ReadSize(reader);
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                        Poll::Ready(Ok(v)) => v,
                    };
                    let src = reader.inner();
                    let coll = C::default();
                    if len == 0 {
                        *self = Self::Done(src);
                        return Poll::Ready(Ok(coll));
                    }
                    *self = Self::ReadItem(coll, len, ReadString::new(src));
                }
                Self::ReadItem(mut coll, left, mut reader) => {
                    let s = match Pin::new(&mut reader).poll(cx) {
                        Poll::Pending => {
                            *self = Self::ReadItem(coll, left, reader);
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                        Poll::Ready(Ok(v)) => v,
                    };
                    coll.push(s);
                    let src = reader.inner();
                    let left = left - 1;
                    if left == 0 {
                        *self = Self::Done(src);
                        return Poll::Ready(Ok(coll));
                    }
                    *self = Self::ReadItem(coll, left, ReadString::new(src));
                }
            }
        }
    }
}
