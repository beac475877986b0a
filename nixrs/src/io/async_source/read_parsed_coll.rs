use std::future::Future;
use std::io;
use std::marker::PhantomData;
use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::AsyncRead;

use super::read_int::ReadUsize;
use super::read_string::ReadString;
use crate::io::CollectionRead;
use crate::io::StateParse;

#[derive(Debug)]
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub enum ReadParsedColl<R, S, T, C> {
    Invalid,
    ReadSize(S, ReadUsize<R>),
    ReadItem(S, C, usize, ReadString<R>),
    Done(R),
    _Marker(PhantomData<T>),
}

impl<R, S, T, C> ReadParsedColl<R, S, T, C> {
    pub fn new(src: R, state: S) -> Self {
        Self::ReadSize(state, ReadUsize::new(src))
    }
}

impl<R, S, T, C> Future for ReadParsedColl<R, S, T, C>
where
    R: AsyncRead + Unpin,
    S: StateParse<T> + Unpin,
    S::Err: From<io::Error>,
    C: CollectionRead<T> + Unpin,
{
    type Output = Result<C, S::Err>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match mem::replace(&mut *self, Self::Invalid) {
                Self::Invalid | Self::_Marker(_) => panic!("invalid state"),
                Self::Done(_) => panic!("polling completed future"),
                Self::ReadSize(state, mut reader) => {
                    let len = match Pin::new(&mut reader).poll(cx) {
                        Poll::Pending => {
                            *self = Self::ReadSize(state, reader);
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                        Poll::Ready(Ok(v)) => v,
                    };
                    let src = reader.inner();
                    let coll = C::default();
                    if len == 0 {
                        *self = Self::Done(src);
                        return Poll::Ready(Ok(coll));
                    }
                    *self = Self::ReadItem(state, coll, len, ReadString::new(src));
                }
                Self::ReadItem(state, mut coll, left, mut reader) => {
                    let s = match Pin::new(&mut reader).poll(cx) {
                        Poll::Pending => {
                            *self = Self::ReadItem(state, coll, left, reader);
                            return Poll::Pending;
                        }
                        Poll::Ready(Err(err)) => return Poll::Ready(Err(err.into())),
                        Poll::Ready(Ok(v)) => v,
                    };
                    let item = state.parse(&s)?;
                    coll.push(item);
                    let src = reader.inner();
                    let left = left - 1;
                    if left == 0 {
                        *self = Self::Done(src);
                        return Poll::Ready(Ok(coll));
                    }
                    *self = Self::ReadItem(state, coll, left, ReadString::new(src));
                }
            }
        }
    }
}
