use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::wire::ZEROS;

fn padding_len(size: u64) -> u8 {
    ((8 - (size % 8)) % 8) as u8
}

pin_project! {
    #[derive(Debug)]
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct ReadPadding<R> {
        #[pin]
        src: R,
        buf: [u8; 8],
        len: u8,
        read: u8,
    }
}

impl<R> ReadPadding<R> {
    pub(crate) fn new(src: R, size: u64) -> Self {
        ReadPadding {
            src,
            buf: [0u8; 8],
            len: padding_len(size),
            read: 0,
        }
    }
    pub(crate) fn inner(self) -> R {
        self.src
    }
}

impl<R> Future for ReadPadding<R>
where
    R: AsyncRead + Unpin,
{
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut me = self.project();
        while *me.read < *me.len {
            let mut buf = ReadBuf::new(&mut me.buf[(*me.read as usize)..(*me.len as usize)]);
            ready!(me.src.as_mut().poll_read(cx, &mut buf)?);
            let n = buf.filled().len();
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
            }
            *me.read += n as u8;
        }
        if me.buf[..*me.len as usize] != ZEROS[..*me.len as usize] {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "non-zero padding",
            )));
        }
        Poll::Ready(Ok(()))
    }
}
