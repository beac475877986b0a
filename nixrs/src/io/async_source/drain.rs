use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::AsyncRead;

pin_project! {
    #[derive(Debug)]
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct DrainAll<R> {
        #[pin]
        src: R,
        buf: [u8; 8192],
    }
}

impl<R> DrainAll<R> {
    pub(crate) fn new(src: R) -> Self {
        DrainAll { src, buf: [0u8; 8192] }
    }
}

impl<R> Future for DrainAll<R>
where
    R: AsyncRead + Unpin,
{
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        use tokio::io::ReadBuf;

        let mut me = self.project();
        loop {
            let mut buf = ReadBuf::new(&mut me.buf[..]);
            ready!(me.src.as_mut().poll_read(cx, &mut buf)?);
            if buf.filled().is_empty() {
                return Poll::Ready(Ok(()));
            }
        }
    }
}

pin_project! {
    #[derive(Debug)]
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct DrainExact<R> {
        #[pin]
        src: R,
        left: u64,
        buf: [u8; 8192],
    }
}

impl<R> DrainExact<R> {
    pub(crate) fn new(src: R, len: u64) -> Self {
        DrainExact {
            src,
            left: len,
            buf: [0u8; 8192],
        }
    }
}

impl<R> Future for DrainExact<R>
where
    R: AsyncRead + Unpin,
{
    type Output = io::Result<()>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        use tokio::io::ReadBuf;

        let mut me = self.project();
        while *me.left > 0 {
            let max = std::cmp::min(*me.left, me.buf.len() as u64) as usize;
            let mut buf = ReadBuf::new(&mut me.buf[..max]);
            ready!(me.src.as_mut().poll_read(cx, &mut buf)?);
            let n = buf.filled().len();
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::UnexpectedEof.into()));
            }
            *me.left -= n as u64;
        }
        Poll::Ready(Ok(()))
    }
}
