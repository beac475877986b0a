use std::cmp::max;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Buf, Bytes};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::io::{AsyncBytesRead, DrainInto};

use super::ZEROS;

#[derive(Debug, Clone)]
enum State {
    Content(u64),
    ReadPadding(u8, u8),
    Padding(u8),
    Eof,
}

pin_project! {
    pub struct PaddedReader<R> {
        #[pin]
        reader: R,
        trailer_size: u8,
        padding: [u8; 8],
        state: State,
    }
}

impl<R> PaddedReader<R> {
    pub fn new(reader: R, len: u64) -> Self {
        let content = len & !7;
        let trailer_size = (len - content) as u8;
        Self {
            reader,
            trailer_size,
            padding: ZEROS,
            state: State::Content(content),
        }
    }
    fn remaining_usize(self: Pin<&mut Self>) -> (usize, usize, usize) {
        let this = self.project();
        let aligned = (*this.trailer_size + 7) & !7;
        match this.state {
            State::Content(rem) => (
                (*rem).try_into().unwrap_or(usize::MAX),
                (*rem + *this.trailer_size as u64)
                    .try_into()
                    .unwrap_or(usize::MAX),
                (*rem + aligned as u64).try_into().unwrap_or(usize::MAX),
            ),
            State::ReadPadding(start, _) => (
                0,
                (*this.trailer_size - *start) as usize,
                (aligned - *start) as usize,
            ),
            State::Padding(start) => (
                0,
                (*this.trailer_size - *start) as usize,
                (aligned - *start) as usize,
            ),
            State::Eof => (0, 0, 0),
        }
    }
}

impl<R> AsyncRead for PaddedReader<R>
where
    R: AsyncRead,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut this = self.project();
        loop {
            match &mut this.state {
                State::Content(rem) => {
                    let n = {
                        let mut buf = buf.take((*rem).try_into().unwrap_or(usize::MAX));
                        let ptr = buf.filled().as_ptr();
                        ready!(this.reader.as_mut().poll_read(cx, &mut buf)?);

                        // Ensure the pointer does not change from under us
                        assert_eq!(ptr, buf.filled().as_ptr());
                        buf.filled().len()
                    };
                    if n == 0 {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "EOF before end of content",
                        )));
                    }

                    // SAFETY: This is guaranteed to be the number of initialized (and read)
                    // bytes due to the invariants provided by `ReadBuf::filled`.
                    unsafe { buf.assume_init(n) };
                    buf.advance(n);

                    *rem -= n as u64;
                    if *rem == 0 {
                        if *this.trailer_size > 0 {
                            *this.state = State::ReadPadding(0, 0);
                        } else {
                            *this.state = State::Eof;
                        }
                    }
                }
                State::ReadPadding(start, end) => {
                    let mut tail_buf = ReadBuf::new(this.padding);
                    tail_buf.advance(*end as usize);
                    ready!(this.reader.as_mut().poll_read(cx, &mut tail_buf))?;
                    if tail_buf.filled().len() == *end as usize {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "EOF before end of padding",
                        )));
                    }
                    *end = tail_buf.filled().len() as u8;
                    if *end == 8 {
                        *this.state = State::Padding(*start);
                    }
                }
                State::Padding(pos) => {
                    let bound =
                        std::cmp::min((*this.trailer_size - *pos) as usize, buf.remaining());
                    buf.put_slice(&this.padding[*pos as usize..bound]);
                    *pos += bound as u8;
                    if *pos == *this.trailer_size {
                        *this.state = State::Eof;
                    }
                }
                State::Eof => break,
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl<R> AsyncBytesRead for PaddedReader<R>
where
    R: AsyncBytesRead,
{
    fn poll_force_fill_buf(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<bytes::Bytes>> {
        let (content, rem, trailing) = self.as_mut().remaining_usize();
        let mut this = self.project();
        match this.state {
            State::Content(_) => {
                let mut buf = ready!(this.reader.as_mut().poll_force_fill_buf(cx))?;
                if buf.len() >= content {
                    while buf.len() < trailing {
                        buf = ready!(this.reader.as_mut().poll_force_fill_buf(cx))?;
                    }
                    Poll::Ready(Ok(buf.split_to(rem)))
                } else {
                    Poll::Ready(Ok(buf))
                }
            }
            State::ReadPadding(start, end) => {
                while *end < 8 {
                    let mut tail_buf = ReadBuf::new(this.padding);
                    tail_buf.advance(*end as usize);
                    ready!(this.reader.as_mut().poll_read(cx, &mut tail_buf))?;
                    if tail_buf.filled().len() == *end as usize {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "EOF before end of padding",
                        )));
                    }
                    *end = tail_buf.filled().len() as u8;
                }
                let start = *start;
                *this.state = State::Padding(start);
                let mut buf = Bytes::from_owner(*this.padding);
                buf.truncate(*this.trailer_size as usize);
                buf.advance(start as usize);
                Poll::Ready(Ok(buf))
            }
            _ => Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF while force reading",
            ))),
        }
    }

    fn poll_fill_buf(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<bytes::Bytes>> {
        let (content, rem, trailing) = self.as_mut().remaining_usize();
        let mut this = self.project();
        match this.state {
            State::Content(_) => {
                let mut buf = ready!(this.reader.as_mut().poll_fill_buf(cx))?;
                if buf.len() >= content {
                    while buf.len() < trailing {
                        buf = ready!(this.reader.as_mut().poll_force_fill_buf(cx))?;
                    }
                    Poll::Ready(Ok(buf.split_to(rem)))
                } else {
                    Poll::Ready(Ok(buf))
                }
            }
            State::ReadPadding(start, end) => {
                while *end < 8 {
                    let mut tail_buf = ReadBuf::new(this.padding);
                    tail_buf.advance(*end as usize);
                    ready!(this.reader.as_mut().poll_read(cx, &mut tail_buf))?;
                    if tail_buf.filled().len() == *end as usize {
                        return Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "EOF before end of padding",
                        )));
                    }
                    *end = tail_buf.filled().len() as u8;
                }
                let start = *start;
                *this.state = State::Padding(start);
                let mut buf = Bytes::from_owner(*this.padding);
                buf.truncate(*this.trailer_size as usize);
                buf.advance(start as usize);
                Poll::Ready(Ok(buf))
            }
            State::Padding(start) => {
                let mut buf = Bytes::from_owner(*this.padding);
                buf.truncate(*this.trailer_size as usize);
                buf.advance(*start as usize);
                Poll::Ready(Ok(buf))
            }
            State::Eof => Poll::Ready(Ok(Bytes::new())),
        }
    }

    fn prepare(self: Pin<&mut Self>, additional: usize) {
        self.project().reader.prepare(additional)
    }

    fn consume(mut self: Pin<&mut Self>, amt: usize) {
        let (_, rem, aligned) = self.as_mut().remaining_usize();
        assert!(amt <= rem, "Consuming more than content");
        let mut this = self.project();
        if amt == rem {
            if matches!(this.state, State::Content(_) | State::ReadPadding(_, _)) {
                this.reader.as_mut().consume(aligned);
            }
            *this.state = State::Eof;
            return;
        }
        match this.state {
            State::Content(c_rem) => {
                this.reader.as_mut().consume(amt);
                let u_rem = (*c_rem).try_into().unwrap_or(usize::MAX);
                if amt > u_rem {
                    let start = (amt - u_rem) as u8;
                    *this.state = State::ReadPadding(start, start);
                } else {
                    *c_rem -= amt as u64;
                }
            }
            State::ReadPadding(start, end) => {
                this.reader.as_mut().consume(amt);
                *start += amt as u8;
                *end = max(*start, *end);
            }
            State::Padding(start) => {
                *start += amt as u8;
            }
            State::Eof => {}
        }
    }
}

impl<R> DrainInto<R> for PaddedReader<R>
where
    R: AsyncBytesRead,
{
    fn poll_drain(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let buf = ready!(self.as_mut().poll_fill_buf(cx))?;
            if buf.is_empty() {
                break;
            }
            self.as_mut().consume(buf.len());
        }
        Poll::Ready(Ok(()))
    }

    fn into_inner(self) -> R {
        self.reader
    }
}
