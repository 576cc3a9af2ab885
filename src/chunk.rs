use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::{io, mem};

use bytes::{Bytes, BytesMut};
use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::RangeBody;

/// Future that seeks a body to `start` and reads up to `length` bytes into a
/// single buffer. Resolves early with fewer bytes if the body hits
/// end-of-file. The body is dropped together with the future.
#[pin_project]
pub(crate) struct ReadChunk<B> {
    state: ChunkState,
    #[pin]
    body: B,
}

impl<B: RangeBody> ReadChunk<B> {
    pub(crate) fn new(body: B, start: u64, length: u64) -> Self {
        ReadChunk {
            state: ChunkState::Seek { start, length },
            body,
        }
    }
}

#[derive(Debug)]
enum ChunkState {
    Seek { start: u64, length: u64 },
    Seeking { length: u64 },
    Reading { buffer: BytesMut, remaining: u64 },
    Done,
}

impl<B: RangeBody> Future for ReadChunk<B> {
    type Output = io::Result<Bytes>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<Bytes>> {
        let mut this = self.project();

        if let ChunkState::Seek { start, length } = *this.state {
            this.body.as_mut().start_seek(start)?;
            *this.state = ChunkState::Seeking { length };
        }

        if let ChunkState::Seeking { length } = *this.state {
            match this.body.as_mut().poll_complete(cx) {
                Poll::Pending => { return Poll::Pending; }
                Poll::Ready(Err(e)) => { return Poll::Ready(Err(e)); }
                Poll::Ready(Ok(())) => {
                    let capacity = usize::try_from(length)
                        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "chunk exceeds address space"))?;
                    let buffer = BytesMut::with_capacity(capacity);
                    *this.state = ChunkState::Reading { buffer, remaining: length };
                }
            }
        }

        if let ChunkState::Reading { buffer, remaining } = this.state {
            while *remaining > 0 {
                let uninit = buffer.spare_capacity_mut();
                let nbytes = std::cmp::min(
                    uninit.len(),
                    usize::try_from(*remaining).unwrap_or(usize::MAX),
                );

                let mut read_buf = ReadBuf::uninit(&mut uninit[0..nbytes]);

                match this.body.as_mut().poll_read(cx, &mut read_buf) {
                    Poll::Pending => { return Poll::Pending; }
                    Poll::Ready(Err(e)) => { return Poll::Ready(Err(e)); }
                    Poll::Ready(Ok(())) => {
                        let n = read_buf.filled().len();
                        if n == 0 {
                            tracing::trace!(missing = *remaining, "short read at end of resource");
                            break;
                        }
                        // SAFETY: poll_read has initialised `n` more bytes
                        // directly after the current length of `buffer`
                        unsafe { buffer.set_len(buffer.len() + n); }
                        // n <= remaining because of the cmp::min above
                        *remaining -= n as u64;
                    }
                }
            }

            let chunk = mem::take(buffer).freeze();
            *this.state = ChunkState::Done;
            return Poll::Ready(Ok(chunk));
        }

        panic!("ReadChunk polled after completion");
    }
}
