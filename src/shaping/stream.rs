//! Stream wrapper that routes every byte through the shared shaper.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;

use crate::shaping::limiter::{Direction, Grant, Reservation, TrafficShaper};

/// Per-direction pacing state of one connection.
///
/// Holds at most a pending sleep, never a reservation: grants are taken and
/// settled within a single poll of the inner stream.
#[derive(Default)]
struct Pacer {
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Pacer {
    /// Wait until the shaper grants part of `wanted`.
    fn poll_grant(
        &mut self,
        cx: &mut Context<'_>,
        shaper: &TrafficShaper,
        direction: Direction,
        wanted: usize,
    ) -> Poll<Grant> {
        loop {
            if let Some(sleep) = self.sleep.as_mut() {
                ready!(sleep.as_mut().poll(cx));
                self.sleep = None;
            }
            match shaper.reserve(direction, wanted) {
                Reservation::Granted(grant) => return Poll::Ready(grant),
                Reservation::Wait(delay) => {
                    self.sleep = Some(Box::pin(tokio::time::sleep(delay)));
                }
            }
        }
    }
}

/// A connection stream whose reads and writes are paced by the global shaper.
///
/// Delays only suspend this connection's own operation.
pub struct ShapedStream<S> {
    inner: S,
    shaper: Arc<TrafficShaper>,
    read: Pacer,
    write: Pacer,
}

impl<S> ShapedStream<S> {
    pub fn new(inner: S, shaper: Arc<TrafficShaper>) -> Self {
        Self {
            inner,
            shaper,
            read: Pacer::default(),
            write: Pacer::default(),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn shaper(&self) -> &Arc<TrafficShaper> {
        &self.shaper
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for ShapedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let wanted = buf.remaining();
        if wanted == 0 {
            return Pin::new(&mut this.inner).poll_read(cx, buf);
        }

        let grant = ready!(this.read.poll_grant(cx, &this.shaper, Direction::Read, wanted));
        let allowed = grant.bytes.min(wanted);

        let polled = {
            let mut limited = ReadBuf::new(buf.initialize_unfilled_to(allowed));
            match Pin::new(&mut this.inner).poll_read(cx, &mut limited) {
                Poll::Pending => None,
                Poll::Ready(result) => Some(result.map(|()| limited.filled().len())),
            }
        };

        match polled {
            None => {
                // nothing to read yet: hand the budget back before parking
                this.shaper.commit(grant, 0);
                Poll::Pending
            }
            Some(Ok(n)) => {
                buf.advance(n);
                this.shaper.commit(grant, n);
                Poll::Ready(Ok(()))
            }
            Some(Err(e)) => {
                this.shaper.commit(grant, 0);
                Poll::Ready(Err(e))
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for ShapedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if buf.is_empty() {
            return Pin::new(&mut this.inner).poll_write(cx, buf);
        }

        let grant = ready!(this.write.poll_grant(cx, &this.shaper, Direction::Write, buf.len()));
        let allowed = grant.bytes.min(buf.len());

        match Pin::new(&mut this.inner).poll_write(cx, &buf[..allowed]) {
            Poll::Pending => {
                this.shaper.commit(grant, 0);
                Poll::Pending
            }
            Poll::Ready(Ok(n)) => {
                this.shaper.commit(grant, n);
                Poll::Ready(Ok(n))
            }
            Poll::Ready(Err(e)) => {
                this.shaper.commit(grant, 0);
                Poll::Ready(Err(e))
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
