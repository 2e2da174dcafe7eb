/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use std::{
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf, Stdout};

use super::Transport;

/// Write-only transport used to inspect outgoing data without a server.
///
/// Reads always fail: a sink has no peer, so any attempt to wait for a
/// reply is a programming error and is reported as such.
#[derive(Debug)]
pub struct Sink<W = Stdout> {
    inner: W,
}

impl Sink<Stdout> {
    /// Creates a sink that writes to standard output.
    pub fn stdout() -> Self {
        Sink {
            inner: tokio::io::stdout(),
        }
    }
}

impl<W> Sink<W> {
    /// Creates a sink writing to `inner`.
    pub fn new(inner: W) -> Self {
        Sink { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> AsyncRead for Sink<W> {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        log::error!("Attempted to receive from a sink transport");
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sink transport cannot receive",
        )))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for Sink<W> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<W: AsyncWrite + Unpin + Send> Transport for Sink<W> {}
