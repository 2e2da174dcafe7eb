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
    collections::VecDeque,
    io,
    pin::Pin,
    task::{Context, Poll},
};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use super::Transport;

/// Scripted server: every read hands out the next queued reply, every
/// write is recorded.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: VecDeque<Vec<u8>>,
    pub written: Vec<u8>,
    pub secure: bool,
    pub fail_shutdown: bool,
}

impl MockTransport {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        MockTransport {
            replies: replies
                .into_iter()
                .map(|r| r.as_ref().to_vec())
                .collect(),
            written: Vec::new(),
            secure: false,
            fail_shutdown: false,
        }
    }

    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Commands sent so far, one per CRLF-terminated line.
    pub fn lines(&self) -> Vec<String> {
        self.written_str()
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect()
    }
}

impl AsyncRead for MockTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(mut reply) = this.replies.pop_front() {
            let len = reply.len().min(buf.remaining());
            buf.put_slice(&reply[..len]);
            if len < reply.len() {
                this.replies.push_front(reply.split_off(len));
            }
        }
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockTransport {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.written.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.fail_shutdown {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::NotConnected, "already closed")))
        } else {
            Poll::Ready(Ok(()))
        }
    }
}

impl Transport for MockTransport {
    fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Yields at most `chunk` bytes per read, to exercise reassembly across
/// physical read boundaries.
pub(crate) struct ChunkedReader {
    data: Vec<u8>,
    pos: usize,
    chunk: usize,
}

impl ChunkedReader {
    pub fn new(data: impl AsRef<[u8]>, chunk: usize) -> Self {
        ChunkedReader {
            data: data.as_ref().to_vec(),
            pos: 0,
            chunk: chunk.max(1),
        }
    }
}

impl AsyncRead for ChunkedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let len = this
            .chunk
            .min(buf.remaining())
            .min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + len]);
        this.pos += len;
        Poll::Ready(Ok(()))
    }
}

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
