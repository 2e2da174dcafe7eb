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

//! Byte conduits the SMTP session talks through.
//!
//! A [`Transport`] is anything that can `send` bytes and `receive` bytes.
//! The session is written once against this trait and runs unchanged over a
//! plain [`TcpStream`], a TLS session wrapping that socket, or a [`Sink`]
//! that only writes (used to preview outgoing data offline).

pub mod sink;
pub mod stream;

#[cfg(test)]
pub(crate) mod mock;

use std::{future::Future, io, time::Duration};

use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
};

pub use sink::Sink;

/// A connected byte stream carrying the SMTP dialogue.
///
/// Implementations do no buffering of their own on the read side; the
/// session and the line sources own their buffers.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send {
    /// Returns `true` when the conduit is protected by TLS.
    fn is_secure(&self) -> bool {
        false
    }

    /// Writes all of `bytes` and flushes, returning the number of bytes written.
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            self.write_all(bytes).await?;
            self.flush().await?;
            Ok(bytes.len())
        }
    }

    /// Reads whatever is available into `buf`. `Ok(0)` means the peer closed
    /// the connection.
    fn receive(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move { self.read(buf).await }
    }

    /// Concatenates `parts` and sends them followed by CRLF.
    fn send_line(&mut self, parts: &[&str]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let mut line = String::with_capacity(parts.iter().map(|p| p.len()).sum::<usize>() + 2);
            for part in parts {
                line.push_str(part);
            }
            line.push_str("\r\n");
            self.send(line.as_bytes()).await
        }
    }

    /// Performs a single read into `buf`.
    ///
    /// Nothing is assumed about line boundaries: a reply longer than `buf`
    /// comes back truncated and the caller is expected to read again.
    fn receive_line(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send {
        async move {
            let br = self.receive(buf).await?;
            log::trace!("<- {:?}", String::from_utf8_lossy(&buf[..br]));
            Ok(br)
        }
    }
}

/// Resolves `addr` and opens a TCP connection to it.
///
/// This is the only place the crate touches DNS or sockets directly; every
/// other component receives an already connected [`Transport`].
pub async fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> crate::Result<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| crate::Error::Timeout)?
        .map_err(crate::Error::Connect)?;
    if let Ok(peer) = stream.peer_addr() {
        log::debug!("Connected to {}", peer);
    }
    Ok(stream)
}
