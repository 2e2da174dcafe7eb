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

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::LineSource;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Line source over a byte stream, backed by a fixed working buffer.
///
/// Lines end at `\n`; a `\r` right before it is dropped. A line longer
/// than the capacity is handed out truncated and its remainder becomes the
/// next line. End of input terminates a final unterminated line.
pub struct StreamLines<R> {
    reader: R,
    // capacity plus room for the CRLF of a line that fills it
    buf: Box<[u8]>,
    capacity: usize,
    start: usize,
    end: usize,
    // (end of content, start of the following line)
    line: Option<(usize, usize)>,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send> StreamLines<R> {
    pub async fn open(reader: R) -> io::Result<Self> {
        Self::with_capacity(reader, DEFAULT_CAPACITY).await
    }

    /// Fills the buffer and stages the first line. `capacity` is the
    /// longest line content handed out whole.
    pub async fn with_capacity(reader: R, capacity: usize) -> io::Result<Self> {
        let capacity = capacity.max(1);
        let mut lines = StreamLines {
            reader,
            buf: vec![0u8; capacity + 2].into_boxed_slice(),
            capacity,
            start: 0,
            end: 0,
            line: None,
            eof: false,
        };
        lines.stage().await?;
        Ok(lines)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    async fn stage(&mut self) -> io::Result<()> {
        loop {
            if let Some(pos) = self.buf[self.start..self.end]
                .iter()
                .position(|&ch| ch == b'\n')
            {
                let nl = self.start + pos;
                let content_end = if nl > self.start && self.buf[nl - 1] == b'\r' {
                    nl - 1
                } else {
                    nl
                };
                self.line = Some(if content_end - self.start > self.capacity {
                    self.truncated()
                } else {
                    (content_end, nl + 1)
                });
                return Ok(());
            } else if self.eof {
                self.line = (self.start < self.end).then(|| {
                    if self.end - self.start > self.capacity {
                        self.truncated()
                    } else {
                        (self.end, self.end)
                    }
                });
                return Ok(());
            } else if self.start == 0 && self.end == self.buf.len() {
                self.line = Some(self.truncated());
                return Ok(());
            }

            if self.start > 0 {
                self.buf.copy_within(self.start..self.end, 0);
                self.end -= self.start;
                self.start = 0;
            }

            let br = self.reader.read(&mut self.buf[self.end..]).await?;
            if br > 0 {
                self.end += br;
            } else {
                self.eof = true;
            }
        }
    }

    fn truncated(&self) -> (usize, usize) {
        log::debug!("Line exceeds {} bytes, truncating", self.capacity);
        let end = self.start + self.capacity;
        (end, end)
    }
}

impl<R: AsyncRead + Unpin + Send> LineSource for StreamLines<R> {
    fn current(&self) -> Option<&[u8]> {
        self.line.map(|(end, _)| &self.buf[self.start..end])
    }

    async fn advance(&mut self) -> io::Result<bool> {
        match self.line.take() {
            Some((_, next)) => {
                self.start = next;
                self.stage().await?;
                Ok(self.line.is_some())
            }
            None => Ok(false),
        }
    }

    fn is_spent(&self) -> bool {
        self.line.is_none()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        lines::{test::collect, LineSource, StreamLines},
        transport::mock::ChunkedReader,
    };

    const INPUT: &str = concat!(
        "jane@example.com\r\n",
        "+john@example.com\n",
        "\r\n",
        "Subject: carriage\rreturn\r\n",
        "\n",
        "body line one\r\n",
        "unterminated tail"
    );

    #[tokio::test]
    async fn chunking_invariance() {
        let expected = [
            "jane@example.com",
            "+john@example.com",
            "",
            "Subject: carriage\rreturn",
            "",
            "body line one",
            "unterminated tail",
        ];
        let whole = collect(
            StreamLines::with_capacity(ChunkedReader::new(INPUT, INPUT.len()), 64)
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(whole, expected);

        // The longest line holds 24 bytes: sweep capacities that it fills
        // exactly or nearly, so lines straddle every refill boundary.
        for capacity in [24, 25, 26, 27, 64] {
            for chunk in 1..INPUT.len() {
                let lines = collect(
                    StreamLines::with_capacity(ChunkedReader::new(INPUT, chunk), capacity)
                        .await
                        .unwrap(),
                )
                .await;
                assert_eq!(lines, whole, "capacity {capacity}, chunk size {chunk}");
            }
        }
    }

    #[tokio::test]
    async fn spent_is_idempotent() {
        let mut lines = StreamLines::open(ChunkedReader::new("one\ntwo\n", 3))
            .await
            .unwrap();
        assert_eq!(lines.current(), Some(&b"one"[..]));
        assert!(lines.advance().await.unwrap());
        assert_eq!(lines.current(), Some(&b"two"[..]));
        assert!(!lines.advance().await.unwrap());
        for _ in 0..3 {
            assert!(lines.is_spent());
            assert!(lines.current().is_none());
            assert!(!lines.advance().await.unwrap());
        }

        let empty = StreamLines::open(ChunkedReader::new("", 1)).await.unwrap();
        assert!(empty.is_spent());
    }

    #[tokio::test]
    async fn oversized_lines() {
        // A line filling the whole buffer is surfaced as-is.
        let lines = StreamLines::with_capacity(ChunkedReader::new("01234567", 16), 8)
            .await
            .unwrap();
        assert_eq!(collect(lines).await, ["01234567"]);

        // Longer lines are split at the buffer boundary.
        let lines = StreamLines::with_capacity(ChunkedReader::new("0123456789\nab\n", 3), 8)
            .await
            .unwrap();
        assert_eq!(collect(lines).await, ["01234567", "89", "ab"]);

        // Lines that fill the capacity keep their terminator handling.
        for chunk in [1, 3, 8, 16] {
            for (input, expected) in [
                ("0123456\r\nrest\n", ["0123456", "rest"]),
                ("01234567\nrest\n", ["01234567", "rest"]),
                ("01234567\r\nrest\n", ["01234567", "rest"]),
            ] {
                let lines = StreamLines::with_capacity(ChunkedReader::new(input, chunk), 8)
                    .await
                    .unwrap();
                assert_eq!(collect(lines).await, expected, "{input:?} chunk size {chunk}");
            }
        }

        // Overlong lines never leave an empty line behind.
        let lines = StreamLines::with_capacity(ChunkedReader::new("012345678\r\nrest", 2), 8)
            .await
            .unwrap();
        assert_eq!(collect(lines).await, ["01234567", "8", "rest"]);
        let lines = StreamLines::with_capacity(ChunkedReader::new("0123456789", 4), 8)
            .await
            .unwrap();
        assert_eq!(collect(lines).await, ["01234567", "89"]);
    }
}
