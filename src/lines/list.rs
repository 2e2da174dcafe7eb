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

use std::{future::Future, io};

use super::LineSource;

/// In-memory line source.
#[derive(Debug, Clone, Default)]
pub struct ListLines {
    lines: Vec<Vec<u8>>,
    pos: usize,
}

impl ListLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        ListLines {
            lines: lines.into_iter().map(|l| l.as_ref().to_vec()).collect(),
            pos: 0,
        }
    }

    /// Splits `text` on `\n`, dropping a `\r` before it.
    pub fn from_text(text: &str) -> Self {
        let text = text.strip_suffix('\n').unwrap_or(text);
        ListLines::new(text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)))
    }
}

impl LineSource for ListLines {
    fn current(&self) -> Option<&[u8]> {
        self.lines.get(self.pos).map(|l| l.as_slice())
    }

    fn advance(&mut self) -> impl Future<Output = io::Result<bool>> + Send {
        if self.pos < self.lines.len() {
            self.pos += 1;
        }
        std::future::ready(Ok(self.pos < self.lines.len()))
    }
}

#[cfg(test)]
mod test {
    use crate::lines::{test::collect, LineSource, ListLines};

    #[tokio::test]
    async fn list_roundtrip() {
        let input = ["To: someone", "", "  indented\ttext ", "last"];
        assert_eq!(collect(ListLines::new(input)).await, input);

        assert_eq!(
            collect(ListLines::from_text("a\r\nb\n\nc\n")).await,
            ["a", "b", "", "c"]
        );
    }

    #[tokio::test]
    async fn spent_is_idempotent() {
        let mut lines = ListLines::new(["only"]);
        assert!(!lines.is_spent());
        assert!(!lines.advance().await.unwrap());
        for _ in 0..3 {
            assert!(!lines.advance().await.unwrap());
            assert!(lines.current().is_none());
            assert!(lines.is_spent());
        }

        let empty = ListLines::new(Vec::<&str>::new());
        assert!(empty.is_spent());
    }
}
