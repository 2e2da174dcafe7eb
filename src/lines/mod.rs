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

//! Line sources.
//!
//! Recipients, headers and body all arrive through one continuous input.
//! A [`LineSource`] hands that input out one logical line at a time, and a
//! [`LineDrop`] layers a break predicate on top so each consumer stops at
//! the end of its own section without the source itself being spent.

pub mod list;
pub mod stream;

use std::{future::Future, io};

pub use list::ListLines;
pub use stream::StreamLines;

/// Terminates the message body.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Predicate deciding whether the staged line ends the current section.
pub type BreakCheck = fn(&[u8]) -> bool;

/// A lazy sequence of lines with a single staged line.
pub trait LineSource: Send {
    /// The staged line without its terminator, or `None` once spent.
    fn current(&self) -> Option<&[u8]>;

    /// Moves past the staged line. Returns `true` when another line has
    /// been staged and `false`, repeatedly, once the source is spent.
    fn advance(&mut self) -> impl Future<Output = io::Result<bool>> + Send;

    fn is_spent(&self) -> bool {
        self.current().is_none()
    }
}

/// Stops on a zero-length line.
pub fn break_on_empty_line(line: &[u8]) -> bool {
    line.is_empty()
}

/// Stops on a line consisting solely of [`RECORD_SEPARATOR`].
pub fn break_on_record_separator(line: &[u8]) -> bool {
    line == [RECORD_SEPARATOR]
}

/// Section-aware view over a [`LineSource`].
pub struct LineDrop<S> {
    source: S,
    break_check: Option<BreakCheck>,
}

impl<S: LineSource> LineDrop<S> {
    /// Wraps `source`, breaking on empty lines.
    pub fn new(source: S) -> Self {
        LineDrop {
            source,
            break_check: Some(break_on_empty_line),
        }
    }

    /// Installs a new break predicate and returns the previous one, so a
    /// consumer can restore it once its section has been read.
    pub fn set_break_check(&mut self, check: Option<BreakCheck>) -> Option<BreakCheck> {
        std::mem::replace(&mut self.break_check, check)
    }

    pub fn break_check(&self) -> Option<BreakCheck> {
        self.break_check
    }

    pub fn current(&self) -> Option<&[u8]> {
        self.source.current()
    }

    /// Whether the staged line terminates the current section.
    pub fn at_break(&self) -> bool {
        match (self.break_check, self.source.current()) {
            (Some(check), Some(line)) => check(line),
            _ => false,
        }
    }

    /// Moves past the staged line. Returns `false` when the source is spent
    /// or the newly staged line is a section break.
    pub async fn advance(&mut self) -> io::Result<bool> {
        Ok(self.source.advance().await? && !self.at_break())
    }

    /// Steps over the break line that ended the previous section. Returns
    /// whether a line is staged afterwards.
    pub async fn next_section(&mut self) -> io::Result<bool> {
        if self.at_break() {
            self.source.advance().await
        } else {
            Ok(!self.source.is_spent())
        }
    }

    pub fn is_spent(&self) -> bool {
        self.source.is_spent()
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod test {
    use crate::lines::{
        break_on_record_separator, LineDrop, LineSource, ListLines, RECORD_SEPARATOR,
    };

    pub(crate) async fn collect<S: LineSource>(mut source: S) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = source.current() {
            lines.push(String::from_utf8_lossy(line).into_owned());
            if !source.advance().await.unwrap() {
                break;
            }
        }
        lines
    }

    async fn section<S: LineSource>(drop: &mut LineDrop<S>) -> Vec<String> {
        let mut lines = Vec::new();
        if !drop.at_break() {
            while let Some(line) = drop.current() {
                lines.push(String::from_utf8_lossy(line).into_owned());
                if !drop.advance().await.unwrap() {
                    break;
                }
            }
        }
        drop.next_section().await.unwrap();
        lines
    }

    #[tokio::test]
    async fn sections_and_break_predicates() {
        let rs = String::from_utf8(vec![RECORD_SEPARATOR]).unwrap();
        let mut drop = LineDrop::new(ListLines::new([
            "jane@example.com",
            "+john@example.com",
            "",
            "Subject: hello",
            "",
            "first paragraph",
            "",
            "second paragraph",
            rs.as_str(),
            "next@example.com",
        ]));

        assert_eq!(
            section(&mut drop).await,
            ["jane@example.com", "+john@example.com"]
        );
        assert_eq!(section(&mut drop).await, ["Subject: hello"]);

        let previous = drop.set_break_check(Some(break_on_record_separator));
        assert_eq!(
            section(&mut drop).await,
            ["first paragraph", "", "second paragraph"]
        );
        let restored = drop.set_break_check(previous);
        assert!(restored.is_some_and(|check| check(&[RECORD_SEPARATOR]) && !check(b"")));
        assert!(drop.break_check().is_some_and(|check| check(b"")));

        assert_eq!(section(&mut drop).await, ["next@example.com"]);
        assert!(drop.is_spent());
        assert!(!drop.advance().await.unwrap());
        assert!(!drop.next_section().await.unwrap());
    }

    #[tokio::test]
    async fn leading_break_yields_empty_section() {
        let mut drop = LineDrop::new(ListLines::new(["", "Subject: x"]));
        assert!(drop.at_break());
        assert!(section(&mut drop).await.is_empty());
        assert_eq!(drop.current(), Some(&b"Subject: x"[..]));
    }

    #[tokio::test]
    async fn no_break_check_reads_everything() {
        let mut drop = LineDrop::new(ListLines::new(["a", "", "b"]));
        assert!(drop.set_break_check(None).is_some());
        assert_eq!(section(&mut drop).await, ["a", "", "b"]);
        assert!(drop.is_spent());
    }
}
