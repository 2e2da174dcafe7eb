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

use std::fmt::Display;

pub const MAX_MESSAGE_LENGTH: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    PositiveCompletion = 2,
    PositiveIntermediate = 3,
    TransientNegativeCompletion = 4,
    PermanentNegativeCompletion = 5,
    Invalid = 0,
}

/// A complete, possibly multi-line, server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    message: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Reply {
            code,
            message: vec![message.into()],
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &[String] {
        &self.message
    }

    pub fn severity(&self) -> Severity {
        match self.code / 100 {
            2 => Severity::PositiveCompletion,
            3 => Severity::PositiveIntermediate,
            4 => Severity::TransientNegativeCompletion,
            5 => Severity::PermanentNegativeCompletion,
            _ => Severity::Invalid,
        }
    }

    pub fn is_positive_completion(&self) -> bool {
        self.severity() == Severity::PositiveCompletion
    }

    pub fn is_positive_intermediate(&self) -> bool {
        self.severity() == Severity::PositiveIntermediate
    }

    /// Status 400 and above.
    pub fn is_negative(&self) -> bool {
        self.code >= 400
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code)?;
        for (pos, line) in self.message.iter().enumerate() {
            f.write_str(if pos == 0 { " " } else { " / " })?;
            f.write_str(line)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidReplyCode,
    InvalidSeparator,
    IncompleteReply,
    CodeMismatch,
    MessageTooLong,
    NeedsMoreData,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidReplyCode => write!(f, "invalid reply code"),
            Error::InvalidSeparator => write!(f, "invalid separator after reply code"),
            Error::IncompleteReply => write!(f, "connection closed before reply was complete"),
            Error::CodeMismatch => write!(f, "reply code changed within multi-line reply"),
            Error::MessageTooLong => write!(f, "reply text too long"),
            Error::NeedsMoreData => write!(f, "more data needed"),
        }
    }
}

enum State {
    FirstDigit,
    SecondDigit,
    ThirdDigit,
    Separator,
    Text,
}

/// Incremental reply parser. Feed it whatever the transport returned until
/// it stops answering [`Error::NeedsMoreData`].
pub struct ReplyParser {
    code: u16,
    current_code: u16,
    state: State,
    is_last: bool,
    buf: Vec<u8>,
    message: Vec<String>,
    message_len: usize,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self {
            code: u16::MAX,
            current_code: 0,
            state: State::FirstDigit,
            buf: Vec::with_capacity(128),
            is_last: false,
            message: Vec::with_capacity(4),
            message_len: 0,
        }
    }
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.state = State::FirstDigit;
        self.code = u16::MAX;
        self.current_code = 0;
        self.message_len = 0;
        self.is_last = false;
        self.buf.clear();
        self.message.clear();
    }

    fn fail(&mut self, err: Error) -> Result<Reply, Error> {
        self.reset();
        Err(err)
    }

    pub fn parse(&mut self, bytes: &[u8]) -> Result<Reply, Error> {
        for &byte in bytes {
            match self.state {
                State::FirstDigit | State::SecondDigit | State::ThirdDigit => {
                    if !byte.is_ascii_digit() {
                        return self.fail(Error::InvalidReplyCode);
                    }
                    self.current_code = self.current_code * 10 + (byte - b'0') as u16;
                    self.state = match self.state {
                        State::FirstDigit => State::SecondDigit,
                        State::SecondDigit => State::ThirdDigit,
                        _ => State::Separator,
                    };
                }
                State::Separator => {
                    match byte {
                        b' ' => self.is_last = true,
                        b'-' => (),
                        // Bare "250\r\n" is tolerated as a final line.
                        b'\r' | b'\n' => self.is_last = true,
                        _ => return self.fail(Error::InvalidSeparator),
                    }

                    if self.code == u16::MAX {
                        self.code = self.current_code;
                    } else if self.code != self.current_code {
                        return self.fail(Error::CodeMismatch);
                    }
                    self.current_code = 0;
                    self.state = State::Text;

                    if byte == b'\n' {
                        return Ok(self.finish());
                    }
                }
                State::Text => match byte {
                    b'\n' => {
                        if !self.buf.is_empty() {
                            self.message
                                .push(String::from_utf8_lossy(&self.buf).into_owned());
                            self.buf.clear();
                        }
                        self.state = State::FirstDigit;

                        if self.is_last {
                            return Ok(self.finish());
                        }
                    }
                    b'\r' => (),
                    _ => {
                        if self.message_len < MAX_MESSAGE_LENGTH {
                            self.buf.push(byte);
                            self.message_len += 1;
                        } else {
                            return self.fail(Error::MessageTooLong);
                        }
                    }
                },
            }
        }

        Err(Error::NeedsMoreData)
    }

    fn finish(&mut self) -> Reply {
        let reply = Reply {
            code: self.code,
            message: std::mem::take(&mut self.message),
        };
        self.reset();
        reply
    }
}

#[cfg(test)]
mod test {
    use crate::smtp::reply::{Error, ReplyParser, Severity, MAX_MESSAGE_LENGTH};

    #[test]
    fn reply_parser() {
        let mut parser = ReplyParser::new();

        let reply = parser
            .parse(b"250-smtp.example.com greets you\r\n250-PIPELINING\r\n250-234 starts with digits\r\n250 AUTH PLAIN\r\n")
            .unwrap();
        assert_eq!(reply.code(), 250);
        assert_eq!(reply.severity(), Severity::PositiveCompletion);
        assert_eq!(
            reply.message(),
            &[
                "smtp.example.com greets you",
                "PIPELINING",
                "234 starts with digits",
                "AUTH PLAIN"
            ]
        );

        let reply = parser.parse(b"334 VXNlcm5hbWU6\r\n").unwrap();
        assert!(reply.is_positive_intermediate());
        assert_eq!(reply.message(), &["VXNlcm5hbWU6"]);

        // Reply split across reads
        assert_eq!(
            parser.parse(b"554-Transaction\r\n554 fa"),
            Err(Error::NeedsMoreData)
        );
        let reply = parser.parse(b"iled\r\n").unwrap();
        assert_eq!(reply.code(), 554);
        assert_eq!(reply.severity(), Severity::PermanentNegativeCompletion);
        assert_eq!(reply.to_string(), "554 Transaction / failed");

        // Code without text
        assert_eq!(parser.parse(b"250\r\n").unwrap().code(), 250);

        assert_eq!(
            parser.parse(b"421-Closing\r\n250 OK\r\n"),
            Err(Error::CodeMismatch)
        );
        assert_eq!(parser.parse(b"2z0 OK\r\n"), Err(Error::InvalidReplyCode));
        assert_eq!(parser.parse(b"250OK\r\n"), Err(Error::InvalidSeparator));

        let mut long_reply = Vec::new();
        (0..MAX_MESSAGE_LENGTH + 1).for_each(|_| long_reply.extend_from_slice(b"250-a\r\n"));
        long_reply.extend_from_slice(b"250 a\r\n");
        assert_eq!(parser.parse(&long_reply), Err(Error::MessageTooLong));

        // Errors leave the parser ready for the next reply
        assert_eq!(parser.parse(b"221 Bye\r\n").unwrap().message(), &["Bye"]);
    }
}
