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

use std::{fmt::Write, io};

use crate::{
    lines::{break_on_record_separator, LineDrop, LineSource},
    transport::Transport,
};

const FLUSH_THRESHOLD: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipientType {
    To,
    Cc,
    Bcc,
    /// Kept in the chain but never sent to the server.
    Ignore,
}

impl RecipientType {
    /// Reads the type prefix of an input line: `+` Cc, `-` Bcc, `#` Ignore.
    pub fn from_prefix(ch: u8) -> Option<Self> {
        match ch {
            b'+' => Some(RecipientType::Cc),
            b'-' => Some(RecipientType::Bcc),
            b'#' => Some(RecipientType::Ignore),
            _ => None,
        }
    }

    pub fn header_name(&self) -> Option<&'static str> {
        match self {
            RecipientType::To => Some("To"),
            RecipientType::Cc => Some("Cc"),
            RecipientType::Bcc => Some("Bcc"),
            RecipientType::Ignore => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub rtype: RecipientType,
    pub address: String,
    /// Reply code to `RCPT TO`, 0 until the envelope has been sent.
    pub smtp_status: u16,
}

impl Recipient {
    pub fn new(rtype: RecipientType, address: impl Into<String>) -> Self {
        Recipient {
            rtype,
            address: address.into(),
            smtp_status: 0,
        }
    }

    /// Parses one input line, stripping the type prefix if present.
    pub fn parse(line: &[u8]) -> Self {
        let (rtype, address) = match line.first().copied().and_then(RecipientType::from_prefix) {
            Some(rtype) => (rtype, &line[1..]),
            None => (RecipientType::To, line),
        };
        Recipient::new(rtype, String::from_utf8_lossy(address.trim_ascii()))
    }

    pub fn is_accepted(&self) -> bool {
        (200..300).contains(&self.smtp_status)
    }
}

/// Recipients of one message, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientChain {
    recipients: Vec<Recipient>,
}

impl RecipientChain {
    /// Reads the recipient section: every non-empty line up to the section
    /// break becomes one entry. The break line itself is consumed.
    pub async fn from_lines<S: LineSource>(lines: &mut LineDrop<S>) -> io::Result<Self> {
        let mut recipients = Vec::new();

        if !lines.at_break() {
            while let Some(line) = lines.current() {
                if !line.is_empty() {
                    let recipient = Recipient::parse(line);
                    if recipient.address.is_empty() {
                        log::warn!("Skipping recipient line without address");
                    } else {
                        recipients.push(recipient);
                    }
                }
                if !lines.advance().await? {
                    break;
                }
            }
        }
        lines.next_section().await?;

        Ok(RecipientChain { recipients })
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Recipient> {
        self.recipients.iter_mut()
    }

    /// Recipients that will be offered to the server.
    pub fn count_unignored(&self) -> usize {
        self.iter()
            .filter(|r| r.rtype != RecipientType::Ignore)
            .count()
    }

    pub fn count_by_type_and_accepted(&self, rtype: RecipientType) -> usize {
        self.iter()
            .filter(|r| r.rtype == rtype && r.is_accepted())
            .count()
    }

    /// Recipients whose `RCPT TO` got a 2xx reply.
    pub fn count_accepted(&self) -> usize {
        self.iter().filter(|r| r.is_accepted()).count()
    }

    /// `To:`, `Cc:` or `Bcc:` line listing the accepted recipients of
    /// `rtype`, CRLF included. `None` when there are none.
    pub fn header_line(&self, rtype: RecipientType) -> Option<String> {
        let name = rtype.header_name()?;
        let addresses = self
            .iter()
            .filter(|r| r.rtype == rtype && r.is_accepted())
            .map(|r| r.address.as_str())
            .collect::<Vec<_>>();

        (!addresses.is_empty()).then(|| format!("{}: {}\r\n", name, addresses.join(", ")))
    }

    /// One line per recipient: type, status and address.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for recipient in self.iter() {
            let _ = writeln!(
                out,
                "{:<6} {:>3} {}",
                format!("{:?}", recipient.rtype),
                recipient.smtp_status,
                recipient.address
            );
        }
        out
    }
}

impl FromIterator<Recipient> for RecipientChain {
    fn from_iter<I: IntoIterator<Item = Recipient>>(iter: I) -> Self {
        RecipientChain {
            recipients: iter.into_iter().collect(),
        }
    }
}

/// Whether `line` starts a `To`, `Cc` or `Bcc` header.
fn is_recipient_header(line: &[u8]) -> bool {
    line.iter()
        .position(|&ch| ch == b':')
        .map(|colon| line[..colon].trim_ascii())
        .is_some_and(|name| {
            [b"To".as_slice(), b"Cc", b"Bcc"]
                .iter()
                .any(|header| name.eq_ignore_ascii_case(header))
        })
}

struct Output<'x, T> {
    transport: &'x mut T,
    buf: Vec<u8>,
    written: usize,
}

impl<T: Transport> Output<'_, T> {
    async fn line(&mut self, line: &[u8]) -> io::Result<()> {
        self.buf.extend_from_slice(line);
        self.buf.extend_from_slice(b"\r\n");
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.written += self.transport.send(&self.buf).await?;
            self.buf.clear();
        }
        Ok(())
    }
}

/// Writes the DATA payload of one message and returns the bytes sent.
///
/// In order: the synthesized recipient headers, the header section of
/// `lines` minus any `To`, `Cc` or `Bcc` headers it carries, a blank line,
/// the body up to the record separator line, and the closing `.` line.
/// Body lines are sent verbatim, leading dots included.
pub async fn write_message<T: Transport, S: LineSource>(
    transport: &mut T,
    chain: &RecipientChain,
    lines: &mut LineDrop<S>,
) -> io::Result<usize> {
    let mut out = Output {
        transport,
        buf: Vec::with_capacity(FLUSH_THRESHOLD + 1024),
        written: 0,
    };

    for rtype in [RecipientType::To, RecipientType::Cc, RecipientType::Bcc] {
        if let Some(header) = chain.header_line(rtype) {
            out.buf.extend_from_slice(header.as_bytes());
        }
    }

    // Header section
    if !lines.at_break() {
        let mut dropping = false;
        while let Some(line) = lines.current() {
            let folded = matches!(line.first(), Some(b' ' | b'\t'));
            if !folded {
                dropping = is_recipient_header(line);
            }
            if dropping {
                log::debug!("Dropping recipient header {:?}", String::from_utf8_lossy(line));
            } else {
                out.line(line).await?;
            }
            if !lines.advance().await? {
                break;
            }
        }
    }
    lines.next_section().await?;
    out.line(b"").await?;

    // Body
    let previous = lines.set_break_check(Some(break_on_record_separator));
    if !lines.at_break() {
        while let Some(line) = lines.current() {
            out.line(line).await?;
            if !lines.advance().await? {
                break;
            }
        }
    }
    lines.next_section().await?;
    lines.set_break_check(previous);

    out.line(b".").await?;
    out.flush().await?;
    Ok(out.written)
}

/// Consumes the header and body sections of a message without sending
/// them, leaving `lines` at the start of the next one.
pub async fn skip_message<S: LineSource>(lines: &mut LineDrop<S>) -> io::Result<()> {
    if !lines.at_break() {
        while lines.advance().await? {}
    }
    lines.next_section().await?;

    let previous = lines.set_break_check(Some(break_on_record_separator));
    if !lines.at_break() {
        while lines.advance().await? {}
    }
    lines.next_section().await?;
    lines.set_break_check(previous);
    Ok(())
}
