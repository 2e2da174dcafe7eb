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

use crate::{transport::Transport, SmtpClient, State};

use super::{
    capability::Capabilities,
    reply::{self, Reply},
};

/// Room for the longest EHLO response the client accepts.
pub const MAX_EHLO_LENGTH: usize = 4096;

/// Reads from `transport` until `buf` holds a complete multi-line EHLO
/// response and returns its length.
///
/// The response is complete at the first line whose code is followed by a
/// space. A line with a status of 400 or above ends collection with
/// [`crate::Error::UnexpectedReply`].
pub async fn read_complete_ehlo_response<T: Transport>(
    transport: &mut T,
    buf: &mut [u8],
) -> crate::Result<usize> {
    let mut len = 0;
    let mut line_start = 0;

    loop {
        if len == buf.len() {
            return Err(reply::Error::MessageTooLong.into());
        }
        let br = transport.receive_line(&mut buf[len..]).await?;
        if br == 0 {
            return Err(reply::Error::IncompleteReply.into());
        }
        len += br;

        while let Some(pos) = buf[line_start..len].iter().position(|&ch| ch == b'\n') {
            let line = &buf[line_start..line_start + pos];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            line_start += pos + 1;

            let code = match line.get(0..3) {
                Some(digits) if digits.iter().all(u8::is_ascii_digit) => digits
                    .iter()
                    .fold(0u16, |code, digit| code * 10 + (digit - b'0') as u16),
                _ => return Err(reply::Error::InvalidReplyCode.into()),
            };

            if code >= 400 {
                let text = String::from_utf8_lossy(line.get(4..).unwrap_or_default());
                return Err(crate::Error::UnexpectedReply {
                    command: "EHLO",
                    reply: Reply::new(code, text),
                });
            }

            match line.get(3) {
                Some(b'-') => (),
                Some(b' ') | None => return Ok(line_start),
                Some(_) => return Err(reply::Error::InvalidSeparator.into()),
            }
        }
    }
}

impl<T: Transport> SmtpClient<T> {
    /// Sends EHLO and replaces the capability table with the server's answer.
    pub async fn ehlo(&mut self) -> crate::Result<&Capabilities> {
        let mut buf = vec![0u8; MAX_EHLO_LENGTH];

        let len = tokio::time::timeout(self.timeout, async {
            log::debug!("-> EHLO {}", self.local_host);
            self.stream
                .send_line(&["EHLO ", self.local_host.as_str()])
                .await?;
            read_complete_ehlo_response(&mut self.stream, &mut buf).await
        })
        .await
        .map_err(|_| crate::Error::Timeout)??;

        let mut capabilities = Capabilities::default();
        capabilities.parse_ehlo_response(&buf[..len]);
        log::debug!("Server capabilities: {}", capabilities.dump());

        self.capabilities = capabilities;
        self.set_state(State::CapsKnown);
        Ok(&self.capabilities)
    }
}
