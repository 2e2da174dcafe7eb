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

use crate::{
    lines::{LineDrop, LineSource},
    transport::Transport,
    SmtpClient, State,
};

use super::{
    message::{self, RecipientChain, RecipientType},
    reply::Reply,
    AssertReply,
};

/// Outcome of a submitted message.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Every recipient with the status the server gave it.
    pub recipients: RecipientChain,
    pub accepted: usize,
    /// Final reply to the end of data.
    pub reply: Reply,
}

impl<T: Transport> SmtpClient<T> {
    /// Sends a MAIL FROM command to the server.
    pub async fn mail_from(&mut self, from: &str) -> crate::Result<()> {
        self.cmd(format!("MAIL FROM:<{from}>\r\n").as_bytes())
            .await?
            .assert_positive_completion("MAIL FROM")?;
        self.set_state(State::EnvelopeOpen);
        Ok(())
    }

    /// Sends a RCPT TO command and returns the reply, whatever its code.
    pub async fn rcpt_to(&mut self, to: &str) -> crate::Result<Reply> {
        self.cmd(format!("RCPT TO:<{to}>\r\n").as_bytes()).await
    }

    /// Opens the transaction and offers every recipient not marked
    /// `Ignore`, one at a time, stamping each with its reply code.
    ///
    /// Returns the number of recipients the server accepted, as counted
    /// from the stamped chain.
    pub async fn send_envelope(
        &mut self,
        from: &str,
        chain: &mut RecipientChain,
    ) -> crate::Result<usize> {
        self.mail_from(from).await?;

        for recipient in chain
            .iter_mut()
            .filter(|r| r.rtype != RecipientType::Ignore)
        {
            let reply = self.rcpt_to(&recipient.address).await?;
            recipient.smtp_status = reply.code();
            if !reply.is_positive_completion() {
                log::warn!("Recipient <{}> rejected: {}", recipient.address, reply);
            }
        }

        Ok(chain.count_accepted())
    }

    /// Sends DATA and expects the server to ask for the message.
    pub async fn data(&mut self) -> crate::Result<()> {
        self.cmd(b"DATA\r\n")
            .await?
            .assert_positive_intermediate("DATA")?;
        self.set_state(State::DataSent);
        Ok(())
    }

    /// Submits the next message of `lines`: recipient section, header
    /// section, then the body up to the record separator.
    ///
    /// When the server accepts none of the recipients the transaction is
    /// reset, the rest of the message is skipped and
    /// [`crate::Error::NoRecipientsAccepted`] is returned; the session
    /// stays usable for the next message. A refused `DATA` is handled the
    /// same way.
    pub async fn send_message<S: LineSource>(
        &mut self,
        lines: &mut LineDrop<S>,
    ) -> crate::Result<Delivery> {
        let sender = self.sender.clone().ok_or(crate::Error::MissingMailFrom)?;
        let mut chain = RecipientChain::from_lines(lines).await?;

        if chain.count_unignored() == 0 {
            log::warn!("Message has no recipients to offer");
            message::skip_message(lines).await?;
            return Err(crate::Error::NoRecipientsAccepted);
        }

        let accepted = match self.send_envelope(&sender, &mut chain).await {
            Ok(accepted) => accepted,
            Err(err) => {
                message::skip_message(lines).await?;
                return Err(err);
            }
        };
        log::debug!("Envelope sent:\n{}", chain.dump());

        if accepted == 0 {
            message::skip_message(lines).await?;
            self.rset().await?;
            return Err(crate::Error::NoRecipientsAccepted);
        }

        if let Err(err) = self.data().await {
            message::skip_message(lines).await?;
            if err.reply().is_some() {
                if let Err(rset_err) = self.rset().await {
                    log::debug!("RSET after refused DATA failed: {}", rset_err);
                }
            }
            return Err(err);
        }

        tokio::time::timeout(
            self.timeout,
            message::write_message(&mut self.stream, &chain, lines),
        )
        .await
        .map_err(|_| crate::Error::Timeout)??;

        let reply = self.read_reply().await?;
        let idle = self.idle_state();
        self.set_state(idle);
        let reply = reply.assert_positive_completion(".")?;

        Ok(Delivery {
            recipients: chain,
            accepted,
            reply,
        })
    }
}
