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

use tokio::io::AsyncWriteExt;

use crate::{transport::Transport, SmtpClient, State};

use super::{
    reply::{self, Reply, ReplyParser},
    AssertReply,
};

impl<T: Transport> SmtpClient<T> {
    pub(crate) async fn read(&mut self) -> crate::Result<Reply> {
        let mut buf = vec![0u8; 1024];
        let mut parser = ReplyParser::new();

        loop {
            let br = self.stream.receive_line(&mut buf).await?;

            if br == 0 {
                return Err(reply::Error::IncompleteReply.into());
            }

            match parser.parse(&buf[..br]) {
                Ok(reply) => return Ok(reply),
                Err(reply::Error::NeedsMoreData) => (),
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reads one reply, bounded by the session timeout.
    pub(crate) async fn read_reply(&mut self) -> crate::Result<Reply> {
        tokio::time::timeout(self.timeout, self.read())
            .await
            .map_err(|_| crate::Error::Timeout)?
    }

    /// Sends raw bytes and waits for the reply, without logging them.
    pub(crate) async fn exchange(&mut self, bytes: &[u8]) -> crate::Result<Reply> {
        tokio::time::timeout(self.timeout, async {
            self.stream.send(bytes).await?;
            self.read().await
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }

    /// Sends a command to the SMTP server and waits for a reply.
    pub async fn cmd(&mut self, cmd: impl AsRef<[u8]>) -> crate::Result<Reply> {
        let cmd = cmd.as_ref();
        log::debug!("-> {}", String::from_utf8_lossy(cmd).trim_end());
        self.exchange(cmd).await
    }

    /// Reads the server banner.
    pub async fn read_greeting(&mut self) -> crate::Result<Reply> {
        let reply = self
            .read_reply()
            .await?
            .assert_positive_completion("greeting")?;
        log::debug!("Greeting: {}", reply);
        self.set_state(State::Greeted);
        Ok(reply)
    }

    pub async fn noop(&mut self) -> crate::Result<()> {
        self.cmd(b"NOOP\r\n")
            .await?
            .assert_positive_completion("NOOP")?;
        Ok(())
    }

    /// Aborts the current mail transaction.
    pub async fn rset(&mut self) -> crate::Result<()> {
        self.cmd(b"RSET\r\n")
            .await?
            .assert_positive_completion("RSET")?;
        let idle = self.idle_state();
        self.set_state(idle);
        Ok(())
    }

    /// Sends QUIT, discards the reply and shuts the connection down.
    pub async fn quit(mut self) -> crate::Result<()> {
        let result = self.cmd(b"QUIT\r\n").await;
        self.set_state(State::Closed);
        if let Err(err) = self.stream.shutdown().await {
            log::debug!("Shutdown after QUIT failed: {}", err);
        }
        result.map(|reply| log::debug!("QUIT: {}", reply))
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::{
        smtp::reply,
        transport::mock::{init_logger, MockTransport},
        Error, SmtpClient, State,
    };

    fn client(replies: &[&str]) -> SmtpClient<MockTransport> {
        SmtpClient::new(
            MockTransport::new(replies),
            Duration::from_secs(5),
            "client.test",
        )
    }

    #[tokio::test]
    async fn greeting_and_simple_commands() {
        init_logger();
        let mut client = client(&[
            "220-smtp.example.com ESMTP\r\n220 ",
            "ready\r\n",
            "250 OK\r\n",
            "250 Reset\r\n",
            "221 Bye\r\n",
        ]);

        let greeting = client.read_greeting().await.unwrap();
        assert_eq!(greeting.message(), &["smtp.example.com ESMTP", "ready"]);
        assert_eq!(client.state(), State::Greeted);

        client.noop().await.unwrap();
        client.rset().await.unwrap();
        assert_eq!(client.state(), State::CapsKnown);
        client.quit().await.unwrap();
    }

    #[tokio::test]
    async fn quit_tolerates_failed_shutdown() {
        init_logger();
        let mut closing = client(&["221 Bye\r\n"]);
        closing.stream.fail_shutdown = true;
        closing.quit().await.unwrap();

        let mut dead = client(&[]);
        dead.stream.fail_shutdown = true;
        assert!(matches!(
            dead.quit().await,
            Err(Error::UnparseableReply(reply::Error::IncompleteReply))
        ));
    }

    #[tokio::test]
    async fn rejected_greeting() {
        let mut client = client(&["554 No service\r\n"]);
        match client.read_greeting().await {
            Err(Error::UnexpectedReply { command, reply }) => {
                assert_eq!(command, "greeting");
                assert_eq!(reply.code(), 554);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(client.state(), State::Connected);
    }

    #[tokio::test]
    async fn closed_and_garbled_replies() {
        let mut closed = client(&["250 partial"]);
        assert!(matches!(
            closed.cmd("NOOP\r\n").await,
            Err(Error::UnparseableReply(reply::Error::IncompleteReply))
        ));

        let mut garbled = client(&["hello\r\n"]);
        assert!(matches!(
            garbled.cmd("NOOP\r\n").await,
            Err(Error::UnparseableReply(reply::Error::InvalidReplyCode))
        ));
    }
}
