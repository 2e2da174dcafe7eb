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

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::{transport, transport::Transport, SmtpClient, SmtpClientBuilder};

use super::{
    auth::{Credentials, Mechanism},
    tls::build_tls_connector,
};

impl<T: AsRef<str>> SmtpClientBuilder<T> {
    pub fn new(hostname: T, port: u16) -> Self {
        SmtpClientBuilder {
            addr: format!("{}:{}", hostname.as_ref(), port),
            timeout: Duration::from_secs(60 * 60),
            tls_connector: build_tls_connector(false),
            tls_hostname: hostname,
            tls_implicit: true,
            local_host: gethostname::gethostname()
                .to_str()
                .unwrap_or("[127.0.0.1]")
                .to_string(),
            credentials: None,
            mechanisms: Vec::new(),
            sender: None,
        }
    }

    /// Allow invalid TLS certificates
    pub fn allow_invalid_certs(mut self) -> Self {
        self.tls_connector = build_tls_connector(true);
        self
    }

    /// Start connection in TLS or upgrade with STARTTLS
    pub fn implicit_tls(mut self, tls_implicit: bool) -> Self {
        self.tls_implicit = tls_implicit;
        self
    }

    /// Set the EHLO hostname
    pub fn helo_host(mut self, host: impl Into<String>) -> Self {
        self.local_host = host.into();
        self
    }

    /// Sets the SMTP connection timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Authenticate with these credentials once connected
    pub fn credentials<'x>(mut self, credentials: impl Into<Credentials<'x>>) -> Self {
        self.credentials = Some(credentials.into().into_owned());
        self
    }

    /// Order in which AUTH mechanisms are tried. Defaults to `PLAIN`, then `LOGIN`.
    pub fn mechanisms(mut self, mechanisms: impl IntoIterator<Item = Mechanism>) -> Self {
        self.mechanisms = mechanisms.into_iter().collect();
        self
    }

    /// Sets the `MAIL FROM` address
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    /// Connect over TLS
    pub async fn connect(&self) -> crate::Result<SmtpClient<TlsStream<TcpStream>>> {
        tokio::time::timeout(self.timeout, async {
            let client = SmtpClient::new(
                transport::connect(self.addr.as_str(), self.timeout).await?,
                self.timeout,
                self.local_host.as_str(),
            );

            let client = if self.tls_implicit {
                let mut client = client
                    .into_tls(&self.tls_connector, self.tls_hostname.as_ref())
                    .await?;
                client.read_greeting().await?;
                client.ehlo().await?;
                client
            } else {
                let mut client = client;
                client.read_greeting().await?;
                client.ehlo().await?;
                client
                    .start_tls(&self.tls_connector, self.tls_hostname.as_ref())
                    .await?
            };

            self.prepare(client).await
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }

    /// Connect over clear text (should not be used)
    pub async fn connect_plain(&self) -> crate::Result<SmtpClient<TcpStream>> {
        tokio::time::timeout(self.timeout, async {
            let mut client = SmtpClient::new(
                transport::connect(self.addr.as_str(), self.timeout).await?,
                self.timeout,
                self.local_host.as_str(),
            );
            client.read_greeting().await?;
            client.ehlo().await?;

            self.prepare(client).await
        })
        .await
        .map_err(|_| crate::Error::Timeout)?
    }

    async fn prepare<S: Transport>(&self, mut client: SmtpClient<S>) -> crate::Result<SmtpClient<S>> {
        if let Some(credentials) = &self.credentials {
            client.authenticate(credentials, &self.mechanisms).await?;
        }
        client.sender = self.sender.clone();
        Ok(client)
    }
}
