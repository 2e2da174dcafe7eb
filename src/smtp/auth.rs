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

use std::{borrow::Cow, fmt::Display};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::{transport::Transport, SmtpClient, State};

use super::reply::Reply;

#[derive(Clone)]
pub struct Credentials<'x> {
    username: Cow<'x, str>,
    secret: Cow<'x, str>,
}

impl<'x> From<(&'x str, &'x str)> for Credentials<'x> {
    fn from(credentials: (&'x str, &'x str)) -> Self {
        Credentials {
            username: credentials.0.into(),
            secret: credentials.1.into(),
        }
    }
}

impl<'x> From<(String, String)> for Credentials<'x> {
    fn from(credentials: (String, String)) -> Self {
        Credentials {
            username: credentials.0.into(),
            secret: credentials.1.into(),
        }
    }
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl<'x> Credentials<'x> {
    /// Creates a new `Credentials` instance.
    pub fn new(
        username: impl Into<Cow<'x, str>>,
        secret: impl Into<Cow<'x, str>>,
    ) -> Credentials<'x> {
        Credentials {
            username: username.into(),
            secret: secret.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `AUTH PLAIN` initial response: base64 of `\0username\0secret`.
    pub(crate) fn encode_plain(&self) -> String {
        STANDARD.encode(format!("\u{0}{}\u{0}{}", self.username, self.secret))
    }

    pub(crate) fn encode_username(&self) -> String {
        STANDARD.encode(self.username.as_bytes())
    }

    pub(crate) fn encode_secret(&self) -> String {
        STANDARD.encode(self.secret.as_bytes())
    }

    /// Copies borrowed fields so the credentials can outlive their source.
    pub fn into_owned(self) -> Credentials<'static> {
        Credentials {
            username: Cow::Owned(self.username.into_owned()),
            secret: Cow::Owned(self.secret.into_owned()),
        }
    }
}

/// Why an authentication exchange failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The server did not answer, or answered with garbage.
    NoResponse,

    /// The `AUTH` command itself was refused.
    RequestRefused(Reply),

    /// The username step was refused.
    UsernameRefused(Reply),

    /// The final authorization was refused.
    CredentialsRefused(Reply),
}

impl Error {
    pub fn reply(&self) -> Option<&Reply> {
        match self {
            Error::NoResponse => None,
            Error::RequestRefused(reply)
            | Error::UsernameRefused(reply)
            | Error::CredentialsRefused(reply) => Some(reply),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NoResponse => write!(f, "No response from server"),
            Error::RequestRefused(r) => write!(f, "Authentication request refused: {}", r),
            Error::UsernameRefused(r) => write!(f, "Username refused: {}", r),
            Error::CredentialsRefused(r) => write!(f, "Credentials refused: {}", r),
        }
    }
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mechanism {
    Login,
    Plain,
    PlainClientToken,
    Gssapi,
    DigestMd5,
    CramMd5,
    OAuth10a,
    OAuthBearer,
    XOAuth,
    XOAuth2,
}

/// Preference order used when the caller supplies none.
pub const DEFAULT_MECHANISMS: &[Mechanism] = &[Mechanism::Plain, Mechanism::Login];

impl Mechanism {
    pub const ALL: [Mechanism; 10] = [
        Mechanism::Login,
        Mechanism::Plain,
        Mechanism::PlainClientToken,
        Mechanism::Gssapi,
        Mechanism::DigestMd5,
        Mechanism::CramMd5,
        Mechanism::OAuth10a,
        Mechanism::OAuthBearer,
        Mechanism::XOAuth,
        Mechanism::XOAuth2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::Login => "LOGIN",
            Mechanism::Plain => "PLAIN",
            Mechanism::PlainClientToken => "PLAIN-CLIENTTOKEN",
            Mechanism::Gssapi => "GSSAPI",
            Mechanism::DigestMd5 => "DIGEST-MD5",
            Mechanism::CramMd5 => "CRAM-MD5",
            Mechanism::OAuth10a => "OAUTH10A",
            Mechanism::OAuthBearer => "OAUTHBEARER",
            Mechanism::XOAuth => "XOAUTH",
            Mechanism::XOAuth2 => "XOAUTH2",
        }
    }

    /// Case-insensitive, whole-token lookup.
    pub fn parse(token: &str) -> Option<Self> {
        Mechanism::ALL
            .into_iter()
            .find(|mechanism| mechanism.as_str().eq_ignore_ascii_case(token))
    }

    /// Whether this client can run the mechanism.
    pub fn is_supported(&self) -> bool {
        matches!(self, Mechanism::Login | Mechanism::Plain)
    }
}

impl Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T: Transport> SmtpClient<T> {
    /// Authenticates with the first mechanism in `preference` that both
    /// sides support. An empty preference means [`DEFAULT_MECHANISMS`].
    pub async fn authenticate(
        &mut self,
        credentials: &Credentials<'_>,
        preference: &[Mechanism],
    ) -> crate::Result<Mechanism> {
        let preference = if preference.is_empty() {
            DEFAULT_MECHANISMS
        } else {
            preference
        };
        let mechanism = preference
            .iter()
            .copied()
            .find(|m| m.is_supported() && self.capabilities.auth.has(*m))
            .ok_or(crate::Error::UnsupportedAuthMechanism)?;

        match mechanism {
            Mechanism::Plain => self.auth_plain(credentials).await?,
            _ => self.auth_login(credentials).await?,
        }

        log::debug!("Authenticated as {} using {}", credentials.username, mechanism);
        self.authenticated = true;
        self.set_state(State::Authenticated);
        Ok(mechanism)
    }

    /// `AUTH LOGIN`: username and secret in two challenge steps.
    pub async fn auth_login(&mut self, credentials: &Credentials<'_>) -> crate::Result<()> {
        log::debug!("-> AUTH LOGIN");
        let reply = self.auth_step(b"AUTH LOGIN\r\n").await?;
        if !reply.is_positive_intermediate() {
            return Err(Error::RequestRefused(reply).into());
        }

        log::debug!("-> <username>");
        let reply = self
            .auth_step(format!("{}\r\n", credentials.encode_username()).as_bytes())
            .await?;
        if !reply.is_positive_intermediate() {
            return Err(Error::UsernameRefused(reply).into());
        }

        log::debug!("-> <secret>");
        let reply = self
            .auth_step(format!("{}\r\n", credentials.encode_secret()).as_bytes())
            .await?;
        if !reply.is_positive_completion() {
            return Err(Error::CredentialsRefused(reply).into());
        }

        Ok(())
    }

    /// `AUTH PLAIN` with the initial response on the command line.
    pub async fn auth_plain(&mut self, credentials: &Credentials<'_>) -> crate::Result<()> {
        log::debug!("-> AUTH PLAIN <credentials>");
        let reply = self
            .auth_step(format!("AUTH PLAIN {}\r\n", credentials.encode_plain()).as_bytes())
            .await?;
        if reply.is_positive_completion() {
            Ok(())
        } else if reply.is_positive_intermediate() {
            Err(Error::RequestRefused(reply).into())
        } else {
            Err(Error::CredentialsRefused(reply).into())
        }
    }

    async fn auth_step(&mut self, line: &[u8]) -> crate::Result<Reply> {
        match self.exchange(line).await {
            Err(crate::Error::Io(_) | crate::Error::UnparseableReply(_)) => {
                Err(Error::NoResponse.into())
            }
            result => result,
        }
    }
}
