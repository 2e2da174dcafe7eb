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

//! # mail-submit
//!
//! _mail-submit_ is an asynchronous SMTP submission client. It connects to a
//! mail server, negotiates its capabilities, secures the connection and
//! authenticates before handing over an envelope and message read line by
//! line from any input:
//!
//! - Simple Mail Transfer Protocol (**SMTP**; _RFC 5321_) with per-recipient
//!   accept/reject tracking.
//! - SMTP Service Extension for Secure SMTP over **TLS** (_RFC 3207_), or
//!   implicit TLS on submission ports such as 465.
//! - SMTP Service Extension for Authentication (_RFC 4954_) with the `PLAIN`
//!   and `LOGIN` mechanisms.
//! - Line sources over any `AsyncRead` or an in-memory list, split into
//!   recipient, header and body sections by swappable break predicates.
//! - Full async (requires Tokio).
//!
//! ## Usage Example
//!
//! ```rust
//!     // Recipients, a blank line, headers, a blank line, then the body
//!     // terminated by a line holding a single 0x1E byte.
//!     let input = tokio::fs::File::open("job.txt").await.unwrap();
//!     let mut lines = LineDrop::new(StreamLines::open(input).await.unwrap());
//!
//!     // Connect over STARTTLS, authenticate and submit.
//!     let delivery = SmtpClientBuilder::new("smtp.example.com", 587)
//!         .implicit_tls(false)
//!         .credentials(("john", "p4ssw0rd"))
//!         .sender("john@example.com")
//!         .connect()
//!         .await
//!         .unwrap()
//!         .send_message(&mut lines)
//!         .await
//!         .unwrap();
//!
//!     println!("{}", delivery.recipients.dump());
//! ```
//!
//! ## License
//!
//! Licensed under either of
//!
//!  * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//!  * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.
//!

pub mod lines;
pub mod smtp;
#[forbid(unsafe_code)]
pub mod transport;

use std::{fmt::Display, time::Duration};

pub use smtp::{
    auth::{Credentials, Mechanism},
    capability::Capabilities,
    envelope::Delivery,
    message::{Recipient, RecipientChain, RecipientType},
    reply::Reply,
    tls::build_tls_connector,
};
pub use transport::{Sink, Transport};

use tokio_rustls::TlsConnector;

#[derive(Debug)]
pub enum Error {
    /// Could not establish the TCP connection.
    Connect(std::io::Error),

    /// I/O error
    Io(std::io::Error),

    /// Failure parsing SMTP reply
    UnparseableReply(smtp::reply::Error),

    /// Unexpected SMTP reply to `command`.
    UnexpectedReply {
        command: &'static str,
        reply: smtp::reply::Reply,
    },

    /// SMTP authentication failure.
    Auth(smtp::auth::Error),

    /// STARTTLS requested but not advertised by the server.
    MissingStartTls,

    /// Invalid TLS name provided.
    InvalidTLSName,

    /// TLS negotiation failed.
    Tls(rustls::Error),

    /// The server does no support any of the available authentication methods.
    UnsupportedAuthMechanism,

    /// Every recipient was rejected or ignored.
    NoRecipientsAccepted,

    /// Missing message sender.
    MissingMailFrom,

    /// Connection timeout.
    Timeout,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Where a session stands in the SMTP dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connected,
    Greeted,
    CapsKnown,
    TlsUpgrading,
    Authenticated,
    EnvelopeOpen,
    DataSent,
    Closed,
}

/// SMTP client session.
pub struct SmtpClient<T> {
    pub(crate) stream: T,
    pub(crate) timeout: Duration,
    pub(crate) capabilities: Capabilities,
    pub(crate) local_host: String,
    pub(crate) sender: Option<String>,
    pub(crate) state: State,
    pub(crate) authenticated: bool,
}

/// Connection parameters for an [`SmtpClient`].
#[derive(Clone)]
pub struct SmtpClientBuilder<T: AsRef<str>> {
    pub(crate) addr: String,
    pub(crate) timeout: Duration,
    pub(crate) tls_connector: TlsConnector,
    pub(crate) tls_hostname: T,
    pub(crate) tls_implicit: bool,
    pub(crate) local_host: String,
    pub(crate) credentials: Option<Credentials<'static>>,
    pub(crate) mechanisms: Vec<Mechanism>,
    pub(crate) sender: Option<String>,
}

impl<T> SmtpClient<T> {
    /// Wraps an already connected transport. The caller is expected to read
    /// the greeting next.
    pub fn new(stream: T, timeout: Duration, local_host: impl Into<String>) -> Self {
        SmtpClient {
            stream,
            timeout,
            capabilities: Capabilities::default(),
            local_host: local_host.into(),
            sender: None,
            state: State::Connected,
            authenticated: false,
        }
    }

    /// Sets the `MAIL FROM` address used by `send_message`.
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }

    pub(crate) fn set_state(&mut self, state: State) {
        if self.state != state {
            log::trace!("Session state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// State to fall back to once a mail transaction ends.
    pub(crate) fn idle_state(&self) -> State {
        if self.authenticated {
            State::Authenticated
        } else {
            State::CapsKnown
        }
    }
}

impl Error {
    /// The server reply behind this error, if any.
    pub fn reply(&self) -> Option<&smtp::reply::Reply> {
        match self {
            Error::UnexpectedReply { reply, .. } => Some(reply),
            Error::Auth(err) => err.reply(),
            _ => None,
        }
    }

    /// A 4xx reply, the same request may succeed later.
    pub fn is_transient(&self) -> bool {
        self.reply().is_some_and(|r| (400..500).contains(&r.code())) || matches!(self, Error::Timeout)
    }

    /// A 5xx reply, retrying the same request is pointless.
    pub fn is_permanent(&self) -> bool {
        self.reply().is_some_and(|r| r.code() >= 500)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Connect(err) | Error::Io(err) => Some(err),
            Error::Tls(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Connect(e) => write!(f, "Connection failed: {}", e),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::UnparseableReply(e) => write!(f, "Unparseable SMTP reply: {}", e),
            Error::UnexpectedReply { command, reply } => {
                write!(f, "Unexpected reply to {}: {}", command, reply)
            }
            Error::Auth(e) => write!(f, "SMTP authentication error: {}", e),
            Error::MissingStartTls => write!(f, "STARTTLS not available"),
            Error::InvalidTLSName => write!(f, "Invalid TLS name provided"),
            Error::Tls(e) => write!(f, "TLS error: {}", e),
            Error::UnsupportedAuthMechanism => write!(
                f,
                "The server does no support any of the available authentication methods"
            ),
            Error::NoRecipientsAccepted => write!(f, "No recipients were accepted"),
            Error::MissingMailFrom => write!(f, "Missing message sender"),
            Error::Timeout => write!(f, "Connection timeout"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<smtp::reply::Error> for Error {
    fn from(err: smtp::reply::Error) -> Self {
        Error::UnparseableReply(err)
    }
}

impl From<smtp::auth::Error> for Error {
    fn from(err: smtp::auth::Error) -> Self {
        Error::Auth(err)
    }
}
