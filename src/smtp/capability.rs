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

use std::fmt::Write;

use super::auth::Mechanism;

/// EHLO keywords the client reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    StartTls,
    EnhancedStatusCodes,
    EightBitMime,
    SevenBitMime,
    Pipelining,
    Chunking,
    SmtpUtf8,
    Size,
}

const EXTENSIONS: &[(&str, Extension)] = &[
    ("STARTTLS", Extension::StartTls),
    ("ENHANCEDSTATUSCODES", Extension::EnhancedStatusCodes),
    ("8BITMIME", Extension::EightBitMime),
    ("7BITMIME", Extension::SevenBitMime),
    ("PIPELINING", Extension::Pipelining),
    ("CHUNKING", Extension::Chunking),
    ("SMTPUTF8", Extension::SmtpUtf8),
    ("SIZE", Extension::Size),
];

impl Extension {
    pub fn as_str(&self) -> &'static str {
        EXTENSIONS
            .iter()
            .find_map(|(name, ext)| (ext == self).then_some(*name))
            .unwrap_or_default()
    }

    pub fn parse(keyword: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find_map(|(name, ext)| name.eq_ignore_ascii_case(keyword).then_some(*ext))
    }
}

/// AUTH mechanisms advertised by the server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Mechanisms {
    pub login: bool,
    pub plain: bool,
    pub plain_clienttoken: bool,
    pub gssapi: bool,
    pub digest_md5: bool,
    pub cram_md5: bool,
    pub oauth10a: bool,
    pub oauthbearer: bool,
    pub xoauth: bool,
    pub xoauth2: bool,
}

impl Mechanisms {
    fn flag(&mut self, mechanism: Mechanism) -> &mut bool {
        match mechanism {
            Mechanism::Login => &mut self.login,
            Mechanism::Plain => &mut self.plain,
            Mechanism::PlainClientToken => &mut self.plain_clienttoken,
            Mechanism::Gssapi => &mut self.gssapi,
            Mechanism::DigestMd5 => &mut self.digest_md5,
            Mechanism::CramMd5 => &mut self.cram_md5,
            Mechanism::OAuth10a => &mut self.oauth10a,
            Mechanism::OAuthBearer => &mut self.oauthbearer,
            Mechanism::XOAuth => &mut self.xoauth,
            Mechanism::XOAuth2 => &mut self.xoauth2,
        }
    }

    pub fn set(&mut self, mechanism: Mechanism) {
        *self.flag(mechanism) = true;
    }

    pub fn has(&self, mechanism: Mechanism) -> bool {
        match mechanism {
            Mechanism::Login => self.login,
            Mechanism::Plain => self.plain,
            Mechanism::PlainClientToken => self.plain_clienttoken,
            Mechanism::Gssapi => self.gssapi,
            Mechanism::DigestMd5 => self.digest_md5,
            Mechanism::CramMd5 => self.cram_md5,
            Mechanism::OAuth10a => self.oauth10a,
            Mechanism::OAuthBearer => self.oauthbearer,
            Mechanism::XOAuth => self.xoauth,
            Mechanism::XOAuth2 => self.xoauth2,
        }
    }

    /// Whether any mechanism was advertised at all.
    pub fn any(&self) -> bool {
        Mechanism::ALL.iter().any(|m| self.has(*m))
    }
}

/// Capabilities learned from one EHLO round-trip.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub starttls: bool,
    pub enhancedstatuscodes: bool,
    pub eightbitmime: bool,
    pub sevenbitmime: bool,
    pub pipelining: bool,
    pub chunking: bool,
    pub smtputf8: bool,
    /// Maximum message size, 0 when not announced.
    pub size: usize,
    pub auth: Mechanisms,
}

impl Capabilities {
    pub fn has(&self, extension: Extension) -> bool {
        match extension {
            Extension::StartTls => self.starttls,
            Extension::EnhancedStatusCodes => self.enhancedstatuscodes,
            Extension::EightBitMime => self.eightbitmime,
            Extension::SevenBitMime => self.sevenbitmime,
            Extension::Pipelining => self.pipelining,
            Extension::Chunking => self.chunking,
            Extension::SmtpUtf8 => self.smtputf8,
            Extension::Size => self.size > 0,
        }
    }

    fn set(&mut self, extension: Extension, argument: Option<&str>) {
        match extension {
            Extension::StartTls => self.starttls = true,
            Extension::EnhancedStatusCodes => self.enhancedstatuscodes = true,
            Extension::EightBitMime => self.eightbitmime = true,
            Extension::SevenBitMime => self.sevenbitmime = true,
            Extension::Pipelining => self.pipelining = true,
            Extension::Chunking => self.chunking = true,
            Extension::SmtpUtf8 => self.smtputf8 = true,
            Extension::Size => {
                self.size = argument.and_then(|arg| arg.parse().ok()).unwrap_or(0);
            }
        }
    }

    /// Applies every `250` line of an EHLO response to this table.
    ///
    /// Lines with a status of 400 or above are logged and skipped, as are
    /// keywords the client does not know.
    pub fn parse_ehlo_response(&mut self, response: &[u8]) {
        for line in response.split(|&ch| ch == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            let code = match line.get(0..3) {
                Some(digits) if digits.iter().all(u8::is_ascii_digit) => digits
                    .iter()
                    .fold(0u16, |code, digit| code * 10 + (digit - b'0') as u16),
                _ => continue,
            };
            let text = String::from_utf8_lossy(line.get(4..).unwrap_or_default());

            if code >= 400 {
                log::warn!("EHLO extension failure: {} {}", code, text);
            } else if code == 250 {
                self.parse_keyword_line(&text);
            }
        }
    }

    fn parse_keyword_line(&mut self, text: &str) {
        let mut tokens = text.split_ascii_whitespace();
        let keyword = match tokens.next() {
            Some(keyword) => keyword,
            None => return,
        };

        if keyword.eq_ignore_ascii_case("AUTH") {
            self.parse_auth_mechanisms(tokens);
        } else if keyword
            .get(..5)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("AUTH="))
        {
            self.parse_auth_mechanisms(std::iter::once(&keyword[5..]).chain(tokens));
        } else if let Some(extension) = Extension::parse(keyword) {
            self.set(extension, tokens.next());
        }
    }

    fn parse_auth_mechanisms<'x>(&mut self, tokens: impl Iterator<Item = &'x str>) {
        for token in tokens {
            match Mechanism::parse(token) {
                Some(mechanism) => self.auth.set(mechanism),
                None => log::warn!("Unrecognized AUTH mechanism {:?}", token),
            }
        }
    }

    /// Names of the capabilities currently set, for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (name, extension) in EXTENSIONS {
            if !self.has(*extension) {
                continue;
            }
            if !out.is_empty() {
                out.push(' ');
            }
            if *extension == Extension::Size {
                let _ = write!(out, "{}={}", name, self.size);
            } else {
                out.push_str(name);
            }
        }
        for mechanism in Mechanism::ALL {
            if self.auth.has(mechanism) {
                if !out.is_empty() {
                    out.push(' ');
                }
                let _ = write!(out, "AUTH={}", mechanism);
            }
        }
        out
    }
}

#[cfg(test)]
mod test {
    use crate::smtp::{
        auth::Mechanism,
        capability::{Capabilities, Extension, Mechanisms},
    };

    fn parse(response: &str) -> Capabilities {
        let mut caps = Capabilities::default();
        caps.parse_ehlo_response(response.as_bytes());
        caps
    }

    #[test]
    fn ehlo_keywords() {
        assert_eq!(
            parse("250-STARTTLS\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 35882577\r\n"),
            Capabilities {
                starttls: true,
                size: 35882577,
                auth: Mechanisms {
                    login: true,
                    plain: true,
                    ..Default::default()
                },
                ..Default::default()
            }
        );

        let caps = parse(concat!(
            "250-smtp.example.com Hello client.example.com\r\n",
            "250-pipelining\r\n",
            "250-8BITMIME\r\n",
            "250-7BITMIME\r\n",
            "250-Chunking\r\n",
            "250-SMTPUTF8\r\n",
            "250-ENHANCEDSTATUSCODES\r\n",
            "250-DSN\r\n",
            "250 SIZE\r\n",
        ));
        assert!(caps.pipelining && caps.eightbitmime && caps.sevenbitmime);
        assert!(caps.chunking && caps.smtputf8 && caps.enhancedstatuscodes);
        assert!(!caps.starttls);
        assert_eq!(caps.size, 0);
        assert!(!caps.has(Extension::Size));
        assert!(!caps.auth.any());
    }

    #[test]
    fn auth_mechanisms() {
        // Whole-keyword matching: XOAUTH2 must not imply XOAUTH.
        let caps = parse("250 AUTH xoauth2 CRAM-MD5 PLAIN-CLIENTTOKEN KERBEROS_V4\r\n");
        assert!(caps.auth.xoauth2 && caps.auth.cram_md5 && caps.auth.plain_clienttoken);
        assert!(!caps.auth.xoauth && !caps.auth.plain);

        // Legacy AUTH= syntax
        let caps = parse("250-AUTH=LOGIN GSSAPI\r\n250 OK\r\n");
        assert!(caps.auth.login && caps.auth.gssapi);

        let mut all = Mechanisms::default();
        for mechanism in Mechanism::ALL {
            all.set(mechanism);
            assert!(all.has(mechanism));
        }
        assert!(all.any());
    }

    #[test]
    fn failure_lines_are_skipped() {
        let caps = parse("250-STARTTLS\r\n452-AUTH PLAIN\r\n250 PIPELINING\r\n");
        assert!(caps.starttls && caps.pipelining);
        assert!(!caps.auth.plain);
    }

    #[test]
    fn dump_names_set_flags() {
        let caps = parse("250-STARTTLS\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 1000\r\n");
        assert_eq!(caps.dump(), "STARTTLS SIZE=1000 AUTH=LOGIN AUTH=PLAIN");
        assert_eq!(Capabilities::default().dump(), "");
    }
}
