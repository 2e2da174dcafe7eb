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

pub mod auth;
pub mod builder;
pub mod capability;
pub mod client;
pub mod ehlo;
pub mod envelope;
pub mod message;
pub mod reply;
pub mod tls;

use self::reply::Reply;

pub trait AssertReply: Sized {
    fn assert_positive_completion(self, command: &'static str) -> crate::Result<Reply>;
    fn assert_positive_intermediate(self, command: &'static str) -> crate::Result<Reply>;
    fn assert_code(self, code: u16, command: &'static str) -> crate::Result<Reply>;
}

impl AssertReply for Reply {
    /// Returns the reply if its code is 2xx.
    fn assert_positive_completion(self, command: &'static str) -> crate::Result<Reply> {
        if self.is_positive_completion() {
            Ok(self)
        } else {
            Err(unexpected(command, self))
        }
    }

    /// Returns the reply if its code is 3xx.
    fn assert_positive_intermediate(self, command: &'static str) -> crate::Result<Reply> {
        if self.is_positive_intermediate() {
            Ok(self)
        } else {
            Err(unexpected(command, self))
        }
    }

    /// Returns the reply if its code matches exactly.
    fn assert_code(self, code: u16, command: &'static str) -> crate::Result<Reply> {
        if self.code() == code {
            Ok(self)
        } else {
            Err(unexpected(command, self))
        }
    }
}

fn unexpected(command: &'static str, reply: Reply) -> crate::Error {
    log::debug!("Unexpected reply to {}: {}", command, reply);
    crate::Error::UnexpectedReply { command, reply }
}
