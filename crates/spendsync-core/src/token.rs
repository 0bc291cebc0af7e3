//! Session token handshake
//!
//! One basic-auth request against `<endpoint>/auth-token` with
//! `auth-token: fetch`; the service answers with the session token in the
//! `auth-token` response header. The token is cached for the rest of the
//! process and never refreshed, so a token that expires mid-run shows up
//! as per-batch rejections.

use std::fmt;

use crate::error::AuthError;
use crate::http::{HttpRequest, Transport, join_url};

/// Header carrying the session token on both handshake and uploads.
pub const AUTH_TOKEN_HEADER: &str = "auth-token";

const TOKEN_PATH: &str = "auth-token";
const FETCH_SENTINEL: &str = "fetch";

/// Opaque session token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Basic-auth identity. Only `user` is ever logged or fingerprinted.
#[derive(Clone)]
pub struct Identity {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Acquires the session token once and hands out the cached copy after.
pub struct TokenProvider<'a> {
    transport: &'a dyn Transport,
    endpoint: String,
    identity: Identity,
    cached: Option<Credential>,
}

impl<'a> TokenProvider<'a> {
    pub fn new(transport: &'a dyn Transport, endpoint: &str, identity: Identity) -> Self {
        Self {
            transport,
            endpoint: endpoint.to_string(),
            identity,
            cached: None,
        }
    }

    #[cfg(test)]
    fn is_acquired(&self) -> bool {
        self.cached.is_some()
    }

    /// Return the session token, performing the handshake on first call.
    pub fn acquire(&mut self) -> Result<Credential, AuthError> {
        if let Some(cred) = &self.cached {
            return Ok(cred.clone());
        }
        let cred = self.handshake()?;
        self.cached = Some(cred.clone());
        Ok(cred)
    }

    fn handshake(&self) -> Result<Credential, AuthError> {
        let fail = |reason: String| AuthError {
            user: self.identity.user.clone(),
            reason,
        };

        let request = HttpRequest::get(join_url(&self.endpoint, TOKEN_PATH))
            .basic_auth(&self.identity.user, &self.identity.password)
            .header(AUTH_TOKEN_HEADER, FETCH_SENTINEL);
        log::debug!("requesting session token as {}", self.identity.user);

        let reply = self
            .transport
            .send(&request)
            .map_err(|e| fail(format!("handshake failed: {e}")))?;

        if !reply.is_success() {
            return Err(fail(format!("handshake returned HTTP {}", reply.status)));
        }

        match reply.header(AUTH_TOKEN_HEADER) {
            Some(token) if !token.is_empty() => {
                log::info!("acquired session token for {}", self.identity.user);
                Ok(Credential::new(token))
            }
            _ => Err(fail(
                "no auth-token header in response: identity rejected or not authorized"
                    .to_string(),
            )),
        }
    }
}
