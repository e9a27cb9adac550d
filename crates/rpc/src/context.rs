//! Per-call context carrying the inbound/outbound side-channels

use std::fmt;

use tracing::{debug, warn};

use crate::cookie;
use crate::metadata::{INBOUND_COOKIE_KEY, Metadata, SET_COOKIE_KEY};
use crate::status::{Result, Status};

/// Identity-provider-asserted user identifier (`sub` claim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject(String);

impl AuthenticatedSubject {
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for AuthenticatedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State scoped to a single RPC.
///
/// Created by the transport for every request and dropped when the response
/// has been written. Nothing in here outlives the call.
#[derive(Debug, Default)]
pub struct CallContext {
    incoming: Metadata,
    outgoing: Option<Metadata>,
    subject: Option<AuthenticatedSubject>,
}

impl CallContext {
    /// Context for a call running inside a request, with an outbound sink.
    pub fn new() -> Self {
        Self {
            incoming: Metadata::new(),
            outgoing: Some(Metadata::new()),
            subject: None,
        }
    }

    /// Context with no transport behind it. Header writes fail with `Internal`.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn incoming(&self) -> &Metadata {
        &self.incoming
    }

    /// Outbound metadata written so far, `None` when detached.
    pub fn outgoing(&self) -> Option<&Metadata> {
        self.outgoing.as_ref()
    }

    /// Queue a response header.
    pub fn set_header(&mut self, key: &str, value: impl Into<String>) -> Result<()> {
        match self.outgoing.as_mut() {
            Some(md) => {
                md.append(key, value);
                Ok(())
            }
            None => Err(Status::internal("failed to set header")),
        }
    }

    /// Queue a cookie for the transport to emit as `Set-Cookie`.
    pub fn set_cookie(&mut self, name: &str, value: &str) -> Result<()> {
        self.set_header(SET_COOKIE_KEY, cookie::format(name, value))
            .map_err(|_| Status::internal(format!("failed to set cookie {name}")))
    }

    pub fn set_cookies(&mut self, cookies: &[(&str, &str)]) -> Result<()> {
        for (name, value) in cookies {
            self.set_cookie(name, value)?;
        }
        Ok(())
    }

    /// Value of the inbound cookie `name`.
    ///
    /// Returns `NotFound` when the request carried no such cookie, including
    /// when it was malformed and therefore never lifted.
    pub fn cookie(&self, name: &str) -> Result<String> {
        let value = self
            .incoming
            .get_all(INBOUND_COOKIE_KEY)
            .find_map(|entry| match entry.split_once('=') {
                Some((n, v)) if n == name => Some(v.to_owned()),
                _ => None,
            });

        value.ok_or_else(|| {
            debug!(cookie = name, "cookie not found");
            Status::not_found("cookie not found")
        })
    }

    /// Store inbound `Cookie` header values under [`INBOUND_COOKIE_KEY`].
    ///
    /// Replaces whatever was lifted before, so lifting the same request twice
    /// yields the same context. A malformed cookie is skipped without
    /// affecting the others in the same header.
    pub fn lift_cookie_headers<'a>(&mut self, headers: impl IntoIterator<Item = &'a str>) {
        self.incoming.remove(INBOUND_COOKIE_KEY);

        for header in headers {
            for parsed in cookie::parse(header) {
                match parsed {
                    Ok((name, value)) => {
                        self.incoming
                            .append(INBOUND_COOKIE_KEY, cookie::format(&name, &value));
                    }
                    Err(e) => warn!(error = %e, "ignoring malformed cookie"),
                }
            }
        }
    }

    /// Drain queued cookies as `(name, value)` pairs.
    ///
    /// Entries without `=` are logged and dropped. The queue is empty
    /// afterwards, so a second call returns nothing.
    pub fn take_set_cookies(&mut self) -> Vec<(String, String)> {
        let Some(md) = self.outgoing.as_mut() else {
            return Vec::new();
        };

        md.remove(SET_COOKIE_KEY)
            .into_iter()
            .filter_map(|entry| match entry.split_once('=') {
                Some((name, value)) => Some((name.to_owned(), value.to_owned())),
                None => {
                    warn!("dropping outbound cookie entry without '=' separator");
                    None
                }
            })
            .collect()
    }

    pub fn subject(&self) -> Option<&AuthenticatedSubject> {
        self.subject.as_ref()
    }

    pub fn set_subject(&mut self, subject: AuthenticatedSubject) {
        self.subject = Some(subject);
    }
}
