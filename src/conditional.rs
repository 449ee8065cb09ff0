//! HTTP conditional requests (RFC 7232) for served images.

use crate::cache::CacheControl;
use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const HTTP_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

/// Outcome of evaluating the conditional headers.
///
/// Ordered by precedence: when several headers are present the greatest
/// individual outcome wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreconditionState {
    Unspecified,
    NotModified,
    ShouldProcess,
    PreconditionFailed,
}

pub fn format_http_date(ts: OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC).format(HTTP_DATE).unwrap_or_default()
}

pub fn parse_http_date(value: &str) -> Option<OffsetDateTime> {
    PrimitiveDateTime::parse(value.trim(), HTTP_DATE).ok().map(PrimitiveDateTime::assume_utc)
}

/// Drop sub-second precision; HTTP dates carry whole seconds only.
fn truncate_to_seconds(ts: OffsetDateTime) -> OffsetDateTime {
    ts.replace_nanosecond(0).unwrap_or(ts)
}

/// Per-request view of the entity about to be served.
pub struct ImageContext<'a> {
    method: &'a Method,
    headers: &'a HeaderMap,
    content_type: &'static str,
    last_modified: OffsetDateTime,
    length: u64,
    etag: String,
    cache_control: String,
}

impl<'a> ImageContext<'a> {
    pub fn new(
        parts: &'a Parts,
        content_type: &'static str,
        last_modified: OffsetDateTime,
        length: u64,
        cache_control: &CacheControl,
    ) -> Self {
        let last_modified = truncate_to_seconds(last_modified);
        Self {
            method: &parts.method,
            headers: &parts.headers,
            content_type,
            last_modified,
            length,
            etag: format!("\"{:x}-{:x}\"", last_modified.unix_timestamp(), length),
            cache_control: cache_control.header_value(),
        }
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn is_head(&self) -> bool {
        *self.method == Method::HEAD
    }

    /// Whether serving `state` needs the payload bytes at all.
    pub fn requires_body(&self, state: PreconditionState) -> bool {
        !self.is_head() && matches!(state, PreconditionState::Unspecified | PreconditionState::ShouldProcess)
    }

    pub fn precondition_state(&self) -> PreconditionState {
        let now = OffsetDateTime::now_utc();
        let if_match = self.if_match_state();
        let if_none_match = self.if_none_match_state();
        // If-Modified-Since is only consulted without If-None-Match.
        let if_modified_since = if self.headers.contains_key(header::IF_NONE_MATCH) {
            PreconditionState::Unspecified
        } else {
            self.if_modified_since_state(now)
        };
        let if_unmodified_since = self.if_unmodified_since_state(now);

        if_match.max(if_none_match).max(if_modified_since).max(if_unmodified_since)
    }

    fn etag_list(&self, name: HeaderName) -> Option<Vec<&str>> {
        let mut values = self.headers.get_all(name).iter().peekable();
        values.peek()?;
        Some(
            values
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect(),
        )
    }

    fn if_match_state(&self) -> PreconditionState {
        let Some(tags) = self.etag_list(header::IF_MATCH) else {
            return PreconditionState::Unspecified;
        };
        // Strong comparison: weak validators never satisfy If-Match.
        if tags.iter().any(|t| *t == "*" || *t == self.etag) {
            PreconditionState::ShouldProcess
        } else {
            PreconditionState::PreconditionFailed
        }
    }

    fn if_none_match_state(&self) -> PreconditionState {
        let Some(tags) = self.etag_list(header::IF_NONE_MATCH) else {
            return PreconditionState::Unspecified;
        };
        let matched = tags
            .iter()
            .any(|t| *t == "*" || t.strip_prefix("W/").unwrap_or(*t) == self.etag);
        if matched {
            PreconditionState::NotModified
        } else {
            PreconditionState::ShouldProcess
        }
    }

    fn header_date(&self, name: HeaderName, now: OffsetDateTime) -> Option<OffsetDateTime> {
        let value = self.headers.get(name)?.to_str().ok()?;
        parse_http_date(value).filter(|date| *date <= now)
    }

    fn if_modified_since_state(&self, now: OffsetDateTime) -> PreconditionState {
        match self.header_date(header::IF_MODIFIED_SINCE, now) {
            Some(date) if self.last_modified <= date => PreconditionState::NotModified,
            Some(_) => PreconditionState::ShouldProcess,
            None => PreconditionState::Unspecified,
        }
    }

    fn if_unmodified_since_state(&self, now: OffsetDateTime) -> PreconditionState {
        match self.header_date(header::IF_UNMODIFIED_SINCE, now) {
            Some(date) if self.last_modified <= date => PreconditionState::ShouldProcess,
            Some(_) => PreconditionState::PreconditionFailed,
            None => PreconditionState::Unspecified,
        }
    }

    /// Build the terminal response for `state`.
    ///
    /// `body` must be supplied whenever [`requires_body`](Self::requires_body)
    /// holds; its length overrides the recorded entity length.
    pub fn respond(&self, state: PreconditionState, body: Option<Bytes>) -> Response {
        match state {
            PreconditionState::Unspecified | PreconditionState::ShouldProcess => {
                let length = body.as_ref().map(|b| b.len() as u64).unwrap_or(self.length);
                let mut response = Response::new(match body {
                    Some(bytes) if !self.is_head() => Body::from(bytes),
                    _ => Body::empty(),
                });
                let headers = response.headers_mut();
                self.write_validators(headers);
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
                response
            }
            PreconditionState::NotModified => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                self.write_validators(response.headers_mut());
                response
            }
            PreconditionState::PreconditionFailed => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::PRECONDITION_FAILED;
                response
            }
        }
    }

    fn write_validators(&self, headers: &mut HeaderMap) {
        if let Ok(v) = HeaderValue::from_str(&format_http_date(self.last_modified)) {
            headers.insert(header::LAST_MODIFIED, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.etag) {
            headers.insert(header::ETAG, v);
        }
        if let Ok(v) = HeaderValue::from_str(&self.cache_control) {
            headers.insert(header::CACHE_CONTROL, v);
        }
    }
}
