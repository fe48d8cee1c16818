//! Parsing of the server's rate-limit headers.

use http::header::{HeaderMap, ToStrError};
use std::num::ParseFloatError;
use std::time::Duration;

pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const GLOBAL: &str = "x-ratelimit-global";
pub const RETRY_AFTER: &str = "retry-after";

/// Unit the server uses for `Retry-After`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryAfterUnit {
    #[default]
    Millis,
    Seconds,
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HeaderParseError {
    #[error("header {name:?} is missing")]
    HeaderMissing { name: &'static str },
    #[error("header {name:?} is not valid UTF-8: {value:?}")]
    HeaderNotUtf8 {
        name: &'static str,
        #[source]
        source: ToStrError,
        value: Vec<u8>,
    },
    #[error("header {name:?} should be a number but isn't: {text:?}")]
    ParsingNumber {
        name: &'static str,
        #[source]
        source: ParseFloatError,
        text: String,
    },
    #[error("header {name:?} is negative or not finite: {value}")]
    OutOfRange { name: &'static str, value: f64 },
}

/// What a response says about rate limits.
#[derive(Clone, Debug, PartialEq)]
pub enum RatelimitHeaders {
    /// The account-wide limit was hit.
    Global { retry_after: Duration },
    /// The route is not (locally) rate limited.
    None,
    /// Bucket state for the route.
    Present {
        limit: u64,
        remaining: u64,
        /// Unix milliseconds when the window resets.
        reset_at: u64,
        retry_after: Option<Duration>,
    },
}

impl RatelimitHeaders {
    pub fn parse(map: &HeaderMap, unit: RetryAfterUnit) -> Result<Self, HeaderParseError> {
        if map.contains_key(GLOBAL) {
            return Ok(Self::Global { retry_after: retry_after(map, unit)?.unwrap_or_default() });
        }

        // No bucket headers at all means no bucket information; some but not all
        // of them is a malformed response.
        if ![LIMIT, REMAINING, RESET].iter().any(|name| map.contains_key(*name)) {
            return Ok(Self::None);
        }

        let limit = header_number(map, LIMIT)?;
        let remaining = header_number(map, REMAINING)?;
        let reset_secs = header_number(map, RESET)?;

        Ok(Self::Present {
            limit: limit as u64,
            remaining: remaining as u64,
            reset_at: (reset_secs * 1000.).ceil() as u64,
            retry_after: retry_after(map, unit)?,
        })
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global { .. })
    }
}

/// The `Retry-After` header, if present.
pub fn retry_after(
    map: &HeaderMap,
    unit: RetryAfterUnit,
) -> Result<Option<Duration>, HeaderParseError> {
    if !map.contains_key(RETRY_AFTER) {
        return Ok(None);
    }
    let value = header_number(map, RETRY_AFTER)?;
    let millis = match unit {
        RetryAfterUnit::Millis => value,
        RetryAfterUnit::Seconds => value * 1000.,
    };
    Ok(Some(Duration::from_millis(millis.ceil() as u64)))
}

fn header_str<'a>(map: &'a HeaderMap, name: &'static str) -> Result<&'a str, HeaderParseError> {
    let value = map.get(name).ok_or(HeaderParseError::HeaderMissing { name })?;

    value.to_str().map_err(|source| HeaderParseError::HeaderNotUtf8 {
        name,
        source,
        value: value.as_bytes().to_owned(),
    })
}

fn header_number(map: &HeaderMap, name: &'static str) -> Result<f64, HeaderParseError> {
    let text = header_str(map, name)?;

    let value: f64 = text.trim().parse().map_err(|source| HeaderParseError::ParsingNumber {
        name,
        source,
        text: text.to_owned(),
    })?;

    if !value.is_finite() || value < 0. {
        return Err(HeaderParseError::OutOfRange { name, value });
    }

    Ok(value)
}
