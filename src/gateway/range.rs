//! Partial content
//!
//! Only a single `bytes=<start>-<end>` range is understood. Either bound may
//! be left out: a missing start means `0` and a missing end means the last
//! byte of the body.

use super::cursor::DeliveryCursor;
use super::{Headers, Prepared, ResponseHead};

use nom::bytes::complete::tag;
use nom::character::complete::{digit1, space0};
use nom::combinator::{all_consuming, map_res, opt};
use nom::sequence::{delimited, separated_pair};
use nom::IResult;

use std::str::{self, FromStr};

/// A requested byte range, before the body length is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: Option<u64>,
    pub end: Option<u64>
}

/// What a range comes to once it meets an actual body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Inclusive bounds, both inside the body
    Partial { start: u64, end: u64 },
    Unsatisfiable
}

fn position(input: &[u8]) -> IResult<&[u8], u64> {
    map_res(map_res(digit1, str::from_utf8), u64::from_str)(input)
}

fn byte_range(input: &[u8]) -> IResult<&[u8], RangeSpec> {
    let (input, _) = tag("bytes=")(input)?;
    let (input, (start, end)) = separated_pair(
        opt(position),
        delimited(space0, tag("-"), space0),
        opt(position))(input)?;

    Ok((input, RangeSpec { start: start, end: end }))
}

impl RangeSpec {
    /// Parses a `Range` header value.
    ///
    /// Returns `None` for anything that isn't a single byte range; such
    /// headers are ignored.
    pub fn parse(value: &str) -> Option<RangeSpec> {
        all_consuming(byte_range)(value.trim().as_bytes())
            .ok()
            .map(|(_, spec)| spec)
    }

    /// The range requested by a header list, if any
    pub fn from_headers(headers: &Headers) -> Option<RangeSpec> {
        let value = headers.get("Range")?;
        let spec = RangeSpec::parse(value);
        if spec.is_none() {
            debug!("Ignoring unusable Range header {:?}", value);
        }
        spec
    }

    /// Fills in the missing bounds against a body of `len` bytes
    ///
    /// An end past the body is pulled back to the last byte. A start past
    /// the body, or past the end, can't be satisfied.
    pub fn resolve(&self, len: u64) -> Resolution {
        if len == 0 {
            return Resolution::Unsatisfiable;
        }

        let start = self.start.unwrap_or(0);
        let end = self.end.map_or(len - 1, |end| end.min(len - 1));

        if start > end {
            Resolution::Unsatisfiable
        }
        else {
            Resolution::Partial { start: start, end: end }
        }
    }
}

/// Cuts a prepared response down to the requested range.
///
/// Without a range the whole body is delivered as is. With one, the status
/// becomes 206 (or 416 if it can't be met) and the range headers are set
/// over any the script wrote itself. Only plain 200 responses are ranged;
/// redirects and other statuses a script chose go out untouched.
pub(super) fn apply(range: Option<RangeSpec>, prepared: Prepared)
                    -> (ResponseHead, DeliveryCursor)
{
    let Prepared { mut head, body } = prepared;

    let range = match range {
        Some(range) if head.status == 200 && head.redirect_url.is_none() => range,
        Some(range) => {
            debug!("Ignoring {:?} on a {} response", range, head.status);
            return (head, DeliveryCursor::new(body));
        },
        None => return (head, DeliveryCursor::new(body))
    };

    let len = body.len() as u64;
    head.headers.set("Accept-Ranges", "bytes");

    match range.resolve(len) {
        Resolution::Partial { start, end } => {
            head.status = 206;
            head.content_length = end - start + 1;
            head.headers.set("Content-Range", format!("bytes {}-{}/{}", start, end, len));
            head.headers.set("Content-Length", head.content_length.to_string());

            (head, DeliveryCursor::window(body, start as usize, end as usize))
        },
        Resolution::Unsatisfiable => {
            debug!("Range {:?} doesn't fit a {} byte body", range, len);
            head.status = 416;
            head.content_length = 0;
            head.headers.set("Content-Range", format!("bytes */{}", len));
            head.headers.set("Content-Length", "0");

            (head, DeliveryCursor::new(Vec::new()))
        }
    }
}
