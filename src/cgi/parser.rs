//! Parsers for CGI/1.1 responses
//!
//! A response is a block of `Name: value` lines, a blank line, and then the
//! body. Interpreters are allowed to be sloppy about line endings, so both
//! `\r\n` and a bare `\n` end a line, and the body offset is counted from the
//! bytes actually consumed.
//!
//! A line that can't be a header ends the header block early. That line is
//! kept as the first line of the body rather than thrown away.

use crate::cgi::{Document, DocumentHeaders, Header};

use nom::bytes::complete::{tag, take_till, take_till1};
use nom::character::complete::digit1;
use nom::combinator::{map_res, opt, rest};
use nom::IResult;

use std::str::{self, FromStr};

/// Splits off one line, without its terminator
pub fn line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, content) = take_till(|b: u8| b == b'\n')(input)?;
    let (input, _) = opt(tag("\n"))(input)?;

    let content = match content.last() {
        Some(&b'\r') => &content[.. content.len() - 1],
        _ => content
    };

    Ok((input, content))
}

/// A `Name: value` line
///
/// The line is split at the first colon, so values may contain colons of
/// their own. Names can't be empty or contain whitespace.
pub fn header(input: &[u8]) -> IResult<&[u8], Header> {
    let (input, name) = take_till1(|b: u8| b == b':' || b.is_ascii_whitespace())(input)?;
    let (input, _) = tag(":")(input)?;
    let (input, content) = rest(input)?;

    Ok((input, Header {
        name: String::from_utf8_lossy(name).into_owned(),
        content: String::from_utf8_lossy(content).trim().to_owned()
    }))
}

/// The leading number of a `Status` value, like the `302` in `302 Found`
pub fn status_code(input: &[u8]) -> IResult<&[u8], u16> {
    map_res(map_res(digit1, str::from_utf8), u16::from_str)(input)
}

/// Splits raw interpreter output into headers and the offset of the body.
///
/// This never fails. Output that isn't a well-formed document is logged and
/// whatever couldn't be read as headers is left to the body.
pub fn document(output: &[u8]) -> Document {
    let mut headers = DocumentHeaders::default();
    let mut offset = 0;
    let mut malformed = false;

    while offset < output.len() {
        let remaining = &output[offset ..];
        let (after, content) = match line(remaining) {
            Ok(parsed) => parsed,
            Err(_) => break
        };
        let consumed = remaining.len() - after.len();

        if content.is_empty() {
            offset += consumed;
            break;
        }

        match header(content) {
            Ok((_, hdr)) => {
                apply_header(&mut headers, &hdr);
                headers.headers.push(hdr);
                offset += consumed;
            },
            Err(_) => {
                warn!("CGI header block ended on a non-header line at byte {}: \"{}\"",
                      offset, crate::log_util::ascii_excerpt(content, 64));
                malformed = true;
                break;
            }
        }
    }

    Document {
        headers: headers,
        body_offset: offset,
        malformed: malformed
    }
}

/// Picks the headers the gateway cares about out of the stream
fn apply_header(headers: &mut DocumentHeaders, hdr: &Header) {
    if hdr.name.eq_ignore_ascii_case("Content-Type") {
        let media = hdr.content.split(';').next().unwrap_or("").trim();
        headers.content_type = Some(String::from(media));
    }
    else if hdr.name.eq_ignore_ascii_case("Status") {
        match status_code(hdr.content.as_bytes()) {
            Ok((_, code)) if (100 ..= 999).contains(&code) =>
                headers.status = Some(code),
            _ => warn!("Ignoring unusable CGI status {:?}", hdr.content)
        }
    }
    else if hdr.name.eq_ignore_ascii_case("Location") {
        headers.location = Some(hdr.content.clone());
    }
}
