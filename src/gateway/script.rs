//! Script service: run the interpreter and turn its document into a response

use super::{Headers, Prepared, Request, ResponseHead};
use crate::cgi::{environment, parser, process, Document};
use crate::config::Config;
use crate::errors::Result;
use crate::filesystem::Target;

use std::mem;

/// Runs `target` for `request` to completion.
///
/// `path` is the normalized request path. The request's body is handed to
/// the interpreter and is gone afterwards.
pub(super) fn serve(request: &mut Request, path: &str, target: &Target, config: &Config)
                    -> Result<Prepared>
{
    let env = environment::build(request, path, target, config)?;
    let invocation = process::Invocation {
        interpreter: &config.cgi.interpreter,
        script: &target.physical_path,
        working_dir: &config.site.document_root,
        env: &env,
        pass_env: &config.cgi.pass_env,
        timeout: config.script_timeout()
    };

    let mut output = process::run(&invocation, mem::take(&mut request.body))?;
    let document = parser::document(&output);
    let body = output.split_off(document.body_offset);

    Ok(Prepared {
        head: head_for(document, body.len() as u64, config),
        body: body
    })
}

fn head_for(document: Document, content_length: u64, config: &Config) -> ResponseHead {
    let fields = document.headers;

    let redirect_url = fields.location.map(|location| {
        if location.starts_with('/') {
            config.full_url(&location)
        }
        else {
            location
        }
    });

    let mime_type = fields.content_type
        .unwrap_or_else(|| String::from(mime::TEXT_HTML.essence_str()));

    ResponseHead {
        status: fields.status.unwrap_or(200),
        mime_type: Some(mime_type),
        content_length: content_length,
        redirect_url: redirect_url,
        headers: fields.headers.into_iter().map(|h| (h.name, h.content)).collect::<Headers>()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn redirect_on_the_virtual_origin_is_made_absolute() {
        let doc = parser::document(b"Status: 302 Found\r\nLocation: /x\r\n\r\n");
        let head = head_for(doc, 0, &Config::default());

        assert_eq!(head.status, 302);
        assert_eq!(head.redirect_url.as_ref().map(String::as_str), Some("http://cgi.local/x"));
        assert_eq!(head.headers.get("Location"), Some("/x"));
    }

    #[test]
    fn absolute_redirect_is_kept_verbatim() {
        let doc = parser::document(b"Location: https://example.com/y\r\n\r\n");
        let head = head_for(doc, 0, &Config::default());

        assert_eq!(head.redirect_url.as_ref().map(String::as_str),
                   Some("https://example.com/y"));
    }

    #[test]
    fn defaults_without_status_or_type() {
        let doc = parser::document(b"X-Thing: 1\r\n\r\nbody");
        let head = head_for(doc, 4, &Config::default());

        assert_eq!(head.status, 200);
        assert_eq!(head.mime_type.as_ref().map(String::as_str), Some("text/html"));
        assert_eq!(head.redirect_url, None);
        assert_eq!(head.content_length, 4);
        assert_eq!(head.headers.len(), 1);
    }
}
