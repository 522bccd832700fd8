//! The host-facing side of the gateway
//!
//! A host hands every request to [`Gateway::intercept`]. Requests for the
//! virtual origin come back as a [`ResourceHandler`], which the host drives
//! through processing, header reporting and bounded body reads. Everything
//! else is declined and handed back untouched.

mod cursor;
mod handler;
pub mod range;
pub mod request;
mod script;
mod static_files;

pub use self::handler::{Chunk, ResourceHandler};
pub use self::request::{BodyElement, Headers, Request, Url};

use crate::config::Config;

use std::sync::Arc;

/// Entry point for an embedding host
///
/// Cheap to clone; every clone shares the same read-only configuration.
#[derive(Debug, Clone)]
pub struct Gateway {
    config: Arc<Config>
}

/// What the gateway made of a request
#[derive(Debug)]
pub enum Interception {
    /// The request is on the virtual origin and this handler owns it now
    Handle(ResourceHandler),
    /// Not ours; the host should carry on as if the gateway weren't there
    Decline(Request)
}

impl Gateway {
    pub fn new(config: Config) -> Gateway {
        Gateway { config: Arc::new(config) }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Claims requests whose scheme and host are the virtual origin's.
    pub fn intercept(&self, request: Request) -> Interception {
        let origin = &self.config.origin;

        if request.url.scheme.eq_ignore_ascii_case(&origin.scheme) &&
            request.url.host.eq_ignore_ascii_case(&origin.host) {
            debug!("Intercepting {} {}", request.method, request.url.path);
            Interception::Handle(ResourceHandler::new(self.config.clone(), request))
        }
        else {
            Interception::Decline(request)
        }
    }
}

/// Everything a host reports before the body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: u16,
    pub mime_type: Option<String>,
    /// Bytes the host will get from reading the body to the end
    pub content_length: u64,
    /// Absolute URL to redirect to, if the response is a redirect
    pub redirect_url: Option<String>,
    pub headers: Headers
}

impl ResponseHead {
    fn not_found() -> ResponseHead {
        ResponseHead {
            status: 404,
            mime_type: None,
            content_length: 0,
            redirect_url: None,
            headers: Headers::new()
        }
    }
}

/// A finished response that hasn't had ranges applied yet
#[derive(Debug)]
struct Prepared {
    head: ResponseHead,
    body: Vec<u8>
}

/// The standard reason phrase for a status code, for hosts that print one
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        416 => "Range Not Satisfiable",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown"
    }
}
