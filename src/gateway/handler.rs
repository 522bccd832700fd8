//! Per-request handlers

use super::cursor::DeliveryCursor;
use super::range::{self, RangeSpec};
use super::{script, static_files, Prepared, Request, ResponseHead};
use crate::config::Config;
use crate::errors::{Error, Result};
use crate::filesystem::{normalize_path, resolve, Layout, ResolvedTarget};

use std::io::ErrorKind;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// The gateway's hold on one intercepted request
///
/// Drive it in order: [`process`](ResourceHandler::process) (or
/// [`process_in_background`](ResourceHandler::process_in_background)), then
/// [`response_head`](ResourceHandler::response_head), then
/// [`read`](ResourceHandler::read) until a chunk comes back final. The
/// buffered response is released on that final read, or when the handler is
/// dropped or aborted, whichever comes first.
#[derive(Debug)]
pub struct ResourceHandler {
    config: Arc<Config>,
    request: Request,
    head: Option<ResponseHead>,
    cursor: Option<DeliveryCursor>
}

/// The result of one bounded read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Bytes written to the start of the sink
    pub len: usize,
    /// Nothing follows this chunk; the handler has let go of the body
    pub is_final: bool
}

impl ResourceHandler {
    pub fn new(config: Arc<Config>, request: Request) -> ResourceHandler {
        ResourceHandler {
            config: config,
            request: request,
            head: None,
            cursor: None
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Produces the response, running the script if there is one.
    ///
    /// Blocks until the interpreter is done. A target that doesn't exist is
    /// a 404 response, not an error. Processing twice is a no-op.
    pub fn process(&mut self) -> Result<()> {
        if self.head.is_some() {
            return Ok(());
        }

        let prepared = match self.prepare()? {
            Some(prepared) => {
                let requested = RangeSpec::from_headers(&self.request.headers);
                range::apply(requested, prepared)
            },
            None => {
                debug!("Nothing at {} {}", self.request.method, self.request.url.path);
                (ResponseHead::not_found(), DeliveryCursor::new(Vec::new()))
            }
        };

        let (head, cursor) = prepared;
        debug!("{} {} -> {} ({} bytes)", self.request.method, self.request.url.path,
               head.status, head.content_length);

        self.head = Some(head);
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Processes on a thread of its own and hands the outcome to
    /// `continuation` from there.
    ///
    /// On failure the handler is gone by the time `continuation` runs.
    pub fn process_in_background<F>(mut self, continuation: F) -> Result<JoinHandle<()>>
        where F: FnOnce(Result<ResourceHandler>) + Send + 'static
    {
        let handle = thread::Builder::new()
            .name(String::from("cgi-request"))
            .spawn(move || {
                let outcome = match self.process() {
                    Ok(()) => Ok(self),
                    Err(e) => {
                        warn!("{} {} failed: {}",
                              self.request.method, self.request.url.path, e);
                        Err(e)
                    }
                };
                continuation(outcome);
            })?;

        Ok(handle)
    }

    /// Status, type, length, redirect and headers, once processed
    pub fn response_head(&self) -> Result<&ResponseHead> {
        self.head.as_ref().ok_or(Error::ResponseNotReady)
    }

    /// Copies the next piece of the body into `sink`.
    ///
    /// Once a chunk comes back final, further reads fail with
    /// `ResponseDrained`.
    pub fn read(&mut self, sink: &mut [u8]) -> Result<Chunk> {
        if self.head.is_none() {
            return Err(Error::ResponseNotReady);
        }

        let (len, is_final) = match self.cursor {
            Some(ref mut cursor) => cursor.read(sink),
            None => return Err(Error::ResponseDrained)
        };

        if is_final {
            self.cursor = None;
            debug!("Released response for {} {}", self.request.method, self.request.url.path);
        }

        Ok(Chunk { len: len, is_final: is_final })
    }

    /// Gives up on the request, releasing whatever it holds.
    ///
    /// Consuming the handler is what frees the buffered response; the
    /// release itself happens on drop.
    pub fn abort(self) {
        debug!("Aborting {} {}", self.request.method, self.request.url.path);
    }

    /// Finds the target and builds the full response for it.
    ///
    /// `None` means there is nothing to serve.
    fn prepare(&mut self) -> Result<Option<Prepared>> {
        let path = match normalize_path(self.request.url.path.as_bytes()) {
            Ok(path) => match String::from_utf8(path) {
                Ok(path) => path,
                Err(_) => {
                    debug!("Request path {:?} isn't UTF-8 once decoded", self.request.url.path);
                    return Ok(None);
                }
            },
            Err(e) => {
                debug!("Unusable request path {:?}: {}", self.request.url.path, e);
                return Ok(None);
            }
        };

        let layout = Layout {
            document_root: &self.config.site.document_root,
            index: &self.config.site.index,
            script_extension: &self.config.cgi.extension
        };

        let target = match resolve(&path, layout) {
            ResolvedTarget::Found(target) => target,
            ResolvedTarget::NotFound => return Ok(None)
        };

        debug!("{:?} resolved to {} (script name {}, path info {:?})",
               path, target.physical_path.display(), target.script_name, target.path_info);

        if target.is_script {
            return script::serve(&mut self.request, &path, &target, &self.config).map(Some);
        }

        match static_files::serve(&target, &self.config) {
            Ok(prepared) => Ok(Some(prepared)),
            Err(Error::Io(ref e)) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
        }
    }
}

impl Drop for ResourceHandler {
    fn drop(&mut self) {
        if let Some(ref cursor) = self.cursor {
            debug!("Released response for {} {} with {} bytes unread",
                   self.request.method, self.request.url.path, cursor.remaining());
        }
    }
}
