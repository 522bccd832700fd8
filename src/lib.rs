//! An in-process CGI/1.1 gateway.
//!
//! An embedding host (a browser shell, a test harness, anything that can
//! intercept its own requests) hands requests for a reserved virtual origin
//! to a [`Gateway`]. Static files under the document root are served
//! directly; scripts are run through an external interpreter, and their
//! output is parsed back into a response the host can read in bounded
//! pieces.
//!
//! ```no_run
//! use cgi_gateway::config::Config;
//! use cgi_gateway::gateway::{Gateway, Interception, Request};
//!
//! let config = Config::default().canonicalize().unwrap();
//! let gateway = Gateway::new(config);
//! let request = Request::new("GET", "http://cgi.local/index.php").unwrap();
//!
//! if let Interception::Handle(mut handler) = gateway.intercept(request) {
//!     handler.process().unwrap();
//!     let mut buffer = [0; 4096];
//!     while !handler.read(&mut buffer).unwrap().is_final {}
//! }
//! ```

#[macro_use] extern crate log;

pub mod cgi;
pub mod config;
pub mod errors;
pub mod filesystem;
pub mod gateway;
mod log_util;

pub use crate::gateway::{Gateway, Interception, ResourceHandler};
