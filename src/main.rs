//! A command-line host for the CGI gateway.
//!
//! Call it like this:
//!
//!     cgi-gateway -f config.toml -r request.http
//!
//! The request is a raw HTTP/1.x request, read from the `-r` file or from
//! stdin. Each `-a FILE` appends that file to the request body the way a
//! browser streams an upload from disk. The response is written to stdout as
//! HTTP/1.1, pulled from the gateway `-c` bytes at a time.
//!
//! The config file is in the [TOML format][toml]. Here is an example:
//!
//! ```toml
//! [origin]
//! scheme = "http"
//! host = "cgi.local"
//!
//! [site]
//! document_root = "htdocs"
//! index = "index.php"
//!
//! [cgi]
//! interpreter = "/usr/bin/php-cgi"
//! extension = "php"
//! timeout_secs = 30
//! pass_env = ["PATH"]
//!
//! [mime]
//! wasm = "application/wasm"
//! ```
//!
//! This example also serves as the defaults if no config file is provided,
//! or any given key is not present. Relative paths are taken from the
//! config file's directory. Logging goes to stderr and is filtered by the
//! `GATEWAY_LOG` environment variable.
//!
//! [toml]: https://github.com/toml-lang/toml

#[macro_use] extern crate log;

use cgi_gateway::config::parser::{self, parse_file};
use cgi_gateway::config::Config;
use cgi_gateway::errors::{Error, Result};
use cgi_gateway::gateway::{reason_phrase, BodyElement, Gateway, Interception, Request};
use cgi_gateway::ResourceHandler;

use clap::{value_parser, Arg, ArgAction, Command};

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::str;
use std::sync::mpsc;

fn main() {
    let mut log_builder = env_logger::Builder::new();
    log_builder.filter_level(log::LevelFilter::Info);

    if let Ok(var) = env::var("GATEWAY_LOG") {
        log_builder.parse_filters(&var);
    }

    if let Err(e) = log_builder.try_init() {
        eprintln!("cgi-gateway: Error when initializing logging: {}", e);
        exit(1);
    }

    let matches = Command::new("cgi-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Alex Hill <alexander.d.hill.89@gmail.com>")
        .about("Runs one request through the CGI gateway")
        .arg(Arg::new("config_file")
             .short('f')
             .value_name("FILE")
             .value_parser(value_parser!(PathBuf))
             .help("The TOML file with gateway configuration"))
        .arg(Arg::new("request_file")
             .short('r')
             .value_name("FILE")
             .value_parser(value_parser!(PathBuf))
             .help("A raw HTTP request; stdin if absent"))
        .arg(Arg::new("attach")
             .short('a')
             .value_name("FILE")
             .action(ArgAction::Append)
             .value_parser(value_parser!(PathBuf))
             .help("A file appended to the request body"))
        .arg(Arg::new("chunk")
             .short('c')
             .value_name("BYTES")
             .value_parser(value_parser!(usize))
             .default_value("4096")
             .help("How much to pull from the gateway per read"))
        .get_matches();

    let config = match matches.get_one::<PathBuf>("config_file") {
        Some(config_file) => load_config(config_file),
        None => Config::default()
    };

    let document_root = config.site.document_root.clone();
    let config = match config.canonicalize() {
        Ok(c) => c,
        Err(e) => {
            error!("Error opening document root {:?}: {}", document_root, e);
            exit(1);
        }
    };

    let raw = match matches.get_one::<PathBuf>("request_file") {
        Some(path) => fs::read(path),
        None => {
            let mut raw = Vec::new();
            io::stdin().read_to_end(&mut raw).map(|_| raw)
        }
    };
    let raw = match raw {
        Ok(r) => r,
        Err(e) => {
            error!("Error reading the request: {}", e);
            exit(1);
        }
    };

    let mut request = match parse_request(&raw, &config) {
        Ok(r) => r,
        Err(e) => {
            error!("Error parsing the request: {}", e);
            exit(1);
        }
    };

    for path in matches.get_many::<PathBuf>("attach").into_iter().flatten() {
        match BodyElement::file(path) {
            Ok(element) => request.body.push(element),
            Err(e) => {
                error!("Error attaching {:?}: {}", path, e);
                exit(1);
            }
        }
    }

    let chunk = matches.get_one::<usize>("chunk").copied().unwrap_or(4096);
    let gateway = Gateway::new(config);

    let handler = match gateway.intercept(request) {
        Interception::Handle(handler) => handler,
        Interception::Decline(request) => {
            error!("{} isn't on {}; nothing to do",
                   request.url.host, gateway.config().origin_url());
            exit(2);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();

    let outcome = run(handler).and_then(|mut handler| {
        write_response(&mut handler, chunk, &mut out)
    });

    if let Err(e) = outcome {
        error!("{}", e);
        let status = match e {
            Error::GatewayTimeout(_) => 504,
            _ => 502
        };
        let _ = write!(out, "HTTP/1.1 {} {}\r\nContent-Length: 0\r\n\r\n",
                       status, reason_phrase(status));
        let _ = out.flush();
        exit(1);
    }
}

fn load_config(config_file: &Path) -> Config {
    match parse_file(config_file) {
        Ok(c) => c,
        Err(parser::Error::Io(e)) => {
            error!("Error opening config file {:?}: {}", config_file, e);
            exit(1);
        },
        Err(parser::Error::Parse(e)) => {
            error!("Errors parsing config file {:?}", config_file);
            for error in e {
                error!("Config file error at line {} column {}: {}",
                       error.line, error.column, error.desc);
            }
            exit(1);
        },
        Err(parser::Error::Validation(message)) => {
            error!("Error in config file: {}", message);
            exit(1);
        }
    }
}

/// Processes on the gateway's worker, the way an embedding host would
fn run(handler: ResourceHandler) -> Result<ResourceHandler> {
    let (tx, rx) = mpsc::channel();
    handler.process_in_background(move |outcome| {
        let _ = tx.send(outcome);
    })?;

    rx.recv().map_err(|_| Error::WorkerLost)?
}

/// Builds a gateway request out of a raw HTTP/1.x one.
///
/// An origin-form target is placed on the virtual origin, or on the `Host`
/// header's host if there is one. Whatever follows the headers is the body.
fn parse_request(raw: &[u8], config: &Config) -> Result<Request> {
    let mut headers = [httparse::EMPTY_HEADER; 100];
    let mut parsed = httparse::Request::new(&mut headers);

    let consumed = match parsed.parse(raw)? {
        httparse::Status::Complete(bytes) => bytes,
        httparse::Status::Partial => return Err(Error::RequestIncomplete)
    };

    let method = parsed.method.ok_or(Error::RequestIncomplete)?;
    let target = parsed.path.ok_or(Error::RequestIncomplete)?;

    let url = if target.starts_with('/') {
        let host = parsed.headers.iter()
            .find(|h| h.name.eq_ignore_ascii_case("Host"))
            .and_then(|h| str::from_utf8(h.value).ok())
            .unwrap_or(config.origin.host.as_str());
        format!("{}://{}{}", config.origin.scheme, host.trim(), target)
    }
    else {
        String::from(target)
    };

    let mut request = Request::new(method, &url)?;
    for header in parsed.headers.iter() {
        request.headers.push(header.name, String::from_utf8_lossy(header.value).into_owned());
    }

    let body = &raw[consumed ..];
    if !body.is_empty() {
        request.body.push(BodyElement::Bytes(body.to_vec()));
    }

    Ok(request)
}

/// Writes the response as HTTP/1.1, pulling the body `chunk` bytes at a time.
fn write_response<W: Write>(handler: &mut ResourceHandler, chunk: usize, out: &mut W)
                            -> Result<()>
{
    {
        let head = handler.response_head()?;
        write!(out, "HTTP/1.1 {} {}\r\n", head.status, reason_phrase(head.status))?;

        for (name, value) in head.headers.iter() {
            // Status is CGI's, and Location is replaced by the absolute form
            if name.eq_ignore_ascii_case("Status") || name.eq_ignore_ascii_case("Location") {
                continue;
            }
            write!(out, "{}: {}\r\n", name, value)?;
        }

        if head.headers.get("Content-Type").is_none() {
            if let Some(ref mime) = head.mime_type {
                write!(out, "Content-Type: {}\r\n", mime)?;
            }
        }
        if let Some(ref location) = head.redirect_url {
            write!(out, "Location: {}\r\n", location)?;
        }
        if head.headers.get("Content-Length").is_none() {
            write!(out, "Content-Length: {}\r\n", head.content_length)?;
        }
        write!(out, "\r\n")?;
    }

    let mut buffer = vec![0; chunk.max(1)];
    loop {
        let read = handler.read(&mut buffer)?;
        out.write_all(&buffer[.. read.len])?;
        if read.is_final {
            break;
        }
    }

    out.flush()?;
    Ok(())
}

#[test]
fn parse_request_basic() {
    let request: &[u8] = b"GET /app/info.php?x=1 HTTP/1.1\r\nHost: cgi.local\r\nUser-Agent: curl/7.47.1\r\nAccept: */*\r\n\r\n";

    let request = parse_request(request, &Config::default()).unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.url.host, "cgi.local");
    assert_eq!(request.url.path, "/app/info.php");
    assert_eq!(request.url.query_str(), Some("x=1"));
    assert_eq!(request.headers.get("user-agent"), Some("curl/7.47.1"));
    assert!(request.body.is_empty());
}

#[test]
fn parse_request_does_not_percent_decode() {
    let request: &[u8] = b"GET /%20 HTTP/1.1\r\n\r\n";
    let request = parse_request(request, &Config::default()).unwrap();

    assert_eq!(request.url.path, "/%20");
    assert_eq!(request.url.host, "cgi.local");
}

#[test]
fn parse_request_keeps_the_body() {
    let request: &[u8] = b"POST /form.php HTTP/1.1\r\nHost: cgi.local\r\nContent-Length: 3\r\n\r\na=1";
    let request = parse_request(request, &Config::default()).unwrap();

    assert_eq!(request.body, vec![BodyElement::Bytes(b"a=1".to_vec())]);
}

#[test]
fn parse_request_incomplete() {
    let request: &[u8] = b"GET / HTTP/1.1\r\nHost: cgi";

    match parse_request(request, &Config::default()) {
        Err(Error::RequestIncomplete) => (),
        other => panic!("{:?}", other)
    }
}

#[test]
fn parse_request_honours_absolute_form() {
    let request: &[u8] = b"GET http://elsewhere.example/x HTTP/1.1\r\n\r\n";
    let request = parse_request(request, &Config::default()).unwrap();

    assert_eq!(request.url.host, "elsewhere.example");
}
