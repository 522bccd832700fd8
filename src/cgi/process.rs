//! Running the interpreter
//!
//! One child process per request. The body goes in on stdin, the whole of
//! stdout comes back as one buffer, and stderr is logged as it arrives.
//!
//! Stdin, stdout and stderr each get their own thread so a script that
//! doesn't read its input (or writes a lot before reading it) can't wedge
//! the pipes. The calling thread just waits on the results, up to the
//! deadline if there is one.

use crate::cgi::CgiEnvironment;
use crate::errors::{Error, Result};
use crate::gateway::BodyElement;
use crate::log_util::ascii_escape;

use std::env;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Everything needed to start the interpreter for one script
#[derive(Debug)]
pub struct Invocation<'a> {
    pub interpreter: &'a Path,
    /// Passed as the interpreter's only argument
    pub script: &'a Path,
    pub working_dir: &'a Path,
    pub env: &'a CgiEnvironment,
    /// Host variables copied into the otherwise empty environment
    pub pass_env: &'a [String],
    pub timeout: Option<Duration>
}

impl<'a> Invocation<'a> {
    fn command(&self) -> Command {
        let mut command = Command::new(self.interpreter);
        command.arg(self.script)
            .current_dir(self.working_dir)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for name in self.pass_env {
            if let Some(value) = env::var_os(name) {
                command.env(name, value);
            }
        }

        for (name, value) in self.env.iter() {
            command.env(name, value);
        }

        command
    }
}

enum Event {
    Output(io::Result<Vec<u8>>),
    BodyWritten(Result<()>)
}

/// Runs the script to completion and returns everything it wrote to stdout.
///
/// Body elements are written in order. A file element that can't be read
/// kills the child and fails with `BodyStreamFailure`; a child that doesn't
/// want the rest of its input is not an error.
pub fn run(invocation: &Invocation, body: Vec<BodyElement>) -> Result<Vec<u8>> {
    let mut child = invocation.command().spawn().map_err(Error::GatewayStartFailure)?;
    let deadline = invocation.timeout.map(|limit| Instant::now() + limit);
    let script = invocation.script.display().to_string();

    debug!("Started {} for {} as pid {}",
           invocation.interpreter.display(), script, child.id());

    let (stdin, stdout, stderr) = match (child.stdin.take(),
                                         child.stdout.take(),
                                         child.stderr.take()) {
        (Some(i), Some(o), Some(e)) => (i, o, e),
        _ => {
            reap(&mut child);
            return Err(Error::GatewayStartFailure(
                io::Error::new(io::ErrorKind::Other, "interpreter pipes weren't captured")));
        }
    };

    let (tx, rx) = mpsc::channel();

    let helpers = {
        let body_tx = tx.clone();
        let output_tx = tx;
        let log_name = script.clone();

        spawn_helper("cgi-stdin", move || {
            let _ = body_tx.send(Event::BodyWritten(write_body(stdin, body)));
        })
            .and_then(|_| spawn_helper("cgi-stdout", move || {
                let _ = output_tx.send(Event::Output(read_all(stdout)));
            }))
            .and_then(|_| spawn_helper("cgi-stderr", move || log_errors(stderr, &log_name)))
    };

    if let Err(e) = helpers {
        reap(&mut child);
        return Err(Error::Io(e));
    }

    let mut output = None;
    let mut body_written = false;

    while output.is_none() || !body_written {
        let event = match recv_until(&rx, deadline) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                let limit = invocation.timeout.unwrap_or_default();
                warn!("{} ran longer than {:?}; killing pid {}", script, limit, child.id());
                reap(&mut child);
                return Err(Error::GatewayTimeout(limit));
            },
            Err(RecvTimeoutError::Disconnected) => {
                reap(&mut child);
                return Err(Error::WorkerLost);
            }
        };

        match event {
            Event::Output(Ok(bytes)) => output = Some(bytes),
            Event::Output(Err(e)) => {
                reap(&mut child);
                return Err(Error::Io(e));
            },
            Event::BodyWritten(Ok(())) => body_written = true,
            Event::BodyWritten(Err(e)) => {
                warn!("Abandoning {}: {}", script, e);
                reap(&mut child);
                return Err(e);
            }
        }
    }

    let status = wait_until(&mut child, deadline, invocation.timeout)?;
    if status.success() {
        debug!("{} finished", script);
    }
    else {
        warn!("Interpreter for {} exited unsuccessfully: {}", script, status);
    }

    Ok(output.unwrap_or_default())
}

fn spawn_helper<F>(name: &str, f: F) -> io::Result<()>
    where F: FnOnce() + Send + 'static
{
    thread::Builder::new()
        .name(String::from(name))
        .spawn(f)
        .map(|_| ())
}

fn recv_until<T>(rx: &Receiver<T>, deadline: Option<Instant>)
                 -> ::std::result::Result<T, RecvTimeoutError>
{
    match deadline {
        Some(deadline) =>
            rx.recv_timeout(deadline.saturating_duration_since(Instant::now())),
        None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected)
    }
}

/// Waits for the child to exit once its output is closed
///
/// Scripts can close stdout and keep going, so the deadline still applies.
fn wait_until(child: &mut Child, deadline: Option<Instant>, limit: Option<Duration>)
              -> Result<ExitStatus>
{
    let deadline = match deadline {
        Some(d) => d,
        None => return Ok(child.wait()?)
    };

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if Instant::now() >= deadline {
            warn!("pid {} closed its output but didn't exit; killing it", child.id());
            reap(child);
            return Err(Error::GatewayTimeout(limit.unwrap_or_default()));
        }

        thread::sleep(Duration::from_millis(5));
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn write_body(mut stdin: ChildStdin, body: Vec<BodyElement>) -> Result<()> {
    for element in body {
        let chunk = match element {
            BodyElement::Bytes(bytes) => bytes,
            BodyElement::File { path, .. } => match fs::read(&path) {
                Ok(contents) => contents,
                Err(e) => return Err(Error::BodyStreamFailure { path: path, source: e })
            }
        };

        if let Err(e) = stdin.write_all(&chunk) {
            debug!("Interpreter stopped reading its input: {}", e);
            return Ok(());
        }
    }

    let _ = stdin.flush();
    Ok(())
}

fn read_all(mut stdout: ChildStdout) -> io::Result<Vec<u8>> {
    let mut output = Vec::with_capacity(16 * 1024);
    stdout.read_to_end(&mut output)?;
    Ok(output)
}

fn log_errors(stderr: ChildStderr, script: &str) {
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = match line.iter().rposition(|&b| b != b'\n' && b != b'\r') {
                    Some(end) => &line[.. end + 1],
                    None => continue
                };
                warn!("Error message from {}: \"{}\"", script, ascii_escape(trimmed));
            }
        }
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;

    use std::path::PathBuf;

    struct Fixture {
        dir: tempfile::TempDir,
        env: CgiEnvironment,
        pass_env: Vec<String>
    }

    impl Fixture {
        fn new(script: &str) -> Fixture {
            let dir = tempfile::tempdir().unwrap();
            fs::write(dir.path().join("script.sh"), script).unwrap();

            let mut env = CgiEnvironment::new();
            env.set("REQUEST_METHOD", "POST");
            env.set("CONTENT_LENGTH", "0");

            Fixture { dir: dir, env: env, pass_env: vec![String::from("PATH")] }
        }

        fn script(&self) -> PathBuf {
            self.dir.path().join("script.sh")
        }

        fn run(&self, body: Vec<BodyElement>, timeout: Option<Duration>) -> Result<Vec<u8>> {
            let script = self.script();
            let invocation = Invocation {
                interpreter: Path::new("/bin/sh"),
                script: &script,
                working_dir: self.dir.path(),
                env: &self.env,
                pass_env: &self.pass_env,
                timeout: timeout
            };
            run(&invocation, body)
        }
    }

    #[test]
    fn output_is_captured_whole() {
        let fixture = Fixture::new("printf 'Content-Type: text/plain\\r\\n\\r\\n'\nprintf 'method=%s' \"$REQUEST_METHOD\"\n");
        let output = fixture.run(Vec::new(), None).unwrap();

        assert_eq!(output, b"Content-Type: text/plain\r\n\r\nmethod=POST");
    }

    #[test]
    fn body_elements_arrive_in_order() {
        let fixture = Fixture::new("cat\n");
        let upload = fixture.dir.path().join("part.txt");
        fs::write(&upload, b"-middle-").unwrap();

        let output = fixture.run(vec![
            BodyElement::Bytes(b"first".to_vec()),
            BodyElement::File { path: upload, size: 8 },
            BodyElement::Bytes(b"last".to_vec())
        ], Some(Duration::from_secs(10))).unwrap();

        assert_eq!(output, b"first-middle-last");
    }

    #[test]
    fn working_directory_is_the_given_one() {
        let fixture = Fixture::new("pwd -P\n");
        let output = fixture.run(Vec::new(), None).unwrap();
        let expected = fs::canonicalize(fixture.dir.path()).unwrap();

        assert_eq!(String::from_utf8(output).unwrap().trim(), expected.to_str().unwrap());
    }

    #[test]
    fn environment_is_not_inherited() {
        env::set_var("CGI_GATEWAY_TEST_LEAK", "leaked");
        let fixture = Fixture::new("printf '%s' \"${CGI_GATEWAY_TEST_LEAK:-clean}\"\n");
        let output = fixture.run(Vec::new(), None).unwrap();

        assert_eq!(output, b"clean");
    }

    #[test]
    fn script_that_ignores_a_big_body_still_completes() {
        let fixture = Fixture::new("printf 'done'\n");
        let body = vec![BodyElement::Bytes(vec![b'x'; 4 * 1024 * 1024])];
        let output = fixture.run(body, Some(Duration::from_secs(10))).unwrap();

        assert_eq!(output, b"done");
    }

    #[test]
    fn unreadable_body_file_fails_the_request() {
        let fixture = Fixture::new("cat\n");
        let missing = fixture.dir.path().join("gone.bin");

        match fixture.run(vec![BodyElement::File { path: missing.clone(), size: 4 }],
                          Some(Duration::from_secs(10))) {
            Err(Error::BodyStreamFailure { path, .. }) => assert_eq!(path, missing),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn missing_interpreter_is_a_start_failure() {
        let fixture = Fixture::new("");
        let script = fixture.script();
        let invocation = Invocation {
            interpreter: Path::new("/nonexistent/php-cgi"),
            script: &script,
            working_dir: fixture.dir.path(),
            env: &fixture.env,
            pass_env: &fixture.pass_env,
            timeout: None
        };

        match run(&invocation, Vec::new()) {
            Err(Error::GatewayStartFailure(_)) => (),
            other => panic!("{:?}", other)
        }
    }

    #[test]
    fn runaway_script_is_killed() {
        let fixture = Fixture::new("exec sleep 30\n");
        let started = Instant::now();

        match fixture.run(Vec::new(), Some(Duration::from_millis(200))) {
            Err(Error::GatewayTimeout(limit)) => assert_eq!(limit, Duration::from_millis(200)),
            other => panic!("{:?}", other)
        }
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn failing_script_output_is_still_returned() {
        let fixture = Fixture::new("printf 'Status: 500\\n\\n'\necho oops >&2\nexit 3\n");
        let output = fixture.run(Vec::new(), None).unwrap();

        assert_eq!(output, b"Status: 500\n\n");
    }
}
