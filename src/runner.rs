//! Curried process invocation.
//!
//! A [`Runner`] turns arguments into one command line, hands it to the shell,
//! waits for the process and post-processes what it printed. Every builder
//! method returns a new runner with one more setting bound, so a runner can be
//! specialized step by step (working directory, environment, leading arguments,
//! error policy, egress) without touching the original.
//!
//! The command line is interpreted by the shell and nothing is escaped on the
//! caller's behalf. Use [`quote`] on any token that comes from untrusted input.

use crate::egress;
use crate::env::Environment;
use crate::error::{Error, Result};
use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Post-processing applied to captured output before it is returned.
pub type Egress<T> = Arc<dyn Fn(Vec<u8>) -> anyhow::Result<T> + Send + Sync>;

type Handler<T> = Arc<dyn Fn(&Error) -> Result<T> + Send + Sync>;

/// What a runner does when a process fails.
pub enum ErrorPolicy<T> {
    /// Return the error to the caller.
    Raise,
    /// Treat a non-zero exit as success and return the captured output.
    /// A missing command or a timeout is still an error.
    Ignore,
    /// Let a handler decide. It sees every process-level failure (command not
    /// found, non-zero exit, timeout) and its return value becomes the result.
    Handle(Handler<T>),
}

impl<T> ErrorPolicy<T> {
    pub fn handle<F>(f: F) -> Self
    where
        F: Fn(&Error) -> Result<T> + Send + Sync + 'static,
    {
        ErrorPolicy::Handle(Arc::new(f))
    }
}

impl<T> Clone for ErrorPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            ErrorPolicy::Raise => ErrorPolicy::Raise,
            ErrorPolicy::Ignore => ErrorPolicy::Ignore,
            ErrorPolicy::Handle(f) => ErrorPolicy::Handle(Arc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for ErrorPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Raise => f.write_str("Raise"),
            ErrorPolicy::Ignore => f.write_str("Ignore"),
            ErrorPolicy::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

/// The shell that interprets command lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shell {
    program: OsString,
    flag: String,
    not_found_code: Option<i32>,
    not_executable_code: Option<i32>,
}

impl Shell {
    /// `/bin/sh -c`, which reports unknown commands with status 127 and files
    /// it found but could not execute with 126.
    pub fn posix() -> Self {
        Self {
            program: "/bin/sh".into(),
            flag: "-c".to_string(),
            not_found_code: Some(127),
            not_executable_code: Some(126),
        }
    }

    /// `cmd /C`, which reports unknown commands with status 9009.
    pub fn cmd() -> Self {
        Self {
            program: "cmd".into(),
            flag: "/C".to_string(),
            not_found_code: Some(9009),
            not_executable_code: None,
        }
    }

    /// Any program that runs a command line passed after `flag`.
    ///
    /// `not_found_code` is the exit status the shell uses for unknown commands, if any.
    pub fn custom(
        program: impl Into<OsString>,
        flag: impl Into<String>,
        not_found_code: Option<i32>,
    ) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
            not_found_code,
            not_executable_code: None,
        }
    }

    /// Exit status the shell uses for a program it found but could not execute.
    pub fn not_executable_code(mut self, code: Option<i32>) -> Self {
        self.not_executable_code = code;
        self
    }

    fn cannot_launch(&self, status: i32) -> bool {
        [self.not_found_code, self.not_executable_code].contains(&Some(status))
    }
}

impl Default for Shell {
    fn default() -> Self {
        if cfg!(windows) { Self::cmd() } else { Self::posix() }
    }
}

/// Everything one invocation produced, before policy and egress are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    /// The line handed to the shell.
    pub command_line: String,
    /// Exit status; `128 + signal` when the process was killed by a signal.
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Arguments accepted by [`Runner::run`]: one pre-joined string or a sequence of tokens.
///
/// Both forms end up on one command line, so `run("echo hello world")` and
/// `run(["echo", "hello", "world"])` spawn the same thing.
pub trait IntoArgs {
    fn into_args(self) -> Vec<String>;
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<String> {
        Vec::new()
    }
}

impl IntoArgs for &str {
    fn into_args(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl IntoArgs for String {
    fn into_args(self) -> Vec<String> {
        vec![self]
    }
}

impl IntoArgs for &String {
    fn into_args(self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl<S: AsRef<str>> IntoArgs for &[S] {
    fn into_args(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoArgs for [S; N] {
    fn into_args(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>, const N: usize> IntoArgs for &[S; N] {
    fn into_args(self) -> Vec<String> {
        self.as_slice().into_args()
    }
}

impl<S: AsRef<str>> IntoArgs for Vec<S> {
    fn into_args(self) -> Vec<String> {
        self.iter().map(|s| s.as_ref().to_string()).collect()
    }
}

impl<S: AsRef<str>> IntoArgs for &Vec<S> {
    fn into_args(self) -> Vec<String> {
        self.as_slice().into_args()
    }
}

/// Runs shell command lines and post-processes their output.
///
/// Example
/// ```no_run
/// use path_commands::Runner;
/// let echo = Runner::new().text().arg("echo");
/// assert_eq!(echo.run("hello world").unwrap(), "hello world");
/// assert_eq!(echo.run(["hello", "world"]).unwrap(), "hello world");
/// ```
pub struct Runner<T = Vec<u8>> {
    env: Environment,
    shell: Shell,
    prefix: Vec<String>,
    input: Option<Arc<[u8]>>,
    timeout: Option<Duration>,
    capture_stderr: bool,
    strip_newlines: bool,
    on_error: ErrorPolicy<T>,
    egress: Egress<T>,
}

impl Runner<Vec<u8>> {
    /// A runner returning raw stdout bytes and raising on failure.
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
            shell: Shell::default(),
            prefix: Vec::new(),
            input: None,
            timeout: None,
            capture_stderr: false,
            strip_newlines: true,
            on_error: ErrorPolicy::Raise,
            egress: Arc::new(egress::bytes),
        }
    }
}

impl Default for Runner<Vec<u8>> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Runner<T> {
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            shell: self.shell.clone(),
            prefix: self.prefix.clone(),
            input: self.input.clone(),
            timeout: self.timeout,
            capture_stderr: self.capture_stderr,
            strip_newlines: self.strip_newlines,
            on_error: self.on_error.clone(),
            egress: Arc::clone(&self.egress),
        }
    }
}

impl<T> fmt::Debug for Runner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runner")
            .field("env", &self.env)
            .field("shell", &self.shell)
            .field("prefix", &self.prefix)
            .field("input", &self.input.as_ref().map(|i| i.len()))
            .field("timeout", &self.timeout)
            .field("capture_stderr", &self.capture_stderr)
            .field("strip_newlines", &self.strip_newlines)
            .field("on_error", &self.on_error)
            .finish_non_exhaustive()
    }
}

impl<T> Runner<T> {
    /// Run children in `dir`.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.env.set_current_dir(dir);
        self
    }

    pub fn env(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.env.set_var(key, val);
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env.remove_var(key);
        self
    }

    pub fn env_clear(mut self) -> Self {
        self.env.clear();
        self
    }

    /// Replace the whole environment at once.
    pub fn environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Append captured stderr to stdout before egress.
    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }

    /// Hand output to egress without stripping leading and trailing newlines.
    pub fn keep_newlines(mut self) -> Self {
        self.strip_newlines = false;
        self
    }

    /// Feed `input` to the child's stdin. Without it stdin is closed.
    pub fn input(mut self, input: impl Into<Vec<u8>>) -> Self {
        let input: Vec<u8> = input.into();
        self.input = Some(Arc::from(input));
        self
    }

    pub fn shell(mut self, shell: Shell) -> Self {
        self.shell = shell;
        self
    }

    /// Bind a leading token placed before every call's arguments.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.prefix.push(arg.into());
        self
    }

    /// Bind several leading tokens.
    pub fn args(mut self, args: impl IntoArgs) -> Self {
        self.prefix.extend(args.into_args());
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy<T>) -> Self {
        self.on_error = policy;
        self
    }

    /// Shorthand for `on_error(ErrorPolicy::Ignore)`.
    pub fn ignore_errors(self) -> Self {
        self.on_error(ErrorPolicy::Ignore)
    }

    /// Replace the egress, changing what `run` returns.
    ///
    /// A bound [`ErrorPolicy::Handle`] produces the old output type, so it cannot
    /// survive the change and falls back to [`ErrorPolicy::Raise`]. Bind handlers
    /// after the egress.
    pub fn egress<U, F>(self, egress: F) -> Runner<U>
    where
        F: Fn(Vec<u8>) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        let on_error = match self.on_error {
            ErrorPolicy::Raise => ErrorPolicy::Raise,
            ErrorPolicy::Ignore => ErrorPolicy::Ignore,
            ErrorPolicy::Handle(_) => {
                debug!("Dropping error handler bound to the previous egress");
                ErrorPolicy::Raise
            }
        };
        Runner {
            env: self.env,
            shell: self.shell,
            prefix: self.prefix,
            input: self.input,
            timeout: self.timeout,
            capture_stderr: self.capture_stderr,
            strip_newlines: self.strip_newlines,
            on_error,
            egress: Arc::new(egress),
        }
    }

    /// Decode output as UTF-8 text.
    pub fn text(self) -> Runner<String> {
        self.egress(egress::text)
    }

    pub fn get_environment(&self) -> &Environment {
        &self.env
    }

    pub fn get_prefix(&self) -> &[String] {
        &self.prefix
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The exact line `run(args)` would hand to the shell.
    pub fn command_line(&self, args: impl IntoArgs) -> String {
        let args = args.into_args();
        self.prefix
            .iter()
            .chain(args.iter())
            .map(String::as_str)
            .filter(|token| !token.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run and post-process, applying the error policy and egress.
    pub fn run(&self, args: impl IntoArgs) -> Result<T> {
        let line = self.command_line(args);
        let result = self.execute(&line).and_then(|output| self.check(output));
        match result {
            Ok(output) => self.finish(output),
            Err(e) => match &self.on_error {
                ErrorPolicy::Handle(handler) if is_process_failure(&e) => handler(&e),
                _ => Err(e),
            },
        }
    }

    /// Run without applying the error policy or egress.
    ///
    /// Fails only when the process cannot be spawned or times out.
    pub fn run_raw(&self, args: impl IntoArgs) -> Result<RunOutput> {
        let line = self.command_line(args);
        self.execute(&line)
    }

    fn check(&self, output: RunOutput) -> Result<RunOutput> {
        if output.success() {
            return Ok(output);
        }
        if self.shell.cannot_launch(output.status) {
            return Err(Error::CommandNotFound {
                command: output.command_line,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        if let ErrorPolicy::Ignore = self.on_error {
            debug!(
                "Ignoring status {} of `{}`",
                output.status, output.command_line
            );
            return Ok(output);
        }
        Err(Error::Process {
            command: output.command_line,
            code: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            stdout: output.stdout,
        })
    }

    fn finish(&self, output: RunOutput) -> Result<T> {
        let mut bytes = output.stdout;
        if self.capture_stderr {
            bytes.extend_from_slice(&output.stderr);
        }
        if self.strip_newlines {
            bytes = strip_newlines(bytes);
        }
        (self.egress)(bytes).map_err(Error::Egress)
    }

    fn execute(&self, line: &str) -> Result<RunOutput> {
        if let Some(dir) = self.env.current_dir() {
            if !dir.is_dir() {
                return Err(Error::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("working directory {} does not exist", dir.display()),
                )));
            }
        }

        let mut cmd = ProcessCommand::new(&self.shell.program);
        cmd.arg(&self.shell.flag).arg(line);
        self.env.apply(&mut cmd);
        cmd.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        // Own process group, so a timeout takes down everything the shell started
        #[cfg(unix)]
        if self.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        debug!("Spawning `{}`", line);
        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::CommandNotFound {
                command: line.to_string(),
                stderr: format!("{}: {}", self.shell.program.to_string_lossy(), e),
            },
            _ => Error::Spawn {
                command: line.to_string(),
                source: e,
            },
        })?;

        let writer = match (child.stdin.take(), &self.input) {
            (Some(mut stdin), Some(input)) => {
                let input = Arc::clone(input);
                // Broken pipes are expected when the child does not read its input.
                Some(thread::spawn(move || {
                    let _ = stdin.write_all(&input);
                }))
            }
            _ => None,
        };
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = match self.timeout {
            None => child.wait()?,
            Some(timeout) => match wait_with_timeout(&mut child, timeout)? {
                Some(status) => status,
                None => {
                    // Readers are left to finish on their own; a child that left
                    // the process group may still hold the pipes open.
                    warn!("`{}` timed out after {:?}, killed", line, timeout);
                    return Err(Error::Timeout {
                        command: line.to_string(),
                        timeout,
                    });
                }
            },
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        let status = exit_code(status);
        debug!("`{}` exited with status {}", line, status);
        Ok(RunOutput {
            command_line: line.to_string(),
            status,
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        })
    }
}

fn is_process_failure(e: &Error) -> bool {
    matches!(
        e,
        Error::CommandNotFound { .. } | Error::Process { .. } | Error::Timeout { .. }
    )
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Poll the child until it exits or `timeout` elapses. `None` means it was killed
/// together with its process group.
fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start.elapsed() >= timeout {
            kill_process_group(child);
            let _ = child.kill();
            let _ = child.wait();
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    let pid = child.id();
    // The negative PID addresses the group the child leads.
    unsafe {
        libc::kill(-(pid as i32), libc::SIGKILL);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(x) => x,
        None => terminated_by_signal(status),
    }
}

#[cfg(unix)]
fn terminated_by_signal(exit_status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = ExitStatusExt::signal(&exit_status) {
        128 + signal
    } else if ExitStatusExt::core_dumped(&exit_status) {
        255
    } else {
        -1
    }
}

#[cfg(not(unix))]
fn terminated_by_signal(_exit_status: ExitStatus) -> i32 {
    -1
}

fn strip_newlines(mut bytes: Vec<u8>) -> Vec<u8> {
    let is_newline = |b: &u8| *b == b'\n' || *b == b'\r';
    while bytes.last().is_some_and(is_newline) {
        bytes.pop();
    }
    let leading = bytes.iter().take_while(|b| is_newline(b)).count();
    bytes.drain(..leading);
    bytes
}

/// Quote `token` for a POSIX shell so it reaches the program as one literal argument.
///
/// Tokens containing a NUL byte cannot be passed to a process and are rejected.
///
/// ```
/// use path_commands::{Error, quote};
/// assert_eq!(quote("plain-word").unwrap(), "plain-word");
/// assert_ne!(quote("it's $HOME").unwrap(), "it's $HOME");
/// assert!(matches!(quote("a\0b"), Err(Error::Quote(_))));
/// ```
pub fn quote(token: &str) -> Result<String> {
    shlex::try_quote(token)
        .map(Cow::into_owned)
        .map_err(|_| Error::Quote(token.to_string()))
}
