//! Best-effort documentation lookup for commands.
//!
//! Sources are tried in order and the first one that exits successfully with
//! non-empty output wins. Failures are logged and swallowed.

use crate::env::Environment;
use crate::runner::{Runner, quote};
use regex::Regex;
use std::sync::{Arc, Condvar, LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Upper bound for a single documentation query.
pub const DOC_TIMEOUT: Duration = Duration::from_secs(10);

/// Width of the brief form returned by [`brief`].
pub const BRIEF_WIDTH: usize = 80;

static OVERSTRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s).\x08").expect("valid overstrike regex"));

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid escape regex"));

/// Where documentation for a command can come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocSource {
    /// `man <program>`, rendered without a pager.
    ManPage,
    /// `<command> <flag>`, e.g. `--help`; stderr counts as output.
    Flag(String),
}

impl DocSource {
    /// Manual page, then `--help`, then `-h`.
    pub fn defaults() -> Vec<DocSource> {
        vec![
            DocSource::ManPage,
            DocSource::Flag("--help".to_string()),
            DocSource::Flag("-h".to_string()),
        ]
    }

    fn query(&self, name: &str, env: &Environment) -> Option<String> {
        let runner = Runner::new()
            .environment(env.clone())
            .timeout(DOC_TIMEOUT)
            .egress(crate::egress::text_lossy);
        let result = match self {
            DocSource::ManPage => {
                let program = name.split_whitespace().next()?;
                let page = quote(program.rsplit('/').next().unwrap_or(program)).ok()?;
                runner
                    .env("MANPAGER", "cat")
                    .env("PAGER", "cat")
                    .env("MANWIDTH", "80")
                    .run(["man", page.as_str()])
                    .map(|page| clean_terminal_text(&page))
            }
            DocSource::Flag(flag) => runner.capture_stderr(true).run([name, flag.as_str()]),
        };
        match result {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => {
                trace!("{:?} for `{}` produced no output", self, name);
                None
            }
            Err(e) => {
                trace!("{:?} for `{}` failed: {}", self, name, e);
                None
            }
        }
    }
}

/// Try each source in order, returning the first usable text.
pub fn lookup(name: &str, env: &Environment, sources: &[DocSource]) -> Option<String> {
    sources.iter().find_map(|source| source.query(name, env))
}

/// Remove backspace overstrikes and ANSI escapes left by terminal formatters.
pub fn clean_terminal_text(text: &str) -> String {
    let text = OVERSTRIKE.replace_all(text, "");
    ANSI_ESCAPE.replace_all(&text, "").into_owned()
}

/// A one-line summary of a help text.
///
/// Uses the line after a `NAME` heading when there is one (manual pages), the
/// first non-blank line otherwise, and truncates it to [`BRIEF_WIDTH`].
pub fn brief(help: &str) -> String {
    let mut lines = help.lines().map(str::trim);
    let mut after_name = help
        .lines()
        .map(str::trim)
        .skip_while(|line| *line != "NAME")
        .skip(1);
    let line = after_name
        .find(|line| !line.is_empty())
        .or_else(|| lines.find(|line| !line.is_empty()))
        .unwrap_or_default();
    let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() <= BRIEF_WIDTH {
        return line;
    }
    let mut short: String = line.chars().take(BRIEF_WIDTH - 3).collect();
    short.push_str("...");
    short
}

/// Text shown when no source produced documentation.
pub fn placeholder(name: &str) -> String {
    format!("No documentation available for `{name}`.")
}

/// Resolution state of a command's documentation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DocState {
    #[default]
    Unresolved,
    /// One caller is querying the sources; others wait for its result.
    Resolving,
    Present(Arc<str>),
    Absent,
}

/// Memoized documentation, resolved at most once.
///
/// The lock is released while the sources are queried: [`DocCache::state`]
/// answers immediately with [`DocState::Resolving`], and concurrent first
/// readers block on a condition variable until the single resolution is done.
#[derive(Debug, Default)]
pub struct DocCache {
    state: Mutex<DocState>,
    resolved: Condvar,
}

impl DocCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current state without resolving or waiting.
    pub fn state(&self) -> DocState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return the cached documentation, running `resolve` on first use.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Option<Arc<str>>
    where
        F: FnOnce() -> Option<String>,
    {
        let mut resolve = Some(resolve);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match &*state {
                DocState::Present(text) => return Some(Arc::clone(text)),
                DocState::Absent => return None,
                DocState::Resolving => {
                    state = self.resolved.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                DocState::Unresolved => {
                    let Some(resolve) = resolve.take() else {
                        return None;
                    };
                    *state = DocState::Resolving;
                    drop(state);
                    let mut guard = ResolvingGuard { cache: self, done: false };
                    let resolved = match resolve() {
                        Some(text) => DocState::Present(Arc::from(text)),
                        None => DocState::Absent,
                    };
                    guard.done = true;
                    state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    *state = resolved;
                    self.resolved.notify_all();
                }
            }
        }
    }
}

/// Puts the cache back to `Unresolved` if `resolve` panics and wakes the waiters,
/// one of which resolves again.
struct ResolvingGuard<'a> {
    cache: &'a DocCache,
    done: bool,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.cache.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = DocState::Unresolved;
        self.cache.resolved.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn overstrikes_and_escapes_are_removed() {
        assert_eq!(clean_terminal_text("N\x08NA\x08AM\x08ME\x08E"), "NAME");
        assert_eq!(clean_terminal_text("_\x08l_\x08s"), "ls");
        assert_eq!(clean_terminal_text("\x1b[1mbold\x1b[0m"), "bold");
    }

    #[test]
    fn brief_prefers_name_section() {
        let page = "LS(1)      User Commands     LS(1)\n\nNAME\n       ls - list directory contents\n\nSYNOPSIS\n";
        assert_eq!(brief(page), "ls - list directory contents");
    }

    #[test]
    fn brief_falls_back_to_first_line() {
        assert_eq!(brief("\n\n  Usage: tool [OPTIONS]\nmore"), "Usage: tool [OPTIONS]");
        assert_eq!(brief(""), "");
    }

    #[test]
    fn brief_truncates_long_lines() {
        let long = "x".repeat(200);
        let short = brief(&long);
        assert_eq!(short.chars().count(), BRIEF_WIDTH);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn cache_resolves_once() {
        let cache = DocCache::new();
        assert_eq!(cache.state(), DocState::Unresolved);
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let doc = cache.get_or_resolve(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Some("text".to_string())
            });
            assert_eq!(doc.as_deref(), Some("text"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn absent_docs_are_cached_too() {
        let cache = DocCache::new();
        assert_eq!(cache.get_or_resolve(|| None), None);
        assert_eq!(cache.state(), DocState::Absent);
        assert_eq!(cache.get_or_resolve(|| Some("late".into())), None);
    }

    #[test]
    fn concurrent_first_access_resolves_once() {
        let cache = Arc::new(DocCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.get_or_resolve(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(20));
                        Some("shared".to_string())
                    })
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("shared"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn state_is_readable_while_resolving() {
        let cache = Arc::new(DocCache::new());
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let resolver = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_resolve(|| {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Some("slow".to_string())
                })
            })
        };
        started_rx.recv().unwrap();

        let start = Instant::now();
        assert_eq!(cache.state(), DocState::Resolving);
        assert!(start.elapsed() < Duration::from_secs(1));

        let waiter = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get_or_resolve(|| Some("second".to_string())))
        };
        thread::sleep(Duration::from_millis(50));
        release_tx.send(()).unwrap();

        assert_eq!(resolver.join().unwrap().as_deref(), Some("slow"));
        assert_eq!(waiter.join().unwrap().as_deref(), Some("slow"));
        assert_eq!(cache.state(), DocState::Present(Arc::from("slow")));
    }

    #[test]
    fn panicking_resolver_leaves_cache_unresolved() {
        let cache = DocCache::new();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            cache.get_or_resolve(|| panic!("boom"))
        }));
        assert!(panicked.is_err());
        assert_eq!(cache.state(), DocState::Unresolved);
        assert_eq!(cache.get_or_resolve(|| Some("ok".into())).as_deref(), Some("ok"));
    }
}
