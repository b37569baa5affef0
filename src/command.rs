use crate::docs::{self, DocCache, DocSource, DocState};
use crate::error::Result;
use crate::runner::{IntoArgs, Runner};
use crate::search::{SearchPath, find_command_path};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One executable bound to a [`Runner`].
///
/// Construction does no I/O. Calling the command runs `<name> <args>` through the
/// runner; documentation is looked up on first request and memoized. Clones share
/// the documentation cache.
///
/// Two commands are equal when they wrap the same name, whatever their runners.
pub struct Command<T = Vec<u8>> {
    name: String,
    runner: Runner<T>,
    doc_sources: Arc<[DocSource]>,
    docs: Arc<DocCache>,
}

impl Command<Vec<u8>> {
    /// Bind `name` to the default runner, which returns stdout bytes.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_runner(name, Runner::new())
    }
}

impl<T> Command<T> {
    pub fn with_runner(name: impl Into<String>, runner: Runner<T>) -> Self {
        Self {
            name: name.into(),
            runner,
            doc_sources: DocSource::defaults().into(),
            docs: Arc::new(DocCache::new()),
        }
    }

    /// Replace the documentation sources, forgetting anything resolved so far.
    pub fn with_doc_sources(mut self, sources: Vec<DocSource>) -> Self {
        self.doc_sources = sources.into();
        self.docs = Arc::new(DocCache::new());
        self
    }

    /// The literal string handed to the shell in front of the arguments.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn runner(&self) -> &Runner<T> {
        &self.runner
    }

    /// The line `call(args)` would hand to the shell.
    pub fn command_line(&self, args: impl IntoArgs) -> String {
        self.runner.command_line(self.tokens(args))
    }

    /// Run the command with `args` appended to its name.
    pub fn call(&self, args: impl IntoArgs) -> Result<T> {
        self.runner.run(self.tokens(args))
    }

    fn tokens(&self, args: impl IntoArgs) -> Vec<String> {
        let mut tokens = vec![self.name.clone()];
        tokens.extend(args.into_args());
        tokens
    }

    /// Locate the program on the runner's search path.
    ///
    /// `None` for shell builtins, aliases and programs that do not exist.
    pub fn resolve(&self) -> Option<PathBuf> {
        let program = self.name.split_whitespace().next()?;
        let env = self.runner.get_environment();
        let search_path = SearchPath::from_environment(env);
        find_command_path(&search_path, &env.effective_dir(), Path::new(program))
            .map(|path| path.into_owned())
    }

    /// Full documentation, or a placeholder when none could be found.
    ///
    /// Never fails; lookup errors are logged at trace level.
    pub fn help_str(&self) -> String {
        match self.resolved_docs() {
            Some(text) => text.to_string(),
            None => docs::placeholder(&self.name),
        }
    }

    /// Print the documentation to stdout.
    pub fn help(&self) {
        println!("{}", self.help_str());
    }

    /// One-line summary of the documentation.
    pub fn doc(&self) -> String {
        match self.resolved_docs() {
            Some(text) => docs::brief(&text),
            None => docs::placeholder(&self.name),
        }
    }

    pub fn doc_state(&self) -> DocState {
        self.docs.state()
    }

    fn resolved_docs(&self) -> Option<Arc<str>> {
        self.docs.get_or_resolve(|| {
            docs::lookup(&self.name, self.runner.get_environment(), &self.doc_sources)
        })
    }
}

impl<T> Clone for Command<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            runner: self.runner.clone(),
            doc_sources: Arc::clone(&self.doc_sources),
            docs: Arc::clone(&self.docs),
        }
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("runner", &self.runner)
            .field("docs", &self.docs.state())
            .finish()
    }
}

impl<T> fmt::Display for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl<T, U> PartialEq<Command<U>> for Command<T> {
    fn eq(&self, other: &Command<U>) -> bool {
        self.name == other.name
    }
}

impl<T> Eq for Command<T> {}

impl<T> Hash for Command<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
