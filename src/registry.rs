//! A read-only map from identifiers to [`Command`]s.
//!
//! A registry is either built from an explicit list of entries or discovered
//! from a search path. In both cases the identifier set is fixed once known and
//! commands are only constructed when first looked up.

use crate::command::Command;
use crate::error::{Error, Result};
use crate::ident::{identifier_mapping, is_identifier};
use crate::search::{ExecutableEntry, SearchPath};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

type Factory<T> = Arc<dyn Fn(&str) -> Command<T> + Send + Sync>;
type Constructor<T> = Box<dyn Fn() -> Command<T> + Send + Sync>;

/// A value supplied for one key of an explicit registry.
pub enum Entry<T> {
    /// A command line, turned into a command by the registry's factory.
    Line(String),
    /// A ready-made command.
    Command(Command<T>),
    /// A closure building the command on first lookup.
    Lazy(Constructor<T>),
}

impl<T> Entry<T> {
    pub fn lazy<F>(f: F) -> Self
    where
        F: Fn() -> Command<T> + Send + Sync + 'static,
    {
        Entry::Lazy(Box::new(f))
    }
}

impl<T> From<&str> for Entry<T> {
    fn from(line: &str) -> Self {
        Entry::Line(line.to_string())
    }
}

impl<T> From<String> for Entry<T> {
    fn from(line: String) -> Self {
        Entry::Line(line)
    }
}

impl<T> From<Command<T>> for Entry<T> {
    fn from(command: Command<T>) -> Self {
        Entry::Command(command)
    }
}

enum Source<T> {
    Discovered(ExecutableEntry),
    Supplied(Entry<T>),
}

struct Slot<T> {
    id: String,
    source: Source<T>,
    command: OnceLock<Command<T>>,
}

struct Catalog<T> {
    slots: Vec<Slot<T>>,
    index: HashMap<String, usize>,
}

impl<T> Catalog<T> {
    fn new(slots: Vec<Slot<T>>) -> Self {
        let index = slots
            .iter()
            .enumerate()
            .map(|(i, slot)| (slot.id.clone(), i))
            .collect();
        Self { slots, index }
    }

    fn slot(&self, id: &str) -> Option<&Slot<T>> {
        self.index.get(id).map(|&i| &self.slots[i])
    }
}

enum Mode {
    /// `None` reads `PATH` when the scan happens.
    Discovery(Option<SearchPath>),
    Explicit,
}

/// Mapping from identifiers to commands.
///
/// Lookups by [`get`](Registry::get), [`command`](Registry::command) and indexing
/// all agree. Containment, length and iteration only need the identifier set and
/// never construct a command. Iteration follows discovery or supply order and is
/// stable for the registry's lifetime, until [`refresh`](Registry::refresh).
///
/// In discovery mode, directories are visited in search-path order and names
/// sorted within each directory. When two executables map to the same
/// identifier, the first one found keeps it and later ones are dropped.
///
/// The scan and each command are built at most once, even under concurrent
/// first access.
pub struct Registry<T = Vec<u8>> {
    mode: Mode,
    factory: Factory<T>,
    catalog: OnceLock<Catalog<T>>,
    scans: AtomicUsize,
}

impl Registry<Vec<u8>> {
    /// Discover every executable on the `PATH` of the current process.
    pub fn discover() -> Self {
        Self::discover_with(None::<SearchPath>, |name: &str| Command::new(name))
    }

    /// Discover every executable on `search_path`.
    pub fn discover_in(search_path: SearchPath) -> Self {
        Self::discover_with(search_path, |name: &str| Command::new(name))
    }

    /// Explicit registry from `(identifier, command line)` pairs.
    pub fn from_lines<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::from_entries(
            pairs
                .into_iter()
                .map(|(k, v)| (k, Entry::Line(v.into()))),
            |line: &str| Command::new(line),
        )
    }

    /// Explicit registry where each name is both the identifier and the command line.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_lines(names.into_iter().map(|name| {
            let name = name.into();
            (name.clone(), name)
        }))
    }
}

impl<T> Registry<T> {
    /// Discover executables, building each command with `factory(raw_name)`.
    ///
    /// Passing `None` uses the `PATH` of the current process at scan time.
    pub fn discover_with<F>(search_path: impl Into<Option<SearchPath>>, factory: F) -> Self
    where
        F: Fn(&str) -> Command<T> + Send + Sync + 'static,
    {
        Self {
            mode: Mode::Discovery(search_path.into()),
            factory: Arc::new(factory),
            catalog: OnceLock::new(),
            scans: AtomicUsize::new(0),
        }
    }

    /// Explicit registry. Command lines are turned into commands by `factory`.
    ///
    /// Fails with [`Error::InvalidIdentifier`] if a key is not an identifier.
    /// A repeated key keeps its first entry.
    pub fn from_entries<I, K, F>(pairs: I, factory: F) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Entry<T>)>,
        K: Into<String>,
        F: Fn(&str) -> Command<T> + Send + Sync + 'static,
    {
        let mut slots: Vec<Slot<T>> = Vec::new();
        for (id, entry) in pairs {
            let id = id.into();
            if !is_identifier(&id) {
                return Err(Error::InvalidIdentifier(id));
            }
            if slots.iter().any(|slot| slot.id == id) {
                debug!("Ignoring repeated registry key `{}`", id);
                continue;
            }
            slots.push(Slot {
                id,
                source: Source::Supplied(entry),
                command: OnceLock::new(),
            });
        }
        Ok(Self {
            mode: Mode::Explicit,
            factory: Arc::new(factory),
            catalog: OnceLock::from(Catalog::new(slots)),
            scans: AtomicUsize::new(0),
        })
    }

    fn catalog(&self) -> &Catalog<T> {
        self.catalog.get_or_init(|| match &self.mode {
            Mode::Discovery(search_path) => {
                self.scans.fetch_add(1, Ordering::Relaxed);
                match search_path {
                    Some(search_path) => discover_slots(search_path),
                    None => discover_slots(&SearchPath::from_env()),
                }
            }
            Mode::Explicit => Catalog::new(Vec::new()),
        })
    }

    /// How many times the search path has been scanned, refreshes included.
    ///
    /// Always 0 for an explicit registry.
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::Relaxed)
    }

    fn materialize<'a>(&self, slot: &'a Slot<T>) -> &'a Command<T> {
        slot.command.get_or_init(|| match &slot.source {
            Source::Discovered(entry) => (self.factory)(&entry.name),
            Source::Supplied(Entry::Line(line)) => (self.factory)(line),
            Source::Supplied(Entry::Command(command)) => command.clone(),
            Source::Supplied(Entry::Lazy(build)) => build(),
        })
    }

    pub fn len(&self) -> usize {
        self.catalog().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` is known. Never constructs a command.
    pub fn contains(&self, id: &str) -> bool {
        self.catalog().index.contains_key(id)
    }

    /// The command for `id`, constructing it on first use.
    pub fn get(&self, id: &str) -> Option<&Command<T>> {
        let slot = self.catalog().slot(id)?;
        Some(self.materialize(slot))
    }

    /// Attribute-style access: like [`get`](Registry::get), but a missing
    /// identifier is an [`Error::UnknownIdentifier`].
    pub fn command(&self, id: &str) -> Result<&Command<T>> {
        self.get(id)
            .ok_or_else(|| Error::UnknownIdentifier(id.to_string()))
    }

    /// Identifiers in registry order.
    pub fn iter(&self) -> Keys<'_, T> {
        Keys {
            inner: self.catalog().slots.iter(),
        }
    }

    pub fn keys(&self) -> Keys<'_, T> {
        self.iter()
    }

    /// `(identifier, command)` pairs in registry order, constructing every command.
    pub fn commands(&self) -> impl Iterator<Item = (&str, &Command<T>)> + '_ {
        self.catalog()
            .slots
            .iter()
            .map(|slot| (slot.id.as_str(), self.materialize(slot)))
    }

    /// The unsanitized name behind `id`: the file name found on the search path,
    /// or the supplied command line.
    pub fn raw_name(&self, id: &str) -> Option<&str> {
        let slot = self.catalog().slot(id)?;
        match &slot.source {
            Source::Discovered(entry) => Some(&entry.name),
            Source::Supplied(Entry::Line(line)) => Some(line),
            Source::Supplied(Entry::Command(command)) => Some(command.name()),
            Source::Supplied(Entry::Lazy(_)) => Some(self.materialize(slot).name()),
        }
    }

    /// Where a discovered identifier was found. `None` for explicit entries.
    pub fn entry(&self, id: &str) -> Option<&ExecutableEntry> {
        match &self.catalog().slot(id)?.source {
            Source::Discovered(entry) => Some(entry),
            Source::Supplied(_) => None,
        }
    }

    /// Number of commands constructed so far.
    pub fn materialized(&self) -> usize {
        match self.catalog.get() {
            Some(catalog) => catalog
                .slots
                .iter()
                .filter(|slot| slot.command.get().is_some())
                .count(),
            None => 0,
        }
    }

    /// Forget constructed commands and, in discovery mode, scan again on next use.
    ///
    /// A registry discovering from the process `PATH` re-reads the variable.
    pub fn refresh(&mut self) {
        match self.mode {
            Mode::Discovery(_) => {
                self.catalog = OnceLock::new();
            }
            Mode::Explicit => {
                if let Some(catalog) = self.catalog.get_mut() {
                    for slot in &mut catalog.slots {
                        slot.command.take();
                    }
                }
            }
        }
    }
}

fn discover_slots<T>(search_path: &SearchPath) -> Catalog<T> {
    let entries = search_path.scan();
    let mapping = identifier_mapping(entries.iter().map(|entry| entry.name.clone()));
    for (id, raw) in &mapping.collisions {
        debug!("`{}` also maps to identifier `{}`, keeping the first", raw, id);
    }
    let mut by_name: HashMap<String, ExecutableEntry> = entries
        .into_iter()
        .map(|entry| (entry.name.clone(), entry))
        .collect();
    let slots: Vec<Slot<T>> = mapping
        .pairs
        .into_iter()
        .filter_map(|(id, raw)| {
            let entry = by_name.remove(&raw)?;
            Some(Slot {
                id,
                source: Source::Discovered(entry),
                command: OnceLock::new(),
            })
        })
        .collect();
    debug!(
        "Discovered {} commands in {} directories",
        slots.len(),
        search_path.dirs().len()
    );
    Catalog::new(slots)
}

/// Iterator over a registry's identifiers.
pub struct Keys<'a, T> {
    inner: std::slice::Iter<'a, Slot<T>>,
}

impl<'a, T> Iterator for Keys<'a, T> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|slot| slot.id.as_str())
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Keys<'_, T> {}

impl<'a, T> IntoIterator for &'a Registry<T> {
    type Item = &'a str;
    type IntoIter = Keys<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> Index<&str> for Registry<T> {
    type Output = Command<T>;

    /// Panics if `id` is unknown, like `HashMap`. Use [`Registry::get`] or
    /// [`Registry::command`] to handle absence.
    fn index(&self, id: &str) -> &Command<T> {
        match self.get(id) {
            Some(command) => command,
            None => panic!("no command registered under `{id}`"),
        }
    }
}

impl<T> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match &self.mode {
            Mode::Discovery(Some(search_path)) => format!("Discovery({:?})", search_path.dirs()),
            Mode::Discovery(None) => "Discovery(PATH)".to_string(),
            Mode::Explicit => "Explicit".to_string(),
        };
        f.debug_struct("Registry")
            .field("mode", &mode)
            .field("len", &self.catalog.get().map(|c| c.slots.len()))
            .field("materialized", &self.materialized())
            .field("scans", &self.scans())
            .finish()
    }
}
