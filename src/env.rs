use std::collections::BTreeMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};
use std::process::Command as ProcessCommand;

/// Environment a runner applies to every process it spawns.
///
/// The environment holds overrides on top of the current process:
/// - `vars`: variables to set (`Some`) or remove (`None`) in the child.
/// - `current_dir`: the working directory, when it differs from ours.
/// - `cleared`: start the child from an empty environment instead of ours.
///
/// Nothing here touches the parent process; overrides only reach children.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, Option<String>>,
    current_dir: Option<PathBuf>,
    cleared: bool,
}

impl Environment {
    /// An environment that inherits everything from the current process.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the value a child would see for `key`.
    ///
    /// Looks up the overrides first, falling back to `std::env::var` unless cleared.
    pub fn get_var(&self, key: &str) -> Option<String> {
        match self.vars.get(key) {
            Some(value) => value.clone(),
            None if self.cleared => None,
            None => stdenv::var(key).ok(),
        }
    }

    /// Set or override a variable for children.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), Some(val.into()));
    }

    /// Hide a variable from children.
    pub fn remove_var(&mut self, key: impl Into<String>) {
        self.vars.insert(key.into(), None);
    }

    /// Drop every inherited variable; explicit overrides still apply.
    pub fn clear(&mut self) {
        self.cleared = true;
        self.vars.retain(|_, value| value.is_some());
    }

    pub fn set_current_dir(&mut self, dir: impl Into<PathBuf>) {
        self.current_dir = Some(dir.into());
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Resolve the working directory a child would start in.
    pub fn effective_dir(&self) -> PathBuf {
        match &self.current_dir {
            Some(dir) => dir.clone(),
            None => stdenv::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Apply the overrides to a process about to be spawned.
    pub(crate) fn apply(&self, cmd: &mut ProcessCommand) {
        if self.cleared {
            cmd.env_clear();
        }
        for (key, value) in &self.vars {
            match value {
                Some(value) => cmd.env(key, value),
                None => cmd.env_remove(key),
            };
        }
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;

    #[test]
    fn test_env_set_and_get_var() {
        let mut env = Environment::new();

        // initially absent
        assert_eq!(env.get_var("SOME_RANDOM_ENV_VAR_12345"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::new();
        assert!(env.get_var("PATH").is_some());
    }

    #[test]
    fn test_env_remove_and_clear() {
        let mut env = Environment::new();
        env.remove_var("PATH");
        assert_eq!(env.get_var("PATH"), None);

        let mut env = Environment::new();
        env.set_var("KEEP", "1");
        env.clear();
        assert_eq!(env.get_var("PATH"), None);
        assert_eq!(env.get_var("KEEP"), Some("1".to_string()));
    }

    #[test]
    fn test_env_effective_dir() {
        let mut env = Environment::new();
        assert_eq!(env.effective_dir(), std::env::current_dir().unwrap());
        env.set_current_dir("/tmp");
        assert_eq!(env.current_dir(), Some(std::path::Path::new("/tmp")));
    }
}
