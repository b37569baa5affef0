use crate::env::Environment;
use std::borrow::Cow;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Ordered list of directories consulted to resolve executable names.
///
/// Read once on construction; a `SearchPath` never changes afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
}

/// An executable found while scanning a [`SearchPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExecutableEntry {
    /// Directory the executable was found in.
    pub dir: PathBuf,
    /// Name the shell resolves, possibly containing dots, dashes or leading digits.
    pub name: String,
    file_name: OsString,
}

impl ExecutableEntry {
    /// Full path of the executable file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }
}

impl SearchPath {
    pub fn new<I, P>(dirs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            dirs: dirs.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a platform-formatted list such as the value of `PATH`.
    pub fn parse(value: &OsStr) -> Self {
        Self::new(std::env::split_paths(value).filter(|dir| !dir.as_os_str().is_empty()))
    }

    /// The `PATH` of the current process.
    pub fn from_env() -> Self {
        std::env::var_os("PATH")
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// The `PATH` a child spawned with `env` would see.
    pub fn from_environment(env: &Environment) -> Self {
        env.get_var("PATH")
            .map(|value| Self::parse(OsStr::new(&value)))
            .unwrap_or_default()
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// List the executables reachable through this search path.
    ///
    /// Directories are visited in order, skipping duplicates and anything that is
    /// not a readable directory. Names are sorted within a directory, and the first
    /// occurrence of a name shadows later ones, as in a shell.
    pub fn scan(&self) -> Vec<ExecutableEntry> {
        let mut visited = HashSet::new();
        let mut names = HashSet::new();
        let mut entries = Vec::new();
        for dir in &self.dirs {
            if !visited.insert(dir.clone()) {
                continue;
            }
            for entry in executables_of_dir(dir) {
                if names.insert(entry.name.clone()) {
                    entries.push(entry);
                } else {
                    debug!("{} is shadowed by an earlier directory", entry.path().display());
                }
            }
        }
        entries
    }
}

fn executables_of_dir(dir: &Path) -> Vec<ExecutableEntry> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            debug!("Skipping search path entry {}: {}", dir.display(), e);
            return Vec::new();
        }
    };
    let mut entries: Vec<ExecutableEntry> = read_dir
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| is_executable_file(&entry.path()))
        .filter_map(|entry| {
            let file_name = entry.file_name();
            let name = command_name(&file_name)?;
            Some(ExecutableEntry {
                dir: dir.to_path_buf(),
                name,
                file_name,
            })
        })
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[cfg(unix)]
fn command_name(file_name: &OsStr) -> Option<String> {
    match file_name.to_str() {
        Some(name) => Some(name.to_string()),
        None => {
            debug!("Skipping non UTF-8 executable name {:?}", file_name);
            None
        }
    }
}

#[cfg(windows)]
fn command_name(file_name: &OsStr) -> Option<String> {
    let name = file_name.to_str()?;
    let path = Path::new(name);
    let stem = path.file_stem()?.to_str()?;
    Some(stem.to_string())
}

/// Whether `path` is a regular file with an execute bit set.
#[cfg(unix)]
pub fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    // Directories carry the execute bit too.
    match fs::metadata(path) {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

/// Whether `path` is a regular file whose extension is listed in `PATHEXT`.
#[cfg(windows)]
pub fn is_executable_file(path: &Path) -> bool {
    let is_file = fs::metadata(path).map(|m| m.is_file()).unwrap_or(false);
    let pathext = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let Some(ext) = path.extension().and_then(OsStr::to_str) else {
        return false;
    };
    is_file
        && pathext
            .split(';')
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Resolve a command path the way a typical shell would.
///
/// Behavior:
/// - Absolute path: returns it if it is an executable file.
/// - `./foo` on Unix or any relative path with several components (e.g. `bin/sh`):
///   resolved against `base_dir` and returned if it is an executable file.
/// - Single path component (no separators): search each directory of `search_path`
///   and return the first executable match.
/// - Empty path: returns `None`.
///
/// Returns either a borrowed reference to the provided `path` or an owned `PathBuf`
/// when the result is discovered through the search path or `base_dir`.
pub fn find_command_path<'a>(
    search_path: &SearchPath,
    base_dir: &Path,
    path: &'a Path,
) -> Option<Cow<'a, Path>> {
    if path.is_absolute() {
        return find_by_path(path).map(Cow::Borrowed);
    }

    let mut components = path.components();
    let first = components.next();
    let second = components.next();
    match (first, second) {
        (None, None) => {
            // Empty path -> not found
            None
        }
        (Some(x), None) if !path.starts_with(".") => {
            // Single component -> search the directories
            find_in_path(search_path, x.as_os_str()).map(Cow::Owned)
        }
        _ => {
            // Relative with a directory part -> search in base dir
            let joined = base_dir.join(path);
            find_by_path(&joined).map(|p| Cow::Owned(p.to_path_buf()))
        }
    }
}

fn find_in_path(search_path: &SearchPath, cmd: &OsStr) -> Option<PathBuf> {
    for dir in search_path.dirs() {
        let path = dir.join(cmd);
        if let Some(path) = find_by_path(&path) {
            return Some(path.to_owned());
        }
        #[cfg(windows)]
        for ext in ["exe", "cmd", "bat", "com"] {
            let path = path.with_extension(ext);
            if find_by_path(&path).is_some() {
                return Some(path);
            }
        }
    }
    None
}

fn find_by_path(path: &Path) -> Option<&Path> {
    if is_executable_file(path) { Some(path) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::fs::File;
    use tempfile::TempDir;

    #[cfg(unix)]
    fn touch(dir: &Path, name: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        File::create(&path).expect("touch");
        fs::set_permissions(&path, fs::Permissions::from_mode(mode)).expect("chmod");
        path
    }

    #[test]
    #[cfg(unix)]
    fn absolute_existing_true() {
        let path = Path::new("/bin/sh");
        let res = find_command_path(&SearchPath::new(["/bin"]), Path::new("/"), path);
        assert!(res.is_some(), "Expected to find /bin/sh via absolute path");
        let found = res.unwrap();
        assert_eq!(found.as_ref(), path);
    }

    #[test]
    #[cfg(unix)]
    fn absolute_nonexisting() {
        let path = Path::new("/bin/nonexisting");
        let res = find_command_path(&SearchPath::new(["/bin"]), Path::new("/"), path);
        assert!(
            res.is_none(),
            "Expected not to find /bin/nonexisting via absolute path"
        );
    }

    #[test]
    #[cfg(unix)]
    fn single_component_found_in_path() {
        let path = Path::new("sh");
        let res = find_command_path(&SearchPath::new(["/bin"]), Path::new("/"), path);
        let found = res.expect("Expected to find 'sh' in /bin via search path");
        assert!(found.as_ref().ends_with("sh"));
        assert!(found.as_ref().starts_with("/bin"));
    }

    #[test]
    #[cfg(unix)]
    fn single_component_not_found_in_path() {
        let path = Path::new("nonexisting");
        let res = find_command_path(&SearchPath::new(["/bin"]), Path::new("/"), path);
        assert!(res.is_none(), "Expected not to find 'nonexisting' in PATH");
    }

    #[test]
    #[cfg(unix)]
    fn relative_paths_resolve_against_base_dir() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("bin")).expect("create bin dir");
        touch(&tmp.path().join("bin"), "tool", 0o755);
        touch(tmp.path(), "foo", 0o755);
        let nowhere = SearchPath::new(["/does/not/matter"]);

        let found = find_command_path(&nowhere, tmp.path(), Path::new("bin/tool"))
            .expect("Expected to find relative 'bin/tool'");
        assert!(found.as_ref().ends_with("bin/tool"));

        let found = find_command_path(&nowhere, tmp.path(), Path::new("./foo"))
            .expect("Expected to find './foo'");
        assert_eq!(found.as_ref(), tmp.path().join("./foo"));
    }

    #[test]
    #[cfg(unix)]
    fn empty_path_is_none() {
        let res = find_command_path(&SearchPath::new(["/bin"]), Path::new("/"), Path::new(""));
        assert!(res.is_none(), "Empty path should not resolve to anything");
    }

    #[test]
    #[cfg(unix)]
    fn non_executable_files_are_not_commands() {
        let tmp = TempDir::new().expect("tempdir");
        touch(tmp.path(), "data.txt", 0o644);
        fs::create_dir(tmp.path().join("subdir")).expect("mkdir");
        assert!(!is_executable_file(&tmp.path().join("data.txt")));
        assert!(!is_executable_file(&tmp.path().join("subdir")));
        assert!(SearchPath::new([tmp.path()]).scan().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn scan_orders_and_shadows() {
        let first = TempDir::new().expect("tempdir");
        let second = TempDir::new().expect("tempdir");
        touch(first.path(), "zeta", 0o755);
        touch(first.path(), "alpha", 0o755);
        touch(second.path(), "alpha", 0o755);
        touch(second.path(), "beta-1.0", 0o700);
        touch(second.path(), "readme", 0o644);

        let search = SearchPath::new([
            first.path(),
            Path::new("/definitely/missing"),
            second.path(),
            first.path(),
        ]);
        let entries = search.scan();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["alpha", "zeta", "beta-1.0"]);
        assert_eq!(entries[0].dir, first.path());
        assert_eq!(entries[2].path(), second.path().join("beta-1.0"));
    }

    #[test]
    fn parse_skips_empty_segments() {
        let joined = std::env::join_paths(["/usr/bin", "", "/bin"]).expect("join");
        let search = SearchPath::parse(&joined);
        assert_eq!(search.dirs(), [PathBuf::from("/usr/bin"), PathBuf::from("/bin")]);
    }

    #[test]
    fn from_environment_follows_overrides() {
        let mut env = Environment::new();
        env.set_var("PATH", "/opt/one");
        assert_eq!(
            SearchPath::from_environment(&env).dirs(),
            [PathBuf::from("/opt/one")]
        );
        env.remove_var("PATH");
        assert!(SearchPath::from_environment(&env).dirs().is_empty());
    }
}
