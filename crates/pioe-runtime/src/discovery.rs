//! Engine discovery from well-known paths.
//!
//! Engine libraries follow the naming pattern
//! `<prefix>pioe<key>engine.<extension>`, e.g. `libpioerubyengine.so` for the
//! key `ruby`. They are searched in the following locations (in order):
//!
//! 1. `./`, `./engines/`, `./lib/`, `../lib/`, `../lib/pioe/`
//! 2. `$XDG_DATA_HOME/pioe/engines/` (user engines)
//! 3. The platform's own library search path (a bare file name)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directories searched before the user engines directory.
pub const DEFAULT_SEARCH_DIRS: [&str; 5] =
    ["./", "./engines/", "./lib/", "../lib/", "../lib/pioe/"];

#[cfg(windows)]
const DEFAULT_PREFIX: &str = "lib";
#[cfg(windows)]
const DEFAULT_EXTENSION: &str = "dll";

#[cfg(target_os = "macos")]
const DEFAULT_PREFIX: &str = "lib";
#[cfg(target_os = "macos")]
const DEFAULT_EXTENSION: &str = "dylib";

#[cfg(all(unix, not(target_os = "macos")))]
const DEFAULT_PREFIX: &str = "lib";
#[cfg(all(unix, not(target_os = "macos")))]
const DEFAULT_EXTENSION: &str = "so";

/// Where and under which file names engine libraries are looked up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPath {
    /// Ordered list of directories. An empty entry defers to the platform's
    /// library search path.
    pub directories: Vec<PathBuf>,

    /// Library file name prefix.
    pub prefix: String,

    /// Library file extension.
    pub extension: String,
}

impl Default for SearchPath {
    fn default() -> Self {
        let mut directories: Vec<PathBuf> =
            DEFAULT_SEARCH_DIRS.iter().map(PathBuf::from).collect();
        if let Some(user_dir) = user_engines_dir() {
            directories.push(user_dir);
        }
        directories.push(PathBuf::new());

        Self {
            directories,
            prefix: DEFAULT_PREFIX.to_string(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

impl SearchPath {
    /// Search only `directories`, with platform file naming.
    pub fn with_directories<I, P>(directories: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            directories: directories.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Library file name for an engine key.
    pub fn file_name(&self, key: &str) -> String {
        format!("{}pioe{}engine.{}", self.prefix, key, self.extension)
    }

    /// Candidate paths for `key`, in search order.
    pub fn candidates(&self, key: &str) -> Vec<PathBuf> {
        let file_name = self.file_name(key);
        self.directories
            .iter()
            .map(|dir| dir.join(&file_name))
            .collect()
    }

    /// Extract the engine key from a library file name.
    pub fn key_of<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        let stem = file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix("pioe")?
            .strip_suffix(self.extension.as_str())?
            .strip_suffix('.')?
            .strip_suffix("engine")?;

        if stem.is_empty() {
            None
        } else {
            Some(stem)
        }
    }
}

/// Whether an engine key should be treated as a file path.
pub fn looks_like_path(key: &str) -> bool {
    key.starts_with('.') || key.starts_with('/')
}

/// Get the user engines directory.
pub fn user_engines_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "pioe", "pioe")
        .map(|dirs| dirs.data_dir().join("engines"))
}

/// An engine library found on the search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredEngine {
    /// Path to the library file.
    pub path: PathBuf,

    /// Engine key, usable with `load_by_name`.
    pub key: String,
}

/// List engine libraries across the search path without loading them.
///
/// Directories are scanned in order and every matching file is listed, so
/// a key may appear once per directory. `load_by_name` picks the first.
pub fn find_engines(search: &SearchPath) -> Vec<DiscoveredEngine> {
    let mut engines = Vec::new();

    for dir in &search.directories {
        // The platform search path cannot be listed.
        if dir.as_os_str().is_empty() {
            continue;
        }
        debug!("Scanning engines directory: {:?}", dir);
        discover_in_directory(search, dir, &mut engines);
    }

    info!("Discovered {} engines", engines.len());
    engines
}

/// Discover engine libraries in a specific directory.
pub fn discover_in_directory(
    search: &SearchPath,
    dir: &Path,
    engines: &mut Vec<DiscoveredEngine>,
) {
    if !dir.is_dir() {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            warn!("Failed to read engines directory {:?}: {}", dir, e);
            return;
        }
    };

    let mut found: Vec<DiscoveredEngine> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let key = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| search.key_of(name))?
                .to_string();
            Some(DiscoveredEngine { path, key })
        })
        .collect();

    // read_dir order is platform-defined
    found.sort_by(|a, b| a.path.cmp(&b.path));

    for engine in &found {
        debug!("Discovered engine {} at {:?}", engine.key, engine.path);
    }
    engines.extend(found);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn search(dirs: &[&Path]) -> SearchPath {
        SearchPath {
            directories: dirs.iter().map(|d| d.to_path_buf()).collect(),
            prefix: "lib".to_string(),
            extension: "so".to_string(),
        }
    }

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_file_name() {
        let search = search(&[]);
        assert_eq!(search.file_name("ruby"), "libpioerubyengine.so");
        assert_eq!(search.file_name("py"), "libpioepyengine.so");
    }

    #[test]
    fn test_key_of() {
        let search = search(&[]);
        assert_eq!(search.key_of("libpioerubyengine.so"), Some("ruby"));
        assert_eq!(search.key_of("libpioeengine.so"), None);
        assert_eq!(search.key_of("libpioerubyengine.so.1"), None);
        assert_eq!(search.key_of("librubyengine.so"), None);
        assert_eq!(search.key_of("libpioerubyengineso"), None);
    }

    #[test]
    fn test_candidates_follow_directory_order() {
        let search = SearchPath::with_directories(["./", "../lib/", ""]);
        let candidates = search.candidates("ruby");
        let name = search.file_name("ruby");

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0], Path::new("./").join(&name));
        assert_eq!(candidates[1], Path::new("../lib/").join(&name));
        assert_eq!(candidates[2], PathBuf::from(&name));
    }

    #[test]
    fn test_default_search_path() {
        let search = SearchPath::default();
        assert_eq!(search.directories[0], PathBuf::from("./"));
        assert_eq!(search.directories.last(), Some(&PathBuf::new()));
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("./libpioerubyengine.so"));
        assert!(looks_like_path("/usr/lib/libpioerubyengine.so"));
        assert!(!looks_like_path("ruby"));
    }

    #[test]
    fn test_find_engines_exact_set() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "libpioerubyengine.so");
        touch(temp_dir.path(), "libpioepyengine.so");
        touch(temp_dir.path(), "libpioerubyengine.so.bak");
        touch(temp_dir.path(), "libother.so");
        touch(temp_dir.path(), "README");
        std::fs::create_dir(temp_dir.path().join("libpioedirengine.so")).unwrap();

        let engines = find_engines(&search(&[temp_dir.path()]));

        let keys: Vec<&str> = engines.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["py", "ruby"]);
        assert!(engines
            .iter()
            .all(|e| e.path.starts_with(temp_dir.path())));
    }

    #[test]
    fn test_engines_listed_per_directory() {
        let temp_dir = TempDir::new().unwrap();

        let dir1 = temp_dir.path().join("dir1");
        let dir2 = temp_dir.path().join("dir2");
        std::fs::create_dir_all(&dir1).unwrap();
        std::fs::create_dir_all(&dir2).unwrap();

        touch(&dir1, "libpioerubyengine.so");
        touch(&dir2, "libpioerubyengine.so");
        touch(&dir2, "libpioepyengine.so");

        let missing = temp_dir.path().join("missing");
        let dirs = [missing.as_path(), dir1.as_path(), dir2.as_path()];
        let engines = find_engines(&search(&dirs));

        let found: Vec<(&str, PathBuf)> = engines
            .iter()
            .map(|e| (e.key.as_str(), e.path.clone()))
            .collect();
        assert_eq!(
            found,
            vec![
                ("ruby", dir1.join("libpioerubyengine.so")),
                ("py", dir2.join("libpioepyengine.so")),
                ("ruby", dir2.join("libpioerubyengine.so")),
            ]
        );
    }
}
