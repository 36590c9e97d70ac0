//! Process matchers deciding whether a process belongs to a logical group.
//!
//! Three matcher kinds exist, keyed in configuration as:
//! - `pidfile`: membership in a pid file (one pid per line)
//! - `exe`: shell glob against the resolved `/proc/<pid>/exe` target
//! - `cmdline`: regex search in the space-joined `/proc/<pid>/cmdline`
//!
//! Every kind has a static compatibility check against the raw configuration
//! value and an instance `matches` test. `matches` never fails: a process that
//! exits between enumeration and the test simply does not match.

use ahash::AHashSet;
use glob::{MatchOptions, Pattern};
use nix::unistd::{access, AccessFlags};
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

use crate::process::scanner::ProcessHandle;

/// Errors raised while building a matcher from a configured filter.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("incompatible with filter {kind}: {value}")]
    Incompatible { kind: MatcherKind, value: String },

    #[error("invalid {kind} pattern '{filter}': {source}")]
    Pattern {
        kind: MatcherKind,
        filter: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid exe glob '{filter}': {source}")]
    Glob {
        filter: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Contract shared by every matcher kind.
pub trait ProcessMatcher: Sized {
    /// Kind this matcher is configured under.
    const KIND: MatcherKind;

    /// Whether `raw` is an acceptable filter for this kind. Pure, never panics.
    fn is_compatible(raw: &Value) -> bool;

    /// Builds the matcher from a filter that passed `is_compatible`.
    fn from_filter(raw: &Value) -> Result<Self, MatcherError>;

    /// Whether the process behind `handle` belongs to this matcher.
    fn matches(&mut self, handle: &ProcessHandle) -> bool;

    /// The configured filter string.
    fn filter(&self) -> &str;
}

fn incompatible(kind: MatcherKind, raw: &Value) -> MatcherError {
    MatcherError::Incompatible {
        kind,
        value: raw.to_string(),
    }
}

// -----------------------------------------------------------------------------
// pidfile
// -----------------------------------------------------------------------------

/// Matches the pids listed in a pid file.
///
/// The file is re-read only when its modification time moves forward.
#[derive(Debug)]
pub struct PidFileMatcher {
    path: PathBuf,
    filter: String,
    pids: AHashSet<String>,
    last_mtime: Option<SystemTime>,
}

impl PidFileMatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filter = path.to_string_lossy().into_owned();
        Self {
            path,
            filter,
            pids: AHashSet::new(),
            last_mtime: None,
        }
    }

    /// Refreshes the cached pid list if needed.
    ///
    /// Returns false when the file is currently missing or unreadable.
    fn refresh(&mut self) -> bool {
        let mtime = match fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                debug!("pid file {} not accessible: {}", self.path.display(), e);
                return false;
            }
        };

        if self.last_mtime.is_some_and(|last| mtime <= last) {
            return true;
        }

        match fs::read_to_string(&self.path) {
            Ok(content) => {
                self.pids = content.split_whitespace().map(str::to_string).collect();
                self.last_mtime = Some(mtime);
                true
            }
            Err(e) => {
                debug!("pid file {} not readable: {}", self.path.display(), e);
                false
            }
        }
    }
}

impl ProcessMatcher for PidFileMatcher {
    const KIND: MatcherKind = MatcherKind::PidFile;

    fn is_compatible(raw: &Value) -> bool {
        let Some(path) = raw.as_str() else {
            return false;
        };
        let path = Path::new(path);
        access(path, AccessFlags::R_OK).is_ok() && fs::metadata(path).is_ok_and(|m| m.is_file())
    }

    fn from_filter(raw: &Value) -> Result<Self, MatcherError> {
        match raw.as_str() {
            Some(path) => Ok(Self::new(path)),
            None => Err(incompatible(Self::KIND, raw)),
        }
    }

    fn matches(&mut self, handle: &ProcessHandle) -> bool {
        self.refresh() && self.pids.contains(handle.id())
    }

    fn filter(&self) -> &str {
        &self.filter
    }
}

// -----------------------------------------------------------------------------
// exe
// -----------------------------------------------------------------------------

/// Matches the resolved executable path against a shell glob.
///
/// fnmatch semantics: `*` and `?` also match `/`, `[!...]` negates a class
/// and a reversed range such as `[z-a]` matches nothing.
#[derive(Debug)]
pub struct ExecutableMatcher {
    filter: String,
    pattern: Pattern,
}

impl ExecutableMatcher {
    pub fn new(glob: &str) -> Result<Self, MatcherError> {
        let pattern = Pattern::new(glob).map_err(|source| MatcherError::Glob {
            filter: glob.to_string(),
            source,
        })?;
        Ok(Self {
            filter: glob.to_string(),
            pattern,
        })
    }

    /// Tests a path against the glob.
    pub fn matches_path(&self, path: &str) -> bool {
        // Default options: case sensitive, separators and leading dots
        // matched by wildcards.
        self.pattern.matches_with(path, MatchOptions::new())
    }
}

impl ProcessMatcher for ExecutableMatcher {
    const KIND: MatcherKind = MatcherKind::Executable;

    fn is_compatible(raw: &Value) -> bool {
        raw.as_str()
            .is_some_and(|s| !s.is_empty() && Pattern::new(s).is_ok())
    }

    fn from_filter(raw: &Value) -> Result<Self, MatcherError> {
        match raw.as_str() {
            Some(glob) if !glob.is_empty() => Self::new(glob),
            _ => Err(incompatible(Self::KIND, raw)),
        }
    }

    fn matches(&mut self, handle: &ProcessHandle) -> bool {
        let target = match fs::read_link(handle.proc_path.join("exe")) {
            Ok(t) => t,
            Err(e) => {
                debug!("Cannot resolve exe of pid {}: {}", handle.pid, e);
                return false;
            }
        };
        // Follow symlinks inside the target as well; deleted binaries keep
        // the raw link text.
        let resolved = fs::canonicalize(&target).unwrap_or(target);
        self.matches_path(&resolved.to_string_lossy())
    }

    fn filter(&self) -> &str {
        &self.filter
    }
}

// -----------------------------------------------------------------------------
// cmdline
// -----------------------------------------------------------------------------

/// Searches the process command line with a regex.
#[derive(Debug)]
pub struct CommandLineMatcher {
    filter: String,
    pattern: Regex,
}

impl CommandLineMatcher {
    pub fn new(filter: &str) -> Result<Self, MatcherError> {
        let pattern = Regex::new(filter).map_err(|source| MatcherError::Pattern {
            kind: Self::KIND,
            filter: filter.to_string(),
            source,
        })?;
        Ok(Self {
            filter: filter.to_string(),
            pattern,
        })
    }

    /// Tests an already joined command line.
    pub fn matches_cmdline(&self, cmdline: &str) -> bool {
        self.pattern.is_match(cmdline)
    }
}

impl ProcessMatcher for CommandLineMatcher {
    const KIND: MatcherKind = MatcherKind::CommandLine;

    fn is_compatible(raw: &Value) -> bool {
        raw.as_str().is_some_and(|s| Regex::new(s).is_ok())
    }

    fn from_filter(raw: &Value) -> Result<Self, MatcherError> {
        match raw.as_str() {
            Some(filter) => Self::new(filter),
            None => Err(incompatible(Self::KIND, raw)),
        }
    }

    fn matches(&mut self, handle: &ProcessHandle) -> bool {
        match read_cmdline(&handle.proc_path) {
            Some(cmdline) => self.matches_cmdline(&cmdline),
            None => false,
        }
    }

    fn filter(&self) -> &str {
        &self.filter
    }
}

/// Reads `/proc/<pid>/cmdline` and joins its NUL-separated arguments with
/// single spaces.
pub fn read_cmdline(proc_path: &Path) -> Option<String> {
    let content = match fs::read(proc_path.join("cmdline")) {
        Ok(c) => c,
        Err(e) => {
            debug!("Cannot read cmdline in {}: {}", proc_path.display(), e);
            return None;
        }
    };

    let content = content.strip_suffix(&[0u8]).unwrap_or(&content[..]);
    let args: Vec<String> = content
        .split(|&b| b == 0u8)
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect();
    Some(args.join(" "))
}

// -----------------------------------------------------------------------------
// dispatch
// -----------------------------------------------------------------------------

/// The configuration keys of the matcher kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    PidFile,
    Executable,
    CommandLine,
}

impl MatcherKind {
    /// All kinds, in the order they are tried for a group.
    pub const ALL: [MatcherKind; 3] = [
        MatcherKind::PidFile,
        MatcherKind::Executable,
        MatcherKind::CommandLine,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MatcherKind::PidFile => "pidfile",
            MatcherKind::Executable => "exe",
            MatcherKind::CommandLine => "cmdline",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key)
    }

    /// Runs the static compatibility check of this kind.
    pub fn is_compatible(self, raw: &Value) -> bool {
        match self {
            MatcherKind::PidFile => PidFileMatcher::is_compatible(raw),
            MatcherKind::Executable => ExecutableMatcher::is_compatible(raw),
            MatcherKind::CommandLine => CommandLineMatcher::is_compatible(raw),
        }
    }

    /// Checks `raw` and builds a matcher of this kind.
    pub fn build(self, raw: &Value) -> Result<Matcher, MatcherError> {
        if !self.is_compatible(raw) {
            return Err(incompatible(self, raw));
        }
        Ok(match self {
            MatcherKind::PidFile => Matcher::PidFile(PidFileMatcher::from_filter(raw)?),
            MatcherKind::Executable => Matcher::Executable(ExecutableMatcher::from_filter(raw)?),
            MatcherKind::CommandLine => {
                Matcher::CommandLine(CommandLineMatcher::from_filter(raw)?)
            }
        })
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// A configured matcher of any kind.
#[derive(Debug)]
pub enum Matcher {
    PidFile(PidFileMatcher),
    Executable(ExecutableMatcher),
    CommandLine(CommandLineMatcher),
}

impl Matcher {
    pub fn kind(&self) -> MatcherKind {
        match self {
            Matcher::PidFile(_) => PidFileMatcher::KIND,
            Matcher::Executable(_) => ExecutableMatcher::KIND,
            Matcher::CommandLine(_) => CommandLineMatcher::KIND,
        }
    }

    pub fn filter(&self) -> &str {
        match self {
            Matcher::PidFile(m) => m.filter(),
            Matcher::Executable(m) => m.filter(),
            Matcher::CommandLine(m) => m.filter(),
        }
    }

    pub fn matches(&mut self, handle: &ProcessHandle) -> bool {
        match self {
            Matcher::PidFile(m) => m.matches(handle),
            Matcher::Executable(m) => m.matches(handle),
            Matcher::CommandLine(m) => m.matches(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, mtime: SystemTime) {
        fs::File::options()
            .write(true)
            .open(path)
            .and_then(|f| f.set_modified(mtime))
            .expect("Failed to set mtime");
    }

    // -------------------------------------------------------------------------
    // Tests for PidFileMatcher
    // -------------------------------------------------------------------------

    #[test]
    fn test_pidfile_compatibility() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pidfile = dir.path().join("app.pid");
        fs::write(&pidfile, "101\n").expect("Failed to write pid file");

        assert!(PidFileMatcher::is_compatible(&json!(pidfile.to_str())));
        // Directories and missing files are rejected
        assert!(!PidFileMatcher::is_compatible(&json!(dir.path().to_str())));
        assert!(!PidFileMatcher::is_compatible(&json!(dir
            .path()
            .join("missing.pid")
            .to_str())));
        assert!(!PidFileMatcher::is_compatible(&json!(42)));
        assert!(!PidFileMatcher::is_compatible(&Value::Null));
    }

    #[test]
    fn test_pidfile_refreshes_on_mtime_change() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pidfile = dir.path().join("app.pid");
        fs::write(&pidfile, "101\n202\n").expect("Failed to write pid file");
        let t0 = SystemTime::now() - Duration::from_secs(60);
        set_mtime(&pidfile, t0);

        let mut matcher = PidFileMatcher::new(&pidfile);
        assert!(matcher.matches(&ProcessHandle::new(dir.path(), 101)));
        assert!(matcher.matches(&ProcessHandle::new(dir.path(), 202)));
        assert!(!matcher.matches(&ProcessHandle::new(dir.path(), 303)));

        // Same mtime: content change is not picked up
        fs::write(&pidfile, "303\n").expect("Failed to write pid file");
        set_mtime(&pidfile, t0);
        assert!(matcher.matches(&ProcessHandle::new(dir.path(), 101)));

        // Advanced mtime: cache is invalidated
        set_mtime(&pidfile, t0 + Duration::from_secs(10));
        assert!(matcher.matches(&ProcessHandle::new(dir.path(), 303)));
        assert!(!matcher.matches(&ProcessHandle::new(dir.path(), 101)));
    }

    #[test]
    fn test_pidfile_tolerates_removal() {
        let dir = tempdir().expect("Failed to create temp dir");
        let pidfile = dir.path().join("app.pid");
        fs::write(&pidfile, "101").expect("Failed to write pid file");

        let mut matcher = PidFileMatcher::new(&pidfile);
        assert!(matcher.matches(&ProcessHandle::new(dir.path(), 101)));

        fs::remove_file(&pidfile).expect("Failed to remove pid file");
        assert!(!matcher.matches(&ProcessHandle::new(dir.path(), 101)));
    }

    // -------------------------------------------------------------------------
    // Tests for ExecutableMatcher
    // -------------------------------------------------------------------------

    #[test]
    fn test_exe_compatibility() {
        for glob in ["/usr/sbin/nginx", "*", "/opt/*/bin/app-?", "/usr/bin/[a-z]*", "[z-a]"] {
            assert!(ExecutableMatcher::is_compatible(&json!(glob)), "{glob}");
        }
        // Unterminated classes do not compile
        assert!(!ExecutableMatcher::is_compatible(&json!("[!")));
        assert!(!ExecutableMatcher::is_compatible(&json!("/opt/app[")));
        assert!(!ExecutableMatcher::is_compatible(&json!("")));
        assert!(!ExecutableMatcher::is_compatible(&json!(1)));
        assert!(!ExecutableMatcher::is_compatible(&json!(["/bin/sh"])));
        assert!(!ExecutableMatcher::is_compatible(&json!({"exe": "/bin/sh"})));
    }

    #[test]
    fn test_glob_semantics() {
        let m = ExecutableMatcher::new("/usr/*/haproxy").expect("valid glob");
        assert!(m.matches_path("/usr/sbin/haproxy"));
        assert!(m.matches_path("/usr/local/sbin/haproxy"));
        assert!(!m.matches_path("/usr/sbin/haproxy2"));

        let m = ExecutableMatcher::new("/bin/python3.?").expect("valid glob");
        assert!(m.matches_path("/bin/python3.9"));
        assert!(!m.matches_path("/bin/python3.11"));
        assert!(!m.matches_path("/bin/python3x9"));

        let m = ExecutableMatcher::new("/bin/worker-[0-9]").expect("valid glob");
        assert!(m.matches_path("/bin/worker-7"));
        assert!(!m.matches_path("/bin/worker-x"));

        let m = ExecutableMatcher::new("/bin/worker-[!0-9]").expect("valid glob");
        assert!(m.matches_path("/bin/worker-x"));
        assert!(!m.matches_path("/bin/worker-7"));

        let m = ExecutableMatcher::new("/opt/app[[]").expect("valid glob");
        assert!(m.matches_path("/opt/app["));
    }

    #[test]
    fn test_glob_character_class_edge_cases() {
        // A range spanning the separator matches it
        let m = ExecutableMatcher::new("[--0]").expect("valid glob");
        assert!(m.matches_path("/"));
        assert!(m.matches_path("-"));
        assert!(!m.matches_path("a"));

        // Reversed ranges compile and match nothing
        let m = ExecutableMatcher::new("[z-a]").expect("valid glob");
        assert!(!m.matches_path("a"));
        assert!(!m.matches_path("z"));
        let m = ExecutableMatcher::new("a[b-a]").expect("valid glob");
        assert!(!m.matches_path("ab"));
        assert!(!m.matches_path("a"));

        let err = ExecutableMatcher::new("/opt/app[").unwrap_err();
        assert!(matches!(err, MatcherError::Glob { .. }));
    }

    #[test]
    fn test_exe_matches_resolved_link() {
        let dir = tempdir().expect("Failed to create temp dir");
        let bin = dir.path().join("bin");
        fs::create_dir(&bin).expect("Failed to create dir");
        fs::write(bin.join("haproxy"), "").expect("Failed to write binary");
        fs::create_dir(dir.path().join("101")).expect("Failed to create dir");
        std::os::unix::fs::symlink(bin.join("haproxy"), dir.path().join("101").join("exe"))
            .expect("Failed to create symlink");
        fs::create_dir(dir.path().join("202")).expect("Failed to create dir");

        let mut m = ExecutableMatcher::new("*/bin/haproxy").expect("valid glob");
        assert!(m.matches(&ProcessHandle::new(dir.path(), 101)));
        // No exe link: process exited or kernel thread
        assert!(!m.matches(&ProcessHandle::new(dir.path(), 202)));
    }

    // -------------------------------------------------------------------------
    // Tests for CommandLineMatcher
    // -------------------------------------------------------------------------

    #[test]
    fn test_cmdline_compatibility() {
        assert!(CommandLineMatcher::is_compatible(&json!(
            "/usr/local/bin/haproxy.* -f /etc/haproxy/haproxy_misc.cfg.*"
        )));
        assert!(CommandLineMatcher::is_compatible(&json!("")));
        assert!(!CommandLineMatcher::is_compatible(&json!("worker(")));
        assert!(!CommandLineMatcher::is_compatible(&json!("[a-")));
        assert!(!CommandLineMatcher::is_compatible(&json!(3.5)));
        // Lookaround and backreferences are not supported by the regex engine
        assert!(!CommandLineMatcher::is_compatible(&json!("java (?!-version)")));
        assert!(!CommandLineMatcher::is_compatible(&json!(r"(\w+) \1")));
    }

    #[test]
    fn test_cmdline_joins_arguments() {
        let dir = tempdir().expect("Failed to create temp dir");
        let proc_dir = dir.path().join("101");
        fs::create_dir(&proc_dir).expect("Failed to create dir");
        fs::write(
            proc_dir.join("cmdline"),
            b"/usr/bin/haproxy\0-f\0/etc/haproxy/misc.cfg\0",
        )
        .expect("Failed to write cmdline");

        assert_eq!(
            read_cmdline(&proc_dir).as_deref(),
            Some("/usr/bin/haproxy -f /etc/haproxy/misc.cfg")
        );

        let handle = ProcessHandle::new(dir.path(), 101);
        let mut m = CommandLineMatcher::new(r"haproxy -f .*misc\.cfg$").expect("valid regex");
        assert!(m.matches(&handle));

        let mut m = CommandLineMatcher::new("nginx").expect("valid regex");
        assert!(!m.matches(&handle));

        // Vanished process
        let mut m = CommandLineMatcher::new(".*").expect("valid regex");
        assert!(!m.matches(&ProcessHandle::new(dir.path(), 999)));
    }

    // -------------------------------------------------------------------------
    // Tests for MatcherKind dispatch
    // -------------------------------------------------------------------------

    #[test]
    fn test_kind_keys_round_trip() {
        for kind in MatcherKind::ALL {
            assert_eq!(MatcherKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(MatcherKind::from_key("user"), None);
    }

    #[test]
    fn test_kind_build() {
        let m = MatcherKind::CommandLine
            .build(&json!("nginx: worker"))
            .expect("compatible");
        assert_eq!(m.kind(), MatcherKind::CommandLine);
        assert_eq!(m.filter(), "nginx: worker");

        let err = MatcherKind::Executable.build(&json!(7)).unwrap_err();
        assert!(matches!(
            err,
            MatcherError::Incompatible {
                kind: MatcherKind::Executable,
                ..
            }
        ));

        // A glob that does not compile fails the compatibility check
        let err = MatcherKind::Executable.build(&json!("/bin/[a-")).unwrap_err();
        assert!(matches!(
            err,
            MatcherError::Incompatible {
                kind: MatcherKind::Executable,
                ..
            }
        ));
        assert!(MatcherKind::Executable.build(&json!("/bin/[z-a]")).is_ok());
    }
}
