//! Role content filtering.
//!
//! Transient runtime output (log directories) must never end up in a
//! package. A directory whose leaf name matches an exclusion name is
//! pruned together with everything below it, wherever it sits in the
//! role tree.

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Directory name roles write their runtime logs to.
pub const LOG_DIR_NAME: &str = "logs";

/// Whether a walked entry is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Decides which entries of a role tree are packaged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFilter {
    excluded_dirs: Vec<String>,
}

impl Default for ContentFilter {
    fn default() -> Self {
        Self::new([LOG_DIR_NAME])
    }
}

/// Outcome of walking one role tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Files handed to the visitor.
    pub files: usize,
    /// Directories pruned by the filter.
    pub excluded_dirs: usize,
    /// Symbolic links left out, relative to the role root.
    pub skipped_links: Vec<PathBuf>,
    /// The role root itself carries an excluded name.
    pub root_excluded: bool,
}

/// Error from [`ContentFilter::walk`]: either the tree could not be read,
/// or the visitor failed.
#[derive(Debug)]
pub enum WalkError<E> {
    Read(walkdir::Error),
    Visit(E),
}

impl ContentFilter {
    pub fn new<I, S>(excluded_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded_dirs: excluded_dirs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn excluded_dirs(&self) -> &[String] {
        &self.excluded_dirs
    }

    /// Exact, case-sensitive match against the exclusion names.
    pub fn is_excluded_dir_name(&self, name: &OsStr) -> bool {
        self.excluded_dirs.iter().any(|ex| OsStr::new(ex) == name)
    }

    /// Whether an entry at `relative` (from the role root) is packaged.
    ///
    /// Every directory segment is checked, so a file is excluded when any
    /// of its ancestors is an excluded directory. A *file* that happens to
    /// carry an excluded name is still included.
    pub fn should_include(&self, relative: &Path, kind: EntryKind) -> bool {
        let mut segments = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name),
                _ => None,
            })
            .peekable();

        while let Some(segment) = segments.next() {
            let is_dir = kind == EntryKind::Dir || segments.peek().is_some();
            if is_dir && self.is_excluded_dir_name(segment) {
                return false;
            }
        }
        true
    }

    /// Walk `root` depth-first in file-name order and call `visit` with the
    /// relative and absolute path of every included regular file.
    ///
    /// Excluded directories are pruned before they are descended into.
    /// Symbolic links are not followed; they are recorded in
    /// [`WalkStats::skipped_links`] instead.
    pub fn walk<F, E>(&self, root: &Path, mut visit: F) -> Result<WalkStats, WalkError<E>>
    where
        F: FnMut(&Path, &Path) -> Result<(), E>,
    {
        let mut stats = WalkStats::default();

        if root.file_name().is_some_and(|name| self.is_excluded_dir_name(name)) {
            tracing::debug!(root = %root.display(), "role root is an excluded directory");
            stats.root_excluded = true;
            return Ok(stats);
        }

        let mut excluded_dirs = 0usize;
        let entries = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                if entry.depth() == 0 || !entry.file_type().is_dir() {
                    return true;
                }
                let relative = relative_to(root, entry.path());
                let keep = self.should_include(relative, EntryKind::Dir);
                if !keep {
                    tracing::debug!(path = %relative.display(), "excluding directory");
                    excluded_dirs += 1;
                }
                keep
            });

        for entry in entries {
            let entry = entry.map_err(WalkError::Read)?;
            let relative = relative_to(root, entry.path());

            if entry.depth() > 0 && entry.path_is_symlink() {
                tracing::warn!(path = %entry.path().display(), "skipping symbolic link");
                stats.skipped_links.push(relative.to_path_buf());
                continue;
            }
            if !entry.file_type().is_file() || !self.should_include(relative, EntryKind::File) {
                continue;
            }

            visit(relative, entry.path()).map_err(WalkError::Visit)?;
            stats.files += 1;
        }

        stats.excluded_dirs = excluded_dirs;
        Ok(stats)
    }
}

/// Path of a walked entry relative to the walk root.
fn relative_to<'p>(root: &Path, path: &'p Path) -> &'p Path {
    // arch-lint: allow(no-silent-result-drop) reason="walkdir only yields paths below its root"
    path.strip_prefix(root).unwrap_or(path)
}
