//! Collision-free output paths within one message.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::filename::file_extension;

/// Paths already handed out while extracting one message.
///
/// Membership is checked on the normalized form of a path, so on
/// case-insensitive platforms `A.pdf` and `a.pdf` collide.
#[derive(Debug, Default)]
pub struct PathAllocator {
    allocated: HashSet<PathBuf>,
}

impl PathAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a path for `name` inside `dir` that no earlier call returned.
    ///
    /// On a clash the name becomes `"<name> attachment <label><ext>"`, then
    /// `"<name> attachment <label> (k)<ext>"` for k = 2, 3, …, where `<ext>`
    /// is the extension of `name`. The returned path is already reserved.
    pub fn allocate(&mut self, dir: &Path, name: &str, label: &str) -> PathBuf {
        let mut path = dir.join(name);
        let mut iteration: u32 = 1;

        while self.allocated.contains(&normalize_path(&path)) {
            let extension = file_extension(name);
            let candidate = if iteration <= 1 {
                format!("{name} attachment {label}{extension}")
            } else {
                format!("{name} attachment {label} ({iteration}){extension}")
            };
            path = dir.join(candidate);
            iteration += 1;
        }

        if iteration > 1 {
            debug!(name, resolved = %path.display(), "Resolved filename collision");
        }
        self.allocated.insert(normalize_path(&path));
        path
    }
}

/// Case-fold a path the way the platform compares names.
///
/// Windows: lower-case and `/` → `\`. Elsewhere the path is unchanged.
pub fn normalize_path(path: &Path) -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(path.to_string_lossy().to_lowercase().replace('/', "\\"))
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_use_keeps_name() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        assert_eq!(paths.allocate(dir, "5 report.pdf", "1"), dir.join("5 report.pdf"));
        assert_eq!(paths.allocate(dir, "5 other.pdf", "2"), dir.join("5 other.pdf"));
    }

    #[test]
    fn test_repeat_gets_attachment_suffix() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        paths.allocate(dir, "5 report.pdf", "1");
        assert_eq!(
            paths.allocate(dir, "5 report.pdf", "2"),
            dir.join("5 report.pdf attachment 2.pdf")
        );
    }

    #[test]
    fn test_further_repeats_count_up() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        paths.allocate(dir, "5 a.txt", "1");
        // The plain suffix form is already taken by an unrelated name
        paths.allocate(dir, "5 a.txt attachment 2.txt", "9");
        assert_eq!(
            paths.allocate(dir, "5 a.txt", "2"),
            dir.join("5 a.txt attachment 2 (2).txt")
        );
        paths.allocate(dir, "5 a.txt attachment 2 (3).txt", "9");
        assert_eq!(
            paths.allocate(dir, "5 a.txt", "2"),
            dir.join("5 a.txt attachment 2 (4).txt")
        );
    }

    #[test]
    fn test_names_without_extension() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        paths.allocate(dir, "2 ii1", "ii1");
        assert_eq!(paths.allocate(dir, "2 ii1", "ii2"), dir.join("2 ii1 attachment ii2"));
    }

    #[test]
    fn test_long_extension_not_reappended() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        let name = "1 notes.this-is-not-an-extension";
        paths.allocate(dir, name, "1");
        assert_eq!(
            paths.allocate(dir, name, "2"),
            dir.join(format!("{name} attachment 2"))
        );
    }

    #[test]
    fn test_same_name_in_different_dirs_does_not_collide() {
        let mut paths = PathAllocator::new();
        let a = paths.allocate(Path::new("out"), "1 ii1", "ii1");
        let b = paths.allocate(Path::new("out/inline_images"), "1 ii1", "ii1");
        assert_ne!(a, b);
    }

    #[test]
    fn test_many_identical_names_stay_distinct() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        let mut seen = HashSet::new();
        for i in 1..=25 {
            let path = paths.allocate(dir, "7 scan.png", &i.to_string());
            assert!(seen.insert(path), "duplicate path at attempt {i}");
        }
        assert_eq!(seen.len(), 25);
    }

    #[cfg(windows)]
    #[test]
    fn test_case_insensitive_on_windows() {
        let mut paths = PathAllocator::new();
        let dir = Path::new("out");
        paths.allocate(dir, "1 A.PDF", "1");
        assert_eq!(
            paths.allocate(dir, "1 a.pdf", "2"),
            dir.join("1 a.pdf attachment 2.pdf")
        );
    }
}
