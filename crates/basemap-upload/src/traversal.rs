//! Resumable discovery of files that still need uploading.
//!
//! Files are visited category by category in configured order, and by sorted
//! file name within a category. That order is what gives a checkpoint of
//! `(category, filename)` a well-defined meaning across runs.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::{DEFAULT_CATEGORIES, DEFAULT_EXTENSION};
use crate::ledger::Ledger;

/// A file that still needs uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub category: String,
    /// Already-uploaded files passed over since the previous candidate.
    pub skipped: u64,
}

/// The fixed set of category subdirectories and the file extension to look for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categories {
    names: Vec<String>,
    suffix: String,
}

impl Categories {
    /// Build a category set. Duplicate names are dropped, keeping the first.
    /// The extension is matched case-insensitively, with or without a leading dot.
    pub fn new<I, S>(names: I, extension: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self {
            names: unique,
            suffix: format!(".{}", extension.trim_start_matches('.').to_lowercase()),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The extension, without its dot.
    pub fn extension(&self) -> &str {
        &self.suffix[1..]
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether `filename` has the expected extension.
    pub fn matches(&self, filename: &str) -> bool {
        filename.to_lowercase().ends_with(&self.suffix)
    }
}

impl Default for Categories {
    fn default() -> Self {
        Self::new(DEFAULT_CATEGORIES.iter().copied(), DEFAULT_EXTENSION)
    }
}

struct CategoryCursor {
    name: String,
    dir: PathBuf,
    files: std::vec::IntoIter<String>,
}

/// Iterator over files that are not yet in the ledger.
///
/// When a checkpoint store is attached, the checkpoint is saved for each file
/// *before* the file is checked against the ledger and handed out, so a crash
/// while processing a file always resumes at or before that file. The
/// checkpointed file itself is visited again on resume.
///
/// Once every category has been visited without a listing error, the
/// checkpoint is cleared.
pub struct Traversal<'a> {
    root: PathBuf,
    categories: Categories,
    ledger: &'a Ledger,
    checkpoint: Option<&'a CheckpointStore>,
    pending: VecDeque<String>,
    current: Option<CategoryCursor>,
    resume: Option<Checkpoint>,
    skipped: u64,
    found: u64,
    had_errors: bool,
    finished: bool,
}

impl<'a> Traversal<'a> {
    /// A traversal of `root` that neither resumes nor records checkpoints.
    pub fn new(root: impl Into<PathBuf>, categories: &Categories, ledger: &'a Ledger) -> Self {
        Self {
            root: root.into(),
            categories: categories.clone(),
            ledger,
            checkpoint: None,
            pending: categories.names().iter().cloned().collect(),
            current: None,
            resume: None,
            skipped: 0,
            found: 0,
            had_errors: false,
            finished: false,
        }
    }

    /// Record progress in `store`, and when `resume` is set continue from the
    /// checkpoint it holds.
    ///
    /// Resuming rotates the category order so the checkpointed category comes
    /// first, with the categories before it wrapped to the end.
    pub fn with_checkpoint(mut self, store: &'a CheckpointStore, resume: bool) -> Self {
        self.checkpoint = Some(store);
        if !resume {
            return self;
        }

        let Some(checkpoint) = store.load() else {
            return self;
        };

        match self
            .pending
            .iter()
            .position(|name| *name == checkpoint.category)
        {
            Some(pos) => {
                info!(
                    category = %checkpoint.category,
                    filename = %checkpoint.last_filename,
                    "Resuming from checkpoint"
                );
                self.pending.rotate_left(pos);
                self.resume = Some(checkpoint);
            }
            None => warn!(
                category = %checkpoint.category,
                "Checkpoint names a category that is not configured, starting from the beginning"
            ),
        }
        self
    }

    /// Already-uploaded files seen after the last candidate was returned.
    pub fn trailing_skipped(&self) -> u64 {
        self.skipped
    }

    /// Whether any category, or any matching file in it, could not be listed.
    pub fn had_errors(&self) -> bool {
        self.had_errors
    }

    fn open_category(&mut self, name: String) -> Option<CategoryCursor> {
        // Resume applies to the first category only, whatever happens to it.
        let resume = self.resume.take();
        let dir = self.root.join(&name);

        match fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                warn!(?dir, category = %name, "Category path is not a directory, skipping");
                return None;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(?dir, category = %name, "Category directory not found, skipping");
                return None;
            }
            Err(err) => {
                error!(?dir, category = %name, %err, "Cannot access category, skipping it");
                self.had_errors = true;
                return None;
            }
        }

        let Listing { files, unlisted } = match list_category(&dir, &self.categories) {
            Ok(listing) => listing,
            Err(err) => {
                error!(?dir, category = %name, %err, "Cannot list category, skipping it");
                self.had_errors = true;
                return None;
            }
        };

        if unlisted > 0 {
            error!(
                ?dir,
                category = %name,
                unlisted,
                "Some matching files cannot be uploaded, checkpoint will be kept"
            );
            self.had_errors = true;
        }

        if files.is_empty() {
            warn!(?dir, category = %name, extension = self.categories.extension(), "No matching files found");
        } else {
            info!(category = %name, files = files.len(), "Found files");
        }
        self.found += files.len() as u64;

        let start = match resume {
            Some(checkpoint) if checkpoint.category == name => {
                match files.binary_search(&checkpoint.last_filename) {
                    Ok(pos) => pos,
                    Err(_) => {
                        warn!(
                            category = %name,
                            filename = %checkpoint.last_filename,
                            "Checkpointed file no longer exists, rescanning category from the start"
                        );
                        0
                    }
                }
            }
            _ => 0,
        };

        let mut files = files;
        files.drain(..start);
        Some(CategoryCursor {
            name,
            dir,
            files: files.into_iter(),
        })
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.found == 0 {
            warn!(root = ?self.root, "No matching files found in any category");
        }

        if self.had_errors {
            warn!("Traversal finished with errors, keeping checkpoint");
        } else if let Some(store) = self.checkpoint {
            store.clear();
            debug!("Traversal complete, checkpoint cleared");
        }
    }
}

impl Iterator for Traversal<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            let Some(cursor) = self.current.as_mut() else {
                let Some(name) = self.pending.pop_front() else {
                    self.finish();
                    return None;
                };
                self.current = self.open_category(name);
                continue;
            };

            let Some(filename) = cursor.files.next() else {
                debug!(category = %cursor.name, "Category done");
                self.current = None;
                continue;
            };

            if let Some(store) = self.checkpoint {
                store.save(&cursor.name, &filename);
            }

            let path = cursor.dir.join(&filename);
            if self.ledger.is_uploaded(&path, &cursor.name) {
                debug!(?path, "Already uploaded, skipping");
                self.skipped += 1;
                continue;
            }

            return Some(Candidate {
                path,
                category: cursor.name.clone(),
                skipped: std::mem::take(&mut self.skipped),
            });
        }
    }
}

struct Listing {
    /// Sorted names of the matching regular files.
    files: Vec<String>,
    /// Matching entries that could not be read or named.
    unlisted: usize,
}

/// List the matching regular files directly inside `dir`.
///
/// Problems with individual entries are logged and the entry skipped, counting
/// it as unlisted when its name has the wanted extension. Failing to read `dir`
/// itself is an error.
fn list_category(dir: &Path, categories: &Categories) -> Result<Listing, walkdir::Error> {
    let mut files = Vec::new();
    let mut unlisted = 0;

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(err),
            Err(err) => {
                let matching = err
                    .path()
                    .and_then(Path::file_name)
                    .is_some_and(|name| categories.matches(&name.to_string_lossy()));
                if matching {
                    error!(path = ?err.path(), %err, "Cannot read matching entry");
                    unlisted += 1;
                } else {
                    warn!(path = ?err.path(), %err, "Skipping unreadable entry");
                }
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        // Object keys are UTF-8, so such a file has no key to upload under.
        let Some(name) = entry.file_name().to_str() else {
            if categories.matches(&entry.file_name().to_string_lossy()) {
                error!(path = ?entry.path(), "Matching file has a non UTF-8 name");
                unlisted += 1;
            }
            continue;
        };

        if categories.matches(name) {
            files.push(name.to_string());
        }
    }

    files.sort();
    Ok(Listing { files, unlisted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, category: &str, name: &str) -> PathBuf {
        let dir = root.join(category);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"tiff").unwrap();
        path
    }

    fn names(candidates: &[Candidate]) -> Vec<String> {
        candidates
            .iter()
            .map(|c| {
                format!(
                    "{}/{}",
                    c.category,
                    c.path.file_name().unwrap().to_string_lossy()
                )
            })
            .collect()
    }

    #[test]
    fn emits_sorted_files_per_category() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions_buildings", "c.tif");
        touch(root.path(), "regions", "b.tif");
        touch(root.path(), "regions", "a.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger).collect();

        assert_eq!(
            out,
            vec![
                Candidate {
                    path: root.path().join("regions/a.tif"),
                    category: "regions".into(),
                    skipped: 0,
                },
                Candidate {
                    path: root.path().join("regions/b.tif"),
                    category: "regions".into(),
                    skipped: 0,
                },
                Candidate {
                    path: root.path().join("regions_buildings/c.tif"),
                    category: "regions_buildings".into(),
                    skipped: 0,
                },
            ]
        );
    }

    #[test]
    fn two_traversals_agree() {
        let root = TempDir::new().unwrap();
        for name in ["q.tif", "b.TIF", "z.tif", "a.tif", "m.tif"] {
            touch(root.path(), "regions", name);
        }
        let ledger = Ledger::open_in_memory().unwrap();
        let categories = Categories::default();

        let first: Vec<_> = Traversal::new(root.path(), &categories, &ledger).collect();
        let second: Vec<_> = Traversal::new(root.path(), &categories, &ledger).collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 5);
    }

    #[test]
    fn filters_by_extension_and_category() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        touch(root.path(), "regions", "B.TIF");
        touch(root.path(), "regions", "notes.txt");
        touch(root.path(), "regions", "c.tiff");
        touch(root.path(), "other", "d.tif");
        fs::create_dir_all(root.path().join("regions/nested.tif")).unwrap();
        touch(root.path(), "regions/nested.tif", "e.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger).collect();
        assert_eq!(names(&out), vec!["regions/B.TIF", "regions/a.tif"]);
    }

    #[test]
    fn counts_skipped_files_before_each_candidate() {
        let root = TempDir::new().unwrap();
        let one = touch(root.path(), "regions", "1.tif");
        let two = touch(root.path(), "regions", "2.tif");
        touch(root.path(), "regions", "3.tif");
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.mark_uploaded(&one, "regions").unwrap();
        ledger.mark_uploaded(&two, "regions").unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger).collect();
        assert_eq!(
            out,
            vec![Candidate {
                path: root.path().join("regions/3.tif"),
                category: "regions".into(),
                skipped: 2,
            }]
        );
    }

    #[test]
    fn trailing_skips_are_reported() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        let b = touch(root.path(), "regions", "b.tif");
        let c = touch(root.path(), "regions_buildings", "c.tif");
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.mark_uploaded(&b, "regions").unwrap();
        ledger.mark_uploaded(&c, "regions_buildings").unwrap();

        let mut traversal = Traversal::new(root.path(), &Categories::default(), &ledger);
        let out: Vec<_> = traversal.by_ref().collect();
        assert_eq!(names(&out), vec!["regions/a.tif"]);
        assert_eq!(traversal.trailing_skipped(), 2);
    }

    #[test]
    fn empty_root_is_a_complete_traversal() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions", "stale.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal =
            Traversal::new(root.path(), &Categories::default(), &ledger).with_checkpoint(&store, false);
        assert!(traversal.next().is_none());
        assert!(!traversal.had_errors());
        assert!(store.load().is_none());
    }

    #[test]
    fn completion_clears_checkpoint() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal =
            Traversal::new(root.path(), &Categories::default(), &ledger).with_checkpoint(&store, true);
        let first = traversal.next().unwrap();
        assert_eq!(
            store.load(),
            Some(Checkpoint {
                category: "regions".into(),
                last_filename: "a.tif".into(),
            })
        );
        assert_eq!(first.category, "regions");

        assert!(traversal.next().is_none());
        assert!(store.load().is_none());
    }

    #[test]
    fn resume_revisits_checkpointed_file_first() {
        let root = TempDir::new().unwrap();
        for name in ["a.tif", "b.tif", "c.tif", "d.tif"] {
            touch(root.path(), "regions", name);
        }
        touch(root.path(), "regions_buildings", "e.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        let ledger = Ledger::open_in_memory().unwrap();
        let categories = Categories::default();

        // Interrupted after handing out b.tif, before it was marked.
        {
            let mut traversal =
                Traversal::new(root.path(), &categories, &ledger).with_checkpoint(&store, true);
            let a = traversal.next().unwrap();
            ledger.mark_uploaded(&a.path, &a.category).unwrap();
            traversal.next().unwrap();
        }

        let out: Vec<_> = Traversal::new(root.path(), &categories, &ledger)
            .with_checkpoint(&store, true)
            .collect();
        assert_eq!(
            names(&out),
            vec![
                "regions/b.tif",
                "regions/c.tif",
                "regions/d.tif",
                "regions_buildings/e.tif"
            ]
        );
        assert!(store.load().is_none());
    }

    #[test]
    fn resume_skips_checkpointed_file_once_marked() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        let b = touch(root.path(), "regions", "b.tif");
        touch(root.path(), "regions", "c.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions", "b.tif");
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.mark_uploaded(&b, "regions").unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger)
            .with_checkpoint(&store, true)
            .collect();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, root.path().join("regions/c.tif"));
        assert_eq!(out[0].skipped, 1);
    }

    #[test]
    fn resume_rotates_categories() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        touch(root.path(), "regions", "b.tif");
        touch(root.path(), "regions_buildings", "c.tif");
        touch(root.path(), "regions_buildings", "d.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions_buildings", "d.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger)
            .with_checkpoint(&store, true)
            .collect();
        // The resumed category scans from its checkpoint only; the wrapped one
        // scans from its start.
        assert_eq!(
            names(&out),
            vec!["regions_buildings/d.tif", "regions/a.tif", "regions/b.tif"]
        );
    }

    #[test]
    fn vanished_checkpoint_file_rescans_category() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        touch(root.path(), "regions", "c.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions", "b.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger)
            .with_checkpoint(&store, true)
            .collect();
        assert_eq!(names(&out), vec!["regions/a.tif", "regions/c.tif"]);
    }

    #[test]
    fn unknown_checkpoint_category_is_ignored() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("retired", "z.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger)
            .with_checkpoint(&store, true)
            .collect();
        assert_eq!(names(&out), vec!["regions/a.tif"]);
    }

    #[test]
    fn without_resume_checkpoint_is_overwritten() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        touch(root.path(), "regions", "b.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions", "b.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal =
            Traversal::new(root.path(), &Categories::default(), &ledger).with_checkpoint(&store, false);
        let first = traversal.next().unwrap();
        assert_eq!(first.path, root.path().join("regions/a.tif"));
        assert_eq!(store.load().unwrap().last_filename, "a.tif");
    }

    #[test]
    fn missing_category_is_not_an_error() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions_buildings", "c.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal = Traversal::new(root.path(), &Categories::default(), &ledger);
        let out: Vec<_> = traversal.by_ref().collect();
        assert_eq!(names(&out), vec!["regions_buildings/c.tif"]);
        assert!(!traversal.had_errors());
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_name_keeps_checkpoint() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "ok.tif");
        fs::write(
            root.path()
                .join("regions")
                .join(OsStr::from_bytes(b"tile_\xff.tif")),
            b"tiff",
        )
        .unwrap();
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal =
            Traversal::new(root.path(), &Categories::default(), &ledger).with_checkpoint(&store, true);
        let out: Vec<_> = traversal.by_ref().collect();

        assert_eq!(names(&out), vec!["regions/ok.tif"]);
        assert!(traversal.had_errors());
        assert!(store.load().is_some());
    }

    #[cfg(unix)]
    #[test]
    fn listing_error_abandons_category_and_keeps_checkpoint() {
        let root = TempDir::new().unwrap();
        std::os::unix::fs::symlink("regions", root.path().join("regions")).unwrap();
        touch(root.path(), "regions_buildings", "c.tif");
        let state = TempDir::new().unwrap();
        let store = CheckpointStore::new(state.path().join("checkpoint.json"));
        store.save("regions", "a.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal =
            Traversal::new(root.path(), &Categories::default(), &ledger).with_checkpoint(&store, true);
        let out: Vec<_> = traversal.by_ref().collect();

        assert_eq!(names(&out), vec!["regions_buildings/c.tif"]);
        assert!(traversal.had_errors());
        assert!(store.load().is_some());
    }

    #[test]
    fn category_path_that_is_a_file_is_skipped() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("regions"), b"not a dir").unwrap();
        touch(root.path(), "regions_buildings", "c.tif");
        let ledger = Ledger::open_in_memory().unwrap();

        let mut traversal = Traversal::new(root.path(), &Categories::default(), &ledger);
        let out: Vec<_> = traversal.by_ref().collect();
        assert_eq!(names(&out), vec!["regions_buildings/c.tif"]);
        assert!(!traversal.had_errors());
    }

    #[test]
    fn scan_without_store_writes_nothing() {
        let root = TempDir::new().unwrap();
        touch(root.path(), "regions", "a.tif");
        let state = TempDir::new().unwrap();
        let ledger = Ledger::open_in_memory().unwrap();

        let out: Vec<_> = Traversal::new(root.path(), &Categories::default(), &ledger).collect();
        assert_eq!(out.len(), 1);
        assert_eq!(fs::read_dir(state.path()).unwrap().count(), 0);
    }

    #[test]
    fn categories_dedupe_and_normalise_extension() {
        let categories = Categories::new(["b", "a", "b"], ".TIF");
        assert_eq!(categories.names(), ["b", "a"]);
        assert_eq!(categories.extension(), "tif");
        assert!(categories.matches("x.Tif"));
        assert!(!categories.matches("x.tiff"));
    }
}
