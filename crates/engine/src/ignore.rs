//! Ignore rules for the source walk
//!
//! Each directory owns one matcher built from its `.gitignore` and
//! `.backupignore`; matchers stack toward the source root. A candidate is
//! decided by the innermost matcher that has an opinion: an ignore match
//! excludes, a negation (`!pattern`) match forces inclusion, and
//! `.backupignore` outranks `.gitignore` within one directory. With no
//! opinion anywhere, the default is include.
//!
//! Pattern syntax is gitignore's: blank lines and `#` comments skipped,
//! trailing `/` for directory-only, leading `/` anchored to the matcher's
//! directory, globs that do not cross `/`.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::Path;
use tracing::warn;

/// Ignore files consulted per directory, highest priority first
const IGNORE_FILES: [&str; 2] = [".backupignore", ".gitignore"];

/// The pattern that decided a candidate, for reporting
#[derive(Debug, Clone)]
pub struct MatchedPattern {
    /// File the pattern came from (`.gitignore` or `.backupignore`)
    pub source: String,
    /// The pattern text as written
    pub pattern: String,
}

/// Verdict of the ignore chain for one candidate
#[derive(Debug, Clone)]
pub enum Verdict {
    Ignore(MatchedPattern),
    Include(MatchedPattern),
}

/// Matcher for a single directory
pub struct DirMatcher {
    sources: Vec<(String, Gitignore)>,
}

impl DirMatcher {
    /// Build the matcher for `dir`, loading whichever ignore files exist
    ///
    /// Unreadable or malformed ignore files are skipped with a warning; a
    /// bad pattern file never aborts a backup.
    pub fn load(dir: &Path) -> Self {
        let mut sources = Vec::new();

        for name in IGNORE_FILES {
            let path = dir.join(name);
            if !path.exists() {
                continue;
            }
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(err) = builder.add(&path) {
                warn!("skipping unreadable ignore file {}: {err}", path.display());
                continue;
            }
            match builder.build() {
                Ok(matcher) => sources.push((name.to_string(), matcher)),
                Err(err) => {
                    warn!("skipping malformed ignore file {}: {err}", path.display());
                }
            }
        }

        Self { sources }
    }

    fn decide(&self, path: &Path, is_dir: bool) -> Option<Verdict> {
        for (name, matcher) in &self.sources {
            match matcher.matched(path, is_dir) {
                ignore::Match::None => continue,
                ignore::Match::Ignore(glob) => {
                    return Some(Verdict::Ignore(MatchedPattern {
                        source: name.clone(),
                        pattern: glob.original().to_string(),
                    }))
                }
                ignore::Match::Whitelist(glob) => {
                    return Some(Verdict::Include(MatchedPattern {
                        source: name.clone(),
                        pattern: glob.original().to_string(),
                    }))
                }
            }
        }
        None
    }
}

/// Stack of per-directory matchers from the source root down to the
/// directory currently being walked
#[derive(Default)]
pub struct IgnoreChain {
    stack: Vec<DirMatcher>,
}

impl IgnoreChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a directory: load and push its matcher
    pub fn push(&mut self, dir: &Path) {
        self.stack.push(DirMatcher::load(dir));
    }

    /// Leave a directory
    pub fn pop(&mut self) {
        self.stack.pop();
    }

    /// Decide a candidate, innermost matcher first
    pub fn decide(&self, path: &Path, is_dir: bool) -> Option<Verdict> {
        self.stack
            .iter()
            .rev()
            .find_map(|matcher| matcher.decide(path, is_dir))
    }

    /// The pattern excluding `path`, if any
    pub fn ignored(&self, path: &Path, is_dir: bool) -> Option<MatchedPattern> {
        match self.decide(path, is_dir) {
            Some(Verdict::Ignore(pattern)) => Some(pattern),
            _ => None,
        }
    }
}
