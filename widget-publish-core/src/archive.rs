//! Zip archiving of a widget source tree.
//!
//! Walks the source directory, skips anything matched by an
//! [`ExcludePattern`], and writes every remaining file into a zip archive
//! under its path relative to the source root.

use std::fs;
use std::io::{ErrorKind, Read, Seek, Write};
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern, PatternError};
use thiserror::Error;
use tracing::{debug, error, info};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Patterns left out of every widget archive by default.
pub const DEFAULT_EXCLUDES: [&str; 2] = [".git/**", ".gitignore"];

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write archive entry {entry}: {source}")]
    Entry {
        entry: String,
        #[source]
        source: ZipError,
    },
    #[error("failed to finalize archive: {0}")]
    Finalize(#[source] ZipError),
    #[error("archive worker stopped unexpectedly: {0}")]
    Worker(String),
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A glob anchored at the source root, e.g. `.git/**` or `*.log`.
///
/// Matched against the `/`-joined relative path, so `*` and `?` stay within
/// one path segment and `**` spans whole segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludePattern {
    glob: Pattern,
    /// The part before a trailing `/**`: a matching directory is skipped whole.
    dir: Option<Pattern>,
}

impl ExcludePattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let dir = match pattern.strip_suffix("/**") {
            Some(prefix) if !prefix.is_empty() => Some(Pattern::new(prefix)?),
            _ => None,
        };
        Ok(Self {
            glob: Pattern::new(pattern)?,
            dir,
        })
    }

    pub fn as_str(&self) -> &str {
        self.glob.as_str()
    }

    /// Whether the pattern matches a relative path given as its segments.
    pub fn matches(&self, path: &[&str]) -> bool {
        let joined = path.join("/");
        self.glob.matches_with(&joined, MATCH_OPTIONS)
            || self
                .dir
                .as_ref()
                .is_some_and(|dir| dir.matches_with(&joined, MATCH_OPTIONS))
    }

    /// A directory is pruned only when everything below it is excluded too.
    fn prunes_dir(&self, path: &[&str]) -> bool {
        self.dir
            .as_ref()
            .is_some_and(|dir| dir.matches_with(&path.join("/"), MATCH_OPTIONS))
    }
}

/// What to put in an archive.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub source_dir: PathBuf,
    pub excludes: Vec<ExcludePattern>,
    /// Never archived, even when it lives inside `source_dir`. Used for the
    /// archive's own output file.
    pub skip: Option<PathBuf>,
}

impl ArchiveRequest {
    /// Archive `source_dir` with [`DEFAULT_EXCLUDES`].
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            excludes: DEFAULT_EXCLUDES
                .iter()
                .filter_map(|p| ExcludePattern::new(p).ok())
                .collect(),
            skip: None,
        }
    }

    pub fn skipping(mut self, path: impl Into<PathBuf>) -> Self {
        self.skip = Some(path.into());
        self
    }

    fn is_excluded_file(&self, rel: &[&str]) -> bool {
        self.excludes.iter().any(|p| p.matches(rel))
    }

    fn is_pruned_dir(&self, rel: &[&str]) -> bool {
        self.excludes.iter().any(|p| p.prunes_dir(rel))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub uncompressed_bytes: u64,
}

/// Write the archive described by `request` into `writer` and finalize it.
pub fn write_archive<W: Write + Seek>(
    request: &ArchiveRequest,
    writer: W,
) -> Result<ArchiveSummary, ArchiveError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ArchiveError::Io { path, source }
    };

    let root = fs::canonicalize(&request.source_dir).map_err(io_err(&request.source_dir))?;
    let skip = request
        .skip
        .as_ref()
        .and_then(|p| fs::canonicalize(p).ok());
    info!(
        source_dir = %root.display(),
        excludes = ?request.excludes.iter().map(ExcludePattern::as_str).collect::<Vec<_>>(),
        "Archiving source directory"
    );

    let mut zip = ZipWriter::new(writer);
    let mut summary = ArchiveSummary::default();
    let mut rel: Vec<String> = Vec::new();

    fn visit_dir<W: Write + Seek>(
        dir: &Path,
        rel: &mut Vec<String>,
        request: &ArchiveRequest,
        skip: Option<&Path>,
        zip: &mut ZipWriter<W>,
        summary: &mut ArchiveSummary,
    ) -> Result<(), ArchiveError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ArchiveError::Io { path, source }
        };

        let mut entries = fs::read_dir(dir)
            .map_err(io_err(dir))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(io_err(dir))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            rel.push(entry.file_name().to_string_lossy().into_owned());
            let rel_refs: Vec<&str> = rel.iter().map(String::as_str).collect();

            let file_type = entry.file_type().map_err(io_err(&path))?;
            let (is_dir, is_file) = if file_type.is_symlink() {
                match fs::metadata(&path) {
                    // Following directory links could loop back into the tree.
                    Ok(meta) if meta.is_dir() => {
                        debug!(path = %path.display(), "Skipping symlinked directory");
                        (false, false)
                    }
                    Ok(meta) => (false, meta.is_file()),
                    Err(e) => {
                        debug!(path = %path.display(), error = ?e, "Skipping dangling symlink");
                        (false, false)
                    }
                }
            } else {
                (file_type.is_dir(), file_type.is_file())
            };

            if is_dir {
                if request.is_pruned_dir(&rel_refs) {
                    debug!(path = %path.display(), "Skipping excluded directory");
                } else {
                    visit_dir(&path, rel, request, skip, zip, summary)?;
                }
            } else if is_file {
                if request.is_excluded_file(&rel_refs) {
                    debug!(path = %path.display(), "Skipping excluded file");
                } else if skip.is_some_and(|s| s == path) {
                    debug!(path = %path.display(), "Skipping archive output file");
                } else {
                    let name = rel_refs.join("/");
                    let size = add_file(zip, &path, &name)?;
                    debug!(entry = %name, size, "Added archive entry");
                    summary.entries += 1;
                    summary.uncompressed_bytes += size;
                }
            }
            rel.pop();
        }
        Ok(())
    }

    if let Err(e) = visit_dir(&root, &mut rel, request, skip.as_deref(), &mut zip, &mut summary) {
        error!(error = ?e, "Error occurred while archiving source directory");
        return Err(e);
    }

    zip.finish().map_err(|e| {
        error!(error = ?e, "Failed to finalize archive");
        ArchiveError::Finalize(e)
    })?;

    info!(
        entries = summary.entries,
        uncompressed_bytes = summary.uncompressed_bytes,
        "Completed archive"
    );
    Ok(summary)
}

fn add_file<W: Write + Seek>(
    zip: &mut ZipWriter<W>,
    path: &Path,
    name: &str,
) -> Result<u64, ArchiveError> {
    let io_err = |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = fs::File::open(path).map_err(io_err)?;
    let len = file.metadata().map_err(io_err)?.len();
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(len >= u64::from(u32::MAX));

    zip.start_file(name, options)
        .map_err(|source| ArchiveError::Entry {
            entry: name.to_string(),
            source,
        })?;
    let entry_err = |source: std::io::Error| ArchiveError::Entry {
        entry: name.to_string(),
        source: ZipError::Io(source),
    };

    let mut buf = vec![0u8; 64 * 1024];
    let mut written = 0u64;
    loop {
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(io_err(e)),
        };
        // Read errors blame the source file, write errors the archive entry.
        zip.write_all(&buf[..n]).map_err(entry_err)?;
        written += n as u64;
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_matches(pattern: &str, path: &str) -> bool {
        let segments: Vec<&str> = path.split('/').collect();
        ExcludePattern::new(pattern).unwrap().matches(&segments)
    }

    #[test]
    fn git_pattern_covers_directory_and_contents() {
        assert!(pattern_matches(".git/**", ".git"));
        assert!(pattern_matches(".git/**", ".git/HEAD"));
        assert!(pattern_matches(".git/**", ".git/refs/heads/main"));
        assert!(!pattern_matches(".git/**", ".github/workflows/ci.yml"));
        assert!(!pattern_matches(".git/**", "src/.git/HEAD"));
    }

    #[test]
    fn literal_pattern_is_anchored_at_root() {
        assert!(pattern_matches(".gitignore", ".gitignore"));
        assert!(!pattern_matches(".gitignore", "docs/.gitignore"));
        assert!(!pattern_matches(".gitignore", ".gitignore.bak"));
    }

    #[test]
    fn wildcards_stay_within_a_segment() {
        assert!(pattern_matches("*.log", "debug.log"));
        assert!(!pattern_matches("*.log", "logs/debug.log"));
        assert!(pattern_matches("**/*.log", "logs/debug.log"));
        assert!(pattern_matches("**/*.log", "debug.log"));
        assert!(pattern_matches("file?.txt", "file1.txt"));
        assert!(!pattern_matches("file?.txt", "file10.txt"));
    }

    #[test]
    fn character_classes_are_globs_not_literals() {
        assert!(pattern_matches("*.[ch]", "main.c"));
        assert!(pattern_matches("*.[ch]", "util.h"));
        assert!(!pattern_matches("*.[ch]", "main.rs"));
        assert!(pattern_matches("build-[!0-9]*", "build-debug"));
        assert!(!pattern_matches("build-[!0-9]*", "build-2024"));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        assert!(ExcludePattern::new("logs/[abc").is_err());
        assert!(ExcludePattern::new("a**/b").is_err());
    }

    #[test]
    fn only_trailing_any_depth_prunes_directories() {
        let git = ExcludePattern::new(".git/**").unwrap();
        assert!(git.prunes_dir(&[".git"]));
        assert!(!git.prunes_dir(&[".github"]));

        let literal = ExcludePattern::new("build").unwrap();
        assert!(literal.matches(&["build"]));
        assert!(!literal.prunes_dir(&["build"]));
    }
}
