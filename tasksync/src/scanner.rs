//! Batch file collection using walkdir and tokio::fs

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use taskbelt_core::{TriggerDescriptor, DEFAULT_MARKER};

use crate::directive::{Diagnostic, DirectiveParser, ParserOptions};
use crate::error::{Result, SyncError};

/// Files larger than this are never read
pub const MAX_BATCH_FILE_SIZE: u64 = 10 * 1024 * 1024;

const BATCH_EXTENSIONS: [&str; 2] = ["bat", "cmd"];

/// Options for batch file collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Directive marker following `REM`/`::`
    pub marker: String,
    /// Maximum file size in bytes
    pub max_file_size: u64,
    /// Follow symbolic links
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            max_file_size: MAX_BATCH_FILE_SIZE,
            follow_links: false,
        }
    }
}

/// A batch file carrying at least one directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFile {
    /// Absolute path to the file
    pub path: PathBuf,
    pub file_name: String,
    /// File name without extension
    pub task_name: String,
    pub triggers: Vec<TriggerDescriptor>,
    /// Hash of the directive lines, stored on the task as documentation
    pub content_hash: Option<String>,
    #[serde(skip)]
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchFile {
    /// Parse a file's text
    pub fn from_contents(path: impl Into<PathBuf>, text: &str, parser: &DirectiveParser) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let task_name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let parsed = parser.parse(text);

        Self {
            path,
            file_name,
            task_name,
            triggers: parsed.triggers(),
            content_hash: parsed.content_hash(),
            diagnostics: parsed.diagnostics,
        }
    }

    /// Directory the file lives in, used as the task's working directory
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Case-insensitive identity of the task
    pub fn task_key(&self) -> String {
        self.task_name.to_lowercase()
    }

    pub fn describe_triggers(&self) -> String {
        self.triggers
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Several files that would produce the same task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    pub task_name: String,
    pub files: Vec<PathBuf>,
}

/// Outcome of a collection pass
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    /// Surviving files sorted by task name, case-insensitively
    pub files: Vec<BatchFile>,
    pub collisions: Vec<Collision>,
    /// Batch files considered
    pub candidates: usize,
    /// Batch files without a single valid directive
    pub skipped_without_directives: usize,
    pub unreadable: usize,
    /// Malformed directive lines across all files
    pub diagnostics: usize,
}

/// Collects batch files from a set of directories
pub struct DirectoryScanner {
    options: ScanOptions,
    parser: DirectiveParser,
}

impl Default for DirectoryScanner {
    fn default() -> Self {
        Self::new(ScanOptions::default())
    }
}

impl DirectoryScanner {
    pub fn new(options: ScanOptions) -> Self {
        let parser = DirectiveParser::new(ParserOptions {
            marker: options.marker.clone(),
        });
        Self { options, parser }
    }

    /// Collect every directive-bearing batch file in `dirs`. Every directory
    /// is validated before any file is read.
    pub async fn collect<P: AsRef<Path>>(&self, dirs: &[P]) -> Result<CollectionReport> {
        let mut roots = Vec::with_capacity(dirs.len());
        for dir in dirs {
            roots.push(validate_directory(dir.as_ref()).await?);
        }

        let mut report = CollectionReport::default();
        let mut seen = HashSet::new();
        let mut groups: BTreeMap<String, Vec<BatchFile>> = BTreeMap::new();

        for root in &roots {
            for path in self.list_candidates(root, &mut report)? {
                let canonical = fs::canonicalize(&path).await.unwrap_or_else(|_| path.clone());
                if !seen.insert(canonical.clone()) {
                    trace!(path = %path.display(), "Already collected");
                    continue;
                }
                report.candidates += 1;

                let file = match self.load(&path).await {
                    Ok(file) => file,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable batch file");
                        report.unreadable += 1;
                        continue;
                    }
                };

                for diagnostic in &file.diagnostics {
                    warn!(
                        path = %file.path.display(),
                        line = diagnostic.line_number,
                        directive = %diagnostic.line,
                        error = %diagnostic.error,
                        "Skipping malformed directive"
                    );
                }
                report.diagnostics += file.diagnostics.len();

                if file.triggers.is_empty() {
                    debug!(path = %file.path.display(), "No directives, ignoring");
                    report.skipped_without_directives += 1;
                    continue;
                }

                groups.entry(file.task_key()).or_default().push(file);
            }
        }

        for (_, mut group) in groups {
            if group.len() == 1 {
                report.files.extend(group.pop());
                continue;
            }

            let collision = Collision {
                task_name: group[0].task_name.clone(),
                files: group.into_iter().map(|f| f.path).collect(),
            };
            warn!(
                task = %collision.task_name,
                files = ?collision.files,
                "Task name collision, none of these files will be synchronized"
            );
            report.collisions.push(collision);
        }

        Ok(report)
    }

    /// Batch files directly inside `dir`. Only failing to read `dir` itself
    /// is an error; entries that cannot be inspected are counted as unreadable.
    fn list_candidates(&self, dir: &Path, report: &mut CollectionReport) -> Result<Vec<PathBuf>> {
        let walker = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(self.options.follow_links)
            .sort_by_file_name();

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(SyncError::scan_error(dir, format!("Walk error: {}", e)));
                }
                Err(e) => {
                    let path = e.path().unwrap_or(dir).display().to_string();
                    warn!(path = %path, error = %e, "Skipping unreadable directory entry");
                    report.unreadable += 1;
                    continue;
                }
            };
            let path = entry.path();

            if !entry.file_type().is_file() && !(entry.path_is_symlink() && path.is_file()) {
                trace!(path = %path.display(), "Not a regular file");
                continue;
            }

            if !has_batch_extension(path) {
                trace!(path = %path.display(), "Not a batch file");
                continue;
            }

            match entry.metadata() {
                Ok(metadata) if metadata.len() > self.options.max_file_size => {
                    trace!(path = %path.display(), size = metadata.len(), "Batch file too large");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read metadata");
                    continue;
                }
            }

            candidates.push(path.to_path_buf());
        }

        Ok(candidates)
    }

    /// Read and parse one batch file
    pub async fn load(&self, path: &Path) -> Result<BatchFile> {
        let bytes = fs::read(path)
            .await
            .map_err(|e| SyncError::path_error(path, format!("Failed to read file: {}", e)))?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(BatchFile::from_contents(path, &text, &self.parser))
    }
}

/// Absolute form of an existing directory
async fn validate_directory(dir: &Path) -> Result<PathBuf> {
    let metadata = fs::metadata(dir)
        .await
        .map_err(|_| SyncError::path_error(dir, "Directory does not exist"))?;
    if !metadata.is_dir() {
        return Err(SyncError::path_error(dir, "Path is not a directory"));
    }
    std::path::absolute(dir)
        .map_err(|e| SyncError::path_error(dir, format!("Failed to resolve path: {}", e)))
}

fn has_batch_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| BATCH_EXTENSIONS.iter().any(|b| ext.eq_ignore_ascii_case(b)))
        .unwrap_or(false)
}
