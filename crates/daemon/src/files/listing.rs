//! Directory listing and name search.
//!
//! Listings are partitioned into directories and files; the reported counts
//! are always the sizes of the two filtered sets. Recursive walks use an
//! explicit queue, so stack depth stays constant on deep trees.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use protocol::messages::{FileEntry, FILE_FOLDER_KIND};

use super::io;
use super::sandbox::{Sandbox, SandboxError};
use super::OpError;

/// A file or directory entry with metadata.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Entry name (not full path).
    pub name: String,
    /// Absolute path of the entry.
    pub path: PathBuf,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes. `None` for directories.
    pub size: Option<u64>,
    /// Kind label shown to clients.
    pub kind: String,
    /// Last modified timestamp.
    pub modified: SystemTime,
}

impl Entry {
    fn new(name: String, path: PathBuf, metadata: &fs::Metadata) -> Self {
        let is_dir = metadata.is_dir();
        let kind = if is_dir {
            FILE_FOLDER_KIND.to_string()
        } else {
            kind_for_file(&name)
        };

        Self {
            name,
            path,
            is_dir,
            size: (!is_dir).then(|| metadata.len()),
            kind,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }

    /// Convert to the wire record.
    pub fn to_protocol(&self) -> FileEntry {
        FileEntry {
            name: self.name.clone(),
            folder: self
                .path
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            size: self.size,
            kind: self.kind.clone(),
            modified: io::modified_secs(self.modified),
            full_path: self.path.display().to_string(),
        }
    }
}

/// Result of a listing: directories and files, post-filter.
#[derive(Debug, Default)]
pub struct Listing {
    /// Matched directories, sorted by full path.
    pub directories: Vec<Entry>,
    /// Matched files, sorted by full path.
    pub files: Vec<Entry>,
}

impl Listing {
    /// Number of matched directories.
    pub fn directory_count(&self) -> usize {
        self.directories.len()
    }

    /// Number of matched files.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Flatten into wire records, directories first.
    pub fn to_protocol_entries(&self) -> Vec<FileEntry> {
        self.directories
            .iter()
            .chain(self.files.iter())
            .map(Entry::to_protocol)
            .collect()
    }
}

/// Directory lister bound to a sandbox root.
pub struct Lister {
    /// Sandbox for path validation.
    sandbox: Sandbox,
}

impl Lister {
    /// Create a new lister.
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// List a directory, optionally filtered and recursive.
    ///
    /// An empty `path` means the sandbox root. The search term matches
    /// case-insensitively against entry base names, for files and
    /// directories alike; it filters inclusion, never traversal. Entries
    /// whose metadata cannot be read are skipped.
    pub fn list(
        &self,
        path: &str,
        search: Option<&str>,
        recursive: bool,
    ) -> Result<Listing, OpError> {
        let dir = if path.trim().is_empty() {
            self.sandbox.root().to_path_buf()
        } else {
            // A missing listing target is an invalid path, not a missing
            // resource: the caller asked to browse something that is not
            // an existing directory.
            self.sandbox.resolve_dir(path).map_err(|e| match e {
                SandboxError::NotFound(p) => {
                    OpError::InvalidPath(format!("not an existing directory: {}", p.display()))
                }
                other => other.into(),
            })?
        };

        let term = search
            .map(str::to_lowercase)
            .filter(|term| !term.trim().is_empty());

        let mut listing = Listing::default();
        let mut queue = VecDeque::from([dir]);
        let mut first = true;

        while let Some(current) = queue.pop_front() {
            let entries = match fs::read_dir(&current) {
                Ok(entries) => entries,
                // The requested directory itself must be readable; deeper
                // levels that vanish or deny access mid-walk are skipped.
                Err(e) if first => return Err(e.into()),
                Err(_) => continue,
            };
            first = false;

            for entry_result in entries {
                let entry = match entry_result {
                    Ok(e) => e,
                    Err(_) => continue,
                };

                let name = entry.file_name().to_string_lossy().to_string();
                let entry_path = entry.path();

                let metadata = match fs::metadata(&entry_path) {
                    Ok(m) => m,
                    Err(_) => continue,
                };

                if recursive && metadata.is_dir() && !is_symlink(&entry) {
                    queue.push_back(entry_path.clone());
                }

                if let Some(term) = &term {
                    if !name.to_lowercase().contains(term.as_str()) {
                        continue;
                    }
                }

                let item = Entry::new(name, entry_path, &metadata);
                if item.is_dir {
                    listing.directories.push(item);
                } else {
                    listing.files.push(item);
                }
            }
        }

        listing.directories.sort_by(|a, b| a.path.cmp(&b.path));
        listing.files.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(listing)
    }
}

/// Symlinked directories are listed but never descended into, so a link
/// cycle cannot make the walk unbounded.
fn is_symlink(entry: &fs::DirEntry) -> bool {
    entry
        .file_type()
        .map(|t| t.is_symlink())
        .unwrap_or(true)
}

/// Kind label for a file name, derived from its extension.
///
/// A small fixed table covers common types; everything else gets a generic
/// "`EXT` file" label, and files without an extension are plain "File".
fn kind_for_file(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    let label = match ext.to_lowercase().as_str() {
        "" => return "File".to_string(),
        "txt" | "log" => "Text document",
        "md" => "Markdown document",
        "pdf" => "PDF document",
        "csv" => "CSV file",
        "json" => "JSON file",
        "toml" => "TOML file",
        "xml" => "XML document",
        "html" | "htm" => "HTML document",
        "png" => "PNG image",
        "jpg" | "jpeg" => "JPEG image",
        "gif" => "GIF image",
        "svg" => "SVG image",
        "mp3" => "MP3 audio",
        "wav" => "WAV audio",
        "mp4" => "MP4 video",
        "zip" => "ZIP archive",
        "tar" => "TAR archive",
        "gz" => "GZ archive",
        "sh" => "Shell script",
        other => return format!("{} file", other.to_uppercase()),
    };
    label.to_string()
}
