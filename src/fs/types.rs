use chrono::{DateTime, Utc};
use serde::Serialize;

/// Node kind discovered during tree enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// Comparison metadata attached to an enumerated entry.
///
/// Which fields a driver fills in depends on the backend; the compare
/// policy falls back gracefully when a field is absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EntryMeta {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub checksum: Option<String>,
}

/// One node discovered during comparison. Paths are absolute within the
/// storage tree, `/`-separated, no trailing slash.
#[derive(Debug, Clone, Serialize)]
pub struct Entry {
    pub path: String,
    pub kind: EntryKind,
    pub meta: EntryMeta,
}

impl Entry {
    pub fn file(path: impl Into<String>, meta: EntryMeta) -> Self {
        Self { path: path.into(), kind: EntryKind::File, meta }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            meta: EntryMeta::default(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn format_size(&self) -> String {
        if self.is_dir() {
            return "<DIR>".to_string();
        }

        let size = self.meta.size;
        if size < 1024 {
            format!("{} B", size)
        } else if size < 1024 * 1024 {
            format!("{:.1} KB", size as f64 / 1024.0)
        } else if size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", size as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", size as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }
}

/// Normalize a tree path to the canonical form used as a comparison key:
/// leading `/`, single separators, no trailing slash, `.` and `..` resolved.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Parent of a normalized tree path, `None` at the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rsplit_once('/') {
        Some(("", _)) => Some("/"),
        Some((parent, _)) => Some(parent),
        None => None,
    }
}
