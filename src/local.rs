//! Local folder source: lists and reads files under a root directory, so the
//! explorer runs against a plain filesystem tree without remote credentials.
//! Descriptor ids are root-relative paths with forward slashes.

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::sources::{ContentFetcher, FileDescriptor, FileLister, NameFilter};

pub struct LocalFolderSource {
    root: PathBuf,
}

impl LocalFolderSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // Ids are relative paths; refuse anything that could escape the root.
    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let p = Path::new(id);
        if p.is_absolute() || p.components().any(|c| matches!(c, Component::ParentDir)) {
            bail!("invalid file id: '{}'", id);
        }
        Ok(self.root.join(p))
    }
}

fn mime_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".csv") {
        "text/csv"
    } else if lower.ends_with(".parquet") {
        "application/vnd.apache.parquet"
    } else if lower.ends_with(".xlsx") {
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
    } else {
        "application/octet-stream"
    }
}

impl FileLister for LocalFolderSource {
    fn list_files(&self, filter: &NameFilter) -> Result<Vec<FileDescriptor>> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.with_context(|| format!("walking '{}'", self.root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !filter.matches(&name) {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            let meta = entry
                .metadata()
                .with_context(|| format!("reading metadata for '{}'", entry.path().display()))?;
            out.push(FileDescriptor {
                id: rel,
                mime_type: mime_for(&name).to_string(),
                name,
                web_view_link: None,
                created_time: meta.created().ok().map(DateTime::<Utc>::from),
                modified_time: meta.modified().ok().map(DateTime::<Utc>::from),
                size_bytes: Some(meta.len()),
            });
        }
        Ok(out)
    }
}

impl ContentFetcher for LocalFolderSource {
    fn fetch_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(id)?;
        std::fs::read(&path).with_context(|| format!("reading '{}'", path.display()))
    }
}
