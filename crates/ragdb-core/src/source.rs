//! Directory source loader used by bulk ingestion.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

const EXTENSIONS: &[&str] = &["txt", "md"];

/// A raw text file ready for ingestion.
#[derive(Debug, Clone)]
pub struct SourceText {
    /// Path relative to the root, without extension (e.g. `policies/spa`).
    pub source: String,
    pub path: PathBuf,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SourceLoader {
    limit: Option<usize>,
}

impl SourceLoader {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self { self.limit = Some(limit); self }

    pub fn load_directory(&self, root: &Path) -> Result<Vec<SourceText>> {
        let mut files = self.list_files(root);
        if let Some(limit) = self.limit { files.truncate(limit); }
        let mut out = Vec::with_capacity(files.len());
        for path in files {
            let text = read_file_content(&path)?;
            out.push(SourceText { source: source_name(&path, root), path, text });
        }
        tracing::debug!(root = %root.display(), files = out.len(), "loaded source files");
        Ok(out)
    }

    pub fn list_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().and_then(|s| s.to_str()).is_some_and(|ext| EXTENSIONS.contains(&ext)))
            .map(walkdir::DirEntry::into_path)
            .collect();
        files.sort();
        files
    }
}

/// Read as UTF-8, falling back to lossy decoding.
pub fn read_file_content(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(path)?).to_string()),
    }
}

fn source_name(path: &Path, root: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    let name = relative.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/");
    if !name.is_empty() { return name; }
    // root was the file itself
    path.file_stem().map_or_else(|| "misc".to_string(), |s| s.to_string_lossy().to_string())
}
