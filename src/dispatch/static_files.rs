//! Static content served from an application's `static/` directory.

use std::io;
use std::path::{Component, Path, PathBuf};

const INDEX_FILE: &str = "index.html";

/// Serves files below a fixed root directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
}

impl StaticFiles {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Static root for an application base directory.
    pub fn for_application(base_dir: &Path) -> Self {
        Self::new(base_dir.join("static"))
    }

    /// Map a request path onto the root; `None` if it would escape it.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in Path::new(url_path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(path)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html; charset=utf-8",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain; charset=utf-8",
            "xml" => "application/xml",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "ico" => "image/x-icon",
            _ => "application/octet-stream",
        }
    }

    /// Read a file, returning its bytes and content type.
    ///
    /// A directory serves its `index.html`. Missing files and traversal
    /// attempts are `NotFound`.
    pub async fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let not_found = || io::Error::new(io::ErrorKind::NotFound, "file not found");
        let mut path = self.map_path(url_path).ok_or_else(not_found)?;
        if tokio::fs::metadata(&path).await?.is_dir() {
            path.push(INDEX_FILE);
        }
        if !tokio::fs::metadata(&path).await?.is_file() {
            return Err(not_found());
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok((bytes, Self::content_type(&path)))
    }
}
