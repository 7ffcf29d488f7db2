//! Archive extraction.

use std::fs::File;
use std::path::Path;

use crate::deploy::DeploymentError;

/// Unpacks a deployable archive into a directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), DeploymentError>;
}

/// Extractor for plain (uncompressed) tar archives.
///
/// Entries that would land outside the destination are skipped by `tar`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, archive: &Path, destination: &Path) -> Result<(), DeploymentError> {
        let invalid = |reason: String| DeploymentError::InvalidArchive {
            path: archive.to_path_buf(),
            reason,
        };

        let file = File::open(archive).map_err(|e| invalid(e.to_string()))?;
        std::fs::create_dir_all(destination)
            .map_err(|e| DeploymentError::io("create extraction directory", e))?;

        let mut tar = tar::Archive::new(file);
        tar.set_preserve_permissions(false);
        tar.set_overwrite(true);
        tar.unpack(destination).map_err(|e| invalid(e.to_string()))?;

        tracing::debug!(
            archive = %archive.display(),
            destination = %destination.display(),
            "Archive extracted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_tar(path: &Path, files: &[(&str, &[u8])]) {
        let mut builder = tar::Builder::new(File::create(path).unwrap());
        for (name, contents) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *contents).unwrap();
        }
        builder.finish().unwrap();
    }

    #[test]
    fn test_extract_tar() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("app.tar");
        build_tar(&archive, &[("app.toml", b""), ("static/index.html", b"<h1>hi</h1>")]);

        let out = dir.path().join("out");
        TarExtractor.extract(&archive, &out).unwrap();
        assert_eq!(
            std::fs::read(out.join("static/index.html")).unwrap(),
            b"<h1>hi</h1>"
        );
    }

    #[test]
    fn test_garbage_is_invalid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar");
        std::fs::write(&archive, vec![b'x'; 1024]).unwrap();

        let err = TarExtractor
            .extract(&archive, &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidArchive { .. }));
    }

    #[test]
    fn test_missing_archive_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let err = TarExtractor
            .extract(&dir.path().join("none.tar"), &dir.path().join("out"))
            .unwrap_err();
        assert!(matches!(err, DeploymentError::InvalidArchive { .. }));
    }
}
