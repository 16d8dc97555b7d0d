use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use cutout_core::sanitize_file_name;
use cutout_logging::cutout_debug;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("output directory unusable: {0}")]
    OutputDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Creates `dir` if it is missing; fails if something other than a directory is there.
pub fn ensure_output_dir(dir: &Path) -> Result<(), PersistError> {
    match fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(PersistError::OutputDir(format!(
            "{} is not a directory",
            dir.display()
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            cutout_debug!("creating output directory {:?}", dir);
            fs::create_dir_all(dir).map_err(|e| {
                PersistError::OutputDir(format!("cannot create {}: {}", dir.display(), e))
            })
        }
        Err(err) => Err(PersistError::OutputDir(err.to_string())),
    }
}

/// Writes downloads into one directory, each through a temp file and a rename.
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `content` to `{dir}/{sanitized name}` and returns the final path.
    ///
    /// An existing file with the same name is replaced.
    pub fn write(&self, name: &str, content: &[u8]) -> Result<PathBuf, PersistError> {
        ensure_output_dir(&self.dir)?;

        let target = self.dir.join(sanitize_file_name(name));
        let mut staged = NamedTempFile::new_in(&self.dir)?;
        staged.write_all(content)?;
        staged.as_file_mut().sync_all()?;
        staged
            .persist(&target)
            .map_err(|err| PersistError::Io(err.error))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_in_place_of_dir_is_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let file_path = temp.path().join("not_a_dir");
        fs::write(&file_path, "x").unwrap();

        let err = ensure_output_dir(&file_path).unwrap_err();
        assert!(matches!(err, PersistError::OutputDir(_)));
    }

    #[test]
    fn writes_under_a_sanitized_name_and_replaces_existing_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let writer = AtomicFileWriter::new(temp.path().join("nested").join("out"));

        let first = writer.write("cat:1.png", b"one").unwrap();
        let second = writer.write("cat:1.png", b"two").unwrap();

        assert_eq!(first, second);
        assert_eq!(first.file_name().unwrap(), "cat_1.png");
        assert_eq!(fs::read(&second).unwrap(), b"two");
        assert_eq!(fs::read_dir(writer.dir()).unwrap().count(), 1);
    }
}
