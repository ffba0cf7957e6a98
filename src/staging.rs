use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;
use tracing::debug;

const TEMP_DIR: &str = "temp";

#[derive(Debug)]
enum FileState {
    Staged(NamedTempFile),
    Stored(PathBuf),
}

/// An uploaded file written to the staging area of the storage location.
///
/// Staged files are removed when dropped unless [`StagedFile::store`] moved
/// them into the storage location first.
#[derive(Debug)]
pub struct StagedFile {
    form_name: String,
    file_name: String,
    size: usize,
    storage_dir: PathBuf,
    state: Mutex<FileState>,
}

impl StagedFile {
    pub(crate) fn stage(
        storage_dir: &Path,
        form_name: &str,
        file_name: &str,
        data: &[u8],
    ) -> io::Result<Self> {
        let file_name = sanitize_file_name(file_name);
        let temp_dir = storage_dir.join(TEMP_DIR);
        std::fs::create_dir_all(&temp_dir)?;

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&format!("-{}", file_name))
            .tempfile_in(&temp_dir)?;
        file.write_all(data)?;
        file.flush()?;

        debug!(
            form_name = %form_name,
            file_name = %file_name,
            size = data.len(),
            path = %file.path().display(),
            "Staged uploaded file"
        );

        Ok(Self {
            form_name: form_name.to_string(),
            file_name,
            size: data.len(),
            storage_dir: storage_dir.to_path_buf(),
            state: Mutex::new(FileState::Staged(file)),
        })
    }

    /// Name of the multipart form field the file arrived in.
    pub fn form_name(&self) -> &str {
        &self.form_name
    }

    /// Client supplied file name, reduced to its final path component.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Current location of the file on disk.
    pub fn path(&self) -> PathBuf {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match &*state {
            FileState::Staged(file) => file.path().to_path_buf(),
            FileState::Stored(path) => path.clone(),
        }
    }

    pub fn is_stored(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        matches!(*state, FileState::Stored(_))
    }

    /// Moves the file into the storage location so it survives the request.
    /// Storing twice returns the same path.
    pub fn store(&self) -> io::Result<PathBuf> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let destination = self.storage_dir.join(&self.file_name);

        match std::mem::replace(&mut *state, FileState::Stored(destination.clone())) {
            FileState::Stored(path) => {
                *state = FileState::Stored(path.clone());
                Ok(path)
            }
            FileState::Staged(file) => match file.persist(&destination) {
                Ok(_) => {
                    debug!(path = %destination.display(), "Stored uploaded file");
                    Ok(destination)
                }
                Err(err) => {
                    *state = FileState::Staged(err.file);
                    Err(err.error)
                }
            },
        }
    }
}

fn sanitize_file_name(name: &str) -> String {
    Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("upload")
        .to_string()
}
