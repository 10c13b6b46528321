use std::io;
use std::path::{Path, PathBuf};

use rocket::fs::TempFile;

use crate::resp::problem::Problem;
use crate::util::stored_file_name;

/// Public path prefix stored in records and used to serve files statically.
pub const PUBLIC_UPLOAD_PREFIX: &str = "uploads";

/// Upload root handed to handlers as managed state; the base path comes from
/// configuration rather than ambient process state.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> FileStore {
        FileStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persists an uploaded file under the store root and returns the path
    /// recorded on the entity, e.g. `uploads/student_avatar-1687000000000.png`.
    /// The extension comes from the submitted content type.
    pub async fn save(&self, field: &str, file: &mut TempFile<'_>) -> Result<String, Problem> {
        let extension = file
            .content_type()
            .and_then(|it| it.extension())
            .map(|it| it.as_str().to_string());

        let name = stored_file_name(field, extension.as_deref());
        file.move_copy_to(self.root.join(&name))
            .await
            .map_err(Problem::from)?;

        Ok(format!("{}/{}", PUBLIC_UPLOAD_PREFIX, name))
    }

    /// Removes a previously stored file given the path recorded on the
    /// entity. Only the file name component is used, so a damaged record
    /// can't point the delete outside the store root.
    pub async fn delete(&self, stored: &str) -> io::Result<()> {
        let name = stored
            .strip_prefix(PUBLIC_UPLOAD_PREFIX)
            .map(|it| it.trim_start_matches('/'))
            .unwrap_or(stored);

        let name = Path::new(name)
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "empty stored path"))?;

        rocket::tokio::fs::remove_file(self.root.join(name)).await
    }
}

///////////////////////
//       TESTS
///////////////////////

#[cfg(test)]
mod file_store {
    use super::FileStore;

    #[rocket::async_test]
    async fn delete_resolves_inside_the_root() {
        let dir = std::env::temp_dir().join("school-admin-store-test");
        std::fs::create_dir_all(&dir).unwrap();
        let target = dir.join("student_avatar-123.png");
        std::fs::write(&target, b"img").unwrap();

        let store = FileStore::new(&dir);
        store.delete("uploads/student_avatar-123.png").await.unwrap();
        assert!(!target.exists());
    }

    #[rocket::async_test]
    async fn delete_of_missing_file_reports_the_error() {
        let store = FileStore::new(std::env::temp_dir());
        assert!(store.delete("uploads/never-stored.png").await.is_err());
        assert!(store.delete("").await.is_err());
    }
}
