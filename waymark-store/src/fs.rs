//! Capability-based directory creation for database files.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8};

use crate::StoreError;

/// Create the parent directory of `path` when it does not exist yet.
pub(crate) fn ensure_parent_dir(path: &Utf8Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_str().is_empty() || parent == Utf8Path::new("/") {
        return Ok(());
    }

    let (base_dir, relative) = base_dir_and_relative(parent)?;
    base_dir
        .create_dir_all(&relative)
        .map_err(|source| StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })
}

/// Split `parent` into an ambient base directory and a path relative to it.
fn base_dir_and_relative(parent: &Utf8Path) -> Result<(fs_utf8::Dir, Utf8PathBuf), StoreError> {
    let (base, relative) = if parent.is_absolute() {
        ("/", parent.strip_prefix("/").unwrap_or(parent))
    } else {
        (".", parent)
    };

    let dir = fs_utf8::Dir::open_ambient_dir(base, ambient_authority()).map_err(|source| {
        StoreError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        }
    })?;
    Ok((dir, relative.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn creates_nested_parents() {
        let temp = TempDir::new().expect("create temp dir");
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 path");
        let db = root.join("a/b/tables.db");

        ensure_parent_dir(&db).expect("create parents");
        assert!(root.join("a/b").is_dir());
    }

    #[rstest]
    fn bare_file_names_need_no_directory() {
        ensure_parent_dir(Utf8Path::new("tables.db")).expect("nothing to create");
    }
}
