use crate::domain::ports::{StagedFile, Storage};
use crate::utils::error::{CompileError, Result};
use std::path::{Path, PathBuf};

/// Writes artifacts under an output root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, path: &Path) -> PathBuf {
        self.base_path.join(path)
    }
}

/// `path` with `suffix` appended to its file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn directory_in_the_way(path: &Path) -> std::io::Error {
    std::io::Error::other(format!("{} is a directory", path.display()))
}

/// Topmost ancestor of `dir` (inclusive) that does not exist yet.
async fn first_missing(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut missing = None;
    let mut current = Some(dir);
    while let Some(candidate) = current {
        if candidate.as_os_str().is_empty() || tokio::fs::try_exists(candidate).await? {
            break;
        }
        missing = Some(candidate.to_path_buf());
        current = candidate.parent();
    }
    Ok(missing)
}

/// Renames the temp over the target. The previous target, if any, is kept as a backup.
async fn replace(file: &StagedFile) -> std::io::Result<Option<PathBuf>> {
    if is_dir(&file.target).await {
        return Err(directory_in_the_way(&file.target));
    }
    let backup = if tokio::fs::try_exists(&file.target).await? {
        let backup = sibling(&file.target, ".bak");
        tokio::fs::rename(&file.target, &backup).await?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = tokio::fs::rename(&file.temp, &file.target).await {
        if let Some(backup) = &backup {
            let _ = tokio::fs::rename(backup, &file.target).await;
        }
        return Err(e);
    }
    Ok(backup)
}

/// Undoes [`replace`]: drops the new file and puts the backup back.
async fn restore(file: &StagedFile, backup: Option<&Path>) {
    let _ = tokio::fs::remove_file(&file.target).await;
    if let Some(backup) = backup {
        if let Err(e) = tokio::fs::rename(backup, &file.target).await {
            tracing::error!(
                "❌ Could not restore {} from {}: {}",
                file.target.display(),
                backup.display(),
                e
            );
        }
    }
}

impl Storage for LocalStorage {
    /// Writes to a sibling temp file; the target stays untouched until commit.
    async fn stage(&self, path: &Path, data: &[u8], executable: bool) -> Result<StagedFile> {
        let target = self.full_path(path);
        if is_dir(&target).await {
            return Err(CompileError::write(path, directory_in_the_way(&target)));
        }

        let mut created_dir = None;
        if let Some(parent) = target.parent() {
            created_dir = first_missing(parent)
                .await
                .map_err(|e| CompileError::write(path, e))?;
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CompileError::write(path, e))?;
        }

        let staged = StagedFile {
            path: path.to_path_buf(),
            temp: sibling(&target, ".tmp"),
            target,
            created_dir,
        };
        let written = async {
            tokio::fs::write(&staged.temp, data).await?;
            if executable {
                make_executable(&staged.temp).await?;
            }
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(e) = written {
            self.discard(vec![staged]).await;
            return Err(CompileError::write(path, e));
        }
        Ok(staged)
    }

    async fn commit(&self, staged: Vec<StagedFile>) -> Result<()> {
        let mut backups: Vec<Option<PathBuf>> = Vec::with_capacity(staged.len());
        let mut failure = None;
        for file in &staged {
            match replace(file).await {
                Ok(backup) => backups.push(backup),
                Err(e) => {
                    failure = Some((file.path.clone(), e));
                    break;
                }
            }
        }

        let Some((path, e)) = failure else {
            for backup in backups.into_iter().flatten() {
                let _ = tokio::fs::remove_file(backup).await;
            }
            return Ok(());
        };

        tracing::warn!(
            "Rolling back {} files after {} failed: {}",
            backups.len(),
            path.display(),
            e
        );
        for (file, backup) in staged.iter().zip(&backups).rev() {
            restore(file, backup.as_deref()).await;
        }
        self.discard(staged).await;
        Err(CompileError::write(&path, e))
    }

    async fn discard(&self, staged: Vec<StagedFile>) {
        for file in &staged {
            let _ = tokio::fs::remove_file(&file.temp).await;
        }
        for dir in staged.iter().filter_map(|file| file.created_dir.as_ref()) {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.full_path(path)).await?)
    }
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(storage: &LocalStorage, path: &str, data: &[u8], executable: bool) {
        tokio_test::block_on(async {
            let staged = storage.stage(Path::new(path), data, executable).await?;
            storage.commit(vec![staged]).await
        })
        .unwrap();
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        write(&storage, "env/web.env", b"SERVICE_NAME=web\n", false);

        let written = std::fs::read_to_string(dir.path().join("env/web.env")).unwrap();
        assert_eq!(written, "SERVICE_NAME=web\n");
        assert!(!dir.path().join("env/web.env.tmp").exists());
        assert!(tokio_test::block_on(storage.exists(Path::new("env/web.env"))).unwrap());
        assert!(!tokio_test::block_on(storage.exists(Path::new("env/db.env"))).unwrap());
    }

    #[test]
    fn test_overwrite_replaces_contents() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        write(&storage, "main.tf", b"old", false);
        write(&storage, "main.tf", b"new", false);

        assert_eq!(std::fs::read_to_string(dir.path().join("main.tf")).unwrap(), "new");
        assert!(!dir.path().join("main.tf.bak").exists());
    }

    #[test]
    fn test_staged_file_is_invisible_until_commit() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());

        let staged = tokio_test::block_on(storage.stage(Path::new("env/db.env"), b"A=1\n", false)).unwrap();
        assert!(!dir.path().join("env/db.env").exists());
        assert_eq!(staged.created_dir, Some(dir.path().join("env")));

        tokio_test::block_on(storage.discard(vec![staged]));
        assert!(!dir.path().join("env").exists());
    }

    #[test]
    fn test_stage_refuses_directory_target() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("env/web.env")).unwrap();
        let storage = LocalStorage::new(dir.path());

        let err = tokio_test::block_on(storage.stage(Path::new("env/web.env"), b"x", false)).unwrap_err();
        assert!(err.to_string().contains("is a directory"));
    }

    #[test]
    fn test_failed_commit_restores_every_target() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        write(&storage, "roles/a.conf", b"old", false);

        let (first, second, third) = tokio_test::block_on(async {
            Ok::<_, crate::utils::error::CompileError>((
                storage.stage(Path::new("roles/a.conf"), b"new", false).await?,
                storage.stage(Path::new("fresh/b.conf"), b"b", false).await?,
                storage.stage(Path::new("roles/c.conf"), b"c", false).await?,
            ))
        })
        .unwrap();
        // appears between staging and commit
        std::fs::create_dir_all(dir.path().join("roles/c.conf")).unwrap();

        let result = tokio_test::block_on(storage.commit(vec![first, second, third]));
        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(dir.path().join("roles/a.conf")).unwrap(), "old");
        assert!(!dir.path().join("fresh").exists());
        assert!(!dir.path().join("roles/a.conf.bak").exists());
        assert!(!dir.path().join("roles/a.conf.tmp").exists());
        assert!(!dir.path().join("roles/c.conf.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path());
        write(&storage, "scripts/provision.sh", b"#!/bin/bash\n", true);

        let mode = std::fs::metadata(dir.path().join("scripts/provision.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o111, 0o111);
    }
}
