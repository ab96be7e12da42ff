//! A small tar-builder/reader wrapper, with directory-recursive archiving and
//! extraction since whole directory trees (source, scripts, artifacts,
//! injections) move in and out of containers, not single files.

use std::{collections::HashSet, path::Path};

use stacked_errors::{Result, StackableErr};

/// An in-memory tarball under construction.
pub struct Tarball {
    tar: tar::Builder<Vec<u8>>,
    paths: HashSet<String>,
}

impl Default for Tarball {
    fn default() -> Self {
        Self {
            tar: tar::Builder::new(Vec::new()),
            paths: HashSet::new(),
        }
    }
}

impl std::fmt::Debug for Tarball {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Tarball {{ {} }}",
            self.paths.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
        )
    }
}

impl Tarball {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single file with in-memory content at `path` with the given
    /// unix permission bits.
    pub fn append_file_bytes(&mut self, path: impl ToString, mode: u32, content: &[u8]) -> Result<()> {
        let path = path.to_string();
        let header = &mut tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_cksum();
        self.tar
            .append_data(header, &path, content)
            .stack_err(|| format!("Tarball::append_file_bytes({path})"))?;
        self.paths.insert(path);
        Ok(())
    }

    /// Recursively archives every file under `dir`, with entries rooted at
    /// `dir` itself (i.e. `dir/foo` becomes the entry `foo`).
    pub async fn append_dir_contents(&mut self, dir: &Path) -> Result<()> {
        self.append_dir_contents_at(dir, "").await
    }

    /// As [`Tarball::append_dir_contents`], but every entry is placed under
    /// `prefix` (e.g. `prefix = "upload"` turns `dir/foo` into `upload/foo`).
    pub async fn append_dir_contents_at(&mut self, dir: &Path, prefix: &str) -> Result<()> {
        let mut stack = vec![dir.to_path_buf()];
        while let Some(current) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&current)
                .await
                .stack_err(|| format!("Tarball::append_dir_contents_at -> read_dir({current:?})"))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .stack_err(|| format!("Tarball::append_dir_contents_at -> next_entry under {current:?}"))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .stack_err(|| format!("Tarball::append_dir_contents_at -> file_type({path:?})"))?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(dir)
                    .stack_err(|| format!("Tarball::append_dir_contents_at -> strip_prefix({path:?})"))?
                    .to_str()
                    .stack_err(|| "Tarball::append_dir_contents_at -> non-UTF-8 path")?
                    .to_string();
                let entry_path = if prefix.is_empty() {
                    relative
                } else {
                    format!("{prefix}/{relative}")
                };
                let bytes = tokio::fs::read(&path)
                    .await
                    .stack_err(|| format!("Tarball::append_dir_contents_at -> read({path:?})"))?;
                let mode = unix_mode(&path).await;
                self.append_file_bytes(entry_path, mode, &bytes)?;
            }
        }
        Ok(())
    }

    pub fn into_tarball(self) -> Result<Vec<u8>> {
        self.tar.into_inner().stack_err(|| "Tarball::into_tarball")
    }
}

#[cfg(unix)]
async fn unix_mode(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::metadata(path)
        .await
        .map(|m| m.permissions().mode())
        .unwrap_or(0o644)
}

#[cfg(not(unix))]
async fn unix_mode(_path: &Path) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn append_dir_contents_at_nests_entries_under_prefix_and_extracts_them() {
        let src = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(src.path().join("bin")).await.unwrap();
        tokio::fs::write(src.path().join("bin/assemble"), b"#!/bin/sh\n").await.unwrap();

        let mut tar = Tarball::new();
        tar.append_dir_contents_at(src.path(), "scripts").await.unwrap();
        let bytes = tar.into_tarball().unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_tarball(bytes, dest.path()).await.unwrap();

        let extracted = tokio::fs::read(dest.path().join("scripts/bin/assemble")).await.unwrap();
        assert_eq!(extracted, b"#!/bin/sh\n");
    }
}

/// Extracts a tarball's bytes into `dest`, creating any parent directories.
/// Used to unpack `save-artifacts` output and extended-build artifact
/// downloads.
pub async fn extract_tarball(tar_bytes: Vec<u8>, dest: &Path) -> Result<()> {
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut archive = tar::Archive::new(std::io::Cursor::new(tar_bytes));
        archive
            .unpack(&dest)
            .stack_err(|| format!("extract_tarball -> unpack into {dest:?}"))?;
        Ok(())
    })
    .await
    .stack_err(|| "extract_tarball -> spawn_blocking join failed")?
}
