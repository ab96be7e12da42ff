//! The source downloader, deliberately an external collaborator: git clone,
//! local copy, HTTP fetch and its ignore-file processing are out of scope for
//! the core. The core only needs [`SourceDownloader`]'s contract and the
//! [`SourceInfo`] it returns for provenance labels.

use std::path::Path;

use async_trait::async_trait;
use stacked_errors::{Result, StackableErr};

/// Provenance metadata the source downloader reports back, used purely to
/// populate commit-time labels.
#[derive(Debug, Clone, Default)]
pub struct SourceInfo {
    pub r#ref: String,
    pub commit_id: String,
    pub date: String,
    pub author_name: String,
    pub author_email: String,
    pub committer_name: String,
    pub committer_email: String,
    pub message: String,
    pub location: String,
    pub context_dir: String,
}

#[async_trait]
pub trait SourceDownloader: Send + Sync {
    async fn download(&self, source_ref: &str, dest_dir: &Path) -> Result<SourceInfo>;
}

/// Treats `source_ref` as an already-local directory and copies it verbatim,
/// reporting only the location in [`SourceInfo`]. This is the fallback a
/// caller gets when it does not supply its own git/HTTP-capable downloader;
/// it deliberately performs no ignore-file pruning, history inspection, or
/// network fetch, matching the "external collaborator" boundary.
#[derive(Debug, Clone, Default)]
pub struct LocalCopyDownloader;

#[async_trait]
impl SourceDownloader for LocalCopyDownloader {
    async fn download(&self, source_ref: &str, dest_dir: &Path) -> Result<SourceInfo> {
        let src = Path::new(source_ref);
        copy_dir_recursive(src, dest_dir)
            .await
            .stack_err(|| format!("LocalCopyDownloader::download({source_ref:?}) failed"))?;

        Ok(SourceInfo {
            location: source_ref.to_string(),
            ..Default::default()
        })
    }
}

async fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dest)
        .await
        .stack_err(|| format!("copy_dir_recursive -> create_dir_all({dest:?})"))?;

    let mut stack = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&from)
            .await
            .stack_err(|| format!("copy_dir_recursive -> read_dir({from:?})"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .stack_err(|| format!("copy_dir_recursive -> next_entry under {from:?}"))?
        {
            let from_path = entry.path();
            let to_path = to.join(entry.file_name());
            let file_type = entry
                .file_type()
                .await
                .stack_err(|| format!("copy_dir_recursive -> file_type({from_path:?})"))?;
            if file_type.is_dir() {
                tokio::fs::create_dir_all(&to_path)
                    .await
                    .stack_err(|| format!("copy_dir_recursive -> create_dir_all({to_path:?})"))?;
                stack.push((from_path, to_path));
            } else {
                tokio::fs::copy(&from_path, &to_path)
                    .await
                    .stack_err(|| format!("copy_dir_recursive -> copy({from_path:?}, {to_path:?})"))?;
            }
        }
    }
    Ok(())
}
