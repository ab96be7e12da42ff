//! Origin-scheme dispatch for [`crate::scripts::ScriptResolver`]: fetches via
//! an origin-scheme dispatcher supporting `http`, `https`, `file`, and the
//! sentinel `image`.

use std::path::Path;

use stacked_errors::{Result, StackableErr};

/// Outcome of attempting to fetch one URL. `Absent` covers both a non-2xx
/// HTTP status and a network error — those aren't distinguished; the
/// resolver just moves on to the next origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Bytes were written to the destination path.
    Fetched,
    /// `image://` sentinel: no bytes move, the path is used in-container.
    InImage,
    Absent,
}

/// Fetches `url` into `dest`, dispatching on scheme. `http`/`https` perform a
/// GET; `file` copies from the local filesystem; `image` is a no-op sentinel
/// meaning "resolve to an absolute in-image path instead of downloading".
pub async fn fetch_url(client: &reqwest::Client, url: &str, dest: &Path) -> Result<FetchOutcome> {
    if let Some(path) = url.strip_prefix("image://") {
        let _ = path;
        return Ok(FetchOutcome::InImage);
    }

    if let Some(path) = url.strip_prefix("file://") {
        return match tokio::fs::read(path).await {
            Ok(bytes) => {
                write_dest(dest, &bytes).await?;
                Ok(FetchOutcome::Fetched)
            }
            Err(_) => Ok(FetchOutcome::Absent),
        };
    }

    if url.starts_with("http://") || url.starts_with("https://") {
        let response = match client.get(url).send().await {
            Ok(response) => response,
            Err(_) => return Ok(FetchOutcome::Absent),
        };
        // Only 200/201 count as success; anything else leaves the
        // destination file absent.
        if response.status().as_u16() != 200 && response.status().as_u16() != 201 {
            return Ok(FetchOutcome::Absent);
        }
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(_) => return Ok(FetchOutcome::Absent),
        };
        write_dest(dest, &bytes).await?;
        return Ok(FetchOutcome::Fetched);
    }

    Ok(FetchOutcome::Absent)
}

async fn write_dest(dest: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .stack_err(|| format!("fetch_url -> create_dir_all({parent:?})"))?;
    }
    tokio::fs::write(dest, bytes)
        .await
        .stack_err(|| format!("fetch_url -> write({dest:?})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_scheme_copies_existing_file_and_reports_absent_otherwise() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("assemble");
        tokio::fs::write(&src, b"#!/bin/sh\n").await.unwrap();
        let dest = dir.path().join("installed");

        let client = reqwest::Client::new();
        let outcome = fetch_url(&client, &format!("file://{}", src.display()), &dest).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fetched);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"#!/bin/sh\n");

        let missing = dir.path().join("does-not-exist");
        let outcome = fetch_url(&client, &format!("file://{}", missing.display()), &dest).await.unwrap();
        assert_eq!(outcome, FetchOutcome::Absent);
    }

    #[tokio::test]
    async fn image_scheme_is_a_no_op_sentinel() {
        let client = reqwest::Client::new();
        let dest = std::path::Path::new("/tmp/unused-by-image-scheme");
        let outcome = fetch_url(&client, "image:///usr/libexec/s2i/assemble", dest).await.unwrap();
        assert_eq!(outcome, FetchOutcome::InImage);
    }
}
