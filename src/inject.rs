//! The truncate-after-use secret injection protocol.

use std::path::PathBuf;

use stacked_errors::{Result, StackableErr};

use crate::{docker_client::DockerClient, request::InjectionSpec, tarball::Tarball};

/// Well-known in-container path for the injection result sentinel.
pub const RESULT_FILE: &str = "/tmp/s2i-injection-result";

/// A single file discovered under an injection's host source, to be
/// truncated after assemble runs (unless its originating spec was marked
/// `keep`).
#[derive(Debug, Clone)]
pub struct TruncateEntry {
    pub container_path: String,
}

/// Rewrites relative/`.` destinations against the image working directory.
pub fn resolve_injection_destination(spec: &InjectionSpec, image_workdir: &str) -> String {
    if spec.container_destination == "." || !spec.container_destination.starts_with('/') {
        let base = if image_workdir.is_empty() { "/" } else { image_workdir };
        format!("{}/{}", base.trim_end_matches('/'), spec.container_destination.trim_start_matches("./"))
    } else {
        spec.container_destination.clone()
    }
}

/// Walks every file recursively under `spec.host_source`, producing its
/// in-container path. Files are excluded from the truncate list (but still
/// uploaded) when `spec.keep` is set. Symlinks are followed; a dangling
/// link is silently skipped.
pub async fn enumerate_files(spec: &InjectionSpec, container_destination: &str) -> Result<Vec<TruncateEntry>> {
    let mut out = Vec::new();
    if spec.keep {
        return Ok(out);
    }

    let metadata = tokio::fs::metadata(&spec.host_source).await;
    let Ok(metadata) = metadata else {
        return Ok(out);
    };

    if metadata.is_file() {
        out.push(TruncateEntry {
            container_path: container_destination.to_string(),
        });
        return Ok(out);
    }

    let mut stack = vec![(spec.host_source.clone(), container_destination.to_string())];
    while let Some((dir, container_dir)) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .stack_err(|| format!("enumerate_files -> next_entry under {dir:?}"))?
        {
            let path = entry.path();
            let container_path = format!("{}/{}", container_dir.trim_end_matches('/'), entry.file_name().to_string_lossy());
            let Ok(file_type) = tokio::fs::metadata(&path).await.map(|m| m.is_dir()) else {
                // dangling symlink, tolerated.
                continue;
            };
            if file_type {
                stack.push((path, container_path));
            } else {
                out.push(TruncateEntry { container_path });
            }
        }
    }
    Ok(out)
}

/// Produces the `truncate -s0` shell script for a batch of entries plus the
/// truncate script's own container path, delimited by `set -e`/`set +e`.
pub fn truncate_script(entries: &[TruncateEntry], script_container_path: &str) -> String {
    let mut script = String::from("set -e\n");
    for entry in entries {
        script.push_str(&format!("truncate -s0 '{}'\n", entry.container_path));
    }
    script.push_str(&format!("set +e\ntruncate -s0 '{script_container_path}'\n"));
    script
}

/// Builds the full assemble-command wrapper that busy-waits for the result
/// file, fails fast on injection failure, otherwise runs `original_command`
/// and always sources the truncate script before propagating the exit code.
pub fn wrap_assemble_command(original_command: &str, truncate_script_path: &str) -> String {
    format!(
        "while [ ! -f {result} ]; do sleep 0.1; done; \
         if [ -s {result} ]; then cat {result} >&2; exit 1; fi; \
         {original_command}; rc=$?; . {truncate_script_path} >/dev/null 2>&1 || true; exit $rc",
        result = RESULT_FILE,
    )
}

/// Performs the injection upload protocol, run as the container's `on_start`
/// callback: uploads every injection source, then the truncate script, then
/// the result sentinel (empty on success).
pub async fn upload(
    docker: &dyn DockerClient,
    container_id: &str,
    injections: &[InjectionSpec],
    image_workdir: &str,
) -> Result<()> {
    let mut all_entries = Vec::new();

    for spec in injections {
        let destination = resolve_injection_destination(spec, image_workdir);
        let mut tar = Tarball::new();
        tar.append_dir_contents(&PathBuf::from(&spec.host_source))
            .await
            .stack_err(|| format!("Injector::upload -> append_dir_contents({:?})", spec.host_source))?;
        let bytes = tar.into_tarball().stack_err(|| "Injector::upload -> into_tarball")?;
        docker
            .upload_to_container(container_id, &destination, bytes)
            .await
            .stack_err(|| format!("Injector::upload -> upload_to_container({destination})"))?;

        all_entries.extend(enumerate_files(spec, &destination).await?);
    }

    let script_path = "/tmp/s2i-truncate.sh";
    let script = truncate_script(&all_entries, script_path);
    let mut tar = Tarball::new();
    tar.append_file_bytes("s2i-truncate.sh", 0o700, script.as_bytes())?;
    let bytes = tar.into_tarball().stack_err(|| "Injector::upload -> truncate tarball")?;
    docker
        .upload_to_container(container_id, "/tmp", bytes)
        .await
        .stack_err(|| "Injector::upload -> upload truncate script")?;

    let mut result_tar = Tarball::new();
    result_tar.append_file_bytes("s2i-injection-result", 0o600, b"")?;
    let bytes = result_tar.into_tarball().stack_err(|| "Injector::upload -> result tarball")?;
    docker
        .upload_to_container(container_id, "/tmp", bytes)
        .await
        .stack_err(|| "Injector::upload -> upload result sentinel")
}
