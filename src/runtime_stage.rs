//! [`RuntimeStage`], the extended (two-stage) build: the builder image
//! produces an intermediate, a separate runtime image receives the mapped
//! artifacts and runs `assemble-runtime`.

use std::path::Path;

use stacked_errors::{Result, StackableErr};

use crate::{
    docker_client::{CreateContainerOpts, DockerClient, ImageMetadata},
    labels,
    layout::WorkingLayout,
    request::{ArtifactMapping, BuildRequest},
    result::FailureReason,
};

/// Resolves artifact mappings: caller-supplied ones win; otherwise parsed
/// from the runtime image's `assemble-input-files` label as `;`-delimited
/// `source:destination` pairs.
pub fn resolve_artifact_mappings(
    request: &BuildRequest,
    runtime_image: &ImageMetadata,
) -> std::result::Result<Vec<ArtifactMapping>, FailureReason> {
    if !request.artifact_mappings.is_empty() {
        return Ok(request.artifact_mappings.clone());
    }

    let Some(label) = labels::read_label_with_legacy(
        &runtime_image.labels,
        &labels::assemble_input_files_label(&request.label_namespace),
        "io.s2i.assemble-input-files",
    ) else {
        return Ok(Vec::new());
    };

    let mut mappings = Vec::new();
    for pair in label.split(';').filter(|s| !s.is_empty()) {
        let (source, destination) = pair.split_once(':').ok_or_else(|| FailureReason::InvalidArtifactsMapping {
            message: format!("malformed mapping entry {pair:?}"),
        })?;
        if !source.starts_with('/') {
            return Err(FailureReason::InvalidArtifactsMapping {
                message: format!("source {source:?} must be absolute"),
            });
        }
        if destination.starts_with('/') || destination.split('/').any(|part| part == "..") {
            return Err(FailureReason::InvalidArtifactsMapping {
                message: format!("destination {destination:?} must be relative and not escape via '..'"),
            });
        }
        mappings.push(ArtifactMapping {
            source: source.to_string(),
            destination: destination.to_string(),
        });
    }
    Ok(mappings)
}

/// Resolves the assemble-runtime user, caller override first, then the
/// runtime image's `assemble-runtime-user` label.
pub fn resolve_assemble_runtime_user(request: &BuildRequest, runtime_image: &ImageMetadata) -> Option<String> {
    request.assemble_runtime_user.clone().or_else(|| {
        labels::read_label_with_legacy(
            &runtime_image.labels,
            &labels::assemble_runtime_user_label(&request.label_namespace),
            "io.s2i.assemble-runtime-user",
        )
        .map(str::to_string)
    })
}

const SENTINEL_PATH: &str = "/tmp/s2i-runtime-sentinel";

/// Drives the full extended-build sequence: start the runtime container
/// waiting on a sentinel, copy each mapped artifact from the builder
/// intermediate into the runtime container, release the sentinel, wait,
/// commit, and remove the builder intermediate.
#[tracing::instrument(skip_all, fields(builder_container = %builder_container_id))]
pub async fn run(
    docker: &dyn DockerClient,
    builder_container_id: &str,
    runtime_image_ref: &str,
    mappings: &[ArtifactMapping],
    assemble_runtime_user: Option<&str>,
    layout: &WorkingLayout,
) -> Result<String> {
    let wait_cmd = format!(
        "while [ ! -f {SENTINEL_PATH} ]; do sleep 0.1; done; assemble-runtime"
    );
    let create_opts = CreateContainerOpts {
        name: format!("s2i-runtime-{}", uuid::Uuid::new_v4()),
        image: runtime_image_ref.to_string(),
        cmd: vec!["sh".to_string(), "-c".to_string(), wait_cmd],
        user: assemble_runtime_user.map(str::to_string),
        attach_stdin: false,
        ..Default::default()
    };

    let runtime_container_id = docker
        .create_container(create_opts)
        .await
        .stack_err(|| "RuntimeStage::run -> create_container")?;

    let result = run_with_container(
        docker,
        builder_container_id,
        &runtime_container_id,
        mappings,
        layout,
    )
    .await;

    if let Err(e) = docker.remove_container(builder_container_id).await {
        tracing::warn!(container = %builder_container_id, error = ?e, "failed to remove builder intermediate");
    }

    result
}

async fn run_with_container(
    docker: &dyn DockerClient,
    builder_container_id: &str,
    runtime_container_id: &str,
    mappings: &[ArtifactMapping],
    layout: &WorkingLayout,
) -> Result<String> {
    docker
        .attach(runtime_container_id)
        .await
        .stack_err(|| "RuntimeStage::run -> attach runtime container")?;
    docker
        .start_container(runtime_container_id)
        .await
        .stack_err(|| "RuntimeStage::run -> start runtime container")?;

    for mapping in mappings {
        copy_artifact(docker, builder_container_id, runtime_container_id, mapping, layout)
            .await
            .stack_err(|| {
                FailureReason::GenericS2IBuildFailed {
                    message: format!("copying artifact {} failed", mapping.source),
                }
                .to_string()
            })?;
    }

    upload_sentinel(docker, runtime_container_id).await?;

    let exit_code = docker
        .wait_container(runtime_container_id)
        .await
        .stack_err(|| "RuntimeStage::run -> wait runtime container")?;
    if exit_code != 0 {
        return Err(stacked_errors::Error::from(FailureReason::GenericS2IBuildFailed {
            message: format!("assemble-runtime exited with code {exit_code}"),
        }));
    }

    Ok(runtime_container_id.to_string())
}

async fn copy_artifact(
    docker: &dyn DockerClient,
    builder_container_id: &str,
    runtime_container_id: &str,
    mapping: &ArtifactMapping,
    layout: &WorkingLayout,
) -> Result<()> {
    let staging_dir = layout.runtime_artifacts().join(mapping.destination.replace('/', "_"));
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .stack_err(|| format!("copy_artifact -> create_dir_all({staging_dir:?})"))?;

    let tar_bytes = docker
        .download_from_container(builder_container_id, &mapping.source)
        .await
        .stack_err(|| format!("copy_artifact -> download_from_container({})", mapping.source))?;

    crate::tarball::extract_tarball(tar_bytes, &staging_dir)
        .await
        .stack_err(|| format!("copy_artifact -> extract_tarball({staging_dir:?})"))?;

    upload_staging_dir(docker, runtime_container_id, &staging_dir, &mapping.destination).await
}

async fn upload_staging_dir(
    docker: &dyn DockerClient,
    runtime_container_id: &str,
    staging_dir: &Path,
    destination: &str,
) -> Result<()> {
    let mut tar = crate::tarball::Tarball::new();
    tar.append_dir_contents(staging_dir)
        .await
        .stack_err(|| format!("upload_staging_dir -> append_dir_contents({staging_dir:?})"))?;
    let bytes = tar.into_tarball().stack_err(|| "upload_staging_dir -> into_tarball")?;
    docker
        .upload_to_container(runtime_container_id, destination, bytes)
        .await
        .stack_err(|| format!("upload_staging_dir -> upload_to_container({destination})"))
}

async fn upload_sentinel(docker: &dyn DockerClient, runtime_container_id: &str) -> Result<()> {
    let mut tar = crate::tarball::Tarball::new();
    tar.append_file_bytes("s2i-runtime-sentinel", 0o644, b"")?;
    let bytes = tar.into_tarball().stack_err(|| "upload_sentinel -> into_tarball")?;
    docker
        .upload_to_container(runtime_container_id, "/tmp", bytes)
        .await
        .stack_err(|| "upload_sentinel -> upload_to_container")
}
