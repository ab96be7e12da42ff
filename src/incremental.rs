//! [`IncrementalDecider`] and the `save-artifacts` drive.

use crate::{
    container_runner::{self, ContainerRunOpts},
    docker_client::{DockerClient, ImageMetadata},
    hooks::{HookName, HookResolution, ScriptOrigin},
    layout::WorkingLayout,
    request::BuildRequest,
    tarball,
};
use stacked_errors::{Result, StackableErr};

/// Whether this build should run incrementally, and against which previous
/// image id.
#[derive(Debug, Clone)]
pub enum IncrementalDecision {
    Clean,
    Incremental { previous_image_id: String },
}

/// Decides incrementality: the request must ask for it, the previous-tag
/// image must resolve, and `save-artifacts` must have been installed.
#[tracing::instrument(skip_all)]
pub async fn decide(
    docker: &dyn DockerClient,
    request: &BuildRequest,
    save_artifacts: &HookResolution,
) -> Result<IncrementalDecision> {
    if !request.incremental {
        return Ok(IncrementalDecision::Clean);
    }
    if save_artifacts.hook != HookName::SaveArtifacts || !save_artifacts.is_resolved() {
        return Ok(IncrementalDecision::Clean);
    }

    let previous_tag = request.incremental_from_tag();
    if previous_tag.is_empty() {
        return Ok(IncrementalDecision::Clean);
    }

    docker
        .pull_image(previous_tag, request.previous_pull_policy)
        .await
        .ok();

    match docker.inspect_image(previous_tag).await? {
        Some(_) => Ok(IncrementalDecision::Incremental {
            previous_image_id: previous_tag.to_string(),
        }),
        None => Ok(IncrementalDecision::Clean),
    }
}

/// Runs `save-artifacts` against `previous_image_id` and materializes its
/// stdout tarball into `layout.upload_artifacts()`. Failure is non-fatal: the
/// caller gets an empty `upload/artifacts` and proceeds with a clean build.
#[tracing::instrument(skip_all, fields(previous_image_id = %previous_image_id))]
pub async fn save_artifacts(
    docker: &dyn DockerClient,
    previous_image_id: &str,
    previous_image: &ImageMetadata,
    save_artifacts: &HookResolution,
    request: &BuildRequest,
    layout: &WorkingLayout,
) -> Result<bool> {
    let hook_path = match save_artifacts.origin {
        Some(ScriptOrigin::BuilderImage) => save_artifacts
            .location
            .clone()
            .unwrap_or_else(|| "/usr/libexec/s2i/save-artifacts".to_string()),
        _ => format!(
            "{}/scripts/save-artifacts",
            crate::labels::resolve_destination(&previous_image.labels, &previous_image.env, &request.label_namespace)
        ),
    };

    let opts = ContainerRunOpts {
        image: previous_image_id.to_string(),
        hook: HookName::SaveArtifacts,
        hook_path,
        destination: String::new(),
        user: request
            .assemble_user
            .clone()
            .or_else(|| previous_image.user.clone()),
        env: Vec::new(),
        binds: Vec::new(),
        network_mode: request.network_mode.clone(),
        cgroup_limits: request.cgroup_limits.clone(),
        drop_capabilities: request.drop_capabilities.clone(),
        stdin_tar: None,
        command_override: None,
        keep_container_on_success: false,
        capture_raw_stdout: true,
    };

    let image = previous_image_id.to_string();
    let result = match container_runner::run(docker, opts, None, None, None).await {
        Ok(result) if result.exit_code == 0 => result,
        Ok(result) => {
            let err = container_runner::ContainerError::from_result(&image, &result);
            tracing::warn!(error = ?err, "save-artifacts failed, falling back to a clean build");
            return Ok(false);
        }
        Err(e) => {
            tracing::warn!(error = ?e, "save-artifacts failed, falling back to a clean build");
            return Ok(false);
        }
    };

    let artifacts_tar = match result.stdout_raw {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => {
            tracing::warn!("save-artifacts produced no artifacts, proceeding with a clean build");
            return Ok(false);
        }
    };

    tarball::extract_tarball(artifacts_tar, &layout.upload_artifacts())
        .await
        .stack_err(|| "save_artifacts -> extract_tarball")?;

    Ok(true)
}
