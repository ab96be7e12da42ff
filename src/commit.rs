//! [`commit`], the final stage of a build: turns a finished assemble (or
//! assemble-runtime) container into a tagged image with the correct
//! `Cmd`/`Entrypoint`/`Env`/`User`/`Labels`.

use std::collections::HashMap;

use stacked_errors::{Result, StackableErr};

use crate::{
    docker_client::{CommitOpts, DockerClient, ImageMetadata},
    downloader::SourceInfo,
    hooks::{HookResolution, ScriptOrigin},
    labels,
    request::BuildRequest,
    result::FailureReason,
};

/// Generated provenance labels from source info.
fn generated_labels(request: &BuildRequest, source: &SourceInfo) -> HashMap<String, String> {
    let ns = &request.label_namespace;
    let mut out = HashMap::new();
    out.insert(labels::build_image_label(ns), request.builder_image.clone());
    out.insert(labels::build_source_location_label(ns), source.location.clone());
    out.insert(labels::build_commit_ref_label(ns), source.r#ref.clone());
    out.insert(labels::build_source_context_dir_label(ns), source.context_dir.clone());
    out.insert(format!("{ns}.build.commit.id"), source.commit_id.clone());
    out.insert(format!("{ns}.build.commit.author"), source.author_name.clone());
    let message: String = source.message.chars().take(80).collect();
    out.insert(format!("{ns}.build.commit.message"), message);
    out
}

/// Merges labels with `caller-labels > generated-labels > existing-labels`
/// precedence.
fn merge_labels(
    existing: &HashMap<String, String>,
    generated: HashMap<String, String>,
    caller: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut out = existing.clone();
    out.extend(generated);
    out.extend(caller.clone());
    out
}

/// Commits `container_id` under `request.tag`, producing the final image
/// id. `run_hook`'s resolution determines the committed `Cmd`.
#[tracing::instrument(skip_all, fields(container_id = %container_id, tag = %request.tag))]
pub async fn commit(
    docker: &dyn DockerClient,
    container_id: &str,
    run_hook: &HookResolution,
    builder_image: &ImageMetadata,
    request: &BuildRequest,
    environment: &[(String, String)],
    source: &SourceInfo,
    destination: &str,
) -> Result<String> {
    let cmd_path = match run_hook.origin {
        Some(ScriptOrigin::BuilderImage) => run_hook
            .location
            .clone()
            .unwrap_or_else(|| format!("{destination}/scripts/run")),
        _ => format!("{destination}/scripts/run"),
    };

    let env: Vec<String> = environment
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .chain(std::iter::once(format!(
            "{}={}",
            "S2I_SOURCE_LOCATION", source.location
        )))
        .collect();

    let generated = generated_labels(request, source);
    let labels = merge_labels(&builder_image.labels, generated, &request.label_overrides);

    let opts = CommitOpts {
        cmd: vec![cmd_path],
        entrypoint: builder_image.entrypoint.clone().unwrap_or_default(),
        env,
        user: builder_image.user.clone(),
        labels,
        repository: request.tag.clone(),
    };

    match docker.commit_container(container_id, opts).await {
        Ok(image_id) => Ok(image_id),
        Err(e) => Err(e)
            .stack_err(|| format!("commit -> commit_container({container_id})"))
            .stack_err(|| {
                FailureReason::CommitContainerFailed {
                    message: format!("committing container {container_id} failed"),
                }
                .to_string()
            }),
    }
}

/// Removes the previous image by id if the request asked for it and the
/// incremental build actually produced one. Log-only on failure.
pub async fn maybe_remove_previous(docker: &dyn DockerClient, request: &BuildRequest, previous_image_id: Option<&str>) {
    if !request.remove_previous_image {
        return;
    }
    let Some(id) = previous_image_id else {
        return;
    };
    if let Err(e) = docker.remove_image(id).await {
        tracing::warn!(previous_image = %id, error = ?e, "failed to remove previous image");
    }
}
