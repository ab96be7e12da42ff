//! [`Orchestrator::build`], the eight-step build sequence that ties every
//! other module together.

use std::sync::Arc;

use stacked_errors::{Result, StackableErr};

use crate::{
    commit,
    container_runner::{self, ContainerError, ContainerRunOpts},
    docker_client::DockerClient,
    downloader::SourceDownloader,
    hooks::{HookName, HookResolution},
    image_inspector,
    inject,
    labels,
    layered,
    layout::WorkingLayout,
    notifier::BuildNotifier,
    request::BuildRequest,
    result::{BuildResult, FailureReason, StageTimer},
    runtime_stage,
    scripts::ScriptResolver,
};

/// Owns the collaborators a build needs: a container runtime, a source
/// downloader, and a stage notifier. Constructed once and reused across
/// builds; concurrent builds each get their own `WorkingLayout` and
/// containers, so the orchestrator itself holds no per-build mutable state.
pub struct Orchestrator {
    docker: Arc<dyn DockerClient>,
    downloader: Arc<dyn SourceDownloader>,
    notifier: Arc<dyn BuildNotifier>,
}

impl Orchestrator {
    pub fn new(
        docker: Arc<dyn DockerClient>,
        downloader: Arc<dyn SourceDownloader>,
        notifier: Arc<dyn BuildNotifier>,
    ) -> Self {
        Self {
            docker,
            downloader,
            notifier,
        }
    }

    #[tracing::instrument(skip_all, fields(builder_image = %request.builder_image, tag = %request.tag))]
    pub async fn build(&self, request: BuildRequest) -> BuildResult {
        let base_dir = std::env::temp_dir();
        let layout = match WorkingLayout::create(&base_dir).await {
            Ok(layout) => layout,
            Err(e) => {
                let mut result = BuildResult::failure(FailureReason::FSOperationFailed {
                    message: format!("{e:?}"),
                });
                result.messages.push("could not allocate working directory".to_string());
                return result;
            }
        };

        let result = self.build_in_layout(request.clone(), &layout, None).await;

        if !request.preserve_working_dir {
            if let Err(e) = layout.clone().remove().await {
                tracing::warn!(error = ?e, "failed to clean up working directory");
            }
        }

        match result {
            Ok(mut result) => {
                if request.preserve_working_dir {
                    result.working_dir = Some(layout.root().to_path_buf());
                }
                result
            }
            Err((reason, mut result)) => {
                result.failure = Some(reason);
                if request.preserve_working_dir {
                    result.working_dir = Some(layout.root().to_path_buf());
                }
                result
            }
        }
    }

    /// Runs the build against an already-allocated `layout`. `layered_image`
    /// is `Some` when this call is the layered-builder re-entry, substituting
    /// the derived builder image.
    async fn build_in_layout(
        &self,
        request: BuildRequest,
        layout: &WorkingLayout,
        layered_image: Option<String>,
    ) -> std::result::Result<BuildResult, (FailureReason, BuildResult)> {
        let mut stages = Vec::new();
        let mut messages = Vec::new();
        let builder_ref = layered_image.clone().unwrap_or_else(|| request.builder_image.clone());

        // Step 1: pull + inspect the builder image.
        let timer = StageTimer::start("build", "pull-builder-image");
        if let Err(e) = self.docker.pull_image(&builder_ref, request.builder_pull_policy).await {
            return Err(self.fail(
                FailureReason::PullBuilderImageFailed { message: format!("{e:?}") },
                stages,
                messages,
            ));
        }
        self.finish_stage(timer, &mut stages).await;

        let timer = StageTimer::start("build", "inspect-builder-image");
        let builder_image = match image_inspector::inspect_required(self.docker.as_ref(), &builder_ref).await {
            Ok(image) => image,
            Err(e) => {
                return Err(self.fail(
                    FailureReason::PullBuilderImageFailed { message: format!("{e:?}") },
                    stages,
                    messages,
                ))
            }
        };
        self.finish_stage(timer, &mut stages).await;

        if !builder_image.onbuild.is_empty() && !request.allow_onbuild {
            return Err(self.fail(FailureReason::OnBuildForbidden, stages, messages));
        }

        // Step 2: user allow-list check.
        let onbuild_users = image_inspector::onbuild_users(&builder_image.onbuild);
        if let Err(e) = image_inspector::check_allowed_uids(
            &builder_image,
            &onbuild_users,
            request.assemble_user.as_deref(),
            &request.allowed_uids,
        ) {
            return Err(self.fail(e, stages, messages));
        }

        let destination = labels::resolve_destination(&builder_image.labels, &builder_image.env, &request.label_namespace);

        // Step 3: download source.
        let timer = StageTimer::start("build", "fetch-source");
        let source_info = match self.downloader.download(&request.source, &layout.upload_src()).await {
            Ok(info) => info,
            Err(e) => {
                return Err(self.fail(
                    FailureReason::FetchSourceFailed { message: format!("{e:?}") },
                    stages,
                    messages,
                ))
            }
        };
        if let Some(pattern) = &request.exclude_regex {
            if let Err(e) = exclude_matching(&layout.upload_src(), pattern).await {
                return Err(self.fail_from_error(e, stages, messages));
            }
        }
        self.finish_stage(timer, &mut stages).await;

        // Step 4: resolve hooks.
        let timer = StageTimer::start("build", "resolve-scripts");
        let resolver = ScriptResolver::new(
            layout,
            request.caller_scripts_url.as_deref(),
            &builder_image,
            &request.label_namespace,
        );
        let resolutions = match resolver.resolve_all(&HookName::ALL).await {
            Ok(resolutions) => resolutions,
            Err(e) => return Err(self.fail(e, stages, messages)),
        };
        self.finish_stage(timer, &mut stages).await;

        let run_hook = find_hook(&resolutions, HookName::Run);
        let assemble_hook = find_hook(&resolutions, HookName::Assemble);
        let save_artifacts_hook = find_hook(&resolutions, HookName::SaveArtifacts);

        // Step 5: incremental decision + save-artifacts.
        let timer = StageTimer::start("build", "incremental-decision");
        let decision = match crate::incremental::decide(self.docker.as_ref(), &request, save_artifacts_hook).await {
            Ok(decision) => decision,
            Err(e) => return Err(self.fail_from_error(e, stages, messages)),
        };
        let mut previous_image_id = None;
        if let crate::incremental::IncrementalDecision::Incremental { previous_image_id: id } = decision {
            if let Ok(Some(previous_image)) = self.docker.inspect_image(&id).await {
                let ok = crate::incremental::save_artifacts(
                    self.docker.as_ref(),
                    &id,
                    &previous_image,
                    save_artifacts_hook,
                    &request,
                    layout,
                )
                .await
                .unwrap_or(false);
                if ok {
                    previous_image_id = Some(id);
                } else {
                    messages.push("save-artifacts failed, proceeding with a clean build".to_string());
                }
            }
        }
        self.finish_stage(timer, &mut stages).await;

        // Step 6: assemble.
        let timer = StageTimer::start("build", "assemble");
        let source_tar = match build_source_tar(layout).await {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail_from_error(e, stages, messages)),
        };
        let environment = match resolve_effective_environment(&request).await {
            Ok(env) => env,
            Err(e) => return Err(self.fail(e, stages, messages)),
        };

        let assemble_hook_path = in_container_hook_path(assemble_hook, &destination);
        let injections = request.injections.clone();
        let image_workdir = builder_image.workdir.clone().unwrap_or_default();
        let docker_for_inject = Arc::clone(&self.docker);

        let command_override = if injections.is_empty() {
            None
        } else {
            let wrapped = inject::wrap_assemble_command(&assemble_hook_path, "/tmp/s2i-truncate.sh");
            Some(wrapped)
        };

        let run_opts = ContainerRunOpts {
            image: builder_ref.clone(),
            hook: HookName::Assemble,
            hook_path: assemble_hook_path,
            destination: destination.clone(),
            user: request.assemble_user.clone().or_else(|| builder_image.user.clone()),
            env: environment.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            binds: request.binds.clone(),
            network_mode: request.network_mode.clone(),
            cgroup_limits: request.cgroup_limits.clone(),
            drop_capabilities: request.drop_capabilities.clone(),
            stdin_tar: Some(source_tar),
            command_override,
            keep_container_on_success: request.runtime_image.is_some(),
            capture_raw_stdout: false,
        };

        let on_start: Option<container_runner::OnStart> = if injections.is_empty() {
            None
        } else {
            Some(Box::new(move |container_id: &str| {
                let docker = Arc::clone(&docker_for_inject);
                let injections = injections.clone();
                let image_workdir = image_workdir.clone();
                let container_id = container_id.to_string();
                Box::pin(async move { inject::upload(docker.as_ref(), &container_id, &injections, &image_workdir).await })
            }))
        };

        let assemble_result = match container_runner::run(self.docker.as_ref(), run_opts, None, on_start, None).await {
            Ok(result) => result,
            Err(e) => {
                return Err(self.fail(
                    FailureReason::AssembleFailed { message: format!("{e:?}") },
                    stages,
                    messages,
                ))
            }
        };

        if let Some(container_err) = ContainerError::from_result(&builder_ref, &assemble_result) {
            if container_runner::is_missing_requirements(&container_err.stderr) {
                return self
                    .retry_with_layered_builder(request, layout, stages, messages, &builder_ref, &destination)
                    .await;
            }
            return Err(self.fail(
                FailureReason::AssembleFailed { message: container_err.to_string() },
                stages,
                messages,
            ));
        }

        self.finish_stage(timer, &mut stages).await;
        messages.extend(assemble_result.stdout_lines);

        // Step 7: commit (direct or via extended build).
        let timer = StageTimer::start("build", "commit");
        let image_id = if let Some(runtime_image_ref) = request.runtime_image.clone() {
            match self
                .run_extended_build(&request, &assemble_result.container_id, &runtime_image_ref, layout)
                .await
            {
                Ok(id) => id,
                Err(e) => return Err(self.fail(e, stages, messages)),
            }
        } else {
            match commit::commit(
                self.docker.as_ref(),
                &assemble_result.container_id,
                run_hook,
                &builder_image,
                &request,
                &environment,
                &source_info,
                &destination,
            )
            .await
            {
                Ok(id) => id,
                Err(e) => return Err(self.fail_from_error(e, stages, messages)),
            }
        };
        self.finish_stage(timer, &mut stages).await;

        commit::maybe_remove_previous(self.docker.as_ref(), &request, previous_image_id.as_deref()).await;

        if let Some(layered_ref) = layered_image {
            if let Err(e) = self.docker.remove_image(&layered_ref).await {
                tracing::warn!(image = %layered_ref, error = ?e, "failed to remove transient layered image");
            }
        }

        let mut result = BuildResult::success(image_id);
        result.messages = messages;
        result.stages = stages;
        Ok(result)
    }

    async fn run_extended_build(
        &self,
        request: &BuildRequest,
        builder_container_id: &str,
        runtime_image_ref: &str,
        layout: &WorkingLayout,
    ) -> std::result::Result<String, FailureReason> {
        self.docker
            .pull_image(runtime_image_ref, request.runtime_pull_policy)
            .await
            .map_err(|e| FailureReason::PullRuntimeImageFailed { message: format!("{e:?}") })?;
        let runtime_image = image_inspector::inspect_required(self.docker.as_ref(), runtime_image_ref)
            .await
            .map_err(|e| FailureReason::PullRuntimeImageFailed { message: format!("{e:?}") })?;

        let mappings = runtime_stage::resolve_artifact_mappings(request, &runtime_image)?;
        let assemble_runtime_user = runtime_stage::resolve_assemble_runtime_user(request, &runtime_image);

        let runtime_container_id = runtime_stage::run(
            self.docker.as_ref(),
            builder_container_id,
            runtime_image_ref,
            &mappings,
            assemble_runtime_user.as_deref(),
            layout,
        )
        .await
        .map_err(|e| FailureReason::GenericS2IBuildFailed { message: format!("{e:?}") })?;

        let run_hook = HookResolution {
            hook: HookName::Run,
            origin: Some(crate::hooks::ScriptOrigin::SourceTree),
            location: None,
            downloaded: false,
            installed: true,
            error: None,
        };
        let destination = labels::resolve_destination(&runtime_image.labels, &runtime_image.env, &request.label_namespace);
        let environment = resolve_effective_environment(request).await?;
        commit::commit(
            self.docker.as_ref(),
            &runtime_container_id,
            &run_hook,
            &runtime_image,
            request,
            &environment,
            &crate::downloader::SourceInfo::default(),
            &destination,
        )
        .await
        .map_err(|e| FailureReason::CommitContainerFailed { message: format!("{e:?}") })
    }

    async fn retry_with_layered_builder(
        &self,
        mut request: BuildRequest,
        layout: &WorkingLayout,
        stages: Vec<crate::result::StageInfo>,
        messages: Vec<String>,
        original_builder: &str,
        destination: &str,
    ) -> std::result::Result<BuildResult, (FailureReason, BuildResult)> {
        let derived = match layered::build_derived_image(self.docker.as_ref(), original_builder, destination, &layout.root().join("upload")).await {
            Ok(derived) => derived,
            Err(e) => return Err(self.fail_from_error(e, stages, messages)),
        };

        request.builder_image = original_builder.to_string();
        let mut result = match Box::pin(self.build_in_layout(request, layout, Some(derived.clone()))).await {
            Ok(result) => result,
            Err((reason, mut result)) => {
                let _ = self.docker.remove_image(&derived).await;
                result.failure = Some(reason.clone());
                return Err((reason, result));
            }
        };
        result.messages.push(format!("rebuilt against layered image {derived}"));
        Ok(result)
    }

    fn fail(&self, reason: FailureReason, stages: Vec<crate::result::StageInfo>, messages: Vec<String>) -> (FailureReason, BuildResult) {
        let mut result = BuildResult::failure(reason.clone());
        result.stages = stages;
        result.messages = messages;
        (reason, result)
    }

    /// Wraps a generic plumbing error (one with no specific `FailureReason`
    /// already attached) as [`FailureReason::GenericS2IBuildFailed`]. Call
    /// sites that already hold a typed `FailureReason` should use
    /// [`Orchestrator::fail`] directly instead.
    fn fail_from_error(
        &self,
        error: stacked_errors::Error,
        stages: Vec<crate::result::StageInfo>,
        messages: Vec<String>,
    ) -> (FailureReason, BuildResult) {
        self.fail(
            FailureReason::GenericS2IBuildFailed { message: format!("{error:?}") },
            stages,
            messages,
        )
    }

    async fn finish_stage(&self, timer: StageTimer, stages: &mut Vec<crate::result::StageInfo>) {
        let stage = timer.finish();
        self.notifier.stage_finished(&stage).await;
        stages.push(stage);
    }
}

fn find_hook(resolutions: &[HookResolution], hook: HookName) -> &HookResolution {
    resolutions
        .iter()
        .find(|r| r.hook == hook)
        .expect("HookResolver::resolve_all always returns one entry per requested hook")
}

fn in_container_hook_path(resolution: &HookResolution, destination: &str) -> String {
    match resolution.origin {
        Some(crate::hooks::ScriptOrigin::BuilderImage) => resolution
            .location
            .clone()
            .unwrap_or_else(|| format!("{destination}/scripts/{}", resolution.hook.as_str())),
        _ => format!("{destination}/scripts/{}", resolution.hook.as_str()),
    }
}

/// Merges the request's explicit `environment` pairs with any parsed from
/// `environment_file`: each line of the file becomes both a commit-time and
/// a build-time env entry, with explicit entries applied after (and so
/// taking precedence over) the file's.
async fn resolve_effective_environment(request: &BuildRequest) -> std::result::Result<Vec<(String, String)>, FailureReason> {
    let mut environment = Vec::new();
    if let Some(path) = &request.environment_file {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| FailureReason::FSOperationFailed {
            message: format!("reading environment file {path:?} failed: {e}"),
        })?;
        let parsed = crate::parsing::parse_env_file(&contents).map_err(|e| FailureReason::FSOperationFailed {
            message: format!("parsing environment file {path:?} failed: {e:?}"),
        })?;
        environment.extend(parsed);
    }
    environment.extend(request.environment.clone());
    Ok(environment)
}

async fn build_source_tar(layout: &WorkingLayout) -> Result<Vec<u8>> {
    let mut tar = crate::tarball::Tarball::new();
    tar.append_dir_contents(&layout.upload_src())
        .await
        .stack_err(|| "build_source_tar -> append source")?;
    tar.append_dir_contents_at(&layout.upload_scripts(), "scripts")
        .await
        .stack_err(|| "build_source_tar -> append scripts")?;
    if tokio::fs::try_exists(layout.upload_artifacts()).await.unwrap_or(false) {
        tar.append_dir_contents_at(&layout.upload_artifacts(), "artifacts")
            .await
            .stack_err(|| "build_source_tar -> append artifacts")?;
    }
    tar.into_tarball().stack_err(|| "build_source_tar -> into_tarball")
}

/// Removes files under `dir` whose relative path matches `pattern`, per the
/// request's `exclude_regex` (a core-level filter distinct from the
/// downloader's own ignore-file processing, which is out of scope for the
/// core).
async fn exclude_matching(dir: &std::path::Path, pattern: &str) -> Result<()> {
    let regex = regex::Regex::new(pattern).stack_err(|| format!("exclude_matching -> invalid regex {pattern:?}"))?;
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current)
            .await
            .stack_err(|| format!("exclude_matching -> read_dir({current:?})"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .stack_err(|| format!("exclude_matching -> next_entry under {current:?}"))?
        {
            let path = entry.path();
            let relative = path.strip_prefix(dir).unwrap_or(&path).to_string_lossy().into_owned();
            if regex.is_match(&relative) {
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    tokio::fs::remove_dir_all(&path).await.ok();
                } else {
                    tokio::fs::remove_file(&path).await.ok();
                }
                continue;
            }
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                stack.push(path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        docker_client::ImageMetadata,
        notifier::NoopNotifier,
        request::ArtifactMapping,
        tarball::Tarball,
        testing::{ContainerScript, FakeDockerClient},
    };

    async fn write_hook(source_root: &std::path::Path, name: &str) {
        let dir = source_root.join(".s2i/bin");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join(name), b"#!/bin/sh\necho hook\n").await.unwrap();
    }

    fn new_orchestrator(docker: Arc<FakeDockerClient>) -> Orchestrator {
        Orchestrator::new(docker, Arc::new(crate::downloader::LocalCopyDownloader), Arc::new(NoopNotifier))
    }

    #[tokio::test]
    async fn clean_build_commits_and_removes_nothing() {
        let source = tempfile::tempdir().unwrap();
        write_hook(source.path(), "assemble").await;
        write_hook(source.path(), "run").await;

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());
        docker.register_script("builder:test", ContainerScript::success(b"assembled\n".to_vec()));

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();

        let result = orchestrator.build(request).await;

        assert!(result.success, "{:?}", result.failure);
        assert!(result.messages.iter().any(|m| m == "assembled"));
        assert_eq!(docker.commits().len(), 1);
        assert_eq!(docker.commits()[0].1.repository, "output:test");
        assert!(docker.removed_images().is_empty());
    }

    #[tokio::test]
    async fn incremental_build_runs_save_artifacts_and_removes_previous() {
        let source = tempfile::tempdir().unwrap();
        write_hook(source.path(), "assemble").await;
        write_hook(source.path(), "run").await;
        write_hook(source.path(), "save-artifacts").await;

        let mut artifacts_tar = Tarball::new();
        artifacts_tar
            .append_file_bytes("previous-artifact.txt", 0o644, b"cached\n")
            .unwrap();
        let artifacts_tar_bytes = artifacts_tar.into_tarball().unwrap();

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());
        docker.register_script("builder:test", ContainerScript::success(b"assembled\n".to_vec()));
        docker.register_image("output:previous", ImageMetadata::default());
        docker.register_script("output:previous", ContainerScript::success(artifacts_tar_bytes));

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();
        request.incremental = true;
        request.incremental_from_tag = "output:previous".to_string();
        request.remove_previous_image = true;

        let result = orchestrator.build(request).await;

        assert!(result.success, "{:?}", result.failure);
        assert_eq!(docker.removed_images(), vec!["output:previous".to_string()]);
    }

    #[tokio::test]
    async fn caller_url_and_source_tree_mixed_resolution() {
        let source = tempfile::tempdir().unwrap();
        write_hook(source.path(), "run").await;

        let caller = tempfile::tempdir().unwrap();
        tokio::fs::write(caller.path().join("assemble"), b"#!/bin/sh\necho caller-assemble\n")
            .await
            .unwrap();

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());
        docker.register_script("builder:test", ContainerScript::success(b"assembled\n".to_vec()));

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();
        request.caller_scripts_url = Some(format!("file://{}", caller.path().display()));

        let result = orchestrator.build(request).await;

        assert!(result.success, "{:?}", result.failure);
        assert_eq!(docker.commits().len(), 1);
    }

    #[tokio::test]
    async fn caller_url_exhausted_fails_with_scripts_fetch_failed() {
        let source = tempfile::tempdir().unwrap();
        let caller = tempfile::tempdir().unwrap();

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();
        request.caller_scripts_url = Some(format!("file://{}", caller.path().display()));

        let result = orchestrator.build(request).await;

        assert!(!result.success);
        assert!(matches!(result.failure, Some(FailureReason::ScriptsFetchFailed { .. })));
    }

    #[tokio::test]
    async fn missing_requirements_triggers_layered_builder_retry() {
        let source = tempfile::tempdir().unwrap();
        write_hook(source.path(), "assemble").await;
        write_hook(source.path(), "run").await;

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());
        docker.register_script("builder:test", ContainerScript::failure(127, "tar: not found\n"));

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();

        let result = orchestrator.build(request).await;

        assert!(result.success, "{:?}", result.failure);
        assert_eq!(docker.built_images().len(), 1);
        assert_eq!(docker.removed_images().len(), 1);
        assert!(docker.removed_images()[0].starts_with("builder:test-"));
    }

    #[tokio::test]
    async fn extended_build_copies_artifacts_and_commits_runtime() {
        let source = tempfile::tempdir().unwrap();
        write_hook(source.path(), "assemble").await;
        write_hook(source.path(), "run").await;

        let mut artifact_tar = Tarball::new();
        artifact_tar.append_file_bytes("built.bin", 0o644, b"binary-blob").unwrap();
        let artifact_tar_bytes = artifact_tar.into_tarball().unwrap();

        let docker = Arc::new(FakeDockerClient::new());
        docker.register_image("builder:test", ImageMetadata::default());
        docker.register_script(
            "builder:test",
            ContainerScript::success(b"assembled\n".to_vec()).with_download("/opt/app/built.bin", artifact_tar_bytes),
        );
        docker.register_image("runtime:test", ImageMetadata::default());

        let orchestrator = new_orchestrator(Arc::clone(&docker));
        let mut request = BuildRequest::new(source.path().to_str().unwrap(), "builder:test");
        request.tag = "output:test".to_string();
        request.runtime_image = Some("runtime:test".to_string());
        request.artifact_mappings = vec![ArtifactMapping {
            source: "/opt/app/built.bin".to_string(),
            destination: "bin".to_string(),
        }];

        let result = orchestrator.build(request).await;

        assert!(result.success, "{:?}", result.failure);
        assert_eq!(docker.commits().len(), 1);
        assert_eq!(docker.commits()[0].1.repository, "output:test");
        assert_eq!(docker.uploads().len(), 2);
    }
}
