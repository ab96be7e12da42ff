//! [`ScriptResolver`], the four-origin hook-script resolution algorithm: a
//! layered "try this, then that" fetch-preference chain over caller URL,
//! source tree, and builder image.

use std::path::Path;

use stacked_errors::{Result, StackableErr};

use crate::{
    docker_client::ImageMetadata,
    fetch::{fetch_url, FetchOutcome},
    hooks::{HookName, HookResolution, ScriptOrigin},
    labels,
    layout::WorkingLayout,
    result::FailureReason,
};

/// Resolves and installs every hook script named in `hooks` into
/// `layout.upload_scripts()`, following caller-URL > source-tree >
/// builder-image precedence.
pub struct ScriptResolver<'a> {
    http: reqwest::Client,
    layout: &'a WorkingLayout,
    caller_scripts_url: Option<&'a str>,
    builder_image: &'a ImageMetadata,
    namespace: &'a str,
}

impl<'a> ScriptResolver<'a> {
    pub fn new(
        layout: &'a WorkingLayout,
        caller_scripts_url: Option<&'a str>,
        builder_image: &'a ImageMetadata,
        namespace: &'a str,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            layout,
            caller_scripts_url,
            builder_image,
            namespace,
        }
    }

    /// Resolves every hook in `hooks`, in order. Returns one [`HookResolution`]
    /// per hook. A required hook left unresolved is reported via the return
    /// value; callers turn that into [`FailureReason::InstallScriptsFailed`].
    #[tracing::instrument(skip_all)]
    pub async fn resolve_all(&self, hooks: &[HookName]) -> std::result::Result<Vec<HookResolution>, FailureReason> {
        let mut resolutions = Vec::with_capacity(hooks.len());
        let mut any_caller_url_hit = false;

        for &hook in hooks {
            let resolution = self.resolve_one(hook).await.map_err(|e| FailureReason::InstallScriptsFailed {
                message: format!("resolving hook {hook} failed: {e:?}"),
            })?;
            if resolution.origin == Some(ScriptOrigin::CallerUrl) {
                any_caller_url_hit = true;
            }
            resolutions.push(resolution);
        }

        if self.caller_scripts_url.is_some() && !any_caller_url_hit {
            return Err(FailureReason::ScriptsFetchFailed {
                message: format!(
                    "caller scripts url {:?} did not yield any hook",
                    self.caller_scripts_url.unwrap()
                ),
            });
        }

        for resolution in &resolutions {
            if resolution.hook.is_required() && !resolution.is_resolved() {
                return Err(FailureReason::InstallScriptsFailed {
                    message: format!("required hook {} could not be resolved", resolution.hook),
                });
            }
        }

        Ok(resolutions)
    }

    async fn resolve_one(&self, hook: HookName) -> Result<HookResolution> {
        let mut resolution = HookResolution::unresolved(hook);

        // Step 1: caller scripts URL.
        if let Some(base) = self.caller_scripts_url {
            let url = format!("{}/{}", base.trim_end_matches('/'), hook.as_str());
            let dest = self.layout.downloads_caller_scripts().join(hook.as_str());
            match fetch_url(&self.http, &url, &dest).await? {
                FetchOutcome::Fetched => {
                    resolution.origin = Some(ScriptOrigin::CallerUrl);
                    resolution.location = Some(url);
                    resolution.downloaded = true;
                    self.install(&dest, hook).await?;
                    resolution.installed = true;
                    return Ok(resolution);
                }
                FetchOutcome::InImage => {
                    resolution.origin = Some(ScriptOrigin::CallerUrl);
                    resolution.location = Some(url);
                    return Ok(resolution);
                }
                FetchOutcome::Absent => {}
            }
        }

        // Step 2: source tree, `.s2i/bin/<hook>` then legacy `.sti/bin/<hook>`.
        for bin_dir in [".s2i/bin", ".sti/bin"] {
            let candidate = self.layout.upload_src().join(bin_dir).join(hook.as_str());
            if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
                resolution.origin = Some(ScriptOrigin::SourceTree);
                resolution.location = candidate.to_str().map(str::to_string);
                self.install(&candidate, hook).await?;
                resolution.installed = true;
                return Ok(resolution);
            }
        }

        // Step 3/4: builder-image scripts URL, in-image sentinel or download.
        if let Some(base) = labels::resolve_scripts_url(
            &self.builder_image.labels,
            &self.builder_image.env,
            self.namespace,
        ) {
            let url = format!("{}/{}", base.trim_end_matches('/'), hook.as_str());
            if let Some(in_image_path) = base.strip_prefix("image://") {
                resolution.origin = Some(ScriptOrigin::BuilderImage);
                resolution.location = Some(format!("{in_image_path}/{}", hook.as_str()));
                return Ok(resolution);
            }

            let dest = self.layout.downloads_default_scripts().join(hook.as_str());
            if let FetchOutcome::Fetched = fetch_url(&self.http, &url, &dest).await? {
                resolution.origin = Some(ScriptOrigin::BuilderImage);
                resolution.location = Some(url);
                resolution.downloaded = true;
                self.install(&dest, hook).await?;
                resolution.installed = true;
                return Ok(resolution);
            }
        }

        Ok(resolution)
    }

    /// Moves `src` into `upload/scripts/<hook>` and chmods it `0700`.
    async fn install(&self, src: &Path, hook: HookName) -> Result<()> {
        let dest = self.layout.upload_scripts().join(hook.as_str());
        tokio::fs::copy(src, &dest)
            .await
            .stack_err(|| format!("ScriptResolver::install -> copy({src:?}, {dest:?})"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o700))
                .await
                .stack_err(|| format!("ScriptResolver::install -> chmod({dest:?})"))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn source_tree_hook_beats_builder_image_sentinel() {
        let base = tempfile::tempdir().unwrap();
        let layout = WorkingLayout::create(base.path()).await.unwrap();
        tokio::fs::create_dir_all(layout.upload_src().join(".s2i/bin")).await.unwrap();
        tokio::fs::write(layout.upload_src().join(".s2i/bin/run"), b"#!/bin/sh\n").await.unwrap();

        let mut builder_image = ImageMetadata::default();
        builder_image
            .labels
            .insert(labels::scripts_url_label(labels::DEFAULT_NAMESPACE), "image:///usr/libexec/s2i".to_string());

        let resolver = ScriptResolver::new(&layout, None, &builder_image, labels::DEFAULT_NAMESPACE);
        let resolutions = resolver.resolve_all(&[HookName::Run, HookName::Assemble]).await.unwrap();

        let run = resolutions.iter().find(|r| r.hook == HookName::Run).unwrap();
        assert_eq!(run.origin, Some(ScriptOrigin::SourceTree));

        let assemble = resolutions.iter().find(|r| r.hook == HookName::Assemble).unwrap();
        assert_eq!(assemble.origin, Some(ScriptOrigin::BuilderImage));
        assert_eq!(assemble.location.as_deref(), Some("/usr/libexec/s2i/assemble"));
    }

    #[tokio::test]
    async fn unresolved_required_hook_fails_with_install_scripts_failed() {
        let base = tempfile::tempdir().unwrap();
        let layout = WorkingLayout::create(base.path()).await.unwrap();
        let builder_image = ImageMetadata::default();

        let resolver = ScriptResolver::new(&layout, None, &builder_image, labels::DEFAULT_NAMESPACE);
        let err = resolver.resolve_all(&[HookName::Run]).await.unwrap_err();

        assert!(matches!(err, FailureReason::InstallScriptsFailed { .. }));
    }
}
