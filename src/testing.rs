//! [`FakeDockerClient`], an in-memory [`DockerClient`] for driving
//! [`crate::orchestrator::Orchestrator`] in tests without a daemon. Grounded
//! in the pack's preference for scripted fakes over mocking frameworks: each
//! image reference is given a [`ContainerScript`] ahead of time, and every
//! container created against that image replays it on attach/wait.

use std::{
    collections::HashMap,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};

use async_trait::async_trait;
use stacked_errors::Result;
use tokio::io::AsyncWrite;

use crate::{
    docker_client::{
        AttachedStreams, BuildImageOpts, CommitOpts, ContainerStdin, CreateContainerOpts,
        DockerClient, ImageMetadata, LogChunk, LogStream, StreamKind,
    },
    request::PullPolicy,
};

/// The canned behavior a fake container replays: what it prints, what it
/// exits with, and what files it "contains" for `download_from_container`.
#[derive(Debug, Clone, Default)]
pub struct ContainerScript {
    pub exit_code: i64,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `container_path` -> tarball bytes returned by `download_from_container`.
    pub downloads: HashMap<String, Vec<u8>>,
}

impl ContainerScript {
    pub fn success(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(exit_code: i64, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn with_download(mut self, path: impl Into<String>, tar_bytes: impl Into<Vec<u8>>) -> Self {
        self.downloads.insert(path.into(), tar_bytes.into());
        self
    }
}

#[derive(Debug, Clone)]
struct ContainerRecord {
    image: String,
    opts: CreateContainerOpts,
    started: bool,
}

#[derive(Default)]
struct FakeState {
    images: HashMap<String, ImageMetadata>,
    missing_images: std::collections::HashSet<String>,
    scripts: HashMap<String, ContainerScript>,
    containers: HashMap<String, ContainerRecord>,
    uploads: Vec<(String, String, Vec<u8>)>,
    commits: Vec<(String, CommitOpts)>,
    removed_images: Vec<String>,
    removed_containers: Vec<String>,
    built_images: Vec<(BuildImageOpts, Vec<u8>)>,
    next_id: u64,
}

/// An in-memory stand-in for a Docker daemon. Register images and their
/// [`ContainerScript`]s with [`FakeDockerClient::register_image`] and
/// [`FakeDockerClient::register_script`] before handing it to an
/// [`crate::orchestrator::Orchestrator`]; inspect what happened afterward
/// with the `commits`/`uploads`/`removed_images` accessors.
#[derive(Default)]
pub struct FakeDockerClient {
    state: Mutex<FakeState>,
}

impl FakeDockerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image(&self, reference: &str, metadata: ImageMetadata) {
        self.state.lock().unwrap().images.insert(reference.to_string(), metadata);
    }

    pub fn register_script(&self, reference: &str, script: ContainerScript) {
        self.state.lock().unwrap().scripts.insert(reference.to_string(), script);
    }

    /// Makes `inspect_image` report `reference` as absent, for tests of a
    /// missing previous/runtime image. Unregistered images that are NOT
    /// marked missing resolve to a default `ImageMetadata` instead of
    /// erroring, since most tests build on top of images freshly produced
    /// by `build_image`/`commit_container` whose reference can't be known
    /// ahead of time (it's derived with a random suffix).
    pub fn mark_image_missing(&self, reference: &str) {
        self.state.lock().unwrap().missing_images.insert(reference.to_string());
    }

    pub fn commits(&self) -> Vec<(String, CommitOpts)> {
        self.state.lock().unwrap().commits.clone()
    }

    pub fn uploads(&self) -> Vec<(String, String, Vec<u8>)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn removed_images(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_images.clone()
    }

    pub fn removed_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().removed_containers.clone()
    }

    pub fn built_images(&self) -> Vec<(BuildImageOpts, Vec<u8>)> {
        self.state.lock().unwrap().built_images.clone()
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{prefix}-{}", state.next_id)
    }

    fn script_for_container(&self, id: &str) -> ContainerScript {
        let state = self.state.lock().unwrap();
        let image = state
            .containers
            .get(id)
            .map(|record| record.image.clone())
            .unwrap_or_default();
        state.scripts.get(&image).cloned().unwrap_or_default()
    }
}

/// An `AsyncWrite` that discards everything, standing in for a container's
/// stdin when the fake has no use for what gets written to it.
struct NullWriter;

impl AsyncWrite for NullWriter {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<std::io::Result<usize>> {
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

fn chunks_for(stream: StreamKind, data: &[u8]) -> Vec<Result<LogChunk>> {
    if data.is_empty() {
        return Vec::new();
    }
    data.split_inclusive(|&b| b == b'\n')
        .map(|line| {
            Ok(LogChunk {
                stream,
                data: line.to_vec(),
            })
        })
        .collect()
}

#[async_trait]
impl DockerClient for FakeDockerClient {
    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageMetadata>> {
        let state = self.state.lock().unwrap();
        if state.missing_images.contains(reference) {
            return Ok(None);
        }
        Ok(Some(state.images.get(reference).cloned().unwrap_or_default()))
    }

    async fn pull_image(&self, _reference: &str, _policy: PullPolicy) -> Result<()> {
        Ok(())
    }

    async fn create_container(&self, opts: CreateContainerOpts) -> Result<String> {
        let id = self.next_id("fake-container");
        self.state.lock().unwrap().containers.insert(
            id.clone(),
            ContainerRecord {
                image: opts.image.clone(),
                opts,
                started: false,
            },
        );
        Ok(id)
    }

    async fn attach(&self, id: &str) -> Result<AttachedStreams> {
        let script = self.script_for_container(id);
        let mut chunks = chunks_for(StreamKind::Stdout, &script.stdout);
        chunks.extend(chunks_for(StreamKind::Stderr, &script.stderr));
        let output: LogStream = Box::pin(futures::stream::iter(chunks));
        let stdin: ContainerStdin = Box::pin(NullWriter);
        Ok(AttachedStreams {
            stdin: Some(stdin),
            output,
        })
    }

    async fn start_container(&self, id: &str) -> Result<()> {
        if let Some(record) = self.state.lock().unwrap().containers.get_mut(id) {
            record.started = true;
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64> {
        Ok(self.script_for_container(id).exit_code)
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.containers.remove(id);
        state.removed_containers.push(id.to_string());
        Ok(())
    }

    async fn upload_to_container(&self, id: &str, container_path: &str, tar_bytes: Vec<u8>) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .uploads
            .push((id.to_string(), container_path.to_string(), tar_bytes));
        Ok(())
    }

    async fn download_from_container(&self, id: &str, container_path: &str) -> Result<Vec<u8>> {
        let script = self.script_for_container(id);
        Ok(script.downloads.get(container_path).cloned().unwrap_or_default())
    }

    async fn commit_container(&self, id: &str, opts: CommitOpts) -> Result<String> {
        let image_id = self.next_id("fake-image");
        self.state.lock().unwrap().commits.push((id.to_string(), opts));
        Ok(image_id)
    }

    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.state.lock().unwrap().removed_images.push(reference.to_string());
        Ok(())
    }

    async fn build_image(&self, opts: BuildImageOpts, tar_bytes: Vec<u8>) -> Result<String> {
        let id = opts.tag.clone().unwrap_or_else(|| self.next_id("fake-built"));
        self.state.lock().unwrap().built_images.push((opts, tar_bytes));
        Ok(id)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inspect_image_returns_registered_metadata() {
        let fake = FakeDockerClient::new();
        fake.register_image(
            "builder:latest",
            ImageMetadata {
                user: Some("1001".to_string()),
                ..Default::default()
            },
        );
        let found = fake.inspect_image("builder:latest").await.unwrap().unwrap();
        assert_eq!(found.user.as_deref(), Some("1001"));
        assert!(fake.inspect_image("unregistered:latest").await.unwrap().is_some());
        fake.mark_image_missing("missing:latest");
        assert!(fake.inspect_image("missing:latest").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn container_replays_its_registered_script() {
        let fake = FakeDockerClient::new();
        fake.register_script(
            "builder:latest",
            ContainerScript::success("hello\n").with_download("/tmp/artifacts.tar", vec![1, 2, 3]),
        );
        let id = fake
            .create_container(CreateContainerOpts {
                image: "builder:latest".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        fake.start_container(&id).await.unwrap();
        assert_eq!(fake.wait_container(&id).await.unwrap(), 0);
        let bytes = fake.download_from_container(&id, "/tmp/artifacts.tar").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn commit_and_remove_image_are_recorded() {
        let fake = FakeDockerClient::new();
        let id = fake
            .create_container(CreateContainerOpts {
                image: "builder:latest".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        fake.commit_container(&id, CommitOpts::default()).await.unwrap();
        fake.remove_image("builder:latest").await.unwrap();
        assert_eq!(fake.commits().len(), 1);
        assert_eq!(fake.removed_images(), vec!["builder:latest".to_string()]);
    }
}
