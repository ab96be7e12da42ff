//! The container-runtime seam: any Docker-protocol-compatible or
//! Buildah-compatible implementation suffices. A thin [`DockerClient`] trait
//! sits above bollard so the orchestrator can be driven by
//! [`crate::testing::FakeDockerClient`] in tests without a daemon.

use std::{collections::HashMap, pin::Pin};

use async_trait::async_trait;
use futures::Stream;
use stacked_errors::Result;

use crate::request::{CgroupLimits, PullPolicy};

/// Image metadata discoverable via `InspectImage`.
#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub user: Option<String>,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    pub workdir: Option<String>,
    /// `None` distinguishes "image had no entrypoint" from `Some(vec![])`.
    pub entrypoint: Option<Vec<String>>,
    pub onbuild: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CreateContainerOpts {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    pub network_mode: Option<String>,
    pub binds: Vec<(String, String)>,
    pub cgroup_limits: CgroupLimits,
    pub cap_drop: Vec<String>,
    pub attach_stdin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone)]
pub struct LogChunk {
    pub stream: StreamKind,
    pub data: Vec<u8>,
}

pub type LogStream = Pin<Box<dyn Stream<Item = Result<LogChunk>> + Send>>;
pub type ContainerStdin = Pin<Box<dyn tokio::io::AsyncWrite + Send>>;

/// The result of attaching to a container, returned before `StartContainer`
/// is called — attach strictly happens-before start.
pub struct AttachedStreams {
    pub stdin: Option<ContainerStdin>,
    pub output: LogStream,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOpts {
    pub cmd: Vec<String>,
    pub entrypoint: Vec<String>,
    pub env: Vec<String>,
    pub user: Option<String>,
    pub labels: HashMap<String, String>,
    /// May be empty; producing an image identified only by id.
    pub repository: String,
}

#[derive(Debug, Clone, Default)]
pub struct BuildImageOpts {
    pub tag: Option<String>,
    pub labels: HashMap<String, String>,
}

/// The eleven-odd operations required of an outbound container runtime.
/// Implemented against bollard by [`crate::bollard_client::BollardDockerClient`]
/// and, for tests, by [`crate::testing::FakeDockerClient`].
#[async_trait]
pub trait DockerClient: Send + Sync {
    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageMetadata>>;
    async fn pull_image(&self, reference: &str, policy: PullPolicy) -> Result<()>;
    async fn create_container(&self, opts: CreateContainerOpts) -> Result<String>;
    async fn attach(&self, id: &str) -> Result<AttachedStreams>;
    async fn start_container(&self, id: &str) -> Result<()>;
    /// Returns the container's exit code.
    async fn wait_container(&self, id: &str) -> Result<i64>;
    async fn remove_container(&self, id: &str) -> Result<()>;
    /// `tar_bytes` is a tarball whose entries are rooted at `container_path`.
    async fn upload_to_container(&self, id: &str, container_path: &str, tar_bytes: Vec<u8>) -> Result<()>;
    /// Returns a tarball of `container_path`'s contents.
    async fn download_from_container(&self, id: &str, container_path: &str) -> Result<Vec<u8>>;
    async fn commit_container(&self, id: &str, opts: CommitOpts) -> Result<String>;
    async fn remove_image(&self, reference: &str) -> Result<()>;
    /// Used only by [`crate::layered::LayeredBuilder`].
    async fn build_image(&self, opts: BuildImageOpts, tar_bytes: Vec<u8>) -> Result<String>;
    async fn ping(&self) -> Result<()>;
}
