//! [`BollardDockerClient`], the real [`DockerClient`] backed by the Docker
//! Engine API via `bollard`: create/attach/start ordering, and a process-wide
//! handle with a double-checked-locking fast path.

use std::sync::{LazyLock, OnceLock};

use bollard::{
    container::{
        AttachContainerOptions, Config, CreateContainerOptions, DownloadFromContainerOptions,
        LogOutput, RemoveContainerOptions, UploadToContainerOptions, WaitContainerOptions,
    },
    image::{BuildImageOptions, CommitContainerOptions, RemoveImageOptions},
    Docker,
};
use futures::StreamExt;
use stacked_errors::{Result, StackableErr};

use crate::{
    docker_client::{
        AttachedStreams, BuildImageOpts, CommitOpts, ContainerStdin, CreateContainerOpts,
        DockerClient, ImageMetadata, LogChunk, LogStream, StreamKind,
    },
    request::PullPolicy,
};

/// Acquires a process-wide `bollard::Docker` handle, connecting on first use:
/// a lock-free fast path once initialized, a mutex-guarded slow path on the
/// first caller.
pub async fn get_or_init_docker() -> Result<Docker> {
    static DOCKER: OnceLock<Docker> = OnceLock::new();
    static INIT_LOCK: LazyLock<tokio::sync::Mutex<()>> = LazyLock::new(Default::default);

    if let Some(docker) = DOCKER.get() {
        return Ok(docker.clone());
    }

    let _guard = INIT_LOCK.lock().await;
    if let Some(docker) = DOCKER.get() {
        return Ok(docker.clone());
    }

    let docker = tokio::task::spawn_blocking(Docker::connect_with_local_defaults)
        .await
        .stack_err(|| "get_or_init_docker -> spawn_blocking join failed")?
        .stack_err(|| "get_or_init_docker -> could not connect to the Docker daemon")?;

    let _ = DOCKER.set(docker);
    Ok(DOCKER.get().unwrap().clone())
}

#[derive(Debug, Clone, Default)]
pub struct BollardDockerClient;

impl BollardDockerClient {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl DockerClient for BollardDockerClient {
    #[tracing::instrument(skip(self))]
    async fn inspect_image(&self, reference: &str) -> Result<Option<ImageMetadata>> {
        let docker = get_or_init_docker().await.stack()?;
        match docker.inspect_image(reference).await {
            Ok(inspect) => {
                let config = inspect.config.unwrap_or_default();
                Ok(Some(ImageMetadata {
                    user: config.user.filter(|s| !s.is_empty()),
                    env: config.env.unwrap_or_default(),
                    labels: config.labels.unwrap_or_default(),
                    workdir: config.working_dir.filter(|s| !s.is_empty()),
                    entrypoint: config.entrypoint,
                    onbuild: config.on_build.unwrap_or_default(),
                }))
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(None),
            Err(e) => Err(e).stack_err(|| format!("inspect_image({reference}) failed")),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn pull_image(&self, reference: &str, policy: PullPolicy) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;

        if matches!(policy, PullPolicy::Never) {
            return Ok(());
        }
        if matches!(policy, PullPolicy::IfNotPresent) && self.inspect_image(reference).await?.is_some() {
            return Ok(());
        }

        let options = bollard::image::CreateImageOptions {
            from_image: reference,
            ..Default::default()
        };
        let mut stream = docker.create_image(Some(options), None, None);
        while let Some(progress) = stream.next().await {
            progress.stack_err(|| format!("pull_image({reference}) -> stream error"))?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, opts))]
    async fn create_container(&self, opts: CreateContainerOpts) -> Result<String> {
        let docker = get_or_init_docker().await.stack()?;

        let binds = opts
            .binds
            .iter()
            .map(|(host, container)| format!("{host}:{container}"))
            .collect::<Vec<_>>();

        let host_config = bollard::secret::HostConfig {
            binds: Some(binds),
            network_mode: opts.network_mode.clone(),
            cap_drop: if opts.cap_drop.is_empty() {
                None
            } else {
                Some(opts.cap_drop.clone())
            },
            memory: opts.cgroup_limits.memory_bytes,
            memory_swap: opts.cgroup_limits.memory_swap_bytes,
            cpu_shares: opts.cgroup_limits.cpu_shares,
            cpu_period: opts.cgroup_limits.cpu_period,
            cpu_quota: opts.cgroup_limits.cpu_quota,
            ..Default::default()
        };

        let config = Config {
            image: Some(opts.image.clone()),
            cmd: if opts.cmd.is_empty() {
                None
            } else {
                Some(opts.cmd.clone())
            },
            env: if opts.env.is_empty() {
                None
            } else {
                Some(opts.env.clone())
            },
            user: opts.user.clone(),
            attach_stdin: Some(opts.attach_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(opts.attach_stdin),
            tty: Some(false),
            host_config: Some(host_config),
            ..Default::default()
        };

        let create_opts = CreateContainerOptions {
            name: opts.name.as_str(),
            platform: None,
        };

        let response = docker
            .create_container(Some(create_opts), config)
            .await
            .stack_err(|| format!("create_container({}) failed", opts.image))?;

        Ok(response.id)
    }

    #[tracing::instrument(skip(self))]
    async fn attach(&self, id: &str) -> Result<AttachedStreams> {
        let docker = get_or_init_docker().await.stack()?;

        let attach_opts = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(false),
            ..Default::default()
        };

        let attach = docker
            .attach_container(id, Some(attach_opts))
            .await
            .stack_err(|| format!("attach({id}) failed"))?;

        let output: LogStream = Box::pin(attach.output.map(|item| {
            let output = item.stack_err(|| "container output stream error")?;
            let (stream, data) = match output {
                LogOutput::StdOut { message } => (StreamKind::Stdout, message),
                LogOutput::StdErr { message } => (StreamKind::Stderr, message),
                LogOutput::StdIn { message } | LogOutput::Console { message } => {
                    (StreamKind::Stdout, message)
                }
            };
            Ok(LogChunk {
                stream,
                data: data.to_vec(),
            })
        }));

        let stdin: ContainerStdin = Box::pin(attach.input);

        Ok(AttachedStreams {
            stdin: Some(stdin),
            output,
        })
    }

    #[tracing::instrument(skip(self))]
    async fn start_container(&self, id: &str) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;
        docker
            .start_container::<String>(id, None)
            .await
            .stack_err(|| format!("start_container({id}) failed"))
    }

    #[tracing::instrument(skip(self))]
    async fn wait_container(&self, id: &str) -> Result<i64> {
        let docker = get_or_init_docker().await.stack()?;
        let mut stream = docker.wait_container(id, None::<WaitContainerOptions<String>>);
        let mut code = 0i64;
        while let Some(response) = stream.next().await {
            match response {
                Ok(ok) => code = ok.status_code,
                Err(bollard::errors::Error::DockerContainerWaitError { code: c, .. }) => {
                    code = c;
                }
                Err(e) => return Err(e).stack_err(|| format!("wait_container({id}) failed")),
            }
        }
        Ok(code)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_container(&self, id: &str) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;
        docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .stack_err(|| format!("remove_container({id}) failed"))
    }

    #[tracing::instrument(skip(self, tar_bytes))]
    async fn upload_to_container(&self, id: &str, container_path: &str, tar_bytes: Vec<u8>) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;
        let options = UploadToContainerOptions {
            path: container_path,
            ..Default::default()
        };
        docker
            .upload_to_container(id, Some(options), tar_bytes.into())
            .await
            .stack_err(|| format!("upload_to_container({id}, {container_path}) failed"))
    }

    #[tracing::instrument(skip(self))]
    async fn download_from_container(&self, id: &str, container_path: &str) -> Result<Vec<u8>> {
        let docker = get_or_init_docker().await.stack()?;
        let options = DownloadFromContainerOptions {
            path: container_path,
        };
        let mut stream = docker.download_from_container(id, Some(options));
        let mut buf = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.stack_err(|| format!("download_from_container({id}, {container_path})"))?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    #[tracing::instrument(skip(self, opts))]
    async fn commit_container(&self, id: &str, opts: CommitOpts) -> Result<String> {
        let docker = get_or_init_docker().await.stack()?;

        let config = Config {
            cmd: if opts.cmd.is_empty() {
                None
            } else {
                Some(opts.cmd.clone())
            },
            entrypoint: if opts.entrypoint.is_empty() {
                None
            } else {
                Some(opts.entrypoint.clone())
            },
            env: if opts.env.is_empty() {
                None
            } else {
                Some(opts.env.clone())
            },
            user: opts.user.clone(),
            labels: if opts.labels.is_empty() {
                None
            } else {
                Some(opts.labels.clone())
            },
            ..Default::default()
        };

        let commit_opts = CommitContainerOptions {
            container: id,
            repo: opts.repository.as_str(),
            pause: true,
            ..Default::default()
        };

        let response = docker
            .commit_container(commit_opts, config)
            .await
            .stack_err(|| format!("commit_container({id}) failed"))?;

        Ok(response.id)
    }

    #[tracing::instrument(skip(self))]
    async fn remove_image(&self, reference: &str) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;
        docker
            .remove_image(reference, Some(RemoveImageOptions {
                force: true,
                ..Default::default()
            }), None)
            .await
            .map(|_| ())
            .stack_err(|| format!("remove_image({reference}) failed"))
    }

    #[tracing::instrument(skip(self, opts, tar_bytes))]
    async fn build_image(&self, opts: BuildImageOpts, tar_bytes: Vec<u8>) -> Result<String> {
        let docker = get_or_init_docker().await.stack()?;

        let options = BuildImageOptions {
            t: opts.tag.as_deref().unwrap_or("").to_string(),
            labels: opts.labels.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = docker.build_image(options, None, Some(tar_bytes.into()));
        let mut image_id = None;
        while let Some(info) = stream.next().await {
            let info = info.stack_err(|| "build_image -> stream error")?;
            if let Some(aux) = info.aux {
                if let Some(id) = aux.id {
                    image_id = Some(id);
                }
            }
        }

        image_id
            .or(opts.tag)
            .ok_or_else(|| stacked_errors::Error::from("build_image -> daemon returned no image id"))
    }

    #[tracing::instrument(skip(self))]
    async fn ping(&self) -> Result<()> {
        let docker = get_or_init_docker().await.stack()?;
        docker.ping().await.map(|_| ()).stack_err(|| "ping failed")
    }
}
