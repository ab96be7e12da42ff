//! [`BuildRequest`] — the immutable input to a build.

use std::{collections::HashMap, path::PathBuf};

use crate::labels::DEFAULT_NAMESPACE;

/// One of the three pull policies a caller may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullPolicy {
    Always,
    Never,
    #[default]
    IfNotPresent,
}

/// A single host-directory injection.
#[derive(Debug, Clone)]
pub struct InjectionSpec {
    pub host_source: PathBuf,
    pub container_destination: String,
    /// If false, the file is truncated to zero length after assemble
    /// completes, before the container is committed.
    pub keep: bool,
}

/// Immutable input to a build. Builder/source/tag are the only fields
/// without a natural default, so this has no blanket `Default` impl (option
/// bags in this style only derive `Default` when every field is optional).
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub source: String,
    pub builder_image: String,
    pub runtime_image: Option<String>,
    /// May be empty, producing an image identified only by id.
    pub tag: String,
    /// Defaults to `tag` when empty.
    pub incremental_from_tag: String,

    pub builder_pull_policy: PullPolicy,
    pub previous_pull_policy: PullPolicy,
    pub runtime_pull_policy: PullPolicy,

    pub caller_scripts_url: Option<String>,
    pub allowed_uids: Option<Vec<String>>,
    pub assemble_user: Option<String>,
    pub drop_capabilities: Vec<String>,
    pub network_mode: Option<String>,
    pub cgroup_limits: CgroupLimits,
    pub binds: Vec<(String, String)>,
    pub injections: Vec<InjectionSpec>,

    pub environment: Vec<(String, String)>,
    pub environment_file: Option<PathBuf>,

    pub label_overrides: HashMap<String, String>,
    pub exclude_regex: Option<String>,

    pub incremental: bool,
    pub remove_previous_image: bool,
    pub allow_onbuild: bool,
    pub preserve_working_dir: bool,

    /// Label namespace used to read/write `<namespace>.*` labels.
    pub label_namespace: String,

    /// Artifact mappings for an extended (two-stage) build. If empty and a
    /// runtime image is requested, [`crate::runtime_stage::RuntimeStage`]
    /// falls back to the runtime image's `assemble-input-files` label.
    pub artifact_mappings: Vec<ArtifactMapping>,
    pub assemble_runtime_user: Option<String>,
}

/// `source:destination` mapping for [`crate::runtime_stage::RuntimeStage`].
#[derive(Debug, Clone)]
pub struct ArtifactMapping {
    /// Absolute path inside the builder container.
    pub source: String,
    /// Relative path (no `..` components) inside the runtime container.
    pub destination: String,
}

#[derive(Debug, Clone, Default)]
pub struct CgroupLimits {
    pub memory_bytes: Option<i64>,
    pub memory_swap_bytes: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub cpu_period: Option<i64>,
    pub cpu_quota: Option<i64>,
}

impl BuildRequest {
    pub fn new(source: impl Into<String>, builder_image: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            builder_image: builder_image.into(),
            runtime_image: None,
            tag: String::new(),
            incremental_from_tag: String::new(),
            builder_pull_policy: PullPolicy::IfNotPresent,
            previous_pull_policy: PullPolicy::IfNotPresent,
            runtime_pull_policy: PullPolicy::IfNotPresent,
            caller_scripts_url: None,
            allowed_uids: None,
            assemble_user: None,
            drop_capabilities: Vec::new(),
            network_mode: None,
            cgroup_limits: CgroupLimits::default(),
            binds: Vec::new(),
            injections: Vec::new(),
            environment: Vec::new(),
            environment_file: None,
            label_overrides: HashMap::new(),
            exclude_regex: None,
            incremental: false,
            remove_previous_image: false,
            allow_onbuild: true,
            preserve_working_dir: false,
            label_namespace: DEFAULT_NAMESPACE.to_string(),
            artifact_mappings: Vec::new(),
            assemble_runtime_user: None,
        }
    }

    /// Resolves the "incremental-from" tag, defaulting to `tag`.
    pub fn incremental_from_tag(&self) -> &str {
        if self.incremental_from_tag.is_empty() {
            &self.tag
        } else {
            &self.incremental_from_tag
        }
    }

    /// `force_pull` is a compatibility shim mapping to `always` for the
    /// builder pull policy.
    pub fn with_force_pull(mut self, force_pull: bool) -> Self {
        if force_pull {
            self.builder_pull_policy = PullPolicy::Always;
        }
        self
    }
}
