//! See README.md for more

mod bollard_client;
mod commit;
mod container_runner;
mod docker_client;
mod downloader;
mod fetch;
mod hooks;
mod image_inspector;
mod incremental;
mod inject;
mod labels;
mod layered;
mod layout;
mod notifier;
mod orchestrator;
mod parsing;
mod request;
mod result;
mod runtime_stage;
mod scripts;
mod tarball;

pub use bollard_client::*;
pub use commit::*;
pub use container_runner::*;
pub use docker_client::*;
pub use downloader::*;
pub use fetch::*;
pub use hooks::*;
pub use image_inspector::*;
pub use incremental::*;
pub use inject::*;
pub use labels::*;
pub use layered::*;
pub use layout::*;
pub use notifier::*;
pub use orchestrator::*;
pub use parsing::*;
pub use request::*;
pub use result::*;
pub use runtime_stage::*;
pub use scripts::*;
pub use tarball::*;

/// An in-memory [`DockerClient`] and scripting helpers for exercising
/// [`Orchestrator::build`] without a daemon. Not gated behind a feature since
/// downstream integration tests need it from outside this crate.
pub mod testing;
