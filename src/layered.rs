//! [`build_derived_image`], the layered-builder fallback: wraps a
//! non-compliant builder with a synthesized image that copies the upload
//! tree in, so a re-entrant build attempt has a clearer failure mode.

use std::path::Path;

use stacked_errors::{Result, StackableErr};

use crate::{
    docker_client::{BuildImageOpts, DockerClient},
    tarball::Tarball,
};

/// Generates the minimal Dockerfile-equivalent recipe for the derived image.
pub fn recipe(original_builder: &str, destination: &str) -> String {
    format!("FROM {original_builder}\nCOPY upload {destination}\nUSER 0\n")
}

/// Builds a derived image from `original_builder`, copying `upload_dir`'s
/// contents in via the generated recipe, and tags it
/// `<original_builder>-<random suffix>`. Returns the derived image's
/// reference.
#[tracing::instrument(skip(docker))]
pub async fn build_derived_image(
    docker: &dyn DockerClient,
    original_builder: &str,
    destination: &str,
    upload_dir: &Path,
) -> Result<String> {
    let tag = format!("{original_builder}-{}", uuid::Uuid::new_v4().simple());

    let mut tar = Tarball::new();
    tar.append_file_bytes("Dockerfile", 0o644, recipe(original_builder, destination).as_bytes())?;
    tar.append_dir_contents_at(upload_dir, "upload")
        .await
        .stack_err(|| format!("build_derived_image -> append_dir_contents_at({upload_dir:?})"))?;
    let tar_bytes = tar.into_tarball().stack_err(|| "build_derived_image -> into_tarball")?;

    let opts = BuildImageOpts {
        tag: Some(tag.clone()),
        labels: Default::default(),
    };

    docker
        .build_image(opts, tar_bytes)
        .await
        .stack_err(|| format!("build_derived_image -> build_image({tag})"))
}
