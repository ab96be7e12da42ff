//! Image metadata resolution and the user allow-list check.

use crate::{
    docker_client::{DockerClient, ImageMetadata},
    parsing::uid_is_allowed,
    result::FailureReason,
};
use stacked_errors::{Result, StackableErr};

/// Inspects `image`, failing with a `FailureReason` if the daemon has no
/// such image (the caller is expected to have pulled it first).
pub async fn inspect_required(docker: &dyn DockerClient, image: &str) -> Result<ImageMetadata> {
    docker
        .inspect_image(image)
        .await
        .stack_err(|| format!("inspect_required({image})"))?
        .ok_or_else(|| {
            stacked_errors::Error::from(FailureReason::GenericS2IBuildFailed {
                message: format!("image {image} not found after pull"),
            })
        })
        .stack_err(|| format!("inspect_required({image}) -> image missing"))
}

/// Verifies the builder's default user, any ONBUILD `USER` directives, and an
/// assemble-user override all lie in `allowed_uids`. A non-numeric user fails
/// the check whenever the allow-list is non-empty.
pub fn check_allowed_uids(
    image: &ImageMetadata,
    onbuild_users: &[String],
    assemble_user: Option<&str>,
    allowed_uids: &Option<Vec<String>>,
) -> std::result::Result<(), FailureReason> {
    let Some(allowed) = allowed_uids else {
        return Ok(());
    };
    if allowed.is_empty() {
        return Ok(());
    }

    let mut candidates: Vec<&str> = Vec::new();
    if let Some(user) = image.user.as_deref() {
        candidates.push(user);
    }
    candidates.extend(onbuild_users.iter().map(String::as_str));
    if let Some(user) = assemble_user {
        candidates.push(user);
    }

    for user in candidates {
        let numeric = user.split(':').next().unwrap_or(user).chars().all(|c| c.is_ascii_digit());
        if !numeric || !uid_is_allowed(user, allowed) {
            return Err(FailureReason::UserNotAllowed {
                message: format!("user \"{user}\" is not in the allowed uid list"),
            });
        }
    }
    Ok(())
}

/// Extracts `USER <value>` directives from an image's ONBUILD list, in order.
pub fn onbuild_users(onbuild: &[String]) -> Vec<String> {
    onbuild
        .iter()
        .filter_map(|line| line.strip_prefix("USER ").map(|rest| rest.trim().to_string()))
        .collect()
}
