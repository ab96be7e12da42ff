//! Well-known image label and environment variable names read by the core.
//!
//! Labels come in a `<namespace>.<name>` form plus deprecated aliases. The
//! namespace is configurable per [`crate::request::BuildRequest`] (defaults to
//! `io.openshift.s2i`), but the deprecated aliases are fixed strings.

/// Default label namespace, overridable by callers that vendor their own.
pub const DEFAULT_NAMESPACE: &str = "io.openshift.s2i";

/// Deprecated, namespace-free label carrying the scripts URL.
pub const LEGACY_SCRIPTS_URL_LABEL: &str = "io.s2i.scripts-url";
/// Deprecated environment variable carrying the scripts URL.
pub const LEGACY_SCRIPTS_URL_ENV: &str = "STI_SCRIPTS_URL";

/// Deprecated, namespace-free label carrying the destination directory.
pub const LEGACY_DESTINATION_LABEL: &str = "io.s2i.destination";
/// Deprecated environment variable carrying the destination directory.
pub const LEGACY_DESTINATION_ENV: &str = "STI_LOCATION";

/// Default destination directory when nothing else specifies one.
pub const DEFAULT_DESTINATION: &str = "/tmp";

pub fn scripts_url_label(namespace: &str) -> String {
    format!("{namespace}.scripts-url")
}

pub fn destination_label(namespace: &str) -> String {
    format!("{namespace}.destination")
}

pub fn build_image_label(namespace: &str) -> String {
    format!("{namespace}.build.image")
}

pub fn build_source_location_label(namespace: &str) -> String {
    format!("{namespace}.build.source-location")
}

pub fn build_commit_ref_label(namespace: &str) -> String {
    format!("{namespace}.build.commit.ref")
}

pub fn build_source_context_dir_label(namespace: &str) -> String {
    format!("{namespace}.build.source-context-dir")
}

pub fn assemble_input_files_label(namespace: &str) -> String {
    format!("{namespace}.assemble-input-files")
}

pub fn assemble_runtime_user_label(namespace: &str) -> String {
    format!("{namespace}.assemble-runtime-user")
}

/// Reads `KEY=value` image env entries (as returned by `InspectImage`) for
/// `key`, used to fall back to `STI_SCRIPTS_URL`/`STI_LOCATION` when neither
/// label is present.
pub fn read_env_var<'a>(env: &'a [String], key: &str) -> Option<&'a str> {
    env.iter().find_map(|entry| {
        let (k, v) = entry.split_once('=')?;
        (k == key).then_some(v)
    })
}

/// Reads a label with namespace-first, deprecated-alias-second precedence,
/// warning when only the deprecated alias is present. A builder image may
/// provide both; the new label always wins.
pub fn read_label_with_legacy<'a>(
    labels: &'a std::collections::HashMap<String, String>,
    namespaced: &str,
    legacy: &str,
) -> Option<&'a str> {
    if let Some(v) = labels.get(namespaced) {
        return Some(v.as_str());
    }
    if let Some(v) = labels.get(legacy) {
        tracing::warn!(
            "image uses deprecated label \"{legacy}\", prefer \"{namespaced}\""
        );
        return Some(v.as_str());
    }
    None
}

/// Full precedence chain for the scripts-url metadata: namespaced label,
/// then legacy label, then legacy env var.
pub fn resolve_scripts_url(
    labels: &std::collections::HashMap<String, String>,
    env: &[String],
    namespace: &str,
) -> Option<String> {
    if let Some(v) = read_label_with_legacy(labels, &scripts_url_label(namespace), LEGACY_SCRIPTS_URL_LABEL) {
        return Some(v.to_string());
    }
    read_env_var(env, LEGACY_SCRIPTS_URL_ENV).map(|v| v.to_string())
}

/// Full precedence chain for the destination metadata, defaulting to
/// [`DEFAULT_DESTINATION`] when nothing overrides it.
pub fn resolve_destination(
    labels: &std::collections::HashMap<String, String>,
    env: &[String],
    namespace: &str,
) -> String {
    if let Some(v) = read_label_with_legacy(labels, &destination_label(namespace), LEGACY_DESTINATION_LABEL) {
        return v.to_string();
    }
    if let Some(v) = read_env_var(env, LEGACY_DESTINATION_ENV) {
        return v.to_string();
    }
    DEFAULT_DESTINATION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_destination_prefers_namespaced_label_over_legacy_label_and_env() {
        let mut labels = std::collections::HashMap::new();
        labels.insert(destination_label(DEFAULT_NAMESPACE), "/opt/app-root/src".to_string());
        labels.insert(LEGACY_DESTINATION_LABEL.to_string(), "/tmp/legacy".to_string());
        let env = vec![format!("{LEGACY_DESTINATION_ENV}=/tmp/from-env")];

        assert_eq!(
            resolve_destination(&labels, &env, DEFAULT_NAMESPACE),
            "/opt/app-root/src"
        );
    }

    #[test]
    fn resolve_destination_falls_back_through_legacy_label_then_env_then_default() {
        let env = vec![format!("{LEGACY_DESTINATION_ENV}=/tmp/from-env")];
        assert_eq!(
            resolve_destination(&std::collections::HashMap::new(), &env, DEFAULT_NAMESPACE),
            "/tmp/from-env"
        );

        let mut labels = std::collections::HashMap::new();
        labels.insert(LEGACY_DESTINATION_LABEL.to_string(), "/tmp/legacy".to_string());
        assert_eq!(resolve_destination(&labels, &[], DEFAULT_NAMESPACE), "/tmp/legacy");

        assert_eq!(
            resolve_destination(&std::collections::HashMap::new(), &[], DEFAULT_NAMESPACE),
            DEFAULT_DESTINATION
        );
    }
}
