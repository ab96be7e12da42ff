//! The closed set of hook scripts a builder image may provide.

use std::fmt;

/// A named executable script contract the builder image either provides or
/// accepts from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookName {
    Assemble,
    Run,
    SaveArtifacts,
    Usage,
    AssembleRuntime,
}

impl HookName {
    pub const ALL: [HookName; 5] = [
        HookName::Assemble,
        HookName::Run,
        HookName::SaveArtifacts,
        HookName::Usage,
        HookName::AssembleRuntime,
    ];

    /// `assemble` and `run` must resolve or the build fails before any
    /// container is started; the others are best-effort.
    pub fn is_required(self) -> bool {
        matches!(self, HookName::Assemble | HookName::Run)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookName::Assemble => "assemble",
            HookName::Run => "run",
            HookName::SaveArtifacts => "save-artifacts",
            HookName::Usage => "usage",
            HookName::AssembleRuntime => "assemble-runtime",
        }
    }

    /// Hooks that receive the source tarball on stdin.
    pub fn receives_source_on_stdin(self) -> bool {
        matches!(self, HookName::Assemble | HookName::Usage)
    }
}

impl fmt::Display for HookName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a resolved hook's script was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrigin {
    CallerUrl,
    SourceTree,
    BuilderImage,
}

impl ScriptOrigin {
    /// Preference order used by [`crate::scripts::ScriptResolver`]: caller-URL
    /// beats source-tree beats builder-image.
    pub const PREFERENCE_ORDER: [ScriptOrigin; 3] = [
        ScriptOrigin::CallerUrl,
        ScriptOrigin::SourceTree,
        ScriptOrigin::BuilderImage,
    ];
}

/// The computed resolution for a single hook.
#[derive(Debug, Clone)]
pub struct HookResolution {
    pub hook: HookName,
    pub origin: Option<ScriptOrigin>,
    /// The URL or in-image path the hook was found at.
    pub location: Option<String>,
    /// True if the script bytes were written into the upload staging area.
    pub downloaded: bool,
    /// True if the script was placed under `upload/scripts/<hook>`.
    pub installed: bool,
    pub error: Option<String>,
}

impl HookResolution {
    pub fn unresolved(hook: HookName) -> Self {
        Self {
            hook,
            origin: None,
            location: None,
            downloaded: false,
            installed: false,
            error: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.origin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_assemble_and_run_are_required() {
        for hook in HookName::ALL {
            let expected = matches!(hook, HookName::Assemble | HookName::Run);
            assert_eq!(hook.is_required(), expected, "{hook}");
        }
    }

    #[test]
    fn only_assemble_and_usage_take_source_on_stdin() {
        for hook in HookName::ALL {
            let expected = matches!(hook, HookName::Assemble | HookName::Usage);
            assert_eq!(hook.receives_source_on_stdin(), expected, "{hook}");
        }
    }
}
