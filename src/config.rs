use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::tracer::TracePattern;

pub const MAX_SERIALIZER_DEPTH: usize = 256;
pub const DEFAULT_INDENT: &str = "   | ";

/// How the nesting depth used for indentation is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthScope {
    /// One counter per calling thread.
    Thread,
    /// One counter shared by every thread (interleaves under concurrency).
    Global,
}

/// What a managed wrapper does when building the signature or entry line fails
/// before the original method ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormatFailurePolicy {
    /// Report the failure and still invoke the original method.
    CallThrough,
    /// Report the failure and return without invoking the original method.
    SkipCall,
}

/// All configurable settings with their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceSettings {
    pub serializer_max_depth: usize,
    pub depth_scope: DepthScope,
    pub on_format_failure: FormatFailurePolicy,
    pub indent: String,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            serializer_max_depth: 16,
            depth_scope: DepthScope::Thread,
            on_format_failure: FormatFailurePolicy::CallThrough,
            indent: DEFAULT_INDENT.to_string(),
        }
    }
}

/// Raw JSON representation. All fields optional for partial overrides.
#[derive(Debug, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "serializer.maxDepth")]
    serializer_max_depth: Option<usize>,
    #[serde(rename = "depth.scope")]
    depth_scope: Option<DepthScope>,
    #[serde(rename = "interceptor.onFormatFailure")]
    on_format_failure: Option<FormatFailurePolicy>,
    #[serde(rename = "logger.indent")]
    indent: Option<String>,
}

/// Resolve settings: defaults → user global → project-local.
pub fn resolve(project_root: Option<&Path>) -> TraceSettings {
    let global_path = dirs::home_dir().map(|h| h.join(".xtrace/settings.json"));
    let project_path = project_root.map(|r| r.join(".xtrace/settings.json"));
    resolve_with_paths(global_path.as_deref(), project_path.as_deref())
}

fn resolve_with_paths(global_path: Option<&Path>, project_path: Option<&Path>) -> TraceSettings {
    let mut settings = TraceSettings::default();

    if let Some(path) = global_path {
        apply_file(&mut settings, path);
    }
    if let Some(path) = project_path {
        apply_file(&mut settings, path);
    }

    settings
}

fn apply_file(settings: &mut TraceSettings, path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(file) = serde_json::from_str::<SettingsFile>(&content) else {
        tracing::warn!("Invalid settings file, ignoring: {}", path.display());
        return;
    };
    if let Some(v) = file.serializer_max_depth {
        if (1..=MAX_SERIALIZER_DEPTH).contains(&v) {
            settings.serializer_max_depth = v;
        } else {
            tracing::warn!(
                "serializer.maxDepth ({}) out of range (1..={}), using default",
                v, MAX_SERIALIZER_DEPTH
            );
        }
    }
    if let Some(scope) = file.depth_scope {
        settings.depth_scope = scope;
    }
    if let Some(policy) = file.on_format_failure {
        settings.on_format_failure = policy;
    }
    if let Some(indent) = file.indent {
        if indent.is_empty() || indent.contains('\n') {
            tracing::warn!("logger.indent must be a non-empty single line, using default");
        } else {
            settings.indent = indent;
        }
    }
}

/// Immutable per-session configuration, fixed before any instrumentation and
/// handed to the installed agent as its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub include_methods: Vec<TracePattern>,
    pub backtrace: bool,
    pub duration: bool,
    pub spawn: bool,
    #[serde(default)]
    pub settings: TraceSettings,
}

impl SessionConfig {
    pub fn new(include_methods: Vec<TracePattern>) -> Self {
        Self {
            include_methods,
            backtrace: false,
            duration: false,
            spawn: false,
            settings: TraceSettings::default(),
        }
    }

    /// Pattern list as the operator typed it, e.g. `['*.getName', 'Foo']`.
    pub fn patterns_display(&self) -> String {
        let quoted: Vec<String> = self
            .include_methods
            .iter()
            .map(|p| format!("'{}'", p.as_str()))
            .collect();
        format!("[{}]", quoted.join(", "))
    }
}
