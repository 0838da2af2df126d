//! Typed error taxonomy for the four engines, plus the non-fatal
//! [`Diagnostic`] channel for muteable warnings (spec §7).

use std::fmt;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{file}:{line}: {message}")]
    Syntax {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },
    #[error("include not found: {target} (included from {from})")]
    IncludeNotFound { target: String, from: String },
    #[error("circular include detected: {stack}")]
    CircularInclude { stack: String },
    #[error("unmatched #endif in {file}")]
    UnmatchedEndif { file: String },
    #[error("malformed directive `{directive}` in {file}:{line}")]
    MalformedDirective {
        file: String,
        line: u32,
        directive: String,
    },
    #[error("stringize of non-parameter token `{token}`")]
    BadStringize { token: String },
    #[error("bad magic, expected \\0raP")]
    BadMagic,
    #[error("config path not found: {path}")]
    PathNotFound { path: String },
    #[error("unexpected value kind while reading {path}")]
    UnexpectedKind { path: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("bad MLOD magic")]
    BadMagic,
    #[error("face references invalid {kind} index {index} (count {count})")]
    InvalidPointIndex { kind: &'static str, index: u32, count: u32 },
    #[error("selection `{name}` references invalid {kind} index {index} (count {count})")]
    InvalidSelectionIndex {
        name: String,
        kind: &'static str,
        index: u32,
        count: u32,
    },
    #[error("more than 8 UV transforms in material {path}")]
    TooManyTransforms { path: String },
    #[error("more than 4 bone weights on a vertex")]
    TooManyVertexBones,
    #[error("missing required input: {what}")]
    MissingInput { what: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PaError {
    #[error("backing file unreadable: {0}")]
    Unreadable(PathBuf),
    #[error("truncated archive while reading {what}")]
    Truncated { what: &'static str },
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SignError {
    #[error("private key file unreadable: {0}")]
    KeyUnreadable(PathBuf),
    #[error("malformed private key")]
    MalformedKey,
    #[error(transparent)]
    Pa(#[from] PaError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Severity of a [`Diagnostic`]. Errors are still raised as typed errors
/// above; this covers only the non-fatal channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Info,
}

/// Individually-muteable diagnostic kinds (spec §7's seven named kinds,
/// plus `UnrecognizedMaterialName` for the material-authoring lookup
/// warnings of spec §4.2.5 — render flag/mainLight/fogMode/shader names
/// that fail to resolve — and `DammageMisspelling` for the "dammage"
/// misspelling warning (spec §4.2.3) — neither of which spec §7 names but
/// which still need their own mute switch distinct from `unknown-bone`
/// and `model-without-prefix`; see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ExcessiveConcatenation,
    RedefinitionWithoutUndef,
    UnquotedString,
    ModelWithoutPrefix,
    AnimatedWithoutSkeleton,
    NoProxyFace,
    UnknownBone,
    UnrecognizedMaterialName,
    DammageMisspelling,
}

impl DiagnosticKind {
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticKind::ExcessiveConcatenation => "excessive-concatenation",
            DiagnosticKind::RedefinitionWithoutUndef => "redefinition-wo-undef",
            DiagnosticKind::UnquotedString => "unquoted-string",
            DiagnosticKind::ModelWithoutPrefix => "model-without-prefix",
            DiagnosticKind::AnimatedWithoutSkeleton => "animated-without-skeleton",
            DiagnosticKind::NoProxyFace => "no-proxy-face",
            DiagnosticKind::UnknownBone => "unknown-bone",
            DiagnosticKind::UnrecognizedMaterialName => "unrecognized-material-name",
            DiagnosticKind::DammageMisspelling => "dammage-misspelling",
        }
    }

    /// Looks up a kind by its `--warning NAME` spelling (spec §7, plus
    /// `UnrecognizedMaterialName` and `DammageMisspelling`).
    pub fn from_name(name: &str) -> Option<DiagnosticKind> {
        const ALL: [DiagnosticKind; 9] = [
            DiagnosticKind::ExcessiveConcatenation,
            DiagnosticKind::RedefinitionWithoutUndef,
            DiagnosticKind::UnquotedString,
            DiagnosticKind::ModelWithoutPrefix,
            DiagnosticKind::AnimatedWithoutSkeleton,
            DiagnosticKind::NoProxyFace,
            DiagnosticKind::UnknownBone,
            DiagnosticKind::UnrecognizedMaterialName,
            DiagnosticKind::DammageMisspelling,
        ];
        ALL.into_iter().find(|k| k.name() == name)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}: {}", self.message),
            (Some(file), None) => write!(f, "{file}: {}", self.message),
            _ => write!(f, "{}", self.message),
        }
    }
}

/// Collects diagnostics and tracks which kinds are muted, mirroring the
/// original tool's `--warning NAME` suppression flag.
#[derive(Debug, Default)]
pub struct Diagnostics {
    muted: rustc_hash::FxHashSet<DiagnosticKind>,
    collected: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mute(&mut self, kind: DiagnosticKind) {
        self.muted.insert(kind);
    }

    /// Mutes every recognized name in `names`, ignoring unrecognized ones
    /// (mirroring `--warning NAME`, repeatable, spec §7).
    pub fn mute_by_name<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        for name in names {
            if let Some(kind) = DiagnosticKind::from_name(name) {
                self.mute(kind);
            } else {
                log::warn!("unknown diagnostic kind `{name}`, ignoring --warning flag");
            }
        }
    }

    pub fn push(&mut self, kind: DiagnosticKind, severity: Severity, message: impl Into<String>) {
        self.push_at(kind, severity, None, None, message);
    }

    pub fn push_at(
        &mut self,
        kind: DiagnosticKind,
        severity: Severity,
        file: Option<String>,
        line: Option<u32>,
        message: impl Into<String>,
    ) {
        if self.muted.contains(&kind) {
            return;
        }
        let diag = Diagnostic {
            kind,
            severity,
            file,
            line,
            message: message.into(),
        };
        match diag.severity {
            Severity::Warning => log::warn!("{diag}"),
            Severity::Info => log::info!("{diag}"),
        }
        self.collected.push(diag);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.collected.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.collected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_kind_name_roundtrips() {
        for kind in [
            DiagnosticKind::ExcessiveConcatenation,
            DiagnosticKind::RedefinitionWithoutUndef,
            DiagnosticKind::UnquotedString,
            DiagnosticKind::ModelWithoutPrefix,
            DiagnosticKind::AnimatedWithoutSkeleton,
            DiagnosticKind::NoProxyFace,
            DiagnosticKind::UnknownBone,
            DiagnosticKind::UnrecognizedMaterialName,
            DiagnosticKind::DammageMisspelling,
        ] {
            assert_eq!(DiagnosticKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(DiagnosticKind::from_name("not-a-real-kind"), None);
    }

    #[test]
    fn mute_by_name_suppresses_matching_diagnostics() {
        let mut diags = Diagnostics::new();
        diags.mute_by_name(["unquoted-string"]);
        diags.push(DiagnosticKind::UnquotedString, Severity::Warning, "should be muted");
        diags.push(DiagnosticKind::NoProxyFace, Severity::Warning, "should survive");
        assert_eq!(diags.iter().count(), 1);
    }
}
