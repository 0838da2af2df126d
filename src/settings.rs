//! The toolchain's own `--config` file (distinct from the game's config
//! language in [`crate::config`]): a `Deserialize`d file shape merged into
//! a richer runtime struct with defaults, mirroring the teacher's
//! `PathSearcherConfig`/`PathSearcherConfigFile` split.

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{self, Context};
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub include_roots: Vec<PathBuf>,
    pub exclude_globs: Vec<String>,
    pub include_globs: Vec<String>,
    pub muted_warnings: Vec<String>,
    pub privatekey: Option<PathBuf>,
    pub signature: Option<PathBuf>,
    pub force: bool,
    pub preserve_lines: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    include_roots: Vec<PathBuf>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    mute_warnings: Vec<String>,
    privatekey: Option<PathBuf>,
    signature: Option<PathBuf>,
    #[serde(default)]
    force: bool,
    #[serde(default = "default_true")]
    preserve_lines: bool,
}

fn default_true() -> bool {
    true
}

impl Settings {
    pub fn from_toml_str(toml_str: &str) -> eyre::Result<Self> {
        let file_cfg: SettingsFile = toml::from_str(toml_str)?;
        Ok(Self::from_file(file_cfg))
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).wrap_err_with(|| format!("failed to read config: {path:?}"))?;
        Self::from_toml_str(&s).wrap_err_with(|| format!("failed to parse TOML config: {path:?}"))
    }

    fn from_file(file: SettingsFile) -> Self {
        Self {
            include_roots: file.include_roots,
            exclude_globs: file.exclude,
            include_globs: file.include,
            muted_warnings: file.mute_warnings,
            privatekey: file.privatekey,
            signature: file.signature,
            force: file.force,
            preserve_lines: file.preserve_lines,
        }
    }
}
