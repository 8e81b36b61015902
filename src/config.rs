//! Build configuration.
//!
//! Handles loading, validating, and merging `webprep.toml`. The stock
//! defaults are serialized to a TOML value and the user file is merged on
//! top, so a config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [processing]
//! concurrency = 8           # Parallel workers per asset family
//! incremental = false       # Skip unchanged inputs, prune instead of clearing
//! include_hidden = false    # Process dotfiles and dot-directories
//!
//! [styles]
//! source = "src/styles"
//! output = "dist/styles"
//! entries = []              # Relative entry stylesheets (empty = every file)
//! targets = ["defaults"]    # Browserslist queries for syntax lowering
//!
//! [fonts]
//! source = "src/fonts"
//! output = "dist/fonts"
//! extensions = []           # Discovery filter (empty = every file)
//! # python = "python3"      # Interpreter with fontTools installed
//! # unicodes = "U+0000-00FF"  # Subset ranges; the SUBSET env var wins
//!
//! [images]
//! source = "src/images"
//! output = "dist/images"
//! extensions = []
//!
//! [images.avif]
//! enabled = true
//! quality = 50
//! speed = 4                 # 1 (slowest, smallest) - 10 (fastest)
//!
//! [images.webp]
//! enabled = true            # Always lossless
//!
//! [images.jpeg]
//! enabled = true            # false = copy the original unchanged
//! quality = 80
//!
//! [images.png]
//! enabled = true
//!
//! [images.svg]
//! enabled = true
//! multipass = true
//!
//! [images.svg.passes]
//! removeViewBox = false
//!
//! [favicons]
//! source = "src/images/favicons"
//! output = "dist/favicons"
//! logo = "logo.svg"
//! raw_icon_svg = true
//! href_prefix = ""
//!
//! [favicons.manifest]
//! name = "Web App"
//! short_name = "App"
//! start_url = "/"
//! orientation = "portrait"
//! description = ""
//! background_color = "#ffffff"
//! display = "standalone"
//!
//! [[favicons.variants]]
//! id = "default"
//! color = "#000000"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::svg::SvgPass;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILENAME: &str = "webprep.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full build configuration loaded from `webprep.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub processing: ProcessingConfig,
    pub styles: StylesConfig,
    pub fonts: FontsConfig,
    pub images: ImagesConfig,
    pub favicons: FaviconsConfig,
}

impl BuildConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.concurrency == 0 {
            return Err(ConfigError::Validation(
                "processing.concurrency must be at least 1".into(),
            ));
        }
        for (name, source, output) in [
            ("styles", &self.styles.source, &self.styles.output),
            ("fonts", &self.fonts.source, &self.fonts.output),
            ("images", &self.images.source, &self.images.output),
            ("favicons", &self.favicons.source, &self.favicons.output),
        ] {
            if source.as_os_str().is_empty() || output.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{name}.source and {name}.output must not be empty"
                )));
            }
        }
        for entry in &self.styles.entries {
            if entry.is_absolute() || entry.components().any(|c| c.as_os_str() == "..") {
                return Err(ConfigError::Validation(format!(
                    "styles.entries must be relative to styles.source: {}",
                    entry.display()
                )));
            }
        }
        let avif = &self.images.avif;
        if !(1..=100).contains(&avif.quality) {
            return Err(ConfigError::Validation(
                "images.avif.quality must be 1-100".into(),
            ));
        }
        if !(1..=10).contains(&avif.speed) {
            return Err(ConfigError::Validation(
                "images.avif.speed must be 1-10".into(),
            ));
        }
        if !(1..=100).contains(&self.images.jpeg.quality) {
            return Err(ConfigError::Validation(
                "images.jpeg.quality must be 1-100".into(),
            ));
        }
        for name in self.images.svg.passes.keys() {
            if SvgPass::from_name(name).is_none() {
                return Err(ConfigError::Validation(format!(
                    "images.svg.passes: unknown pass '{name}'"
                )));
            }
        }
        self.favicons.validate()
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Workers per asset family. Clamped to the item count at run time,
    /// not to the core count: most work is I/O or child processes.
    pub concurrency: usize,
    /// Skip inputs whose content and parameters are unchanged since the
    /// previous run, and prune stale outputs instead of clearing.
    pub incremental: bool,
    /// Process dotfiles and dot-directories.
    pub include_hidden: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            incremental: false,
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Entry stylesheets relative to `source`. Empty processes every file
    /// under the source root. A listed entry that does not exist is fatal.
    pub entries: Vec<PathBuf>,
    /// Browserslist queries. Empty disables syntax lowering.
    pub targets: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            source: "src/styles".into(),
            output: "dist/styles".into(),
            entries: Vec::new(),
            targets: vec!["defaults".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FontsConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub extensions: Vec<String>,
    /// Interpreter with `fontTools` installed. Defaults to `python3`
    /// (`python` on Windows), looked up on `PATH`.
    pub python: Option<String>,
    /// Unicode ranges to keep. Overridden by the `SUBSET` environment variable.
    pub unicodes: Option<String>,
}

impl Default for FontsConfig {
    fn default() -> Self {
        Self {
            source: "src/fonts".into(),
            output: "dist/fonts".into(),
            extensions: Vec::new(),
            python: None,
            unicodes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub extensions: Vec<String>,
    pub avif: AvifConfig,
    pub webp: WebpConfig,
    pub jpeg: JpegConfig,
    pub png: PngConfig,
    pub svg: SvgConfig,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            source: "src/images".into(),
            output: "dist/images".into(),
            extensions: Vec::new(),
            avif: AvifConfig::default(),
            webp: WebpConfig::default(),
            jpeg: JpegConfig::default(),
            png: PngConfig::default(),
            svg: SvgConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AvifConfig {
    pub enabled: bool,
    pub quality: u32,
    /// rav1e speed preset, 1 (slowest) to 10 (fastest).
    pub speed: u8,
}

impl Default for AvifConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 50,
            speed: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebpConfig {
    pub enabled: bool,
}

impl Default for WebpConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JpegConfig {
    /// Re-encode JPEG originals. When off they are copied unchanged.
    pub enabled: bool,
    pub quality: u32,
}

impl Default for JpegConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 80,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PngConfig {
    /// Re-encode PNG originals at best compression.
    pub enabled: bool,
}

impl Default for PngConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// SVG optimizer settings. Passes not listed keep their preset default
/// (enabled).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SvgConfig {
    pub enabled: bool,
    pub multipass: bool,
    pub passes: BTreeMap<String, bool>,
}

impl Default for SvgConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            multipass: true,
            passes: BTreeMap::from([(SvgPass::RemoveViewBox.name().to_string(), false)]),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FaviconsConfig {
    /// Holds one `<id>/<logo>` per variant.
    pub source: PathBuf,
    /// Each variant writes into `<output>/<id>/`.
    pub output: PathBuf,
    pub logo: String,
    /// Copy the logo to `icon.svg` untouched instead of lightly optimizing it.
    pub raw_icon_svg: bool,
    /// Prefix for hrefs in `head.html`, e.g. `"/favicons/"`.
    pub href_prefix: String,
    pub manifest: ManifestConfig,
    pub variants: Vec<VariantConfig>,
}

impl Default for FaviconsConfig {
    fn default() -> Self {
        Self {
            source: "src/images/favicons".into(),
            output: "dist/favicons".into(),
            logo: "logo.svg".to_string(),
            raw_icon_svg: true,
            href_prefix: String::new(),
            manifest: ManifestConfig::default(),
            variants: vec![VariantConfig {
                id: "default".to_string(),
                color: "#000000".to_string(),
            }],
        }
    }
}

impl FaviconsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.logo.is_empty() || self.logo.contains(['/', '\\']) {
            return Err(ConfigError::Validation(
                "favicons.logo must be a plain file name".into(),
            ));
        }
        parse_hex_color(&self.manifest.background_color).ok_or_else(|| {
            ConfigError::Validation(format!(
                "favicons.manifest.background_color is not a hex color: {}",
                self.manifest.background_color
            ))
        })?;
        let mut seen = HashSet::new();
        for variant in &self.variants {
            let id = variant.id.as_str();
            if id.is_empty() || id == "." || id == ".." || id.contains(['/', '\\']) {
                return Err(ConfigError::Validation(format!(
                    "favicons.variants: '{id}' is not a valid directory name"
                )));
            }
            if !seen.insert(id) {
                return Err(ConfigError::Validation(format!(
                    "favicons.variants: duplicate id '{id}'"
                )));
            }
            parse_hex_color(&variant.color).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "favicons.variants: '{}' is not a hex color",
                    variant.color
                ))
            })?;
        }
        Ok(())
    }
}

/// Fields copied into every variant's `site.webmanifest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManifestConfig {
    pub name: String,
    pub short_name: String,
    pub start_url: String,
    pub orientation: String,
    pub description: String,
    pub background_color: String,
    pub display: String,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            name: "Web App".to_string(),
            short_name: "App".to_string(),
            start_url: "/".to_string(),
            orientation: "portrait".to_string(),
            description: String::new(),
            background_color: "#ffffff".to_string(),
            display: "standalone".to_string(),
        }
    }
}

/// One brand variant: its id names both the source and output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    pub id: String,
    /// Theme color, `#rgb` or `#rrggbb`.
    pub color: String,
}

/// Parse `#rgb` or `#rrggbb` into RGB bytes.
pub fn parse_hex_color(value: &str) -> Option<[u8; 3]> {
    let hex = value.strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Some(rgb)
        }
        6 => Some([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ]),
        _ => None,
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, so arrays
///   such as `favicons.variants` are replaced, not appended to.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when the file
/// is absent.
pub fn load_config(path: &Path) -> Result<BuildConfig, ConfigError> {
    let overlay = load_raw_config(path)?;
    if overlay.is_none() {
        log::debug!("{} not found, using stock defaults", path.display());
    }
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `webprep.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# webprep Configuration
# =====================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.
# Paths are relative to the working directory.

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Parallel workers per asset family (clamped to the number of files).
concurrency = 8

# Skip inputs whose content and settings are unchanged since the last run.
# Stale outputs are pruned instead of clearing the output directory.
# Also available per command as --incremental.
incremental = false

# Process dotfiles and dot-directories (e.g. .well-known/).
include_hidden = false

# ---------------------------------------------------------------------------
# Stylesheets: @import bundling, syntax lowering, minification
# ---------------------------------------------------------------------------
[styles]
source = "src/styles"
output = "dist/styles"

# Entry stylesheets relative to source. Empty processes every file.
# entries = ["base/min.css", "layout/min.css"]
entries = []

# Browserslist queries used to lower modern syntax. Empty disables lowering.
targets = ["defaults"]

# ---------------------------------------------------------------------------
# Fonts: subset and convert to WOFF2 with fontTools
# ---------------------------------------------------------------------------
[fonts]
source = "src/fonts"
output = "dist/fonts"

# Only these extensions are discovered. Empty discovers every file;
# non-font files are copied unchanged.
extensions = []

# Interpreter with fontTools and brotli installed. Default: python3
# (python on Windows), looked up on PATH.
# python = "python3"

# Unicode ranges to keep, e.g. "U+0000-00FF,U+0131". The SUBSET environment
# variable takes precedence. Unset keeps every glyph.
# unicodes = "U+0000-00FF"

# ---------------------------------------------------------------------------
# Images: rasters get AVIF + WebP siblings and a re-encoded original
# ---------------------------------------------------------------------------
[images]
source = "src/images"
output = "dist/images"
extensions = []

[images.avif]
enabled = true
quality = 50      # 1-100
speed = 4         # 1 (slowest, smallest) - 10 (fastest)

[images.webp]
enabled = true    # lossless

[images.jpeg]
enabled = true    # false copies JPEG originals unchanged
quality = 80      # 1-100

[images.png]
enabled = true    # best compression

[images.svg]
enabled = true    # false copies SVGs unchanged
multipass = true  # repeat until the output stops changing

# Toggle individual passes. Unlisted passes are enabled.
# Available: removeXMLProcInst, removeDoctype, removeComments,
# removeMetadata, removeEditorsNSData, removeEmptyAttrs,
# collapseWhitespace, removeViewBox, cleanupIds
[images.svg.passes]
removeViewBox = false

# ---------------------------------------------------------------------------
# Favicons and PWA manifest, one set per variant
# ---------------------------------------------------------------------------
[favicons]
# Reads <source>/<variant id>/<logo>, writes <output>/<variant id>/.
source = "src/images/favicons"
output = "dist/favicons"
logo = "logo.svg"

# Copy the logo to icon.svg untouched. false strips metadata and comments.
raw_icon_svg = true

# Prefix for hrefs in the generated head.html fragment.
href_prefix = ""

[favicons.manifest]
name = "Web App"
short_name = "App"
start_url = "/"
orientation = "portrait"
description = ""
background_color = "#ffffff"
display = "standalone"

# Each variant's color becomes its manifest theme_color and mask-icon color.
[[favicons.variants]]
id = "default"
color = "#000000"
"##
}
