//! Favicon and PWA manifest generation.
//!
//! Each brand variant reads `<source>/<id>/<logo>` and writes a complete
//! icon set into `<output>/<id>/`:
//!
//! ```text
//! dist/favicons/default/
//! ├── icon.svg                 # logo, raw or lightly optimized
//! ├── favicon-16x16.png        # transparent
//! ├── favicon-32x32.png        # transparent
//! ├── favicon-192x192.png      # transparent, manifest icon
//! ├── favicon-512x512.png      # transparent, manifest icon
//! ├── apple-touch-icon.png     # 180px on the manifest background color
//! ├── favicon.ico              # 16 + 32 px frames
//! ├── safari-pinned-tab.svg    # monochrome, fill=currentColor
//! ├── site.webmanifest
//! └── head.html                # <link>/<meta> tags for the above
//! ```
//!
//! Rasters are always rendered from the raw logo so optimization can never
//! change their geometry. Variants run on the bounded pool; a failing
//! variant is reported and the others carry on.

use crate::config::{FaviconsConfig, ManifestConfig, VariantConfig, parse_hex_color};
use crate::dispatch::{Outcome, TransformResult, Written, panic_message, write_output};
use crate::imaging::{BackendError, encode_png, pack_ico, rasterize_svg};
use crate::pipeline::{BatchReport, PipelineEvent};
use crate::pool::{self, PoolError};
use crate::svg::{SvgError, SvgOptimizer, SvgPass};
use crate::sync::{self, SyncError};
use maud::{Markup, html};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::sync::mpsc::Sender;
use thiserror::Error;

pub const FAMILY: &str = "favicons";

#[derive(Error, Debug)]
pub enum FaviconError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot read logo {path}: {source}")]
    Logo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Imaging(#[from] BackendError),
    #[error(transparent)]
    Svg(#[from] SvgError),
    #[error("manifest serialization failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("'{0}' is not a hex color")]
    Color(String),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("generation panicked: {0}")]
    Panicked(String),
}

/// A PNG rendered from the logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Raster {
    pub name: &'static str,
    pub size: u32,
    /// Flatten onto the manifest background color.
    pub opaque: bool,
}

pub const RASTERS: [Raster; 5] = [
    Raster { name: "favicon-16x16.png", size: 16, opaque: false },
    Raster { name: "favicon-32x32.png", size: 32, opaque: false },
    Raster { name: "favicon-192x192.png", size: 192, opaque: false },
    Raster { name: "favicon-512x512.png", size: 512, opaque: false },
    Raster { name: "apple-touch-icon.png", size: 180, opaque: true },
];

/// Frame sizes packed into `favicon.ico`.
pub const ICO_SIZES: [u32; 2] = [16, 32];

pub const ICON_SVG: &str = "icon.svg";
pub const ICO: &str = "favicon.ico";
pub const PINNED_TAB: &str = "safari-pinned-tab.svg";
pub const MANIFEST: &str = "site.webmanifest";
pub const HEAD: &str = "head.html";

static FILL_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sfill="[^"]*""#).expect("fill pattern is valid"));
static STYLE_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<style[^>]*>").expect("style pattern is valid"));
static SVG_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg([^>]*?)>").expect("svg pattern is valid"));

const CURRENT_COLOR_RULE: &str = "*{fill:currentColor}";

/// Passes that can never change how the icon renders.
pub fn light_optimizer() -> SvgOptimizer {
    SvgOptimizer::with_passes(
        &[
            SvgPass::RemoveMetadata,
            SvgPass::RemoveXmlProcInst,
            SvgPass::RemoveDoctype,
            SvgPass::RemoveComments,
        ],
        true,
    )
}

/// Strip every `fill` attribute and paint everything with `currentColor`.
pub fn to_monochrome(svg: &str) -> String {
    let stripped = FILL_ATTR.replace_all(svg, "");
    if stripped.contains("<style") {
        STYLE_OPEN
            .replacen(&stripped, 1, |caps: &regex::Captures| {
                format!("{}\n{CURRENT_COLOR_RULE}", &caps[0])
            })
            .into_owned()
    } else {
        SVG_OPEN
            .replacen(&stripped, 1, |caps: &regex::Captures| {
                format!("<svg{}><style>{CURRENT_COLOR_RULE}</style>", &caps[1])
            })
            .into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestIcon {
    pub src: String,
    pub sizes: String,
    #[serde(rename = "type")]
    pub mime: String,
}

/// `site.webmanifest` contents. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebManifest {
    pub name: String,
    pub short_name: String,
    pub start_url: String,
    pub orientation: String,
    pub description: String,
    pub icons: Vec<ManifestIcon>,
    pub theme_color: String,
    pub background_color: String,
    pub display: String,
}

impl WebManifest {
    pub fn new(config: &ManifestConfig, theme_color: &str) -> Self {
        let icons = RASTERS
            .iter()
            .filter(|r| r.size >= 192)
            .map(|r| ManifestIcon {
                src: r.name.to_string(),
                sizes: format!("{0}x{0}", r.size),
                mime: "image/png".to_string(),
            })
            .collect();
        Self {
            name: config.name.clone(),
            short_name: config.short_name.clone(),
            start_url: config.start_url.clone(),
            orientation: config.orientation.clone(),
            description: config.description.clone(),
            icons,
            theme_color: theme_color.to_string(),
            background_color: config.background_color.clone(),
            display: config.display.clone(),
        }
    }
}

/// `<head>` tags referencing one variant's artifacts, one per line.
pub fn head_fragment(prefix: &str, theme_color: &str) -> String {
    let href = |name: &str| format!("{prefix}{name}");
    let tags: [Markup; 8] = [
        html! { link rel="icon" href=(href(ICO)) sizes="any"; },
        html! { link rel="icon" type="image/svg+xml" href=(href(ICON_SVG)); },
        html! { link rel="icon" type="image/png" sizes="32x32" href=(href("favicon-32x32.png")); },
        html! { link rel="icon" type="image/png" sizes="16x16" href=(href("favicon-16x16.png")); },
        html! { link rel="apple-touch-icon" sizes="180x180" href=(href("apple-touch-icon.png")); },
        html! { link rel="mask-icon" href=(href(PINNED_TAB)) color=(theme_color); },
        html! { link rel="manifest" href=(href(MANIFEST)); },
        html! { meta name="theme-color" content=(theme_color); },
    ];
    let mut out = String::new();
    for tag in tags {
        out.push_str(&tag.into_string());
        out.push('\n');
    }
    out
}

pub fn logo_path(config: &FaviconsConfig, variant: &VariantConfig) -> PathBuf {
    config.source.join(&variant.id).join(&config.logo)
}

pub fn variant_dir(config: &FaviconsConfig, variant: &VariantConfig) -> PathBuf {
    config.output.join(&variant.id)
}

/// Write every artifact for one variant.
pub fn generate_variant(
    config: &FaviconsConfig,
    variant: &VariantConfig,
) -> Result<Vec<Written>, FaviconError> {
    let logo = logo_path(config, variant);
    let raw = fs::read_to_string(&logo).map_err(|source| FaviconError::Logo {
        path: logo.clone(),
        source,
    })?;
    let background = parse_hex_color(&config.manifest.background_color)
        .ok_or_else(|| FaviconError::Color(config.manifest.background_color.clone()))?;
    parse_hex_color(&variant.color).ok_or_else(|| FaviconError::Color(variant.color.clone()))?;
    let dir = variant_dir(config, variant);
    let mut written = Vec::new();

    let icon_svg = if config.raw_icon_svg {
        raw.clone()
    } else {
        light_optimizer().optimize(&raw)?
    };
    written.push(write_output(&dir.join(ICON_SVG), icon_svg.as_bytes())?);

    let mut ico_frames = Vec::with_capacity(ICO_SIZES.len());
    for raster in RASTERS {
        let img = rasterize_svg(&raw, raster.size, raster.opaque.then_some(background))?;
        written.push(write_output(&dir.join(raster.name), &encode_png(&img)?)?);
        if !raster.opaque && ICO_SIZES.contains(&raster.size) {
            ico_frames.push(img);
        }
    }
    written.push(write_output(&dir.join(ICO), &pack_ico(&ico_frames)?)?);

    written.push(write_output(
        &dir.join(PINNED_TAB),
        to_monochrome(&icon_svg).as_bytes(),
    )?);

    let manifest = serde_json::to_string_pretty(&WebManifest::new(&config.manifest, &variant.color))?;
    written.push(write_output(&dir.join(MANIFEST), manifest.as_bytes())?);

    written.push(write_output(
        &dir.join(HEAD),
        head_fragment(&config.href_prefix, &variant.color).as_bytes(),
    )?);

    log::debug!("{}: wrote {} file(s) to {}", variant.id, written.len(), dir.display());
    Ok(written)
}

/// Run `generate` for one variant, containing errors and panics to it.
fn variant_result(
    config: &FaviconsConfig,
    variant: &VariantConfig,
    generate: impl FnOnce(&FaviconsConfig, &VariantConfig) -> Result<Vec<Written>, FaviconError>,
) -> TransformResult {
    let input = logo_path(config, variant);
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| generate(config, variant)))
        .unwrap_or_else(|payload| Err(FaviconError::Panicked(panic_message(&*payload))));
    let outcome = match attempt {
        Ok(written) => Outcome::Written(written),
        Err(err) => {
            log::error!("{}: favicon generation failed: {}", input.display(), err);
            Outcome::Failed {
                error: err.to_string(),
                fallback: None,
            }
        }
    };
    TransformResult {
        relative: Path::new(&variant.id).join(&config.logo),
        input,
        transform: FAMILY,
        outcome,
        fingerprint: None,
    }
}

/// Regenerate every variant into a freshly reset output root.
pub fn run(
    config: &FaviconsConfig,
    concurrency: usize,
    events: Option<Sender<PipelineEvent>>,
) -> Result<BatchReport, FaviconError> {
    sync::guard(&config.source, &config.output)?;
    sync::reset(&config.output)?;

    let workers = pool::effective_workers(concurrency, config.variants.len());
    log::info!(
        "{}: {} variant(s) from {} with {} worker(s)",
        FAMILY,
        config.variants.len(),
        config.source.display(),
        workers
    );
    if let Some(tx) = &events {
        tx.send(PipelineEvent::Started {
            family: FAMILY,
            items: config.variants.len(),
            workers,
        })
        .ok();
    }

    let results = pool::run(&config.variants, concurrency, |variant| {
        let result = variant_result(config, variant, generate_variant);
        if let Some(tx) = &events {
            tx.send(PipelineEvent::Item(result.clone())).ok();
        }
        result
    })?;
    Ok(BatchReport::new(FAMILY, results))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_variant_is_reported_failed() {
        let config = FaviconsConfig::default();
        let variant = VariantConfig {
            id: "dark".to_string(),
            color: "#000000".to_string(),
        };

        let result = variant_result(&config, &variant, |_, _| panic!("encoder exploded"));

        assert_eq!(result.relative, Path::new("dark").join(&config.logo));
        match result.outcome {
            Outcome::Failed { error, fallback } => {
                assert!(error.contains("encoder exploded"), "{error}");
                assert!(fallback.is_none());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn monochrome_strips_fills_and_adds_style() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><rect fill="#f00" width="10" height="10"/><circle fill="none" r="2"/></svg>"##;
        let out = to_monochrome(svg);
        assert!(!out.contains("fill=\""));
        assert!(out.starts_with(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10"><style>*{fill:currentColor}</style><rect"#
        ));
    }

    #[test]
    fn monochrome_extends_existing_style() {
        let svg = r#"<svg><style type="text/css">.a{stroke:red}</style><path class="a" fill="red"/></svg>"#;
        let out = to_monochrome(svg);
        assert_eq!(
            out,
            "<svg><style type=\"text/css\">\n*{fill:currentColor}.a{stroke:red}</style><path class=\"a\"/></svg>"
        );
    }

    #[test]
    fn monochrome_keeps_fill_like_attributes() {
        let out = to_monochrome(r#"<svg><path fill-rule="evenodd" fill="red"/></svg>"#);
        assert!(out.contains(r#"fill-rule="evenodd""#));
    }

    #[test]
    fn manifest_fields_in_order() {
        let manifest = WebManifest::new(&ManifestConfig::default(), "#0b4f60");
        let json = serde_json::to_string_pretty(&manifest).unwrap();
        let keys: Vec<&str> = [
            "\"name\"",
            "\"short_name\"",
            "\"start_url\"",
            "\"orientation\"",
            "\"description\"",
            "\"icons\"",
            "\"theme_color\"",
            "\"background_color\"",
            "\"display\"",
        ]
        .into_iter()
        .collect();
        let positions: Vec<usize> = keys.iter().map(|k| json.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(json.contains("\"theme_color\": \"#0b4f60\""));
        assert!(json.contains("\"type\": \"image/png\""));
        assert_eq!(manifest.icons.len(), 2);
        assert_eq!(manifest.icons[1].sizes, "512x512");
    }

    #[test]
    fn head_fragment_links_every_artifact() {
        let head = head_fragment("/favicons/", "#d58a8b");
        for name in [ICO, ICON_SVG, "favicon-32x32.png", "apple-touch-icon.png", PINNED_TAB, MANIFEST] {
            assert!(head.contains(&format!("href=\"/favicons/{name}\"")), "{name}");
        }
        assert!(head.contains(r##"<meta name="theme-color" content="#d58a8b">"##));
        assert_eq!(head.lines().count(), 8);
    }

    #[test]
    fn light_optimizer_keeps_geometry_attributes() {
        let svg = r#"<?xml version="1.0"?><!-- made by hand --><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 24 24" width="24" height="24"><defs><clipPath id="c"><rect width="24" height="24"/></clipPath></defs><g clip-path="url(#c)"><path d="M0 0h24"/></g></svg>"#;
        let out = light_optimizer().optimize(svg).unwrap();
        assert!(!out.contains("<?xml"));
        assert!(!out.contains("made by hand"));
        assert!(out.contains(r#"viewBox="0 0 24 24""#));
        assert!(out.contains(r#"id="c""#));
        assert!(out.contains("url(#c)"));
    }
}
