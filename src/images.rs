//! Image family transforms.
//!
//! | Extensions | Transformer | Outputs |
//! |---|---|---|
//! | `jpg jpeg png` | [`RasterTransformer`] | `.avif`, `.webp`, re-encoded original |
//! | `svg` | [`SvgTransformer`] | optimized `.svg` |
//! | `json webmanifest` | [`JsonMinifier`] | compact JSON |
//!
//! Anything else under the images root is copied through.

use crate::config::ImagesConfig;
use crate::dispatch::{Dispatcher, Job, TransformError, Transformer, Written, write_output};
use crate::imaging::{ImageBackend, RasterSettings, RustBackend, create_variants, plan_raster};
use crate::paths::PathError;
use crate::svg::{SvgError, SvgOptimizer};
use std::fs;
use std::path::PathBuf;

pub const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];
pub const SVG_EXTENSIONS: &[&str] = &["svg"];
pub const JSON_EXTENSIONS: &[&str] = &["json", "webmanifest"];

pub struct RasterTransformer<B: ImageBackend> {
    backend: B,
    settings: RasterSettings,
}

impl<B: ImageBackend> RasterTransformer<B> {
    pub fn new(backend: B, settings: RasterSettings) -> Self {
        Self { backend, settings }
    }
}

impl<B: ImageBackend> Transformer for RasterTransformer<B> {
    fn name(&self) -> &'static str {
        "raster"
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        let plan = plan_raster(job, &self.settings)?;
        let mut outputs: Vec<PathBuf> = plan.encode.targets.into_iter().map(|t| t.output).collect();
        if plan.copy_original {
            outputs.push(job.target(None)?);
        }
        Ok(outputs)
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        create_variants(&self.backend, job, &self.settings)
    }

    fn params(&self) -> String {
        format!("raster:{}", self.settings.describe())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SvgTransformer {
    optimizer: SvgOptimizer,
}

impl SvgTransformer {
    pub fn new(optimizer: SvgOptimizer) -> Self {
        Self { optimizer }
    }
}

impl Transformer for SvgTransformer {
    fn name(&self) -> &'static str {
        "svg"
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        Ok(vec![job.target(None)?])
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        let source = fs::read_to_string(job.input)?;
        let optimized = self.optimizer.optimize(&source)?;
        Ok(vec![write_output(&job.target(None)?, optimized.as_bytes())?])
    }

    fn params(&self) -> String {
        format!("svg:{}", self.optimizer.describe())
    }
}

/// Re-serializes JSON without insignificant whitespace. Key order is kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMinifier;

impl Transformer for JsonMinifier {
    fn name(&self) -> &'static str {
        "json"
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        Ok(vec![job.target(None)?])
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        let value: serde_json::Value = serde_json::from_slice(&fs::read(job.input)?)?;
        let compact = serde_json::to_vec(&value)?;
        Ok(vec![write_output(&job.target(None)?, &compact)?])
    }
}

/// Routing table for the images family. SVG inputs are copied through when
/// `images.svg.enabled` is off.
pub fn dispatcher(config: &ImagesConfig) -> Result<Dispatcher, SvgError> {
    dispatcher_with_backend(config, RustBackend::new())
}

pub fn dispatcher_with_backend(
    config: &ImagesConfig,
    backend: impl ImageBackend + 'static,
) -> Result<Dispatcher, SvgError> {
    let mut dispatcher = Dispatcher::new().route(
        RASTER_EXTENSIONS,
        RasterTransformer::new(backend, RasterSettings::from_config(config)),
    );
    if config.svg.enabled {
        dispatcher = dispatcher.route(
            SVG_EXTENSIONS,
            SvgTransformer::new(SvgOptimizer::from_config(&config.svg)?),
        );
    }
    Ok(dispatcher.route(JSON_EXTENSIONS, JsonMinifier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::COPY;
    use crate::imaging::backend::tests::MockBackend;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(name: &str, content: &[u8]) -> (TempDir, PathBuf, PathBuf, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        let input = src.join(name);
        fs::create_dir_all(input.parent().unwrap()).unwrap();
        fs::write(&input, content).unwrap();
        (tmp, src, out, input)
    }

    #[test]
    fn routes_by_family_table() {
        let dispatcher =
            dispatcher_with_backend(&ImagesConfig::default(), MockBackend::new()).unwrap();
        assert_eq!(dispatcher.select(Path::new("a.JPG")).name(), "raster");
        assert_eq!(dispatcher.select(Path::new("a.svg")).name(), "svg");
        assert_eq!(dispatcher.select(Path::new("site.webmanifest")).name(), "json");
        assert_eq!(dispatcher.select(Path::new("a.gif")).name(), COPY);
    }

    #[test]
    fn disabled_svg_is_copied() {
        let mut config = ImagesConfig::default();
        config.svg.enabled = false;
        let dispatcher = dispatcher_with_backend(&config, MockBackend::new()).unwrap();
        assert_eq!(dispatcher.select(Path::new("a.svg")).name(), COPY);
    }

    #[test]
    fn raster_plan_lists_every_output() {
        let transformer = RasterTransformer::new(MockBackend::new(), RasterSettings::default());
        let job = Job::new(Path::new("/src/a.png"), Path::new("/src"), Path::new("/out"));
        assert_eq!(
            transformer.plan(&job).unwrap(),
            vec![
                PathBuf::from("/out/a.avif"),
                PathBuf::from("/out/a.webp"),
                PathBuf::from("/out/a.png"),
            ]
        );
    }

    #[test]
    fn svg_transform_keeps_view_box() {
        let (_tmp, src, out, input) = setup(
            "icons/check.svg",
            br#"<?xml version="1.0"?><!-- x --><svg xmlns="http://www.w3.org/2000/svg" width="24" height="24" viewBox="0 0 24 24"><path d="M0 0h24v24H0z"/></svg>"#,
        );
        let written = SvgTransformer::new(SvgOptimizer::from_config(&ImagesConfig::default().svg).unwrap())
            .transform(&Job::new(&input, &src, &out))
            .unwrap();
        let svg = fs::read_to_string(&written[0].path).unwrap();
        assert!(svg.contains(r#"viewBox="0 0 24 24""#));
        assert!(!svg.contains("<?xml"));
        assert!(!svg.contains("<!--"));
    }

    #[test]
    fn json_is_compacted_in_key_order() {
        let (_tmp, src, out, input) = setup("data/site.json", b"{\n  \"z\": 1,\n  \"a\": [1, 2]\n}\n");
        let written = JsonMinifier.transform(&Job::new(&input, &src, &out)).unwrap();
        assert_eq!(fs::read_to_string(&written[0].path).unwrap(), r#"{"z":1,"a":[1,2]}"#);
    }

    #[test]
    fn invalid_json_is_a_transform_error() {
        let (_tmp, src, out, input) = setup("bad.json", b"{ nope");
        let result = JsonMinifier.transform(&Job::new(&input, &src, &out));
        assert!(matches!(result, Err(TransformError::Json(_))));
    }
}
