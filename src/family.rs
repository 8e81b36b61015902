//! Asset families.
//!
//! Every family except favicons is the same [`pipeline::run`] with its own
//! roots and routing table, both derived from its config section:
//!
//! | Family | Config | Routes |
//! |---|---|---|
//! | styles | `[styles]` | `css` → bundle + minify |
//! | fonts | `[fonts]` | `ttf otf woff woff2` → WOFF2 subset |
//! | images | `[images]` | rasters, `svg`, `json` |
//! | favicons | `[favicons]` | one job per brand variant |

use crate::config::{BuildConfig, ConfigError};
use crate::discover::Filter;
use crate::dispatch::{Dispatcher, Job};
use crate::favicons::{self, FaviconError};
use crate::pipeline::{self, BatchReport, PipelineError, PipelineEvent, RunConfig};
use crate::svg::SvgError;
use crate::{fonts, images, styles};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FamilyError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Svg(#[from] SvgError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Favicon(#[from] FaviconError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssetFamily {
    Styles,
    Fonts,
    Images,
    Favicons,
}

impl AssetFamily {
    /// Build order for `webprep build`.
    pub const ALL: [AssetFamily; 4] = [
        AssetFamily::Styles,
        AssetFamily::Fonts,
        AssetFamily::Images,
        AssetFamily::Favicons,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AssetFamily::Styles => "styles",
            AssetFamily::Fonts => "fonts",
            AssetFamily::Images => "images",
            AssetFamily::Favicons => favicons::FAMILY,
        }
    }

    pub fn roots(self, config: &BuildConfig) -> (PathBuf, PathBuf) {
        match self {
            AssetFamily::Styles => (config.styles.source.clone(), config.styles.output.clone()),
            AssetFamily::Fonts => (config.fonts.source.clone(), config.fonts.output.clone()),
            AssetFamily::Images => (config.images.source.clone(), config.images.output.clone()),
            AssetFamily::Favicons => {
                (config.favicons.source.clone(), config.favicons.output.clone())
            }
        }
    }

    /// Pipeline settings, or `None` for favicons which run per variant.
    pub fn run_config(self, config: &BuildConfig, incremental: bool) -> Option<RunConfig> {
        let (extensions, entries) = match self {
            AssetFamily::Styles => (&[][..], config.styles.entries.clone()),
            AssetFamily::Fonts => (&config.fonts.extensions[..], Vec::new()),
            AssetFamily::Images => (&config.images.extensions[..], Vec::new()),
            AssetFamily::Favicons => return None,
        };
        let (source_root, output_root) = self.roots(config);
        let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
        let mut filter = Filter::with_extensions(&extensions);
        filter.include_hidden = config.processing.include_hidden;
        Some(RunConfig {
            family: self.name(),
            source_root,
            output_root,
            filter,
            entries,
            concurrency: config.processing.concurrency,
            incremental: incremental || config.processing.incremental,
        })
    }

    pub fn dispatcher(self, config: &BuildConfig) -> Result<Dispatcher, FamilyError> {
        Ok(match self {
            AssetFamily::Styles => styles::dispatcher(&config.styles)?,
            AssetFamily::Fonts => fonts::dispatcher(&config.fonts),
            AssetFamily::Images => images::dispatcher(&config.images)?,
            AssetFamily::Favicons => Dispatcher::new(),
        })
    }
}

impl fmt::Display for AssetFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Run one family end to end. Setup errors are returned; per-item
/// failures are in the report.
pub fn run(
    family: AssetFamily,
    config: &BuildConfig,
    incremental: bool,
    events: Option<Sender<PipelineEvent>>,
) -> Result<BatchReport, FamilyError> {
    match family.run_config(config, incremental) {
        Some(run_config) => {
            let dispatcher = family.dispatcher(config)?;
            Ok(pipeline::run(&run_config, &dispatcher, events)?)
        }
        None => Ok(favicons::run(
            &config.favicons,
            config.processing.concurrency,
            events,
        )?),
    }
}

/// What a run would pick up, without writing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Survey {
    pub family: AssetFamily,
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    /// Input count per transformer name.
    pub by_transform: BTreeMap<&'static str, usize>,
    /// Inputs a run would fail to read (favicon logos).
    pub missing: Vec<PathBuf>,
}

impl Survey {
    pub fn inputs(&self) -> usize {
        self.by_transform.values().sum::<usize>() + self.missing.len()
    }
}

pub fn survey(family: AssetFamily, config: &BuildConfig) -> Result<Survey, FamilyError> {
    let (source_root, output_root) = family.roots(config);
    let mut by_transform = BTreeMap::new();
    let mut missing = Vec::new();

    match family.run_config(config, false) {
        Some(run_config) => {
            let dispatcher = family.dispatcher(config)?;
            let items = pipeline::work_list(&run_config)?;
            let withheld = pipeline::withheld_outputs(&items, &run_config, &dispatcher)?;
            for item in &items {
                let skip = withheld.get(item).map(Vec::as_slice).unwrap_or(&[]);
                let job = Job::new(item, &run_config.source_root, &run_config.output_root)
                    .withholding(skip);
                *by_transform.entry(dispatcher.select_for(&job).name()).or_insert(0) += 1;
            }
        }
        None => {
            for variant in &config.favicons.variants {
                let logo = favicons::logo_path(&config.favicons, variant);
                if logo.is_file() {
                    *by_transform.entry(favicons::FAMILY).or_insert(0) += 1;
                } else {
                    missing.push(logo);
                }
            }
        }
    }

    Ok(Survey {
        family,
        source_root,
        output_root,
        by_transform,
        missing,
    })
}
