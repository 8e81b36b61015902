//! # webprep
//!
//! Prepares static web assets for deployment: stylesheets, fonts, images,
//! favicons and the PWA manifest. Each asset family mirrors a source tree
//! into an output tree, transforming files on the way.
//!
//! # Architecture: One Parameterized Pipeline
//!
//! Every family is the same pipeline with a different routing table:
//!
//! ```text
//! sync::reset   output root cleared (or pruned afterwards, incremental)
//!     ↓
//! discover      source tree → sorted work list
//!     ↓
//! pool::run     N workers drain the list through one atomic cursor
//!     ↓
//! dispatch      per item: extension → Transformer → mirrored output(s)
//!     ↓
//! BatchReport   one result per input, keyed by path
//! ```
//!
//! A transform failure never aborts the batch: the input is copied
//! unmodified to its mirrored path and reported as failed. Only setup
//! problems (bad config, unreadable source root, overlapping roots, a
//! reset that fails) stop a run before any work starts.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `webprep.toml` loading, stock defaults, merging and validation |
//! | [`discover`] | Recursive source walk with extension and hidden-file filtering |
//! | [`paths`] | Pure source → output path mirroring with extension override |
//! | [`dispatch`] | [`dispatch::Transformer`] trait, routing table, failure containment |
//! | [`pool`] | Bounded worker pool over a pre-enumerated list |
//! | [`sync`] | Output root reset, root overlap guard, stale output pruning |
//! | [`cache`] | Content-hash manifest for incremental runs |
//! | [`pipeline`] | The parameterized run shared by every family |
//! | [`family`] | Family table: roots, routing and run per config section |
//! | [`styles`] | CSS bundling and minification (lightningcss) |
//! | [`fonts`] | WOFF2 subsetting through `fontTools` |
//! | [`images`] | Raster, SVG and JSON transforms |
//! | [`imaging`] | Pure-Rust encode, rasterize and ICO packing |
//! | [`svg`] | Pass-based SVG optimizer |
//! | [`favicons`] | Per-variant favicon set, manifest and `<head>` fragment |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Mirrored Output, One Owner per Path
//!
//! An output path is a pure function of the input path: the relative path
//! under the source root, re-rooted under the output root, with at most the
//! final extension replaced. When two inputs plan the same file (`a.png`
//! and `a.jpg` both become `a.avif`; `hero.png` derives a `hero.webp` that
//! also ships as a source), the input whose mirrored path it is keeps it,
//! else the first in work-list order. The other input skips that output and
//! is copied through when nothing else is left for it to write.
//!
//! ## Clean by Default, Incremental on Request
//!
//! A normal run deletes the output root and rebuilds it, so stale outputs
//! can never survive. With `--incremental`, inputs whose content and
//! transform parameters match the previous run's cache are skipped, and
//! anything the run did not produce or confirm is pruned afterwards.
//!
//! ## Pure-Rust Imaging
//!
//! Raster re-encoding, SVG rendering and ICO packing use the `image` and
//! `resvg` crates. The only external process is the font subsetter.

pub mod cache;
pub mod config;
pub mod discover;
pub mod dispatch;
pub mod family;
pub mod favicons;
pub mod fonts;
pub mod images;
pub mod imaging;
pub mod output;
pub mod paths;
pub mod pipeline;
pub mod pool;
pub mod styles;
pub mod svg;
pub mod sync;
