//! Stylesheet bundling and minification.
//!
//! Each `.css` input is treated as an entry point: its `@import`s are
//! inlined, syntax is lowered for the configured browserslist targets, and
//! the result is minified (comments dropped) and written to the mirrored
//! path with a trailing newline.
//!
//! Relative `url()`s in imported sheets are rebased onto the entry's
//! directory, so `base/min.css` importing `../partials/hero.css` turns
//! `url(img/bg.png)` into `url(../partials/img/bg.png)`. Absolute, rooted,
//! fragment-only and scheme URLs are left alone.

use crate::config::{ConfigError, StylesConfig};
use crate::dispatch::{Dispatcher, Job, TransformError, Transformer, Written, write_output};
use crate::paths::PathError;
use lightningcss::bundler::{Bundler, FileProvider};
use lightningcss::rules::CssRule;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions};
use lightningcss::targets::{Browsers, Targets};
use lightningcss::values::url::Url;
use lightningcss::visit_types;
use lightningcss::visitor::{Visit, VisitTypes, Visitor};
use std::convert::Infallible;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CssTransformer {
    queries: Vec<String>,
    targets: Targets,
}

impl CssTransformer {
    /// Resolve browserslist `queries` up front so a bad query fails the
    /// run before any work starts.
    pub fn new(queries: &[String]) -> Result<Self, ConfigError> {
        let targets = if queries.is_empty() {
            Targets::default()
        } else {
            Browsers::from_browserslist(queries)
                .map_err(|e| {
                    ConfigError::Validation(format!("styles.targets: {e}"))
                })?
                .map(Targets::from)
                .unwrap_or_default()
        };
        Ok(Self {
            queries: queries.to_vec(),
            targets,
        })
    }
}

impl Transformer for CssTransformer {
    fn name(&self) -> &'static str {
        "css"
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        Ok(vec![job.target(None)?])
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        let css = bundle_css(job.input, self.targets)?;
        Ok(vec![write_output(&job.target(None)?, css.as_bytes())?])
    }

    fn params(&self) -> String {
        format!("css:{}", self.queries.join(","))
    }
}

/// Inline `@import`s of `entry`, lower for `targets` and minify.
pub fn bundle_css(entry: &Path, targets: Targets) -> Result<String, TransformError> {
    let provider = FileProvider::new();
    let mut bundler = Bundler::new(&provider, None, ParserOptions::default());
    let mut stylesheet = bundler
        .bundle(entry)
        .map_err(|e| TransformError::Css(e.to_string()))?;
    let mut rebaser = UrlRebaser::new(entry, stylesheet.sources.clone());
    let Ok(()) = stylesheet.visit(&mut rebaser);
    stylesheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| TransformError::Css(e.to_string()))?;
    let printed = stylesheet
        .to_css(PrinterOptions {
            minify: true,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| TransformError::Css(e.to_string()))?;

    let mut code = printed.code;
    if !code.ends_with('\n') {
        code.push('\n');
    }
    Ok(code)
}

/// Points `url()`s of every bundled sheet at the same file as seen from
/// the entry's directory.
struct UrlRebaser {
    entry_dir: PathBuf,
    /// Bundled file paths, indexed by `Location::source_index`.
    sources: Vec<String>,
    /// Directory of the sheet the rule being visited came from.
    sheet_dir: Option<PathBuf>,
}

impl UrlRebaser {
    fn new(entry: &Path, sources: Vec<String>) -> Self {
        Self {
            entry_dir: lexical(entry.parent().unwrap_or(Path::new(""))),
            sources,
            sheet_dir: None,
        }
    }
}

impl<'i> Visitor<'i> for UrlRebaser {
    type Error = Infallible;

    fn visit_types(&self) -> VisitTypes {
        visit_types!(RULES | URLS)
    }

    fn visit_rule(&mut self, rule: &mut CssRule<'i>) -> Result<(), Self::Error> {
        let source = match rule {
            CssRule::Style(r) => Some(r.loc.source_index),
            CssRule::FontFace(r) => Some(r.loc.source_index),
            CssRule::Page(r) => Some(r.loc.source_index),
            CssRule::Keyframes(r) => Some(r.loc.source_index),
            CssRule::Media(r) => Some(r.loc.source_index),
            CssRule::Supports(r) => Some(r.loc.source_index),
            _ => None,
        };
        if let Some(index) = source {
            self.sheet_dir = self
                .sources
                .get(index as usize)
                .map(|sheet| lexical(Path::new(sheet).parent().unwrap_or(Path::new(""))));
        }
        rule.visit_children(self)
    }

    fn visit_url(&mut self, url: &mut Url<'i>) -> Result<(), Self::Error> {
        if let Some(sheet_dir) = &self.sheet_dir
            && let Some(rebased) = rebase_url(&url.url, sheet_dir, &self.entry_dir)
        {
            url.url = rebased.into();
        }
        Ok(())
    }
}

/// Rewrite `url`, relative to `sheet_dir`, so it is relative to
/// `entry_dir` instead. `None` when it needs no change.
pub fn rebase_url(url: &str, sheet_dir: &Path, entry_dir: &Path) -> Option<String> {
    if sheet_dir == entry_dir || !is_relative_url(url) {
        return None;
    }
    let split = url.find(['?', '#']).unwrap_or(url.len());
    let (path, suffix) = url.split_at(split);

    let mut segments = relative_dir(sheet_dir, entry_dir)?;
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." if segments.last().is_some_and(|s| *s != "..") => {
                segments.pop();
            }
            _ => segments.push(part.to_string()),
        }
    }
    Some(format!("{}{}", segments.join("/"), suffix))
}

fn is_relative_url(url: &str) -> bool {
    if url.is_empty() || url.starts_with(['/', '#']) {
        return false;
    }
    match url.find(':') {
        // A colon after a path separator is part of the path, not a scheme.
        Some(colon) => url[..colon].contains(['/', '?', '#']),
        None => true,
    }
}

/// Path segments leading from `entry_dir` to `sheet_dir`.
fn relative_dir(sheet_dir: &Path, entry_dir: &Path) -> Option<Vec<String>> {
    let sheet: Vec<Component> = sheet_dir.components().collect();
    let entry: Vec<Component> = entry_dir.components().collect();
    let common = sheet.iter().zip(&entry).take_while(|(a, b)| a == b).count();
    let normal = |c: &Component| matches!(c, Component::Normal(_));
    if !entry[common..].iter().all(normal) || !sheet[common..].iter().all(normal) {
        return None;
    }

    let mut segments = vec!["..".to_string(); entry.len() - common];
    segments.extend(
        sheet[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    Some(segments)
}

/// Resolve `.` and `..` without touching the filesystem.
fn lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir
                if matches!(out.components().next_back(), Some(Component::Normal(_))) =>
            {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

pub fn dispatcher(config: &StylesConfig) -> Result<Dispatcher, ConfigError> {
    Ok(Dispatcher::new().route(&["css"], CssTransformer::new(&config.targets)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn imports_are_inlined() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "base.css", ".base { color: red; }\n");
        let entry = write(
            tmp.path(),
            "main.css",
            "@import \"base.css\";\n.main { margin: 0; }\n",
        );

        let css = bundle_css(&entry, Targets::default()).unwrap();
        assert!(!css.contains("@import"));
        assert!(css.contains(".base"));
        assert!(css.contains(".main"));
    }

    #[test]
    fn output_is_minified_with_trailing_newline() {
        let tmp = TempDir::new().unwrap();
        let entry = write(
            tmp.path(),
            "a.css",
            "/* banner */\n.a {\n    color: #ff0000;\n    padding: 0px;\n}\n",
        );

        let css = bundle_css(&entry, Targets::default()).unwrap();
        assert!(!css.contains("banner"));
        assert!(!css.contains("\n    "));
        assert!(css.ends_with('\n'));
        assert_eq!(css.matches('\n').count(), 1);
    }

    #[test]
    fn imported_urls_are_rebased_onto_the_entry() {
        let tmp = TempDir::new().unwrap();
        write(
            tmp.path(),
            "partials/hero.css",
            ".hero { background: url(img/bg.png); }\n.cdn { background: url(https://cdn.example/x.png); }\n",
        );
        let entry = write(
            tmp.path(),
            "base/min.css",
            "@import \"../partials/hero.css\";\n.own { background: url(local.png); }\n",
        );

        let css = bundle_css(&entry, Targets::default()).unwrap();
        assert!(css.contains("url(../partials/img/bg.png)"), "{css}");
        assert!(css.contains("https://cdn.example/x.png"), "{css}");
        assert!(css.contains("url(local.png)"), "{css}");
    }

    #[test]
    fn rebase_url_walks_between_directories() {
        let entry = Path::new("/site/base");
        let partials = Path::new("/site/partials");
        assert_eq!(
            rebase_url("img/bg.png", partials, entry).as_deref(),
            Some("../partials/img/bg.png")
        );
        assert_eq!(
            rebase_url("../fonts/a.woff2?v=2#x", partials, entry).as_deref(),
            Some("../fonts/a.woff2?v=2#x")
        );
        assert_eq!(
            rebase_url("bg.png", Path::new("/site/base/deep"), entry).as_deref(),
            Some("deep/bg.png")
        );
        assert_eq!(rebase_url("img/bg.png", entry, entry), None);
    }

    #[test]
    fn rebase_url_leaves_non_relative_urls() {
        let entry = Path::new("/site/base");
        let partials = Path::new("/site/partials");
        for url in ["/abs.png", "#clip", "data:image/png;base64,AAAA", "https://x/y.png", ""] {
            assert_eq!(rebase_url(url, partials, entry), None, "{url}");
        }
    }

    #[test]
    fn lexical_resolves_parent_components() {
        assert_eq!(lexical(Path::new("/a/base/../partials/./x")), PathBuf::from("/a/partials/x"));
        assert_eq!(lexical(Path::new("../../a")), PathBuf::from("../../a"));
    }

    #[test]
    fn syntax_error_is_a_transform_error() {
        let tmp = TempDir::new().unwrap();
        let entry = write(tmp.path(), "bad.css", "@import \"missing.css\";\n");
        assert!(matches!(
            bundle_css(&entry, Targets::default()),
            Err(TransformError::Css(_))
        ));
    }

    #[test]
    fn transformer_writes_mirrored_path() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let out = tmp.path().join("out");
        let input = write(&src, "pages/home.css", ".home{display:flex}");

        let transformer = CssTransformer::new(&[]).unwrap();
        let written = transformer.transform(&Job::new(&input, &src, &out)).unwrap();
        assert_eq!(written[0].path, out.join("pages/home.css"));
        assert!(fs::read_to_string(&written[0].path).unwrap().ends_with('\n'));
    }

    #[test]
    fn bad_browserslist_query_is_a_config_error() {
        let result = CssTransformer::new(&["not a real query ???".to_string()]);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn params_include_targets() {
        let a = CssTransformer::new(&["defaults".to_string()]).unwrap();
        let b = CssTransformer::new(&[]).unwrap();
        assert_ne!(a.params(), b.params());
    }
}
