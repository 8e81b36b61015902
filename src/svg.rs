//! SVG optimizer.
//!
//! A streaming rewrite over `quick-xml` events made of named passes that
//! can be switched on and off individually. Every pass is conservative:
//! it only removes things browsers never render, and it never touches path
//! data or geometry.
//!
//! | Pass | Effect |
//! |------|--------|
//! | `removeXMLProcInst` | drops the `<?xml ...?>` declaration |
//! | `removeDoctype` | drops `<!DOCTYPE ...>` |
//! | `removeComments` | drops `<!-- ... -->` |
//! | `removeMetadata` | drops `<metadata>` subtrees |
//! | `removeEditorsNSData` | drops Inkscape/Sodipodi elements, attributes and namespaces |
//! | `removeEmptyAttrs` | drops attributes with empty values |
//! | `collapseWhitespace` | drops whitespace-only text between elements (not inside text content) |
//! | `removeViewBox` | drops a root `viewBox` that merely repeats `width`/`height` |
//! | `cleanupIds` | drops unreferenced ids, renames referenced ones to short names |
//!
//! `cleanupIds` leaves the document alone when it contains `<style>` or
//! `<script>`, since selectors and scripts may reference ids by name.
//!
//! With `multipass`, the whole pipeline repeats until the output stops
//! changing (bounded by [`MAX_PASSES`]).

use crate::config::SvgConfig;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use thiserror::Error;

/// Upper bound on multipass iterations.
pub const MAX_PASSES: usize = 10;

#[derive(Error, Debug)]
pub enum SvgError {
    #[error("XML parse error {0}")]
    Parse(String),
    #[error("XML write error: {0}")]
    Write(String),
    #[error("SVG is not valid UTF-8")]
    Utf8,
    #[error("unknown SVG pass: {0}")]
    UnknownPass(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SvgPass {
    RemoveXmlProcInst,
    RemoveDoctype,
    RemoveComments,
    RemoveMetadata,
    RemoveEditorsNsData,
    RemoveEmptyAttrs,
    CollapseWhitespace,
    RemoveViewBox,
    CleanupIds,
}

impl SvgPass {
    pub const ALL: [SvgPass; 9] = [
        SvgPass::RemoveXmlProcInst,
        SvgPass::RemoveDoctype,
        SvgPass::RemoveComments,
        SvgPass::RemoveMetadata,
        SvgPass::RemoveEditorsNsData,
        SvgPass::RemoveEmptyAttrs,
        SvgPass::CollapseWhitespace,
        SvgPass::RemoveViewBox,
        SvgPass::CleanupIds,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SvgPass::RemoveXmlProcInst => "removeXMLProcInst",
            SvgPass::RemoveDoctype => "removeDoctype",
            SvgPass::RemoveComments => "removeComments",
            SvgPass::RemoveMetadata => "removeMetadata",
            SvgPass::RemoveEditorsNsData => "removeEditorsNSData",
            SvgPass::RemoveEmptyAttrs => "removeEmptyAttrs",
            SvgPass::CollapseWhitespace => "collapseWhitespace",
            SvgPass::RemoveViewBox => "removeViewBox",
            SvgPass::CleanupIds => "cleanupIds",
        }
    }

    pub fn from_name(name: &str) -> Option<SvgPass> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

const EDITOR_PREFIXES: [&str; 2] = ["inkscape:", "sodipodi:"];
const EDITOR_NAMESPACES: [&str; 2] = ["xmlns:inkscape", "xmlns:sodipodi"];
/// Elements whose text content is rendered or meaningful.
const TEXT_ELEMENTS: [&str; 6] = ["text", "tspan", "textPath", "title", "desc", "style"];

static URL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*['"]?#([^'")\s]+)['"]?\s*\)"#).expect("url() pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvgOptimizer {
    enabled: BTreeSet<SvgPass>,
    multipass: bool,
}

impl Default for SvgOptimizer {
    /// Every pass enabled, multipass on.
    fn default() -> Self {
        Self {
            enabled: SvgPass::ALL.into_iter().collect(),
            multipass: true,
        }
    }
}

impl SvgOptimizer {
    /// Only the given passes.
    pub fn with_passes(passes: &[SvgPass], multipass: bool) -> Self {
        Self {
            enabled: passes.iter().copied().collect(),
            multipass,
        }
    }

    /// Preset defaults with the config's per-pass overrides applied.
    pub fn from_config(config: &SvgConfig) -> Result<Self, SvgError> {
        let mut optimizer = Self {
            multipass: config.multipass,
            ..Self::default()
        };
        for (name, &on) in &config.passes {
            let pass = SvgPass::from_name(name).ok_or_else(|| SvgError::UnknownPass(name.clone()))?;
            if on {
                optimizer.enabled.insert(pass);
            } else {
                optimizer.enabled.remove(&pass);
            }
        }
        Ok(optimizer)
    }

    pub fn is_enabled(&self, pass: SvgPass) -> bool {
        self.enabled.contains(&pass)
    }

    /// Stable description of the enabled passes, for cache keys.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.enabled.iter().map(|p| p.name()).collect();
        format!("multipass={};{}", self.multipass, names.join(","))
    }

    pub fn optimize(&self, svg: &str) -> Result<String, SvgError> {
        let mut current = self.single_pass(svg)?;
        if self.multipass {
            for _ in 1..MAX_PASSES {
                let next = self.single_pass(&current)?;
                if next == current {
                    break;
                }
                current = next;
            }
        }
        Ok(current)
    }

    fn single_pass(&self, svg: &str) -> Result<String, SvgError> {
        let ids = if self.is_enabled(SvgPass::CleanupIds) {
            IdPlan::collect(svg)?
        } else {
            IdPlan::default()
        };

        let mut reader = Reader::from_str(svg);
        let mut writer = Writer::new(Vec::with_capacity(svg.len()));
        let mut skip_depth = 0usize;
        let mut text_depth = 0usize;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| SvgError::Parse(format!("at {}: {e}", reader.error_position())))?;

            if skip_depth > 0 {
                match event {
                    Event::Start(_) => skip_depth += 1,
                    Event::End(_) => skip_depth -= 1,
                    Event::Eof => break,
                    _ => {}
                }
                continue;
            }

            let out = match event {
                Event::Eof => break,
                Event::Decl(_) if self.is_enabled(SvgPass::RemoveXmlProcInst) => continue,
                Event::DocType(_) if self.is_enabled(SvgPass::RemoveDoctype) => continue,
                Event::Comment(_) if self.is_enabled(SvgPass::RemoveComments) => continue,
                Event::Start(e) => {
                    if self.drops_element(&e) {
                        skip_depth = 1;
                        continue;
                    }
                    if is_text_element(&e) {
                        text_depth += 1;
                    }
                    Event::Start(self.rewrite(&e, &ids)?)
                }
                Event::Empty(e) => {
                    if self.drops_element(&e) {
                        continue;
                    }
                    Event::Empty(self.rewrite(&e, &ids)?)
                }
                Event::End(e) => {
                    if TEXT_ELEMENTS.contains(&local_name(e.local_name().as_ref()).as_str()) {
                        text_depth = text_depth.saturating_sub(1);
                    }
                    Event::End(e)
                }
                Event::Text(t)
                    if text_depth == 0
                        && self.is_enabled(SvgPass::CollapseWhitespace)
                        && t.iter().all(|b| b.is_ascii_whitespace()) =>
                {
                    continue;
                }
                other => other,
            };
            writer
                .write_event(out)
                .map_err(|e| SvgError::Write(e.to_string()))?;
        }

        String::from_utf8(writer.into_inner()).map_err(|_| SvgError::Utf8)
    }

    fn drops_element(&self, e: &BytesStart) -> bool {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        (self.is_enabled(SvgPass::RemoveMetadata) && local_name(e.local_name().as_ref()) == "metadata")
            || (self.is_enabled(SvgPass::RemoveEditorsNsData)
                && EDITOR_PREFIXES.iter().any(|p| name.starts_with(p)))
    }

    fn rewrite(&self, e: &BytesStart, ids: &IdPlan) -> Result<BytesStart<'static>, SvgError> {
        let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let mut attrs: Vec<(String, String)> = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| SvgError::Parse(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = String::from_utf8_lossy(&attr.value).into_owned();
            attrs.push((key, value));
        }

        if self.is_enabled(SvgPass::RemoveEditorsNsData) {
            attrs.retain(|(k, _)| {
                !EDITOR_PREFIXES.iter().any(|p| k.starts_with(p))
                    && !EDITOR_NAMESPACES.contains(&k.as_str())
            });
        }
        if self.is_enabled(SvgPass::RemoveEmptyAttrs) {
            attrs.retain(|(_, v)| !v.is_empty());
        }
        if self.is_enabled(SvgPass::RemoveViewBox) && name == "svg" && redundant_view_box(&attrs) {
            attrs.retain(|(k, _)| k != "viewBox");
        }
        if self.is_enabled(SvgPass::CleanupIds) && ids.active {
            attrs = attrs
                .into_iter()
                .filter_map(|(k, v)| {
                    if k == "id" {
                        ids.renamed.get(&v).map(|new| (k, new.clone()))
                    } else {
                        let v = ids.rewrite_refs(&k, &v);
                        Some((k, v))
                    }
                })
                .collect();
        }

        let mut out = BytesStart::new(name);
        for (k, v) in &attrs {
            out.push_attribute((k.as_bytes(), v.as_bytes()));
        }
        Ok(out)
    }
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn is_text_element(e: &BytesStart) -> bool {
    TEXT_ELEMENTS.contains(&local_name(e.local_name().as_ref()).as_str())
}

/// `viewBox="0 0 W H"` with unitless (or px) `width="W"` and `height="H"`.
fn redundant_view_box(attrs: &[(String, String)]) -> bool {
    let get = |key: &str| attrs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
    let (Some(view_box), Some(width), Some(height)) = (get("viewBox"), get("width"), get("height"))
    else {
        return false;
    };
    let parts: Vec<f64> = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    let px = |s: &str| s.trim().trim_end_matches("px").parse::<f64>().ok();
    match (parts.as_slice(), px(width), px(height)) {
        ([x, y, w, h], Some(width), Some(height)) => {
            *x == 0.0 && *y == 0.0 && *w == width && *h == height
        }
        _ => false,
    }
}

/// Id renames computed from a full scan of the document.
#[derive(Debug, Default)]
struct IdPlan {
    /// False when the document has `<style>`/`<script>`; ids are then kept.
    active: bool,
    /// Referenced ids and their new short names. Ids absent here are dropped.
    renamed: HashMap<String, String>,
}

impl IdPlan {
    fn collect(svg: &str) -> Result<Self, SvgError> {
        let mut reader = Reader::from_str(svg);
        let mut defined: Vec<String> = Vec::new();
        let mut referenced: HashSet<String> = HashSet::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| SvgError::Parse(format!("at {}: {e}", reader.error_position())))?;
            let element = match event {
                Event::Eof => break,
                Event::Start(e) | Event::Empty(e) => e,
                _ => continue,
            };
            let local = local_name(element.local_name().as_ref());
            if local == "style" || local == "script" {
                return Ok(Self::default());
            }
            for attr in element.attributes() {
                let attr = attr.map_err(|err| SvgError::Parse(err.to_string()))?;
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = String::from_utf8_lossy(&attr.value).into_owned();
                if key == "id" {
                    if !defined.contains(&value) {
                        defined.push(value);
                    }
                    continue;
                }
                for cap in URL_REF.captures_iter(&value) {
                    referenced.insert(cap[1].to_string());
                }
                if is_href(&key)
                    && let Some(target) = value.strip_prefix('#')
                {
                    referenced.insert(target.to_string());
                }
            }
        }

        let renamed = defined
            .into_iter()
            .filter(|id| referenced.contains(id))
            .enumerate()
            .map(|(n, id)| (id, short_id(n)))
            .collect();
        Ok(Self {
            active: true,
            renamed,
        })
    }

    fn rewrite_refs(&self, key: &str, value: &str) -> String {
        if is_href(key)
            && let Some(target) = value.strip_prefix('#')
        {
            return match self.renamed.get(target) {
                Some(new) => format!("#{new}"),
                None => value.to_string(),
            };
        }
        if !value.contains("url(") {
            return value.to_string();
        }
        URL_REF
            .replace_all(value, |caps: &regex::Captures| match self.renamed.get(&caps[1]) {
                Some(new) => format!("url(#{new})"),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

fn is_href(key: &str) -> bool {
    key == "href" || key == "xlink:href"
}

/// `0 → a`, `25 → z`, `26 → A`, `51 → Z`, `52 → aa`, ...
fn short_id(mut n: usize) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut out = Vec::new();
    loop {
        out.push(ALPHABET[n % ALPHABET.len()]);
        n /= ALPHABET.len();
        if n == 0 {
            break;
        }
        n -= 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}
