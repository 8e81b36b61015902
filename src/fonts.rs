//! Font subsetting via `fontTools`.
//!
//! Every `ttf`/`otf`/`woff`/`woff2` input is subset to WOFF2 by running the
//! Python `fontTools.subset` module as a child process:
//!
//! ```text
//! python3 -m fontTools.subset <in> --output-file=<out> --flavor=woff2
//!     --no-hinting --layout-features=* --drop-tables+=FFTM,DSIG
//!     (--unicodes=<SUBSET> | --glyphs=*)
//! ```
//!
//! The `STAT` table is kept since variable fonts need it. The unicode range
//! comes from the `SUBSET` environment variable, then `fonts.unicodes`;
//! with neither, every glyph is kept.

use crate::config::FontsConfig;
use crate::dispatch::{Dispatcher, Job, TransformError, Transformer, Written, ensure_parent};
use crate::paths::PathError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Environment variable holding the unicode ranges to keep.
pub const SUBSET_ENV: &str = "SUBSET";

pub const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "woff", "woff2"];

pub fn default_python() -> &'static str {
    if cfg!(windows) { "python" } else { "python3" }
}

/// Resolve the interpreter on `PATH`. An unresolvable name is returned as
/// is so the spawn error names it.
pub fn locate_python(configured: Option<&str>) -> PathBuf {
    let name = configured.unwrap_or(default_python());
    match which::which(name) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("{name} not found on PATH ({e}); font subsetting will fail");
            PathBuf::from(name)
        }
    }
}

/// The environment value wins over the configured one. Blank means unset.
pub fn resolve_unicodes(env: Option<String>, configured: Option<&str>) -> Option<String> {
    let non_blank = |s: &str| {
        let s = s.trim();
        (!s.is_empty()).then(|| s.to_string())
    };
    env.as_deref()
        .and_then(non_blank)
        .or_else(|| configured.and_then(non_blank))
}

/// Arguments passed to the interpreter, `-m` included.
pub fn subset_invocation(input: &Path, output: &Path, unicodes: Option<&str>) -> Vec<OsString> {
    let mut output_arg = OsString::from("--output-file=");
    output_arg.push(output);

    let mut args: Vec<OsString> = vec![
        "-m".into(),
        "fontTools.subset".into(),
        input.as_os_str().to_owned(),
        output_arg,
        "--flavor=woff2".into(),
        "--no-hinting".into(),
        "--layout-features=*".into(),
        "--drop-tables+=FFTM,DSIG".into(),
    ];
    args.push(match unicodes {
        Some(range) => format!("--unicodes={range}").into(),
        None => "--glyphs=*".into(),
    });
    args
}

#[derive(Debug, Clone)]
pub struct FontSubsetter {
    python: PathBuf,
    unicodes: Option<String>,
}

impl FontSubsetter {
    pub fn new(python: PathBuf, unicodes: Option<String>) -> Self {
        Self { python, unicodes }
    }

    pub fn from_config(config: &FontsConfig) -> Self {
        Self::new(
            locate_python(config.python.as_deref()),
            resolve_unicodes(std::env::var(SUBSET_ENV).ok(), config.unicodes.as_deref()),
        )
    }

    pub fn invocation(&self, job: &Job) -> Result<Vec<OsString>, PathError> {
        Ok(subset_invocation(
            job.input,
            &job.target(Some("woff2"))?,
            self.unicodes.as_deref(),
        ))
    }
}

impl Transformer for FontSubsetter {
    fn name(&self) -> &'static str {
        "subset"
    }

    fn plan(&self, job: &Job) -> Result<Vec<PathBuf>, PathError> {
        Ok(vec![job.target(Some("woff2"))?])
    }

    fn transform(&self, job: &Job) -> Result<Vec<Written>, TransformError> {
        let target = job.target(Some("woff2"))?;
        ensure_parent(&target)?;

        let output = Command::new(&self.python).args(self.invocation(job)?).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(TransformError::Font(if detail.is_empty() {
                format!("{} exited with {}", self.python.display(), output.status)
            } else {
                detail.to_string()
            }));
        }
        Ok(vec![Written::from_disk(target)?])
    }

    fn params(&self) -> String {
        format!("subset:{}", self.unicodes.as_deref().unwrap_or("*"))
    }
}

pub fn dispatcher(config: &FontsConfig) -> Dispatcher {
    Dispatcher::new().route(FONT_EXTENSIONS, FontSubsetter::from_config(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn invocation_without_range_keeps_all_glyphs() {
        let args = strings(&subset_invocation(
            Path::new("src/fonts/Inter-VariableFont_opsz,wght.ttf"),
            Path::new("dist/fonts/Inter-VariableFont_opsz,wght.woff2"),
            None,
        ));
        assert_eq!(
            args,
            vec![
                "-m",
                "fontTools.subset",
                "src/fonts/Inter-VariableFont_opsz,wght.ttf",
                "--output-file=dist/fonts/Inter-VariableFont_opsz,wght.woff2",
                "--flavor=woff2",
                "--no-hinting",
                "--layout-features=*",
                "--drop-tables+=FFTM,DSIG",
                "--glyphs=*",
            ]
        );
    }

    #[test]
    fn invocation_with_range_uses_unicodes() {
        let args = strings(&subset_invocation(
            Path::new("a.otf"),
            Path::new("a.woff2"),
            Some("U+0000-00FF,U+0100-024F"),
        ));
        assert_eq!(args.last().unwrap(), "--unicodes=U+0000-00FF,U+0100-024F");
        assert!(!args.iter().any(|a| a == "--glyphs=*"));
    }

    #[test]
    fn env_range_wins_and_blank_is_unset() {
        assert_eq!(
            resolve_unicodes(Some(" U+0020-007E ".into()), Some("U+0000-00FF")),
            Some("U+0020-007E".to_string())
        );
        assert_eq!(
            resolve_unicodes(Some("   ".into()), Some("U+0000-00FF")),
            Some("U+0000-00FF".to_string())
        );
        assert_eq!(resolve_unicodes(None, Some("")), None);
        assert_eq!(resolve_unicodes(None, None), None);
    }

    #[test]
    fn plan_overrides_only_final_extension() {
        let subsetter = FontSubsetter::new(PathBuf::from("python3"), None);
        let job = Job::new(
            Path::new("/src/a/b/Inter-VariableFont_opsz,wght.ttf"),
            Path::new("/src"),
            Path::new("/dist"),
        );
        assert_eq!(
            subsetter.plan(&job).unwrap(),
            vec![PathBuf::from("/dist/a/b/Inter-VariableFont_opsz,wght.woff2")]
        );
    }

    #[test]
    fn params_track_the_range() {
        let all = FontSubsetter::new(PathBuf::from("python3"), None);
        let latin = FontSubsetter::new(PathBuf::from("python3"), Some("U+0000-00FF".into()));
        assert_eq!(all.params(), "subset:*");
        assert_ne!(all.params(), latin.params());
    }

    #[test]
    fn unresolvable_interpreter_is_returned_as_given() {
        let name = format!("no-such-python-{}", std::process::id());
        assert_eq!(locate_python(Some(&name)), PathBuf::from(&name));
    }

    #[test]
    fn missing_interpreter_is_a_transform_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let src = tmp.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        let input = src.join("a.ttf");
        std::fs::write(&input, b"not a font").unwrap();
        let out = tmp.path().join("out");

        let subsetter = FontSubsetter::new(tmp.path().join("no-such-python"), None);
        let result = subsetter.transform(&Job::new(&input, &src, &out));
        assert!(matches!(result, Err(TransformError::Io(_))));
    }
}
