//! Output path mapping.
//!
//! Every output mirrors its input: the path relative to the source root is
//! re-rooted under the output root, optionally with a new extension.
//!
//! ```text
//! src/images/team/a.png   →  dist/images/team/a.png
//!                         →  dist/images/team/a.avif   (extension override)
//! ```
//!
//! Mapping is purely lexical. Nothing here touches the filesystem.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PathError {
    #[error("{input} is not inside source root {root}")]
    OutsideRoot { input: PathBuf, root: PathBuf },
}

/// Path of `input` relative to `source_root`.
///
/// The input must name something strictly below the root.
pub fn relative<'a>(input: &'a Path, source_root: &Path) -> Result<&'a Path, PathError> {
    match input.strip_prefix(source_root) {
        Ok(rel) if !rel.as_os_str().is_empty() => Ok(rel),
        _ => Err(PathError::OutsideRoot {
            input: input.to_path_buf(),
            root: source_root.to_path_buf(),
        }),
    }
}

/// Compute the mirrored output path for `input`.
///
/// With `extension` set, the final extension is replaced (a leading dot is
/// tolerated). Only the last extension changes, so `a.min.css` with `"gz"`
/// becomes `a.min.gz`.
pub fn map_output(
    input: &Path,
    source_root: &Path,
    output_root: &Path,
    extension: Option<&str>,
) -> Result<PathBuf, PathError> {
    let rel = relative(input, source_root)?;
    let mut output = output_root.join(rel);
    if let Some(ext) = extension {
        output.set_extension(ext.trim_start_matches('.'));
    }
    Ok(output)
}

/// Lowercased extension of `path`, if it has one.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mirrors_relative_position() {
        let out = map_output(
            Path::new("src/images/team/a.png"),
            Path::new("src/images"),
            Path::new("dist/images"),
            None,
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/images/team/a.png"));
    }

    #[test]
    fn replaces_extension() {
        let out = map_output(
            Path::new("src/images/team/a.png"),
            Path::new("src/images"),
            Path::new("dist/images"),
            Some("avif"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/images/team/a.avif"));
    }

    #[test]
    fn leading_dot_in_override_is_ignored() {
        let out = map_output(
            Path::new("src/a.ttf"),
            Path::new("src"),
            Path::new("dist"),
            Some(".woff2"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/a.woff2"));
    }

    #[test]
    fn only_last_extension_changes() {
        let out = map_output(
            Path::new("src/fonts/Inter-VariableFont_opsz,wght.ttf"),
            Path::new("src/fonts"),
            Path::new("dist/fonts"),
            Some("woff2"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/fonts/Inter-VariableFont_opsz,wght.woff2"));

        let out = map_output(
            Path::new("src/base/min.css"),
            Path::new("src"),
            Path::new("dist"),
            Some("map"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/base/min.map"));
    }

    #[test]
    fn file_without_extension_gains_one() {
        let out = map_output(
            Path::new("src/LICENSE"),
            Path::new("src"),
            Path::new("dist"),
            Some("txt"),
        )
        .unwrap();
        assert_eq!(out, PathBuf::from("dist/LICENSE.txt"));
    }

    #[test]
    fn sibling_with_shared_prefix_is_outside() {
        let err = map_output(
            Path::new("src/images2/a.png"),
            Path::new("src/images"),
            Path::new("dist"),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, PathError::OutsideRoot { .. }));
    }

    #[test]
    fn root_itself_is_not_a_mappable_input() {
        assert!(relative(Path::new("src"), Path::new("src")).is_err());
    }

    #[test]
    fn distinct_inputs_map_to_distinct_outputs() {
        let inputs = ["a.png", "b/a.png", "b/c/a.png", "a.jpg", "A.png"];
        let mut outputs: Vec<PathBuf> = inputs
            .iter()
            .map(|i| {
                map_output(
                    &Path::new("src").join(i),
                    Path::new("src"),
                    Path::new("out"),
                    None,
                )
                .unwrap()
            })
            .collect();
        for out in &outputs {
            assert!(out.starts_with("out"));
        }
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), inputs.len());
    }

    #[test]
    fn extension_of_lowercases() {
        assert_eq!(extension_of(Path::new("a/B.JPG")), Some("jpg".to_string()));
        assert_eq!(extension_of(Path::new("a/README")), None);
    }
}
