//! Copy steps: script sources into the staging tree, static files into the
//! output tree.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::builder::BuildError;

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx"];

/// Copy the script sources from the source tree into the staging tree,
/// preserving the directory layout. Returns the number of files copied.
pub fn stage_sources(source_root: &Path, staging_root: &Path) -> Result<usize, BuildError> {
    let mut copied = 0;

    for entry in WalkDir::new(source_root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
    {
        let path = entry.path();
        let is_source = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
        if !is_source {
            continue;
        }

        copy_into(path, source_root, staging_root)?;
        copied += 1;
    }

    Ok(copied)
}

/// Copy the HTML shell and the static assets into the output tree. Returns
/// the number of files copied. A missing shell is an error; a missing assets
/// directory just means there are none.
pub fn copy_static(
    source_root: &Path,
    output_root: &Path,
    html: &Path,
    assets_dir: &Path,
) -> Result<usize, BuildError> {
    let mut copied = 0;

    let shell = source_root.join(html);
    copy_into(&shell, source_root, output_root)?;
    copied += 1;

    let assets_root = source_root.join(assets_dir);
    if assets_root.is_dir() {
        for entry in WalkDir::new(&assets_root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
        {
            copy_into(entry.path(), source_root, output_root)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Copy one file, recreating its path relative to `from_root` under
/// `to_root`.
fn copy_into(path: &Path, from_root: &Path, to_root: &Path) -> Result<(), BuildError> {
    let relative = path.strip_prefix(from_root).unwrap_or(path);
    let target = to_root.join(relative);

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::Write {
            path: parent.display().to_string(),
            message: e.to_string(),
        })?;
    }

    fs::copy(path, &target).map_err(|e| BuildError::Write {
        path: target.display().to_string(),
        message: e.to_string(),
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn stages_only_script_sources() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let staging = temp.path().join("build");
        write(&src.join("index.tsx"), "export {};\n");
        write(&src.join("Hello/index.tsx"), "export {};\n");
        write(&src.join("Hello/index.styl"), ".hello\n  color red\n");
        write(&src.join("index.html"), "<html></html>\n");

        let copied = stage_sources(&src, &staging).unwrap();

        assert_eq!(copied, 2);
        assert!(staging.join("index.tsx").is_file());
        assert!(staging.join("Hello/index.tsx").is_file());
        assert!(!staging.join("Hello/index.styl").exists());
        assert!(!staging.join("index.html").exists());
    }

    #[test]
    fn copies_shell_and_assets() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("dist");
        write(&src.join("index.html"), "<html></html>\n");
        write(&src.join("assets/logo.svg"), "<svg/>\n");
        write(&src.join("assets/img/bg.png"), "png\n");

        let copied = copy_static(
            &src,
            &out,
            &PathBuf::from("index.html"),
            &PathBuf::from("assets"),
        )
        .unwrap();

        assert_eq!(copied, 3);
        assert!(out.join("index.html").is_file());
        assert!(out.join("assets/logo.svg").is_file());
        assert!(out.join("assets/img/bg.png").is_file());
    }

    #[test]
    fn asset_bytes_survive_the_copy() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        let out = temp.path().join("dist");
        write(&src.join("index.html"), "<html></html>\n");
        write(&src.join("assets/logo.svg"), "<svg viewBox=\"0 0 1 1\"/>\n");

        copy_static(&src, &out, &PathBuf::from("index.html"), &PathBuf::from("assets")).unwrap();

        let before = blake3::hash(&fs::read(src.join("assets/logo.svg")).unwrap());
        let after = blake3::hash(&fs::read(out.join("assets/logo.svg")).unwrap());
        assert_eq!(before, after);
    }

    #[test]
    fn missing_shell_is_an_error() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();

        let err = copy_static(
            &src,
            &temp.path().join("dist"),
            &PathBuf::from("index.html"),
            &PathBuf::from("assets"),
        )
        .unwrap_err();

        assert!(matches!(err, BuildError::Write { .. }), "{err}");
    }
}
