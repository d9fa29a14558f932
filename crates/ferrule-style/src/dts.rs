//! TypeScript declaration files for CSS Modules.
//!
//! For every transpiled stylesheet in the staging tree, emits a co-located
//! `<name>.css.d.ts` so the type checker sees one typed property per class.

use std::fs;
use std::path::Path;

use walkdir::WalkDir;

use crate::classmap::class_identifiers;
use crate::transpile::StyleError;

/// Generate the declaration source for one stylesheet.
///
/// `origin` names the stylesheet in collision warnings.
pub fn generate(css: &str, origin: &str) -> String {
    let idents = class_identifiers(css, origin);

    let mut out = String::from("declare const styles: {\n");
    for ident in idents.keys() {
        if is_valid_identifier(ident) {
            out.push_str(&format!("  readonly {ident}: string;\n"));
        } else {
            out.push_str(&format!("  readonly {ident:?}: string;\n"));
        }
    }
    out.push_str("};\nexport default styles;\n");
    out
}

/// Write a declaration file next to every `*.css` under the staging tree.
/// Returns the number of declarations written.
pub fn write_declarations(staging_root: &Path) -> Result<usize, StyleError> {
    let mut written = 0;

    for entry in WalkDir::new(staging_root)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "css"))
    {
        let path = entry.path();
        let css = fs::read_to_string(path).map_err(|e| StyleError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let origin = path
            .strip_prefix(staging_root)
            .unwrap_or(path)
            .display()
            .to_string();

        let declaration = generate(&css, &origin);

        let mut target = path.as_os_str().to_os_string();
        target.push(".d.ts");
        fs::write(&target, declaration).map_err(|e| StyleError::Write {
            path: Path::new(&target).display().to_string(),
            message: e.to_string(),
        })?;

        written += 1;
    }

    Ok(written)
}

fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
