//! Writes a staged case's artifacts next to its fixture for inspection.

use crate::error::HarnessError;
use crate::harness::Artifacts;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// Writes every artifact as `{name}.{ext}` into `dir` and returns the paths
/// written, in order.
///
/// The preprocessed map keeps array mappings so it can be read by eye; the
/// script and stylesheet maps are VLQ-encoded and linked from their code.
pub fn write_artifacts(
    dir: &Utf8Path,
    name: &str,
    artifacts: &Artifacts,
) -> Result<Vec<Utf8PathBuf>, HarnessError> {
    let mut written = Vec::new();
    let mut write = |file: String, contents: String| -> Result<(), HarnessError> {
        let path = dir.join(file);
        fs::write(&path, contents).map_err(|source| HarnessError::Persist {
            path: path.clone(),
            source,
        })?;
        written.push(path);
        Ok(())
    };

    write(
        format!("{name}.svelte"),
        artifacts.preprocessed.code().to_string(),
    )?;
    if let Some(map) = &artifacts.preprocessed.map {
        write(
            format!("{name}.svelte.map"),
            map.to_raw_decoded().to_json_pretty(),
        )?;
    }

    write(
        format!("{name}.js"),
        format!(
            "{}\n//# sourceMappingURL={name}.js.map",
            artifacts.js.code()
        ),
    )?;
    if let Some(map) = &artifacts.js.map {
        write(format!("{name}.js.map"), map.to_raw().to_json_pretty())?;
    }

    if !artifacts.css.code().is_empty() {
        write(
            format!("{name}.css"),
            format!(
                "{}\n/*# sourceMappingURL={name}.css.map */",
                artifacts.css.code()
            ),
        )?;
        if let Some(map) = &artifacts.css.map {
            write(format!("{name}.css.map"), map.to_raw().to_json_pretty())?;
        }
    }

    Ok(written)
}
