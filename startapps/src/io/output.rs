//! Writes rendered documents to the output directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::io::config::OutputFormat;
use crate::io::render::OutputDocument;

/// Write every `(path, document)` pair as `<path joined by _>.<ext>` files.
///
/// One file is written per configured format the document has a rendering
/// for. Existing files are overwritten. Returns the number of files written.
pub fn write_outputs<I>(outdir: &Path, documents: I, formats: &[OutputFormat]) -> Result<usize>
where
    I: IntoIterator<Item = Result<(Vec<String>, OutputDocument)>>,
{
    fs::create_dir_all(outdir)
        .with_context(|| format!("create output directory {}", outdir.display()))?;

    let mut written = 0;
    for entry in documents {
        let (path, document) = entry?;
        if let Some(bad) = path.iter().find(|part| !is_plain_component(part)) {
            bail!("refusing to write document with path component '{bad}'");
        }
        let stem = path.join("_");
        for output in formats {
            let Some(contents) = document.get(output.format) else {
                continue;
            };
            let file = outdir.join(format!("{stem}.{}", output.extension));
            fs::write(&file, contents).with_context(|| format!("write {}", file.display()))?;
            debug!(
                file = %file.display(),
                title = document.title.as_deref().unwrap_or(""),
                "wrote document"
            );
            written += 1;
        }
    }
    info!(outdir = %outdir.display(), files = written, "outputs written");
    Ok(written)
}

/// A path component that stays inside the output directory once joined.
fn is_plain_component(part: &str) -> bool {
    !part.is_empty() && part != "." && part != ".." && !part.contains(['/', '\\'])
}
