//! Headless office conversion to PDF

use super::PreviewError;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error};

/// Run a command to completion within `timeout`
async fn run(mut command: Command, timeout: Duration, what: &str) -> Result<(), PreviewError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, command.output()).await {
        Err(_) => {
            error!("{} timed out after {:?}", what, timeout);
            return Err(PreviewError::Conversion(format!("{} timed out", what)));
        }
        Ok(Err(e)) => {
            error!("{} could not be started: {}", what, e);
            return Err(PreviewError::Conversion(format!("{} is not available: {}", what, e)));
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        error!("{} failed ({}): {}", what, output.status, stderr.trim());
        return Err(PreviewError::Conversion(format!("{} failed", what)));
    }
    Ok(())
}

/// Convert an office document to PDF in `out_dir`, returning the PDF path
pub async fn office_to_pdf(
    converter: &str,
    input: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> Result<PathBuf, PreviewError> {
    let mut command = Command::new(converter);
    command
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(out_dir)
        .arg(input);
    run(command, timeout, "Office conversion").await?;

    let stem = input
        .file_stem()
        .ok_or_else(|| PreviewError::Conversion("input has no file name".to_string()))?;
    let pdf = out_dir.join(format!("{}.pdf", stem.to_string_lossy()));
    if !pdf.exists() {
        return Err(PreviewError::Conversion("converter produced no PDF".to_string()));
    }
    debug!("Converted {} to {}", input.display(), pdf.display());
    Ok(pdf)
}
