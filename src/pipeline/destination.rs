//! Output path resolution.
//!
//! By default an export lands next to its source with the extension swapped
//! (`/docs/readme.md` + pdf → `/docs/readme.pdf`). An output-directory
//! override changes the directory only:
//!
//! | Override | Behaviour |
//! |----------|-----------|
//! | none / empty | next to the source |
//! | `~/out` | expanded to the home directory, created if absent |
//! | `/abs/out` | must exist, otherwise the job fails |
//! | `rel/out` | resolved against the source directory, must exist |

use crate::config::ExportFormat;
use crate::error::JobError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Compute the destination for `format`, using the real home directory.
pub async fn resolve_output_path(
    source: &Path,
    format: ExportFormat,
    output_dir: Option<&str>,
) -> Result<PathBuf, JobError> {
    resolve_output_path_with_home(source, format, output_dir, dirs::home_dir().as_deref()).await
}

/// Same as [`resolve_output_path`] with an explicit home directory.
pub async fn resolve_output_path_with_home(
    source: &Path,
    format: ExportFormat,
    output_dir: Option<&str>,
    home: Option<&Path>,
) -> Result<PathBuf, JobError> {
    let default = source.with_extension(format.extension());

    let Some(dir) = output_dir.map(str::trim).filter(|d| !d.is_empty()) else {
        return Ok(default);
    };
    let file_name = default
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| JobError::Internal {
            detail: format!("source has no file name: '{}'", source.display()),
        })?;

    if let Some(rest) = dir.strip_prefix('~') {
        let home = home.ok_or_else(|| JobError::OutputDirMissing {
            path: PathBuf::from(dir),
        })?;
        let target = home.join(rest.trim_start_matches(['/', '\\']));
        if !is_dir(&target).await {
            info!("Creating output directory {}", target.display());
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| JobError::write_failed(&target, &e))?;
        }
        return Ok(target.join(file_name));
    }

    let target = if Path::new(dir).is_absolute() {
        PathBuf::from(dir)
    } else {
        source
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(dir)
    };
    if !is_dir(&target).await {
        return Err(JobError::OutputDirMissing { path: target });
    }
    debug!("Output directory override: {}", target.display());
    Ok(target.join(file_name))
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_swaps_extension() {
        let p = resolve_output_path_with_home(
            Path::new("/docs/readme.md"),
            ExportFormat::Pdf,
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(p, PathBuf::from("/docs/readme.pdf"));
    }

    #[tokio::test]
    async fn empty_override_is_default() {
        let p = resolve_output_path_with_home(
            Path::new("/docs/readme.md"),
            ExportFormat::Jpeg,
            Some("   "),
            None,
        )
        .await
        .unwrap();
        assert_eq!(p, PathBuf::from("/docs/readme.jpeg"));
    }

    #[tokio::test]
    async fn tilde_override_is_created() {
        let home = tempfile::tempdir().unwrap();
        let p = resolve_output_path_with_home(
            Path::new("/docs/readme.md"),
            ExportFormat::Pdf,
            Some("~/out/nested"),
            Some(home.path()),
        )
        .await
        .unwrap();
        assert_eq!(p, home.path().join("out/nested/readme.pdf"));
        assert!(home.path().join("out/nested").is_dir());
    }

    #[tokio::test]
    async fn missing_absolute_override_fails() {
        let err = resolve_output_path_with_home(
            Path::new("/docs/readme.md"),
            ExportFormat::Pdf,
            Some("/definitely/not/a/dir"),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, JobError::OutputDirMissing { .. }));
        assert!(!Path::new("/definitely/not/a/dir").exists());
    }

    #[tokio::test]
    async fn existing_absolute_override() {
        let out = tempfile::tempdir().unwrap();
        let p = resolve_output_path_with_home(
            Path::new("/docs/readme.md"),
            ExportFormat::Png,
            out.path().to_str(),
            None,
        )
        .await
        .unwrap();
        assert_eq!(p, out.path().join("readme.png"));
    }

    #[tokio::test]
    async fn relative_override_resolves_against_source() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("build")).unwrap();
        let source = root.path().join("notes.md");
        let p = resolve_output_path_with_home(&source, ExportFormat::Html, Some("build"), None)
            .await
            .unwrap();
        assert_eq!(p, root.path().join("build/notes.html"));

        let err =
            resolve_output_path_with_home(&source, ExportFormat::Html, Some("missing"), None)
                .await
                .unwrap_err();
        assert!(matches!(err, JobError::OutputDirMissing { .. }));
    }
}
