//! Function packaging: one zip archive per source revision, cached on disk.
//!
//! Archives live at `{build_dir}/{revision}.zip` and are never invalidated or pruned.
//! An existing archive for the current revision is reused as-is.

use std::path::{Path, PathBuf};
use std::process::Command;

use async_trait::async_trait;
use aws_lc_rs::digest::{digest, SHA256};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use s_zip::StreamingZipWriter;
use walkdir::WalkDir;

use crate::config::PackagingSettings;
use crate::error::{DeployError, DeployResult};

/// Something that can produce the function's deployment archive.
#[async_trait]
pub trait Packaging: Send + Sync {
    async fn prepare(&self) -> DeployResult<Archive>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub path: PathBuf,
    pub revision: String,
    /// `false` when an archive for this revision was already on disk.
    pub built: bool,
}

impl Archive {
    pub fn read(&self) -> DeployResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|e| DeployError::io("read archive", &self.path, e))
    }

    /// Base64 SHA-256 of the archive, the format Lambda reports as `CodeSha256`.
    pub fn sha256_base64(&self) -> DeployResult<String> {
        let bytes = self.read()?;
        Ok(BASE64_STANDARD.encode(digest(&SHA256, &bytes).as_ref()))
    }
}

/// Current `HEAD` commit id of the repository containing `project_dir`.
pub fn revision(project_dir: &Path) -> DeployResult<String> {
    let repo = git2::Repository::discover(project_dir)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

#[derive(Debug, Clone)]
pub struct Packager {
    settings: PackagingSettings,
}

impl Packager {
    pub fn new(settings: PackagingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PackagingSettings {
        &self.settings
    }

    pub fn archive_path(&self, revision: &str) -> PathBuf {
        self.settings.build_dir.join(format!("{revision}.zip"))
    }

    /// Return the archive for `revision`, building it only if it is not cached.
    pub fn ensure_archive(&self, revision: &str) -> DeployResult<Archive> {
        if revision.is_empty() || !revision.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DeployError::packaging(format!(
                "revision '{revision}' cannot be used as an archive name"
            )));
        }

        let path = self.archive_path(revision);
        if path.is_file() {
            log::info!("Reusing cached archive {}", path.display());
            return Ok(Archive {
                path,
                revision: revision.to_string(),
                built: false,
            });
        }

        self.run_install()?;

        let files = self.collect_files()?;
        std::fs::create_dir_all(&self.settings.build_dir)
            .map_err(|e| DeployError::io("create build directory", &self.settings.build_dir, e))?;

        log::info!(
            "Building {} from {} files in {}",
            path.display(),
            files.len(),
            self.settings.project_dir.display()
        );
        write_then_rename(&path, |partial| self.write_zip(partial, &files))?;

        Ok(Archive {
            path,
            revision: revision.to_string(),
            built: true,
        })
    }

    fn run_install(&self) -> DeployResult<()> {
        let Some((program, args)) = self
            .settings
            .install_command
            .as_ref()
            .and_then(|cmd| cmd.split_first())
        else {
            return Ok(());
        };

        log::info!(
            "Executing `{}` in {}...",
            std::iter::once(program)
                .chain(args)
                .cloned()
                .collect::<Vec<_>>()
                .join(" "),
            self.settings.project_dir.display()
        );
        let output = Command::new(program)
            .args(args)
            .current_dir(&self.settings.project_dir)
            .output()
            .map_err(|e| DeployError::packaging(format!("failed to run '{program}': {e}")))?;

        log::debug!("{}", String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            return Err(DeployError::packaging(format!(
                "'{program}' exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    /// Files to archive, relative to the project directory, sorted.
    fn collect_files(&self) -> DeployResult<Vec<PathBuf>> {
        let project_dir = &self.settings.project_dir;
        let entry = project_dir.join(&self.settings.entry_file);
        if !entry.is_file() {
            return Err(DeployError::packaging(format!(
                "entry file {} does not exist",
                entry.display()
            )));
        }

        let mut files = vec![self.settings.entry_file.clone()];
        for include in &self.settings.include {
            let root = project_dir.join(include);
            if !root.exists() {
                log::warn!("Include path {} does not exist, skipping", root.display());
                continue;
            }
            // Symlinked packages are archived with their target's contents
            for item in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
                let item = item.map_err(|e| {
                    DeployError::packaging(format!("failed to walk {}: {e}", root.display()))
                })?;
                if !item.file_type().is_file() {
                    continue;
                }
                let relative = item.path().strip_prefix(project_dir).map_err(|e| {
                    DeployError::packaging(format!(
                        "{} is outside the project directory: {e}",
                        item.path().display()
                    ))
                })?;
                files.push(relative.to_path_buf());
            }
        }

        files.sort();
        files.dedup();
        Ok(files)
    }

    fn write_zip(&self, output: &Path, files: &[PathBuf]) -> DeployResult<()> {
        let mut writer = StreamingZipWriter::new(output)?;
        for relative in files {
            let source = self.settings.project_dir.join(relative);
            let data =
                std::fs::read(&source).map_err(|e| DeployError::io("read", &source, e))?;
            writer.start_entry(&entry_name(relative))?;
            writer.write_data(&data)?;
        }
        writer.finish()?;
        Ok(())
    }
}

impl Packager {
    /// Archive for the project's current `HEAD`. Runs the install command and
    /// file I/O on the calling thread.
    pub fn prepare_blocking(&self) -> DeployResult<Archive> {
        let revision = revision(&self.settings.project_dir)?;
        log::info!("Source revision is {revision}");
        self.ensure_archive(&revision)
    }
}

#[async_trait]
impl Packaging for Packager {
    async fn prepare(&self) -> DeployResult<Archive> {
        let packager = self.clone();
        tokio::task::spawn_blocking(move || packager.prepare_blocking())
            .await
            .map_err(|e| DeployError::packaging(format!("packaging task failed: {e}")))?
    }
}

/// Produce `path` by writing `{path}.partial` and renaming it. A failed write
/// removes the partial file, so it is never mistaken for a cached archive.
fn write_then_rename(
    path: &Path,
    write: impl FnOnce(&Path) -> DeployResult<()>,
) -> DeployResult<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);

    if let Err(e) = write(&partial) {
        if partial.exists() {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                log::warn!("Failed to remove {}: {cleanup}", partial.display());
            }
        }
        return Err(e);
    }
    std::fs::rename(&partial, path).map_err(|e| DeployError::io("move archive into place", path, e))
}

/// Zip entry names always use `/`.
fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
