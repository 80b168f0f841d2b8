//! File system utils.

use std::path::Path;

use anyhow::{Context, Result};

pub struct FsHandler;

impl FsHandler {
    /// Recursively copy the contents of `src` into `dst`, creating `dst` if
    /// it does not exist.
    pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
        std::fs::create_dir_all(dst)
            .context(format!("Failed to create directory {}", dst.display()))?;

        for entry in std::fs::read_dir(src)
            .context(format!("Failed to read directory {}", src.display()))?
        {
            let entry = entry.context("Failed to read directory entry")?;
            let target = dst.join(entry.file_name());
            let file_type = entry
                .file_type()
                .context("Failed to determine directory entry type")?;

            if file_type.is_dir() {
                Self::copy_dir_recursive(&entry.path(), &target)?;
            } else {
                std::fs::copy(entry.path(), &target).context(format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                ))?;
            }
        }

        tracing::debug!(
            src = %src.display(),
            dst = %dst.display(),
            "Copied directory contents"
        );
        Ok(())
    }
}
