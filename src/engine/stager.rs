use crate::definition::options::BuildConfig;
use crate::engine::EngineSettings;
use crate::Recipe;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug)]
pub struct Stager {
    settings: Arc<EngineSettings>,
}

#[derive(Debug, Error)]
#[error("staging failed at {}", path.display())]
pub struct StagingError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl StagingError {
    fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> StagingError {
        let path = path.into();
        move |source| StagingError { path, source }
    }
}

impl Stager {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Stager { settings }
    }

    /// Copies the recipe's declared sources into the build tree: loose
    /// descriptor files land at the tree root, declared directories get
    /// merge-copied recursively. Existing files are overwritten, anything
    /// else already in the tree stays. A failure mid-copy leaves whatever
    /// was copied so far in place.
    pub async fn stage(&self, recipe: &Recipe, config: BuildConfig) -> Result<(), StagingError> {
        let source_root = self.settings.source_root();
        let build_tree = self.settings.build_tree_for(recipe, config);

        tokio::fs::create_dir_all(&build_tree)
            .await
            .map_err(StagingError::at(&build_tree))?;

        for file in &recipe.source.files {
            let from = source_root.join(file);
            let to = build_tree.join(file);

            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(StagingError::at(parent))?;
            }

            tokio::fs::copy(&from, &to)
                .await
                .map_err(StagingError::at(&from))?;
        }

        for dir in &recipe.source.dirs {
            copy_tree(source_root.join(dir), build_tree.join(dir)).await?;
        }

        Ok(())
    }
}

fn copy_tree(from: PathBuf, to: PathBuf) -> BoxFuture<'static, Result<(), StagingError>> {
    async move {
        tokio::fs::create_dir_all(&to)
            .await
            .map_err(StagingError::at(&to))?;

        let mut reader = tokio::fs::read_dir(&from)
            .await
            .map_err(StagingError::at(&from))?;

        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(StagingError::at(&from))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(StagingError::at(entry.path()))?;

            if file_type.is_dir() {
                copy_tree(entry.path(), to.join(entry.file_name())).await?;
            } else {
                tokio::fs::copy(entry.path(), to.join(entry.file_name()))
                    .await
                    .map_err(StagingError::at(entry.path()))?;
            }
        }

        Ok(())
    }
    .boxed()
}
