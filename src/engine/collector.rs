use crate::definition::options::BuildConfig;
use crate::engine::EngineSettings;
use crate::utils::FileWalker;
use crate::Recipe;
use hex::ToHex;
use ring::digest::{Context, SHA256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;
use wax::{Glob, Pattern};

#[derive(Debug)]
pub struct Collector {
    settings: Arc<EngineSettings>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArtifactKind {
    Library,
    Header,
}

impl ArtifactKind {
    pub fn dest_dir(&self) -> &'static str {
        match self {
            ArtifactKind::Library => "lib",
            ArtifactKind::Header => "include",
        }
    }
}

/// One file that made it into the package dir. `path` is relative to the
/// package root, which keeps manifests free of machine-local prefixes.
#[derive(Debug, Clone)]
pub struct CollectedArtifact {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no libraries matched {patterns:?} under {}", searched.display())]
    NoLibraries {
        patterns: Vec<String>,
        searched: PathBuf,
    },
    #[error("no headers matched {patterns:?} under {}", searched.display())]
    NoHeaders {
        patterns: Vec<String>,
        searched: PathBuf,
    },
    #[error("artifact pattern `{pattern}` does not compile as a glob")]
    Pattern { pattern: String },
    #[error("io failure while collecting {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Collector {
    pub fn new(settings: Arc<EngineSettings>) -> Self {
        Collector { settings }
    }

    /// Gathers libraries out of the toolchain output dir and headers out of
    /// the declared include tree, flattening both into `lib/` and `include/`
    /// under the package dir. Re-running over an unchanged build yields a
    /// byte-identical package tree. Zero matches on either side is an error,
    /// since it means the recipe and the toolchain disagree about layout.
    pub async fn collect(
        &self,
        recipe: &Recipe,
        config: BuildConfig,
    ) -> Result<Vec<CollectedArtifact>, CollectError> {
        let output_dir = self.settings.output_dir_for(recipe, config);
        let include_tree = self.settings.include_tree_for(recipe);
        let package_dir = self.settings.package_dir_for(recipe, config);

        let mut artifacts = self
            .collect_kind(
                ArtifactKind::Library,
                &recipe.artifacts.libraries,
                &output_dir,
                &package_dir,
            )
            .await?;

        if artifacts.is_empty() {
            return Err(CollectError::NoLibraries {
                patterns: recipe.artifacts.libraries.clone(),
                searched: output_dir,
            });
        }

        let headers = self
            .collect_kind(
                ArtifactKind::Header,
                &recipe.artifacts.headers,
                &include_tree,
                &package_dir,
            )
            .await?;

        if headers.is_empty() {
            return Err(CollectError::NoHeaders {
                patterns: recipe.artifacts.headers.clone(),
                searched: include_tree,
            });
        }

        artifacts.extend(headers);
        artifacts.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(artifacts)
    }

    async fn collect_kind(
        &self,
        kind: ArtifactKind,
        patterns: &[String],
        search_root: &Path,
        package_dir: &Path,
    ) -> Result<Vec<CollectedArtifact>, CollectError> {
        let mut globs = vec![];
        for pattern in patterns {
            let glob = Glob::from_str(pattern).map_err(|_| CollectError::Pattern {
                pattern: pattern.clone(),
            })?;
            globs.push(glob);
        }

        // A missing search root reads as zero matches; the caller decides
        // whether that is fatal.
        if tokio::fs::metadata(search_root).await.is_err() {
            return Ok(vec![]);
        }

        // File name -> source path. Patterns apply to file names since the
        // destination is flat anyway; the sorted walk plus the map makes
        // collisions between subdirectories resolve the same way every run.
        let mut matched: BTreeMap<String, PathBuf> = BTreeMap::new();

        let mut walker = FileWalker::new(search_root)
            .await
            .map_err(|source| CollectError::Io {
                path: search_root.to_path_buf(),
                source,
            })?;
        while let Some(entry) = walker.next().await.map_err(|source| CollectError::Io {
            path: search_root.to_path_buf(),
            source,
        })? {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if globs.iter().any(|glob| glob.is_match(file_name.as_str())) {
                matched.insert(file_name, entry.path());
            }
        }

        if matched.is_empty() {
            return Ok(vec![]);
        }

        let dest_root = package_dir.join(kind.dest_dir());
        tokio::fs::create_dir_all(&dest_root)
            .await
            .map_err(|source| CollectError::Io {
                path: dest_root.clone(),
                source,
            })?;

        let mut artifacts = vec![];
        for (file_name, source_path) in matched {
            let dest = dest_root.join(&file_name);
            tokio::fs::copy(&source_path, &dest)
                .await
                .map_err(|source| CollectError::Io {
                    path: source_path.clone(),
                    source,
                })?;

            let sha256 = sha256_hex(&dest).await.map_err(|source| CollectError::Io {
                path: dest.clone(),
                source,
            })?;

            artifacts.push(CollectedArtifact {
                kind,
                path: PathBuf::from(kind.dest_dir()).join(&file_name),
                file_name,
                sha256,
            });
        }

        Ok(artifacts)
    }
}

async fn sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut context = Context::new(&SHA256);
    let mut buffer = vec![0; 4096];

    loop {
        let r = file.read(&mut buffer).await?;
        if r == 0 {
            break;
        }

        context.update(&buffer[..r]);
    }

    Ok(context.finish().as_ref().encode_hex::<String>())
}
