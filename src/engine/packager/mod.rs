use crate::engine::build_state::BuildState;
use crate::engine::collector::{ArtifactKind, CollectedArtifact};
use crate::engine::EngineSettings;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

mod folder;

pub use folder::FolderLayout;

#[async_trait]
pub trait Packager: Send + Sync + Debug {
    async fn build_package<'a>(&self, state: &mut BuildState<'a>) -> anyhow::Result<()>;
}

pub trait PackagerBuilder {
    type Output: Packager + 'static;

    fn build(settings: Arc<EngineSettings>) -> Self::Output;
}

/// What a consumer of the package needs to know: which names to link against
/// and where the headers live.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct Package {
    pub libraries: Vec<String>,
    pub include_dirs: Vec<String>,
}

/// Derives the consumer-facing summary from the collected artifacts. Pure
/// over its input: the filesystem never enters, so the same artifact list
/// always gives the same summary.
pub fn describe(artifacts: &[CollectedArtifact]) -> Package {
    let mut libraries = BTreeSet::new();

    for artifact in artifacts {
        if artifact.kind != ArtifactKind::Library {
            continue;
        }

        libraries.insert(link_name(&artifact.file_name));
    }

    Package {
        libraries: libraries.into_iter().collect(),
        include_dirs: vec!["include".to_string()],
    }
}

/// `libfoo.a` and `libfoo.so` both link as `-lfoo`.
fn link_name(file_name: &str) -> String {
    let stem = file_name
        .strip_suffix(".a")
        .or_else(|| file_name.strip_suffix(".so"))
        .unwrap_or(file_name);

    stem.strip_prefix("lib")
        .filter(|rest| !rest.is_empty())
        .unwrap_or(stem)
        .to_string()
}
