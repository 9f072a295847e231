use crate::definition::options::BuildConfig;
use crate::engine::collector::CollectedArtifact;
use crate::engine::invoker::ToolchainRun;
use crate::engine::Phase;
use crate::utils::elf::ElfHeader;
use crate::Recipe;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

/// Everything one invocation accumulates while moving through the phases.
/// Hooks get a mutable borrow of this between phases.
pub struct BuildState<'a> {
    pub build_time: SystemTime,
    pub recipe: &'a Recipe,
    pub config: BuildConfig,
    pub phase: Phase,
    pub toolchain_run: Option<ToolchainRun>,
    pub artifacts: Vec<CollectedArtifact>,
    pub elf_headers: HashMap<PathBuf, ElfHeader>,
    pub archives: Vec<PathBuf>,
}
