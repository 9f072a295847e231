use crate::definition::options::{BuildConfig, BuildOptions};
use crate::engine::build_state::BuildState;
use crate::engine::collector::Collector;
use crate::engine::hooks::{HookTrigger, SORTED_HOOKS};
use crate::engine::invoker::Invoker;
use crate::engine::packager::{describe, Package, Packager, PackagerBuilder};
use crate::engine::stager::Stager;
use crate::Recipe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

mod build_state;
mod collector;
mod hooks;
mod invoker;
pub mod packager;
mod stager;

/// The pipeline, in the order it runs. A failure in any phase aborts the
/// build; there is no way to enter a later phase without the earlier ones
/// having succeeded.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Phase {
    Validate,
    Stage,
    Build,
    Collect,
    Package,
}

impl Phase {
    pub fn phases() -> [Phase; 5] {
        [
            Phase::Validate,
            Phase::Stage,
            Phase::Build,
            Phase::Collect,
            Phase::Package,
        ]
    }
}

#[derive(Debug)]
pub struct Engine {
    stager: Stager,
    invoker: Invoker,
    collector: Collector,
    packager: Box<dyn Packager>,
    pub settings: Arc<EngineSettings>,
}

#[derive(Debug)]
pub struct EngineSettings {
    source_root: PathBuf,
    build_root: PathBuf,
    package_root: PathBuf,
}

impl EngineSettings {
    pub fn new(
        source_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        package_root: impl Into<PathBuf>,
    ) -> Self {
        EngineSettings {
            source_root: source_root.into(),
            build_root: build_root.into(),
            package_root: package_root.into(),
        }
    }

    pub fn source_root(&self) -> &Path {
        self.source_root.as_path()
    }

    /// One build tree per (recipe, configuration). Distinct configurations
    /// can never stomp on each other's trees.
    pub fn build_tree_for(&self, recipe: &Recipe, config: BuildConfig) -> PathBuf {
        self.build_root
            .join(format!("{}-{}", recipe.name, config.slug()))
    }

    pub fn output_dir_for(&self, recipe: &Recipe, config: BuildConfig) -> PathBuf {
        self.build_tree_for(recipe, config).join(&recipe.output_dir)
    }

    pub fn include_tree_for(&self, recipe: &Recipe) -> PathBuf {
        self.source_root.join(&recipe.include_dir)
    }

    pub fn package_dir_for(&self, recipe: &Recipe, config: BuildConfig) -> PathBuf {
        self.package_root
            .join(format!("{}-{}", recipe.name, config.slug()))
    }
}

impl Engine {
    pub fn new<T: PackagerBuilder>() -> Self {
        Self::from_settings::<T>(EngineSettings {
            source_root: PathBuf::from("."),
            build_root: PathBuf::from(".kiln/build"),
            package_root: PathBuf::from(".kiln/pkg"),
        })
    }

    pub fn from_settings<T: PackagerBuilder>(settings: EngineSettings) -> Self {
        let settings = Arc::from(settings);
        Engine {
            stager: Stager::new(settings.clone()),
            invoker: Invoker::new(settings.clone()),
            collector: Collector::new(settings.clone()),
            packager: Box::new(T::build(settings.clone())),
            settings,
        }
    }

    /// Runs every registered hook matching the state's current phase and the
    /// given trigger, in priority order.
    pub async fn run_hooks<'a>(
        &self,
        state: &mut BuildState<'a>,
        trigger: HookTrigger,
    ) -> anyhow::Result<()> {
        let phase = state.phase;
        for hook in SORTED_HOOKS.iter().copied() {
            if hook.when() == (phase, trigger) {
                println!("    running hook: {:?}", hook);
                hook.trigger(state, self).await?;
            }
        }
        Ok(())
    }

    /// Drives a recipe through the whole pipeline for one configuration and
    /// returns what a consumer of the finished package needs to know.
    ///
    /// The options are validated before anything below touches the
    /// filesystem, so a bad selection leaves no build tree behind.
    pub async fn build_package(
        &self,
        recipe: &Recipe,
        options: BuildOptions,
    ) -> anyhow::Result<Package> {
        let config = options.validate(recipe)?;

        let mut state = BuildState {
            build_time: SystemTime::now(),
            recipe,
            config,
            phase: Phase::Validate,
            toolchain_run: None,
            artifacts: vec![],
            elf_headers: Default::default(),
            archives: vec![],
        };

        println!("building {} {} for {}", recipe.name, recipe.version, config);

        for phase in Phase::phases() {
            println!("running phase: {:?}", phase);
            state.phase = phase;

            self.run_hooks(&mut state, HookTrigger::Before).await?;

            match phase {
                Phase::Validate => {
                    println!("    {}", config.command_line(&recipe.toolchain));
                }

                Phase::Stage => {
                    self.stager.stage(recipe, config).await?;
                }

                Phase::Build => {
                    let run = self.invoker.invoke(recipe, config).await?;
                    let verdict = run.check();
                    state.toolchain_run = Some(run);
                    verdict?;
                }

                Phase::Collect => {
                    let artifacts = self.collector.collect(recipe, config).await?;
                    println!("    {} artifacts", artifacts.len());
                    state.artifacts = artifacts;
                }

                Phase::Package => {
                    self.packager.build_package(&mut state).await?;
                    let package_dir = self.settings.package_dir_for(recipe, config);
                    println!("    package at {}", package_dir.display());
                }
            }

            self.run_hooks(&mut state, HookTrigger::After).await?;
        }

        Ok(describe(&state.artifacts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::options::{LibraryType, OptimizeLevel, TargetChip};
    use crate::definition::SourceLayout;
    use crate::engine::invoker::BuildError;
    use crate::engine::packager::FolderLayout;
    use std::os::unix::fs::PermissionsExt;
    use std::time::UNIX_EPOCH;

    fn options(target: Option<TargetChip>) -> BuildOptions {
        BuildOptions {
            target,
            library: Some(LibraryType::Static),
            optimize: Some(OptimizeLevel::ReleaseFast),
        }
    }

    fn engine_in(root: &Path) -> Engine {
        Engine::from_settings::<FolderLayout>(EngineSettings::new(
            root.to_path_buf(),
            root.join("out/build"),
            root.join("out/pkg"),
        ))
    }

    async fn seed_project(root: &Path, toolchain_body: &str) -> Recipe {
        tokio::fs::create_dir_all(root.join("build")).await.unwrap();
        tokio::fs::create_dir_all(root.join("src")).await.unwrap();
        tokio::fs::create_dir_all(root.join("inc")).await.unwrap();
        tokio::fs::write(root.join("build.zig"), b"// build graph").await.unwrap();
        tokio::fs::write(root.join("build.zig.zon"), b".{}").await.unwrap();
        tokio::fs::write(root.join("src/kernel.zig"), b"kernel").await.unwrap();
        tokio::fs::write(root.join("inc/kernel.h"), b"kernel api").await.unwrap();

        let script = root.join("fake-zig");
        tokio::fs::write(&script, format!("#!/bin/sh\n{}\n", toolchain_body))
            .await
            .unwrap();
        let mut permissions = tokio::fs::metadata(&script).await.unwrap().permissions();
        permissions.set_mode(0o755);
        tokio::fs::set_permissions(&script, permissions).await.unwrap();

        Recipe {
            name: "a-rtos-m".to_string(),
            version: "3.1.0".to_string(),
            toolchain: "./fake-zig".to_string(),
            targets: vec![TargetChip::Stm32F103, TargetChip::Testing],
            source: SourceLayout {
                dirs: vec!["build".to_string(), "src".to_string(), "inc".to_string()],
                files: vec![
                    "build.zig".to_string(),
                    "build.zig.zon".to_string(),
                    "fake-zig".to_string(),
                ],
            },
            ..Recipe::default()
        }
    }

    #[tokio::test]
    async fn builds_collects_and_packages() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = seed_project(
            dir.path(),
            "mkdir -p zig-out/lib\nprintf 'static archive' > zig-out/lib/libA-RTOS-M.a",
        )
        .await;
        let engine = engine_in(dir.path());

        let package = engine
            .build_package(&recipe, options(Some(TargetChip::Stm32F103)))
            .await
            .unwrap();

        assert_eq!(package.libraries, vec!["A-RTOS-M"]);
        assert_eq!(package.include_dirs, vec!["include"]);

        let config = options(Some(TargetChip::Stm32F103)).validate(&recipe).unwrap();
        let package_dir = engine.settings.package_dir_for(&recipe, config);
        let archive = tokio::fs::read(package_dir.join("lib/libA-RTOS-M.a"))
            .await
            .unwrap();
        assert_eq!(archive, b"static archive");
        let header = tokio::fs::read(package_dir.join("include/kernel.h"))
            .await
            .unwrap();
        assert_eq!(header, b"kernel api");
        assert!(tokio::fs::metadata(package_dir.join("package.json")).await.is_ok());

        let manifest = tokio::fs::read_to_string(package_dir.join("manifest.txt"))
            .await
            .unwrap();
        assert_eq!(manifest.lines().count(), 2);

        // Before-package hooks normalized modes and pinned every timestamp.
        let metadata = tokio::fs::metadata(package_dir.join("lib/libA-RTOS-M.a"))
            .await
            .unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o644);
        let mtime = metadata
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert_eq!(mtime, 315532800);
    }

    #[tokio::test]
    async fn failed_toolchain_reports_the_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = seed_project(dir.path(), "exit 9").await;
        let engine = engine_in(dir.path());

        let err = engine
            .build_package(&recipe, options(Some(TargetChip::Stm32F103)))
            .await
            .unwrap_err();

        match err.downcast_ref::<BuildError>() {
            Some(BuildError::BuildFailed { code, command }) => {
                assert_eq!(*code, 9);
                assert!(command.ends_with(
                    "build -Doptimize=ReleaseFast -DLibrary_Type=Static -DCompile_Target=STM32F103"
                ));
            }
            other => panic!("expected BuildFailed, got {:?}", other),
        }

        // Nothing was collected or packaged.
        let config = options(Some(TargetChip::Stm32F103)).validate(&recipe).unwrap();
        let package_dir = engine.settings.package_dir_for(&recipe, config);
        assert!(tokio::fs::metadata(&package_dir).await.is_err());
    }

    #[tokio::test]
    async fn rejected_options_leave_no_build_tree() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = seed_project(dir.path(), "exit 0").await;
        let engine = engine_in(dir.path());

        let err = engine
            .build_package(&recipe, options(None))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no target chip selected"));
        assert!(tokio::fs::metadata(dir.path().join("out/build")).await.is_err());
        assert!(tokio::fs::metadata(dir.path().join("out/pkg")).await.is_err());
    }

    #[test]
    fn distinct_configurations_get_distinct_trees() {
        let engine = Engine::new::<FolderLayout>();
        let recipe = Recipe {
            name: "a-rtos-m".to_string(),
            targets: vec![TargetChip::Stm32F103],
            ..Recipe::default()
        };
        let a = BuildConfig {
            target: TargetChip::Stm32F103,
            library: LibraryType::Static,
            optimize: OptimizeLevel::ReleaseFast,
        };
        let b = BuildConfig {
            optimize: OptimizeLevel::ReleaseSmall,
            ..a
        };

        assert_eq!(
            engine.settings.build_tree_for(&recipe, a),
            PathBuf::from(".kiln/build/a-rtos-m-stm32f103-static-releasefast")
        );
        assert_ne!(
            engine.settings.build_tree_for(&recipe, a),
            engine.settings.build_tree_for(&recipe, b)
        );
        assert_ne!(
            engine.settings.package_dir_for(&recipe, a),
            engine.settings.package_dir_for(&recipe, b)
        );
    }
}
