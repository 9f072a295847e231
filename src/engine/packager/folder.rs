use crate::definition::options::BuildConfig;
use crate::engine::build_state::BuildState;
use crate::engine::packager::{describe, Packager, PackagerBuilder};
use crate::engine::EngineSettings;
use crate::utils::elf::EM_ARM;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

/// Packager that leaves the collected tree as a plain folder and drops the
/// metadata next to it: `package.json` for consumers, `manifest.txt` with
/// one digest line per packaged file.
#[derive(Debug)]
pub struct FolderLayout {
    settings: Arc<EngineSettings>,
}

impl PackagerBuilder for FolderLayout {
    type Output = FolderLayout;

    fn build(settings: Arc<EngineSettings>) -> Self::Output {
        FolderLayout { settings }
    }
}

/// Shape of `package.json`. Besides what consumers link against, it records
/// how the artifacts were produced: the exact toolchain command, which of
/// the libraries are ar archives and which were verified as ARM objects.
#[derive(Debug, Serialize)]
struct PackageInfo<'a> {
    name: &'a str,
    version: &'a str,
    description: &'a str,
    license: &'a [String],
    configuration: BuildConfig,
    command: Option<&'a str>,
    libraries: Vec<String>,
    include_dirs: Vec<String>,
    static_archives: Vec<String>,
    arm_objects: Vec<String>,
    built_unix: u64,
}

#[async_trait]
impl Packager for FolderLayout {
    async fn build_package<'a>(&self, state: &mut BuildState<'a>) -> anyhow::Result<()> {
        let recipe = state.recipe;
        let package_dir = self.settings.package_dir_for(recipe, state.config);

        tokio::fs::create_dir_all(&package_dir).await?;

        let mut static_archives: Vec<String> = state
            .archives
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        static_archives.sort();

        let mut arm_objects: Vec<String> = state
            .elf_headers
            .iter()
            .filter(|(_, header)| header.machine == EM_ARM)
            .map(|(path, _)| path.to_string_lossy().into_owned())
            .collect();
        arm_objects.sort();

        let package = describe(&state.artifacts);
        let info = PackageInfo {
            name: &recipe.name,
            version: &recipe.version,
            description: &recipe.description,
            license: &recipe.license,
            configuration: state.config,
            command: state.toolchain_run.as_ref().map(|run| run.command.as_str()),
            libraries: package.libraries,
            include_dirs: package.include_dirs,
            static_archives,
            arm_objects,
            built_unix: state.build_time.duration_since(UNIX_EPOCH)?.as_secs(),
        };

        let rendered = serde_json::to_vec_pretty(&info)?;
        tokio::fs::write(package_dir.join("package.json"), rendered).await?;

        // The artifact list arrives sorted from the collector, which keeps
        // the manifest diffable between builds.
        let mut manifest = String::new();
        for artifact in &state.artifacts {
            manifest.push_str(&artifact.sha256);
            manifest.push_str("  ");
            manifest.push_str(&artifact.path.to_string_lossy());
            manifest.push('\n');
        }
        tokio::fs::write(package_dir.join("manifest.txt"), manifest).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::options::{LibraryType, OptimizeLevel, TargetChip};
    use crate::engine::collector::{ArtifactKind, CollectedArtifact};
    use crate::engine::invoker::ToolchainRun;
    use crate::engine::Phase;
    use crate::utils::elf::ElfHeader;
    use crate::Recipe;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;
    use std::process::ExitStatus;
    use std::time::SystemTime;

    fn arm_shared_object() -> Vec<u8> {
        let mut raw = vec![0x7f, b'E', b'L', b'F', 1, 1, 1];
        raw.resize(16, 0);
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&EM_ARM.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw
    }

    fn state_for(recipe: &Recipe) -> BuildState<'_> {
        BuildState {
            build_time: SystemTime::now(),
            recipe,
            config: BuildConfig {
                target: TargetChip::Stm32F103,
                library: LibraryType::Static,
                optimize: OptimizeLevel::ReleaseFast,
            },
            phase: Phase::Package,
            toolchain_run: None,
            artifacts: vec![
                CollectedArtifact {
                    kind: ArtifactKind::Header,
                    file_name: "kernel.h".to_string(),
                    path: PathBuf::from("include/kernel.h"),
                    sha256: "a".repeat(64),
                },
                CollectedArtifact {
                    kind: ArtifactKind::Library,
                    file_name: "libA-RTOS-M.a".to_string(),
                    path: PathBuf::from("lib/libA-RTOS-M.a"),
                    sha256: "b".repeat(64),
                },
            ],
            elf_headers: Default::default(),
            archives: vec![],
        }
    }

    #[tokio::test]
    async fn writes_metadata_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Arc::new(EngineSettings::new(
            dir.path().to_path_buf(),
            dir.path().join("build"),
            dir.path().join("pkg"),
        ));
        let recipe = Recipe {
            name: "a-rtos-m".to_string(),
            version: "3.1.0".to_string(),
            description: "Preemptive kernel".to_string(),
            license: vec!["Apache-2.0".to_string()],
            targets: vec![TargetChip::Stm32F103],
            ..Recipe::default()
        };
        let mut state = state_for(&recipe);
        let command =
            "zig build -Doptimize=ReleaseFast -DLibrary_Type=Static -DCompile_Target=STM32F103";
        state.toolchain_run = Some(ToolchainRun {
            command: command.to_string(),
            status: ExitStatus::from_raw(0),
        });
        state.archives = vec![PathBuf::from("lib/libA-RTOS-M.a")];

        let raw = arm_shared_object();
        let header = ElfHeader::parse(&mut raw.as_slice()).await.unwrap().unwrap();
        state
            .elf_headers
            .insert(PathBuf::from("lib/libA-RTOS-M.so"), header);

        let packager = FolderLayout::build(settings.clone());

        packager.build_package(&mut state).await.unwrap();

        let package_dir = settings.package_dir_for(&recipe, state.config);
        let rendered = tokio::fs::read(package_dir.join("package.json")).await.unwrap();
        let info: serde_json::Value = serde_json::from_slice(&rendered).unwrap();

        assert_eq!(info["name"], "a-rtos-m");
        assert_eq!(info["version"], "3.1.0");
        assert_eq!(info["configuration"]["target"], "STM32F103");
        assert_eq!(info["configuration"]["library"], "Static");
        assert_eq!(info["configuration"]["optimize"], "ReleaseFast");
        assert_eq!(info["command"], command);
        assert_eq!(info["libraries"][0], "A-RTOS-M");
        assert_eq!(info["include_dirs"][0], "include");
        assert_eq!(info["static_archives"][0], "lib/libA-RTOS-M.a");
        assert_eq!(info["arm_objects"][0], "lib/libA-RTOS-M.so");

        let manifest = tokio::fs::read_to_string(package_dir.join("manifest.txt"))
            .await
            .unwrap();
        let lines: Vec<_> = manifest.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("include/kernel.h"));
        assert!(lines[1].ends_with("lib/libA-RTOS-M.a"));
        assert!(lines[1].starts_with(&"b".repeat(64)));
    }
}
