use crate::engine::build_state::BuildState;
use crate::engine::hooks::{Hook, HookTrigger};
use crate::engine::Phase;
use crate::utils::FileWalker;
use crate::Engine;
use async_trait::async_trait;
use std::ffi::CString;
use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::os::unix::prelude::OsStrExt;

/// Seconds since the epoch for 1980-01-01T00:00:00Z, the timestamp every
/// packaged file gets pinned to. Collecting the same build twice then has to
/// produce indistinguishable trees.
const RELEASE_EPOCH: libc::time_t = 315532800;

#[derive(Debug)]
pub struct FixPermissions;

#[async_trait]
impl Hook for FixPermissions {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const PHASE: Phase = Phase::Package;

    async fn run(&self, state: &mut BuildState, engine: &Engine) -> anyhow::Result<()> {
        let path = engine.settings.package_dir_for(state.recipe, state.config);

        let mut files = FileWalker::empty(true);
        files.push(&path).await?;

        tokio::fs::set_permissions(&path, Permissions::from_mode(0o755)).await?;
        while let Some(file) = files.next().await? {
            let mode = if file.file_type().await?.is_dir() {
                0o755
            } else {
                0o644
            };

            tokio::fs::set_permissions(file.path(), Permissions::from_mode(mode)).await?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct PinTimestamps;

#[async_trait]
impl Hook for PinTimestamps {
    const PRIORITY: usize = 100;
    const TRIGGER: HookTrigger = HookTrigger::Before;
    const PHASE: Phase = Phase::Package;

    async fn run(&self, state: &mut BuildState, engine: &Engine) -> anyhow::Result<()> {
        let path = engine.settings.package_dir_for(state.recipe, state.config);

        let tv = libc::timeval {
            tv_sec: RELEASE_EPOCH,
            tv_usec: 0,
        };

        let mut files = FileWalker::empty(true);
        files.push(&path).await?;

        pin(path.as_os_str().as_bytes(), tv)?;
        while let Some(file) = files.next().await? {
            pin(file.path().as_os_str().as_bytes(), tv)?;
        }

        Ok(())
    }
}

fn pin(path: &[u8], tv: libc::timeval) -> anyhow::Result<()> {
    let c_str = CString::new(path)?;
    let data = [tv, tv];

    unsafe {
        if libc::lutimes(c_str.as_ptr(), &data as _) != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::options::{BuildConfig, LibraryType, OptimizeLevel, TargetChip};
    use crate::engine::packager::FolderLayout;
    use crate::engine::EngineSettings;
    use crate::Recipe;
    use std::path::Path;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn config() -> BuildConfig {
        BuildConfig {
            target: TargetChip::Testing,
            library: LibraryType::Static,
            optimize: OptimizeLevel::Debug,
        }
    }

    fn state_for(recipe: &Recipe) -> BuildState<'_> {
        BuildState {
            build_time: SystemTime::now(),
            recipe,
            config: config(),
            phase: Phase::Package,
            toolchain_run: None,
            artifacts: vec![],
            elf_headers: Default::default(),
            archives: vec![],
        }
    }

    async fn mode_of(path: &Path) -> u32 {
        tokio::fs::metadata(path).await.unwrap().permissions().mode() & 0o777
    }

    async fn mtime_of(path: &Path) -> u64 {
        tokio::fs::metadata(path)
            .await
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    #[tokio::test]
    async fn normalizes_modes_and_pins_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::from_settings::<FolderLayout>(EngineSettings::new(
            dir.path().to_path_buf(),
            dir.path().join("build"),
            dir.path().join("pkg"),
        ));
        let recipe = Recipe {
            name: "a-rtos-m".to_string(),
            targets: vec![TargetChip::Testing],
            ..Recipe::default()
        };

        let package_dir = engine.settings.package_dir_for(&recipe, config());
        tokio::fs::create_dir_all(package_dir.join("lib")).await.unwrap();
        tokio::fs::write(package_dir.join("lib/liba.a"), b"archive").await.unwrap();
        tokio::fs::set_permissions(
            package_dir.join("lib/liba.a"),
            Permissions::from_mode(0o700),
        )
        .await
        .unwrap();

        let mut state = state_for(&recipe);
        FixPermissions.run(&mut state, &engine).await.unwrap();
        PinTimestamps.run(&mut state, &engine).await.unwrap();

        assert_eq!(mode_of(&package_dir).await, 0o755);
        assert_eq!(mode_of(&package_dir.join("lib")).await, 0o755);
        assert_eq!(mode_of(&package_dir.join("lib/liba.a")).await, 0o644);

        let pinned = RELEASE_EPOCH as u64;
        assert_eq!(mtime_of(&package_dir).await, pinned);
        assert_eq!(mtime_of(&package_dir.join("lib")).await, pinned);
        assert_eq!(mtime_of(&package_dir.join("lib/liba.a")).await, pinned);
    }
}
