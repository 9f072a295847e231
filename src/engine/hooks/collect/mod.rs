use crate::engine::build_state::BuildState;
use crate::engine::collector::ArtifactKind;
use crate::engine::hooks::{Hook, HookTrigger};
use crate::engine::Phase;
use crate::utils::elf::{ElfHeader, EM_ARM};
use crate::Engine;
use async_trait::async_trait;
use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, BufReader};

/// Looks inside every collected library: ar archives get recorded as such,
/// ELF objects get their header kept around, and object code for the wrong
/// machine earns a warning.
#[derive(Debug)]
pub struct InspectElf;

#[async_trait]
impl Hook for InspectElf {
    const PRIORITY: usize = 0;
    const TRIGGER: HookTrigger = HookTrigger::After;
    const PHASE: Phase = Phase::Collect;

    async fn run(&self, state: &mut BuildState, engine: &Engine) -> anyhow::Result<()> {
        if !state.config.target.is_hardware() {
            return Ok(());
        }

        let package_dir = engine.settings.package_dir_for(state.recipe, state.config);
        let libraries: Vec<_> = state
            .artifacts
            .iter()
            .filter(|artifact| artifact.kind == ArtifactKind::Library)
            .map(|artifact| artifact.path.clone())
            .collect();

        let mut buffer: [u8; 9] = [0; 9];

        for relative in libraries {
            let path = package_dir.join(&relative);
            let mut file = BufReader::new(File::open(&path).await?);

            // The 9th byte makes sure an empty archive stub does not pass
            // for a real one.
            if file.read_exact(&mut buffer).await.is_err() {
                continue;
            }

            if &buffer[..8] == b"!<arch>\n" {
                state.archives.push(relative);
                continue;
            }

            file.seek(SeekFrom::Start(0)).await?;
            if let Some(elf_header) = ElfHeader::parse(&mut file).await? {
                if elf_header.machine != EM_ARM {
                    println!(
                        "    warning: {} is not ARM object code (machine {})",
                        relative.display(),
                        elf_header.machine
                    );
                }

                if elf_header.is_executable() {
                    println!(
                        "    warning: {} is an executable, not a library",
                        relative.display()
                    );
                }

                let claims_shared = relative.extension().map_or(false, |ext| ext == "so");
                if claims_shared && !elf_header.is_shared_object() {
                    println!(
                        "    warning: {} does not look like a shared object",
                        relative.display()
                    );
                }

                state.elf_headers.insert(relative, elf_header);
            }
        }

        Ok(())
    }
}
