pub mod elf;

use std::path::Path;
use tokio::fs::DirEntry;
use tokio::io;

/// Depth-first directory walker with a stable ordering: entries of every
/// directory are visited sorted by file name, so two walks over identical
/// trees yield the same sequence.
pub struct FileWalker {
    omit_directories: bool,
    stack: Vec<std::vec::IntoIter<DirEntry>>,
}

impl FileWalker {
    pub fn empty(with_directories: bool) -> Self {
        Self {
            omit_directories: !with_directories,
            stack: vec![],
        }
    }

    pub async fn push(&mut self, path: impl AsRef<Path>) -> io::Result<&mut Self> {
        let entries = Self::read_sorted(path).await?;
        self.stack.push(entries);

        Ok(self)
    }

    pub async fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(FileWalker {
            omit_directories: true,
            stack: vec![Self::read_sorted(path).await?],
        })
    }

    async fn read_sorted(path: impl AsRef<Path>) -> io::Result<std::vec::IntoIter<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            entries.push(entry);
        }
        entries.sort_by_key(|entry| entry.file_name());

        Ok(entries.into_iter())
    }

    pub async fn next(&mut self) -> io::Result<Option<DirEntry>> {
        loop {
            let next = {
                let top = if let Some(top) = self.stack.last_mut() {
                    top
                } else {
                    return Ok(None);
                };

                top.next()
            };

            let next = if let Some(v) = next {
                v
            } else {
                self.stack.pop();
                continue;
            };

            if !next.file_type().await?.is_dir() {
                return Ok(Some(next));
            }

            self.stack.push(Self::read_sorted(next.path()).await?);

            if !self.omit_directories {
                return Ok(Some(next));
            }
        }
    }
}
