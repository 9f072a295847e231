use byteorder::{ReadBytesExt, BE, LE};
use std::io::Cursor;
use tokio::io::{AsyncBufRead, AsyncReadExt};

/// `e_machine` value for ARM cores. Every STM32 part compiles to this.
pub const EM_ARM: u16 = 40;

#[derive(Debug, Copy, Clone)]
pub struct ElfHeaderIdent {
    _actual: [u8; 16],
    _class: ElfClass,
    _byte_order: ElfByteOrder,
}

/// Leading fields of an ELF header, enough to tell what kind of object the
/// toolchain produced and for which machine. The program and section tables
/// past `e_entry` are never needed here and stay unread.
#[derive(Debug, Copy, Clone)]
pub struct ElfHeader {
    _ident: ElfHeaderIdent,
    object_type: u16,
    pub(crate) machine: u16,
    _version: u32,
    _entry: u64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
enum ElfClass {
    Class32 = 1,
    Class64 = 2,
}

impl ElfClass {
    pub fn width(&self) -> usize {
        match self {
            ElfClass::Class32 => 4,
            ElfClass::Class64 => 8,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum ElfByteOrder {
    Lsb = 1,
    Msb = 2,
}

impl ElfHeader {
    const ELFCLASS32: u8 = 1;
    const ELFCLASS64: u8 = 2;

    const ELFDATA2LSB: u8 = 1;
    const ELFDATA2MSB: u8 = 2;

    const _ET_REL: u16 = 1;
    const ET_EXEC: u16 = 2;
    const ET_DYN: u16 = 3;

    pub fn is_shared_object(&self) -> bool {
        self.object_type == ElfHeader::ET_DYN
    }

    pub fn is_executable(&self) -> bool {
        self.object_type == ElfHeader::ET_EXEC
    }

    /// Reads the header from the start of `input`. `Ok(None)` means the bytes
    /// are not ELF at all (or are truncated), which is not an error: archives
    /// and plain files flow through the same inspection path.
    pub async fn parse<R: AsyncBufRead + Unpin>(input: &mut R) -> anyhow::Result<Option<Self>> {
        let mut header = [0u8; 32];
        let amt_read = input.read(&mut header).await?;
        if amt_read < 24 || &header[..4] != b"\x7FELF" {
            return Ok(None);
        }

        let class = match header[4] {
            Self::ELFCLASS32 => ElfClass::Class32,
            Self::ELFCLASS64 => ElfClass::Class64,
            _ => return Ok(None),
        };

        let byte_order = match header[5] {
            Self::ELFDATA2LSB => ElfByteOrder::Lsb,
            Self::ELFDATA2MSB => ElfByteOrder::Msb,
            _ => return Ok(None),
        };

        let ident = ElfHeaderIdent {
            _actual: header[..16].try_into().unwrap(),
            _class: class,
            _byte_order: byte_order,
        };

        if amt_read < 24 + class.width() {
            return Ok(None);
        }

        let mut cur = Cursor::new(&header[16..]);

        let header = match byte_order {
            ElfByteOrder::Lsb => ElfHeader {
                _ident: ident,
                object_type: ReadBytesExt::read_u16::<LE>(&mut cur)?,
                machine: ReadBytesExt::read_u16::<LE>(&mut cur)?,
                _version: ReadBytesExt::read_u32::<LE>(&mut cur)?,
                _entry: match class {
                    ElfClass::Class32 => ReadBytesExt::read_u32::<LE>(&mut cur)? as u64,
                    ElfClass::Class64 => ReadBytesExt::read_u64::<LE>(&mut cur)?,
                },
            },
            ElfByteOrder::Msb => ElfHeader {
                _ident: ident,
                object_type: ReadBytesExt::read_u16::<BE>(&mut cur)?,
                machine: ReadBytesExt::read_u16::<BE>(&mut cur)?,
                _version: ReadBytesExt::read_u32::<BE>(&mut cur)?,
                _entry: match class {
                    ElfClass::Class32 => ReadBytesExt::read_u32::<BE>(&mut cur)? as u64,
                    ElfClass::Class64 => ReadBytesExt::read_u64::<BE>(&mut cur)?,
                },
            },
        };

        Ok(Some(header))
    }
}

#[cfg(test)]
mod tests {
    use super::{ElfHeader, EM_ARM};

    fn arm_shared_object() -> Vec<u8> {
        let mut raw = vec![0x7f, b'E', b'L', b'F', 1, 1, 1];
        raw.resize(16, 0);
        raw.extend_from_slice(&3u16.to_le_bytes());
        raw.extend_from_slice(&EM_ARM.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&0u32.to_le_bytes());
        raw
    }

    #[tokio::test]
    async fn parses_arm_shared_object() {
        let raw = arm_shared_object();
        let header = ElfHeader::parse(&mut raw.as_slice())
            .await
            .unwrap()
            .unwrap();

        assert!(header.is_shared_object());
        assert!(!header.is_executable());
        assert_eq!(header.machine, EM_ARM);
    }

    #[tokio::test]
    async fn rejects_non_elf_bytes() {
        let raw = b"!<arch>\ndebian-binary padding padding padding".to_vec();
        assert!(ElfHeader::parse(&mut raw.as_slice())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn rejects_truncated_header() {
        let raw = arm_shared_object()[..20].to_vec();
        assert!(ElfHeader::parse(&mut raw.as_slice())
            .await
            .unwrap()
            .is_none());
    }
}
