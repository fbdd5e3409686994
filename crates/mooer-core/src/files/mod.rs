//! On-disk file formats.

pub mod gnr;
pub mod mbf;
pub mod mo;

use std::fmt;
use std::path::Path;

pub use gnr::IrContainer;
pub use mbf::{BackupArchive, BackupEntry};
pub use mo::MoFile;

use crate::protocol::constants::{GNR_MAGIC, MO_FILE_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Mo,
    Gnr,
    Mbf,
}

impl FileKind {
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mo" => Some(FileKind::Mo),
            "gnr" => Some(FileKind::Gnr),
            "mbf" => Some(FileKind::Mbf),
            _ => None,
        }
    }

    /// Guess from content, falling back to the extension.
    pub fn detect(path: &Path, data: &[u8]) -> Option<Self> {
        if data.starts_with(GNR_MAGIC) {
            return Some(FileKind::Gnr);
        }
        if data.len() == MO_FILE_SIZE {
            return Some(FileKind::Mo);
        }
        Self::from_extension(path)
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileKind::Mo => write!(f, ".mo preset"),
            FileKind::Gnr => write!(f, ".gnr IR container"),
            FileKind::Mbf => write!(f, ".mbf backup"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect() {
        let gnr = Path::new("cab.bin");
        assert_eq!(FileKind::detect(gnr, b"mooerge\0\0\0\0\0"), Some(FileKind::Gnr));
        assert_eq!(
            FileKind::detect(Path::new("x"), &[0u8; MO_FILE_SIZE]),
            Some(FileKind::Mo)
        );
        assert_eq!(
            FileKind::detect(Path::new("all.MBF"), &[0u8; 10]),
            Some(FileKind::Mbf)
        );
        assert_eq!(FileKind::detect(Path::new("notes.txt"), b"hi"), None);
    }
}
