//! A raw flash dump file seen through the NOR flash traits.

use {
    embedded_storage::nor_flash::{
        ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
    },
    slotboot::consts::{ERASED_BYTE, SECTOR_SIZE, WRITE_ALIGN},
    std::{io::Write, path::Path},
};

/// Whole flash contents held in memory. Nothing reaches the file until [`DumpFlash::save`].
#[derive(Debug, Clone)]
pub struct DumpFlash {
    data: Vec<u8>,
}

impl DumpFlash {
    /// A fully erased flash of `size` bytes.
    pub fn erased(size: u32) -> Self {
        Self {
            data: vec![ERASED_BYTE; size as usize],
        }
    }

    pub fn open(path: &Path) -> Result<Self, Error> {
        let data = std::fs::read(path).map_err(Error::Read)?;
        if data.is_empty() || data.len() % SECTOR_SIZE as usize != 0 {
            return Err(Error::Size(data.len()));
        }
        Ok(Self { data })
    }

    /// Replace the file at `path` in one step, through a temporary file in the same directory.
    pub fn save(&self, path: &Path) -> Result<(), Error> {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir).map_err(Error::CreateTempFile)?;
        file.write_all(&self.data).map_err(Error::Write)?;
        file.as_file().sync_all().map_err(Error::Write)?;
        file.persist(path).map_err(|e| Error::Persist(e.error))?;
        Ok(())
    }

    fn check(&self, offset: u32, len: usize, align: usize) -> Result<(), OpError> {
        if offset as usize % align != 0 || len % align != 0 {
            return Err(OpError(NorFlashErrorKind::NotAligned));
        }
        match (offset as usize).checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(OpError(NorFlashErrorKind::OutOfBounds)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpError(NorFlashErrorKind);

impl NorFlashError for OpError {
    fn kind(&self) -> NorFlashErrorKind {
        self.0
    }
}

impl ErrorType for DumpFlash {
    type Error = OpError;
}

impl ReadNorFlash for DumpFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.check(offset, bytes.len(), Self::READ_SIZE)?;
        let offset = offset as usize;
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl NorFlash for DumpFlash {
    const WRITE_SIZE: usize = WRITE_ALIGN as usize;
    const ERASE_SIZE: usize = SECTOR_SIZE as usize;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        if to < from {
            return Err(OpError(NorFlashErrorKind::OutOfBounds));
        }
        self.check(from, (to - from) as usize, Self::ERASE_SIZE)?;
        self.data[from as usize..to as usize].fill(ERASED_BYTE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        self.check(offset, bytes.len(), Self::WRITE_SIZE)?;
        let offset = offset as usize;
        // Programming can only clear bits.
        for (cell, byte) in self.data[offset..offset + bytes.len()].iter_mut().zip(bytes) {
            *cell &= byte;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum Error {
    CreateTempFile(std::io::Error),
    Persist(std::io::Error),
    Read(std::io::Error),
    Size(usize),
    Write(std::io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::CreateTempFile(e) => write!(f, "failed to create temporary file: {e}"),
            Error::Persist(e) => write!(f, "failed to move temporary file to flash dump: {e}"),
            Error::Read(e) => write!(f, "failed to read flash dump: {e}"),
            Error::Size(size) => write!(
                f,
                "flash dump size {size} is not a whole number of {SECTOR_SIZE} byte sectors"
            ),
            Error::Write(e) => write!(f, "failed to write temporary file: {e}"),
        }
    }
}

impl std::error::Error for Error {}
