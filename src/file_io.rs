use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

/// Abstract byte-addressable file.
///
/// Segments only ever grow by appending, while reads are random-access at
/// offsets handed out by the index.
pub trait FileIo: Send + Sync {
    /// Fills `buf` with the bytes starting at `offset`.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()>;

    /// Appends `buf` at the end of the file, returning the number of bytes
    /// written.
    fn append(&mut self, buf: &[u8]) -> std::io::Result<usize>;

    /// Flushes OS buffers to durable media.
    fn sync(&self) -> std::io::Result<()>;

    /// Returns the current file size in bytes.
    fn size(&self) -> std::io::Result<u64>;
}

/// [`FileIo`] over a [`std::fs::File`].
pub struct StdFileIo {
    file: File,
}

impl StdFileIo {
    /// Opens (or creates) the file at `path` for reading and appending.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).read(true).append(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        Ok(Self {
            file: options.open(path)?,
        })
    }
}

impl FileIo for StdFileIo {
    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
        use std::os::windows::fs::FileExt;

        while !buf.is_empty() {
            match self.file.seek_read(buf, offset) {
                Ok(0) => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ));
                }
                Ok(n) => {
                    buf = buf.get_mut(n..).unwrap_or(&mut []);
                    offset += n as u64;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    fn append(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }

    fn size(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}
