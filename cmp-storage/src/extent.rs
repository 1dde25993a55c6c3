//! Multi-extent virtual address space
//!
//! Large CMP datasets overflow into numbered sibling files
//! (`name00001.ext`, `name00002.ext`, ...). [`ExtentSet`] opens the base file
//! plus as many siblings as the target virtual size requires and exposes one
//! monotonic byte address space over all of them.

use crate::error::{Error, Result};
use memmap2::{Mmap, MmapOptions};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// One physical file contributing a contiguous slice of the address space.
#[derive(Debug)]
struct Extent {
    /// Memory-mapped view (preferred).
    mmap: Option<Mmap>,
    /// Buffered reader fallback when mapping fails.
    file: Option<Mutex<BufReader<File>>>,
    len: u64,
}

impl Extent {
    fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let mmap = if len > 0 {
            match unsafe { MmapOptions::new().map(&file) } {
                Ok(mmap) => Some(mmap),
                Err(e) => {
                    debug!("failed to map {}, falling back to reads: {e}", path.display());
                    None
                }
            }
        } else {
            None
        };

        let file = if mmap.is_none() {
            Some(Mutex::new(BufReader::new(file)))
        } else {
            None
        };

        Ok(Self { mmap, file, len })
    }

    /// Copy `dst.len()` bytes starting at `offset` within this extent.
    /// The caller guarantees the range is in bounds.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if let Some(mmap) = &self.mmap {
            let start = offset as usize;
            dst.copy_from_slice(&mmap[start..start + dst.len()]);
            return Ok(());
        }
        if let Some(file) = &self.file {
            let mut reader = file.lock().unwrap_or_else(|e| e.into_inner());
            reader.seek(SeekFrom::Start(offset))?;
            reader.read_exact(dst)?;
        }
        Ok(())
    }
}

/// Virtual contiguous address space over a base file and its numbered
/// overflow siblings.
#[derive(Debug)]
pub struct ExtentSet {
    base: PathBuf,
    extents: Vec<Extent>,
    /// Cumulative start offset of each extent.
    starts: Vec<u64>,
    total: u64,
}

impl ExtentSet {
    /// Open the base file and numbered siblings until the accumulated size
    /// covers `target_size` (or the siblings run out). A `target_size` of 0
    /// opens every sibling present.
    pub fn open(base: impl AsRef<Path>, target_size: u64) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        if !base.exists() {
            return Err(Error::NotFound(base));
        }

        let mut extents = Vec::new();
        let mut starts = Vec::new();
        let mut total = 0u64;
        let mut index = 0u32;
        loop {
            let path = if index == 0 {
                base.clone()
            } else {
                numbered_extent(&base, index)
            };
            if index > 0 && !path.exists() {
                break;
            }
            let extent = Extent::open(&path)?;
            debug!(
                "opened extent {} ({} bytes, mapped={})",
                path.display(),
                extent.len,
                extent.mmap.is_some()
            );
            starts.push(total);
            total += extent.len;
            extents.push(extent);
            index += 1;

            if target_size > 0 && total >= target_size {
                break;
            }
        }

        Ok(Self {
            base,
            extents,
            starts,
            total,
        })
    }

    /// Path of the base file.
    pub fn base_path(&self) -> &Path {
        &self.base
    }

    /// Total virtual size in bytes.
    pub fn total_size(&self) -> u64 {
        self.total
    }

    /// Number of physical files backing the address space.
    pub fn extent_count(&self) -> usize {
        self.extents.len()
    }

    fn check_range(&self, offset: u64, len: usize) -> Result<()> {
        if offset >= self.total {
            return Err(Error::OutOfRange(format!(
                "offset {offset} beyond end of address space ({} bytes)",
                self.total
            )));
        }
        if offset + len as u64 > self.total {
            return Err(Error::ShortRead {
                offset,
                wanted: len,
                available: self.total - offset,
            });
        }
        Ok(())
    }

    /// Index of the extent containing `offset`. Bounds already checked.
    fn extent_index(&self, offset: u64) -> usize {
        self.starts.partition_point(|&start| start <= offset) - 1
    }

    /// Fill `dst` from the virtual address `offset`, crossing extent
    /// boundaries as needed.
    pub fn read_fully(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if dst.is_empty() {
            return Ok(());
        }
        self.check_range(offset, dst.len())?;

        let mut pos = offset;
        let mut written = 0usize;
        while written < dst.len() {
            let idx = self.extent_index(pos);
            let within = pos - self.starts[idx];
            let can_read = ((self.extents[idx].len - within) as usize).min(dst.len() - written);
            self.extents[idx].read_at(within, &mut dst[written..written + can_read])?;
            written += can_read;
            pos += can_read as u64;
        }
        Ok(())
    }

    /// Borrowed view when the range sits inside a single mapped extent,
    /// otherwise an owned copy assembled with [`Self::read_fully`].
    pub fn slice(&self, offset: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        self.check_range(offset, len)?;

        let idx = self.extent_index(offset);
        let within = (offset - self.starts[idx]) as usize;
        if within as u64 + len as u64 <= self.extents[idx].len {
            if let Some(mmap) = &self.extents[idx].mmap {
                return Ok(Cow::Borrowed(&mmap[within..within + len]));
            }
        }

        let mut buf = vec![0u8; len];
        self.read_fully(offset, &mut buf)?;
        Ok(Cow::Owned(buf))
    }
}

/// Path of the `index`-th overflow sibling: the extension stem gains a
/// five-digit counter (`data.cmp` -> `data00001.cmp`).
pub fn numbered_extent(base: &Path, index: u32) -> PathBuf {
    let name = base
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name.as_str(), ""),
    };
    let numbered = format!("{stem}{index:05}{ext}");
    match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(numbered),
        _ => PathBuf::from(numbered),
    }
}
