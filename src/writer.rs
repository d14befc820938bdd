//! Writers producing the on-disk record format.
//!
//! The stores are write-once, read-many: a writer appends whole records and
//! the mapped readers never mutate. Records are validated before any byte is
//! emitted so a failed `write` leaves the file unchanged.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::interval::{Interval, PayloadEntry};

fn open_output(path: &Path, append: bool) -> Result<BufWriter<File>> {
    let file = if append {
        OpenOptions::new().create(true).append(true).open(path)?
    } else {
        File::create(path)?
    };
    Ok(BufWriter::new(file))
}

fn check_record_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| StoreError::InvalidArgument(format!("record of {} items exceeds u32", len)))
}

/// Writer for interval set stores.
///
/// Every record must be sorted, non-overlapping, and non-touching
/// (`prev.end < next.start`); the readers rely on this invariant for
/// binary search and for `minus`.
pub struct IntervalSetWriter {
    out: BufWriter<File>,
}

impl IntervalSetWriter {
    /// Create or truncate a store file.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            out: open_output(path.as_ref(), false)?,
        })
    }

    /// Open a store file for appending. Appended records with already
    /// present ids supersede the earlier ones on read.
    pub fn append<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            out: open_output(path.as_ref(), true)?,
        })
    }

    /// Append one record.
    pub fn write(&mut self, id: u32, intervals: &[Interval]) -> Result<()> {
        let count = check_record_len(intervals.len())?;
        let mut prev_end: Option<u32> = None;
        for iv in intervals {
            if iv.end <= iv.start {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid interval: {}",
                    iv
                )));
            }
            if let Some(end) = prev_end {
                if iv.start <= end {
                    return Err(StoreError::InvalidArgument(format!(
                        "interval {} overlaps or touches the previous end {}",
                        iv, end
                    )));
                }
            }
            prev_end = Some(iv.end);
        }

        self.out.write_u32::<LittleEndian>(id)?;
        self.out.write_u32::<LittleEndian>(count)?;
        for iv in intervals {
            self.out.write_u32::<LittleEndian>(iv.start)?;
            self.out.write_u32::<LittleEndian>(iv.end)?;
        }
        Ok(())
    }

    /// Flush and close the writer.
    pub fn finish(mut self) -> Result<()> {
        use std::io::Write;
        self.out.flush()?;
        Ok(())
    }
}

/// Writer for interval list stores with a fixed payload width.
pub struct IntervalListWriter {
    out: BufWriter<File>,
    payload_len: usize,
}

impl IntervalListWriter {
    /// Create or truncate a store file whose entries carry
    /// `payload_len`-byte payloads (0 to 8).
    pub fn create<P: AsRef<Path>>(path: P, payload_len: usize) -> Result<Self> {
        Self::open(path.as_ref(), payload_len, false)
    }

    /// Open a store file for appending.
    pub fn append<P: AsRef<Path>>(path: P, payload_len: usize) -> Result<Self> {
        Self::open(path.as_ref(), payload_len, true)
    }

    fn open(path: &Path, payload_len: usize, append: bool) -> Result<Self> {
        if payload_len > 8 {
            return Err(StoreError::InvalidArgument(format!(
                "payload length {} exceeds 8 bytes",
                payload_len
            )));
        }
        Ok(Self {
            out: open_output(path, append)?,
            payload_len,
        })
    }

    /// Append one record. Entries must be sorted by start (ties allowed)
    /// and every payload must fit the configured width.
    pub fn write(&mut self, id: u32, entries: &[PayloadEntry]) -> Result<()> {
        let count = check_record_len(entries.len())?;
        let payload_limit = match self.payload_len {
            0 => 1,
            8 => u64::MAX,
            n => 1u64 << (8 * n),
        };
        let mut prev_start: Option<u32> = None;
        for entry in entries {
            let iv = entry.interval;
            if iv.end <= iv.start {
                return Err(StoreError::InvalidArgument(format!(
                    "invalid interval: {}",
                    iv
                )));
            }
            if let Some(start) = prev_start {
                if iv.start < start {
                    return Err(StoreError::InvalidArgument(format!(
                        "entry {} breaks the start ordering",
                        entry
                    )));
                }
            }
            if self.payload_len < 8 && entry.payload >= payload_limit {
                return Err(StoreError::InvalidArgument(format!(
                    "payload {:#x} does not fit in {} bytes",
                    entry.payload, self.payload_len
                )));
            }
            prev_start = Some(iv.start);
        }

        self.out.write_u32::<LittleEndian>(id)?;
        self.out.write_u32::<LittleEndian>(count)?;
        for entry in entries {
            self.out.write_u32::<LittleEndian>(entry.interval.start)?;
            self.out.write_u32::<LittleEndian>(entry.interval.end)?;
            if self.payload_len > 0 {
                self.out
                    .write_uint::<LittleEndian>(entry.payload, self.payload_len)?;
            }
        }
        Ok(())
    }

    /// Flush and close the writer.
    pub fn finish(mut self) -> Result<()> {
        use std::io::Write;
        self.out.flush()?;
        Ok(())
    }
}
