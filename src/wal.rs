use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::Record;

const HEADER: usize = 4;
const TRAILER: usize = 4;

fn encode_frame(out: &mut Vec<u8>, record: &Record) -> io::Result<()> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

fn encode_frames(records: &[Record]) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    for record in records {
        encode_frame(&mut buf, record)?;
    }
    Ok(buf)
}

/// One frame from the front of `buf` and its encoded size. `None` if the
/// frame is short, fails its checksum, or does not decode.
fn decode_frame(buf: &[u8]) -> Option<(Record, usize)> {
    let len = u32::from_le_bytes(buf.get(..HEADER)?.try_into().ok()?) as usize;
    let end = HEADER.checked_add(len)?;
    let payload = buf.get(HEADER..end)?;
    let crc = u32::from_le_bytes(buf.get(end..end + TRAILER)?.try_into().ok()?);
    if crc != crc32fast::hash(payload) {
        return None;
    }
    let record = bincode::deserialize(payload).ok()?;
    Some((record, end + TRAILER))
}

/// Every intact frame, plus the length of the intact prefix.
fn decode_frames(bytes: &[u8]) -> (Vec<Record>, usize) {
    let mut records = Vec::new();
    let mut offset = 0;
    while let Some((record, used)) = decode_frame(&bytes[offset..]) {
        records.push(record);
        offset += used;
    }
    (records, offset)
}

/// Append-only log of store records, owned by the durable store's writer task.
///
/// Frame: `[u32 le: payload len][bincode Record][u32 le: crc32 of payload]`.
/// The file only ever holds whole frames: a torn tail found on open is cut
/// off, and a batch that fails mid-write is rolled back to the last good
/// length, so anything appended afterwards stays replayable.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Bytes of intact frames in the file.
    len: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log and return it with the records it holds.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Record>)> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e),
        };
        let (records, intact) = decode_frames(&bytes);

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        if intact < bytes.len() {
            warn!(
                path = %path.display(),
                "discarding {} bytes of torn log tail after {} records",
                bytes.len() - intact,
                records.len()
            );
            file.set_len(intact as u64)?;
            file.sync_all()?;
        }

        let wal = Self {
            file,
            path: path.to_path_buf(),
            len: intact as u64,
            // Replayed records count towards the next compaction.
            appends_since_compact: records.len() as u64,
        };
        Ok((wal, records))
    }

    /// Write a batch and fsync once. On failure the file is cut back to
    /// where it was before the batch.
    pub fn append_batch(&mut self, records: &[Record]) -> io::Result<()> {
        let buf = encode_frames(records)?;
        let written = self
            .file
            .write_all(&buf)
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            if let Err(undo) = self.file.set_len(self.len) {
                warn!(path = %self.path.display(), "could not roll back partial batch: {undo}");
            }
            return Err(e);
        }
        self.len += buf.len() as u64;
        self.appends_since_compact += records.len() as u64;
        Ok(())
    }

    /// Replace the whole log with `records` (temp file, fsync, rename).
    pub fn rewrite(&mut self, records: &[Record]) -> io::Result<()> {
        let buf = encode_frames(records)?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.len = buf.len() as u64;
        self.appends_since_compact = 0;
        Ok(())
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }
}
