//! Commit log record codec
//!
//! Each record is length-prefixed and checksummed:
//!
//! ```text
//! [body_len: varint][crc32(body): u32 LE][body ...]
//! ```
//!
//! Body layout:
//! - unique-index (varint)
//! - identity marker (1 byte); when 1, the series-identity block follows:
//!   namespace (varint len + bytes), id (varint len + bytes), shard (varint)
//! - timestamp (i64 LE nanoseconds)
//! - value (f64 LE bits)
//! - unit (1 byte)
//! - annotation (varint len + bytes, may be empty)
//!
//! The identity block is written only on the first appearance of a
//! unique-index within a file; later records for the same series reference
//! it by number alone. A zero `body_len` marks end-of-data, which is how a
//! preallocated file's zeroed tail reads back.

use crate::types::{CommitLogEntry, Datapoint, Series, TimeUnit};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::{Arc, Mutex};

/// Marker byte: record carries a full series-identity block.
const MARKER_WITH_IDENTITY: u8 = 1;
/// Marker byte: record references a previously seen unique-index.
const MARKER_REF_ONLY: u8 = 0;

/// Decode-side sanity bound on a single record body.
const MAX_BODY_LEN: usize = 16 * 1024 * 1024;

/// A decode failure localized to one record. The reader treats it as
/// corruption and truncates the rest of the file.
#[derive(Debug)]
pub(crate) struct DecodeError {
    pub reason: String,
}

impl DecodeError {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// --- varint and fixed-width helpers ---

pub(crate) fn write_var_u64(buf: &mut Vec<u8>, mut v: u64) {
    while v >= 0x80 {
        buf.push((v as u8) | 0x80);
        v >>= 7;
    }
    buf.push(v as u8);
}

pub(crate) fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn read_var_u64<R: Read>(r: &mut R) -> Result<u64, DecodeError> {
    let mut out: u64 = 0;
    let mut shift: u32 = 0;
    for _ in 0..10 {
        let mut b = [0u8; 1];
        r.read_exact(&mut b)
            .map_err(|e| DecodeError::new(format!("truncated varint: {}", e)))?;
        out |= ((b[0] & 0x7F) as u64) << shift;
        if b[0] & 0x80 == 0 {
            return Ok(out);
        }
        shift = shift.saturating_add(7);
    }
    Err(DecodeError::new("varint too long"))
}

/// Like `read_var_u64`, but EOF before the first byte yields None.
pub(crate) fn read_var_u64_or_eof<R: Read>(r: &mut R) -> Result<Option<u64>, DecodeError> {
    let mut b = [0u8; 1];
    match r.read(&mut b) {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(e) => return Err(DecodeError::new(format!("read failed: {}", e))),
    }
    if b[0] & 0x80 == 0 {
        return Ok(Some(b[0] as u64));
    }
    let mut out: u64 = (b[0] & 0x7F) as u64;
    let mut shift: u32 = 7;
    for _ in 0..9 {
        r.read_exact(&mut b)
            .map_err(|e| DecodeError::new(format!("truncated varint: {}", e)))?;
        out |= ((b[0] & 0x7F) as u64) << shift;
        if b[0] & 0x80 == 0 {
            return Ok(Some(out));
        }
        shift = shift.saturating_add(7);
    }
    Err(DecodeError::new("varint too long"))
}

pub(crate) fn read_i64<R: Read>(r: &mut R) -> Result<i64, DecodeError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)
        .map_err(|e| DecodeError::new(format!("truncated i64: {}", e)))?;
    Ok(i64::from_le_bytes(b))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64, DecodeError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)
        .map_err(|e| DecodeError::new(format!("truncated u64: {}", e)))?;
    Ok(u64::from_le_bytes(b))
}

pub(crate) fn read_u32<R: Read>(r: &mut R) -> Result<u32, DecodeError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)
        .map_err(|e| DecodeError::new(format!("truncated u32: {}", e)))?;
    Ok(u32::from_le_bytes(b))
}

pub(crate) fn read_f64<R: Read>(r: &mut R) -> Result<f64, DecodeError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)
        .map_err(|e| DecodeError::new(format!("truncated f64: {}", e)))?;
    Ok(f64::from_le_bytes(b))
}

fn read_var_bytes<R: Read>(r: &mut R, what: &str) -> Result<Vec<u8>, DecodeError> {
    let len = read_var_u64(r)? as usize;
    if len > MAX_BODY_LEN {
        return Err(DecodeError::new(format!("{} length {} too large", what, len)));
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)
        .map_err(|e| DecodeError::new(format!("truncated {}: {}", what, e)))?;
    Ok(bytes)
}

// --- encoder ---

/// Encodes records for a single log file, tracking which unique-indexes
/// have already carried their identity block.
#[derive(Debug, Default)]
pub(crate) struct RecordEncoder {
    seen: HashSet<u64>,
    body: Vec<u8>,
}

impl RecordEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode one record, appending the framed bytes to `out`.
    pub fn encode(&mut self, entry: &CommitLogEntry, out: &mut Vec<u8>) {
        self.body.clear();
        let body = &mut self.body;

        let series = &entry.series;
        write_var_u64(body, series.unique_index);

        if self.seen.insert(series.unique_index) {
            body.push(MARKER_WITH_IDENTITY);
            write_var_u64(body, series.namespace.len() as u64);
            body.extend_from_slice(&series.namespace);
            write_var_u64(body, series.id.len() as u64);
            body.extend_from_slice(&series.id);
            write_var_u64(body, series.shard as u64);
        } else {
            body.push(MARKER_REF_ONLY);
        }

        write_i64(body, entry.datapoint.timestamp_nanos);
        write_f64(body, entry.datapoint.value);
        body.push(entry.unit as u8);
        write_var_u64(body, entry.annotation.len() as u64);
        body.extend_from_slice(&entry.annotation);

        write_var_u64(out, body.len() as u64);
        write_u32(out, crc32fast::hash(body));
        out.extend_from_slice(body);
    }

    /// Conservative upper bound on the framed size of an entry, used for
    /// batch byte accounting before the entry is encoded.
    pub fn estimated_size(entry: &CommitLogEntry) -> usize {
        // Frame + fixed fields + worst-case varints, plus the identity
        // block in case this is the entry's first appearance in the file.
        64 + entry.series.namespace.len() + entry.series.id.len() + entry.annotation.len()
    }
}

// --- decoder ---

/// Decodes records from a single log file, reconstructing series identity
/// from unique-index references.
#[derive(Debug, Default)]
pub(crate) struct RecordDecoder {
    registry: HashMap<u64, Arc<Series>>,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the next record. Returns None at end-of-data (true EOF or a
    /// preallocated zeroed tail).
    pub fn read_record<R: Read>(
        &mut self,
        r: &mut R,
    ) -> Result<Option<CommitLogEntry>, DecodeError> {
        let body_len = match read_var_u64_or_eof(r)? {
            None | Some(0) => return Ok(None),
            Some(len) => len as usize,
        };
        if body_len > MAX_BODY_LEN {
            return Err(DecodeError::new(format!(
                "record body length {} exceeds limit",
                body_len
            )));
        }

        let stored_crc = read_u32(r)?;
        let mut body = vec![0u8; body_len];
        r.read_exact(&mut body)
            .map_err(|e| DecodeError::new(format!("truncated record body: {}", e)))?;

        let computed_crc = crc32fast::hash(&body);
        if stored_crc != computed_crc {
            return Err(DecodeError::new(format!(
                "checksum mismatch: stored={}, computed={}",
                stored_crc, computed_crc
            )));
        }

        self.decode_body(&body).map(Some)
    }

    fn decode_body(&mut self, body: &[u8]) -> Result<CommitLogEntry, DecodeError> {
        let mut r = body;

        let unique_index = read_var_u64(&mut r)?;

        let mut marker = [0u8; 1];
        r.read_exact(&mut marker)
            .map_err(|e| DecodeError::new(format!("truncated marker: {}", e)))?;

        let series = match marker[0] {
            MARKER_WITH_IDENTITY => {
                let namespace = read_var_bytes(&mut r, "namespace")?;
                let id = read_var_bytes(&mut r, "series id")?;
                let shard = read_var_u64(&mut r)?;
                if shard > u32::MAX as u64 {
                    return Err(DecodeError::new(format!("shard {} out of range", shard)));
                }
                let series = Arc::new(Series::new(namespace, id, shard as u32, unique_index));
                self.registry.insert(unique_index, Arc::clone(&series));
                series
            }
            MARKER_REF_ONLY => self
                .registry
                .get(&unique_index)
                .cloned()
                .ok_or_else(|| {
                    DecodeError::new(format!(
                        "record references unknown unique-index {}",
                        unique_index
                    ))
                })?,
            other => {
                return Err(DecodeError::new(format!(
                    "unknown identity marker {}",
                    other
                )))
            }
        };

        let timestamp_nanos = read_i64(&mut r)?;
        let value = read_f64(&mut r)?;

        let mut unit_byte = [0u8; 1];
        r.read_exact(&mut unit_byte)
            .map_err(|e| DecodeError::new(format!("truncated unit: {}", e)))?;
        let unit = TimeUnit::try_from(unit_byte[0])
            .map_err(|b| DecodeError::new(format!("unknown time unit {}", b)))?;

        let annotation = read_var_bytes(&mut r, "annotation")?;

        Ok(CommitLogEntry {
            series,
            datapoint: Datapoint::new(timestamp_nanos, value),
            unit,
            annotation,
        })
    }
}

// --- buffer pool ---

/// Pool of reusable byte buffers for encode scratch space.
///
/// Buffers are handed out on `get` and returned on `put`; buffers that
/// grew past the retain limit are dropped instead of pooled.
#[derive(Debug)]
pub struct BufferPool {
    bufs: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    retain_capacity: usize,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self {
            bufs: Mutex::new(Vec::new()),
            max_pooled: 8,
            retain_capacity: 1024 * 1024,
        }
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared buffer with at least `size` capacity.
    pub fn get(&self, size: usize) -> Vec<u8> {
        let mut bufs = self.bufs.lock().unwrap_or_else(|e| e.into_inner());
        match bufs.pop() {
            Some(mut buf) => {
                buf.clear();
                if buf.capacity() < size {
                    buf.reserve(size - buf.capacity());
                }
                buf
            }
            None => Vec::with_capacity(size),
        }
    }

    /// Return a buffer to the pool.
    pub fn put(&self, buf: Vec<u8>) {
        if buf.capacity() > self.retain_capacity {
            return;
        }
        let mut bufs = self.bufs.lock().unwrap_or_else(|e| e.into_inner());
        if bufs.len() < self.max_pooled {
            bufs.push(buf);
        }
    }
}
