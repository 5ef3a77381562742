//! Image wire format
//!
//! ```text
//! header:  magic "OMIM" | version u16 | reserved u16 | root offset u64 | object count u64 | body length u64
//! record:  type tag u16 | reserved u16 | object size u32 | payload length u32 | payload
//! ```
//!
//! All integers are little endian. A reference inside a payload is the u64
//! image offset of the target record; offset 0 is the null reference, which
//! can never name a record because the header occupies it.

use rustc_hash::FxHashMap;

use crate::error::{MemoryError, Result};
use crate::object::{ObjectRef, TypeTag};

pub const IMAGE_MAGIC: [u8; 4] = *b"OMIM";
pub const IMAGE_VERSION: u16 = 1;
pub const IMAGE_HEADER_SIZE: usize = 32;
pub const RECORD_HEADER_SIZE: usize = 12;

/// Encoded size of a reference in a payload
pub const REF_SIZE: usize = 8;

// ============================================================================
// HEADERS
// ============================================================================

/// Fixed image header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub version: u16,
    pub root_offset: u64,
    pub object_count: u64,
    pub body_length: u64,
}

impl ImageHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&IMAGE_MAGIC);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.root_offset.to_le_bytes());
        out.extend_from_slice(&self.object_count.to_le_bytes());
        out.extend_from_slice(&self.body_length.to_le_bytes());
    }

    /// Decode and check the header of `image`
    ///
    /// Verifies magic, version and that the declared body fits the image.
    pub fn decode(image: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(image, 0);
        let magic = cursor.take(4)?;
        if magic != IMAGE_MAGIC {
            return Err(MemoryError::corrupt(0, "bad magic"));
        }

        let version = cursor.u16()?;
        if version != IMAGE_VERSION {
            return Err(MemoryError::corrupt(
                4,
                format!("unsupported version {}", version),
            ));
        }
        let _reserved = cursor.u16()?;

        let header = ImageHeader {
            version,
            root_offset: cursor.u64()?,
            object_count: cursor.u64()?,
            body_length: cursor.u64()?,
        };

        let declared = (IMAGE_HEADER_SIZE as u64).saturating_add(header.body_length);
        if declared > image.len() as u64 {
            return Err(MemoryError::TruncatedImage {
                offset: IMAGE_HEADER_SIZE,
                needed: header.body_length as usize,
                length: image.len(),
            });
        }
        if declared < image.len() as u64 {
            return Err(MemoryError::corrupt(
                declared as usize,
                "trailing bytes after body",
            ));
        }

        Ok(header)
    }
}

/// Header of one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub tag: TypeTag,
    pub object_size: u32,
    pub payload_len: u32,
}

impl RecordHeader {
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tag.0.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.object_size.to_le_bytes());
        out.extend_from_slice(&self.payload_len.to_le_bytes());
    }

    /// Decode the record header at `offset`, checking the payload fits
    pub fn decode_at(image: &[u8], offset: usize) -> Result<Self> {
        let mut cursor = Cursor::new(image, offset);
        let tag = TypeTag(cursor.u16()?);
        let _reserved = cursor.u16()?;
        let header = RecordHeader {
            tag,
            object_size: cursor.u32()?,
            payload_len: cursor.u32()?,
        };
        cursor.take(header.payload_len as usize)?;
        Ok(header)
    }

    /// Offset of the record following one at `offset`
    pub fn next_offset(&self, offset: usize) -> usize {
        offset + RECORD_HEADER_SIZE + self.payload_len as usize
    }
}

// ============================================================================
// CURSOR
// ============================================================================

/// Bounds-checked little-endian reader over an image slice
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8], pos: usize) -> Self {
        Self { bytes, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let slice = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(slice)
            },
            None => Err(MemoryError::TruncatedImage {
                offset: self.pos,
                needed: n,
                length: self.bytes.len(),
            }),
        }
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}

// ============================================================================
// RECORD WRITER
// ============================================================================

/// Payload writer handed to [`HeapObject::flatten`](crate::object::HeapObject::flatten)
///
/// References are written as placeholders and patched with image offsets
/// once every object has been placed.
#[derive(Debug, Default)]
pub struct RecordWriter {
    payload: Vec<u8>,
    refs: Vec<(usize, ObjectRef)>,
}

impl RecordWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.payload.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.payload.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a length or count as u32
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| MemoryError::InvalidState {
            expected: "length fitting in u32".to_string(),
            actual: len.to_string(),
        })?;
        self.write_u32(len);
        Ok(())
    }

    /// Write a length-prefixed byte string
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.payload.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Write a reference; the image writer follows it
    pub fn write_ref(&mut self, target: Option<ObjectRef>) {
        if let Some(target) = target {
            self.refs.push((self.payload.len(), target));
        }
        self.write_u64(0);
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Payload bytes and the (payload position, target) of each reference
    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<(usize, ObjectRef)>) {
        (self.payload, self.refs)
    }
}

// ============================================================================
// RECORD READER
// ============================================================================

/// Payload reader handed to a [`RestoreFn`](crate::object::RestoreFn)
///
/// Offsets read by [`read_ref`](Self::read_ref) resolve to the objects the
/// restore pass reserved for each record.
pub struct RecordReader<'a> {
    payload: &'a [u8],
    pos: usize,
    base: usize,
    image_len: usize,
    header: RecordHeader,
    resolved: &'a FxHashMap<u64, ObjectRef>,
}

impl<'a> RecordReader<'a> {
    pub(crate) fn new(
        image: &'a [u8],
        record_offset: usize,
        header: RecordHeader,
        resolved: &'a FxHashMap<u64, ObjectRef>,
    ) -> Self {
        let base = record_offset + RECORD_HEADER_SIZE;
        let end = base + header.payload_len as usize;
        Self {
            payload: &image[base..end],
            pos: 0,
            base,
            image_len: image.len(),
            header,
            resolved,
        }
    }

    /// Type tag of the record being read
    pub fn tag(&self) -> TypeTag {
        self.header.tag
    }

    /// Slot size the object had when it was flattened
    pub fn object_size(&self) -> usize {
        self.header.object_size as usize
    }

    /// Absolute image offset of the next unread byte
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.payload.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos == self.payload.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(MemoryError::TruncatedImage {
                offset: self.offset(),
                needed: n,
                length: self.image_len,
            });
        }
        let slice = &self.payload[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.array()?))
    }

    /// Read a count of elements each `elem_size` bytes long
    ///
    /// Fails before any allocation if the elements cannot fit in the rest of
    /// the payload.
    pub fn read_count(&mut self, elem_size: usize) -> Result<usize> {
        let at = self.offset();
        let count = self.read_u32()? as usize;
        if count.saturating_mul(elem_size) > self.remaining() {
            return Err(MemoryError::corrupt(
                at,
                format!("count {} exceeds record payload", count),
            ));
        }
        Ok(count)
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_count(1)?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_str(&mut self) -> Result<String> {
        let at = self.offset();
        String::from_utf8(self.read_bytes()?)
            .map_err(|_| MemoryError::corrupt(at, "string payload is not UTF-8"))
    }

    /// Read a reference and resolve it to the restored object
    pub fn read_ref(&mut self) -> Result<Option<ObjectRef>> {
        let at = self.offset();
        let offset = self.read_u64()?;
        if offset == 0 {
            return Ok(None);
        }
        match self.resolved.get(&offset) {
            Some(&target) => Ok(Some(target)),
            None => Err(MemoryError::corrupt(
                at,
                format!("reference to {} does not name a record", offset),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(body_length: u64) -> ImageHeader {
        ImageHeader {
            version: IMAGE_VERSION,
            root_offset: IMAGE_HEADER_SIZE as u64,
            object_count: 1,
            body_length,
        }
    }

    #[test]
    fn test_header_size_matches_encoding() {
        let mut out = Vec::new();
        header(0).encode(&mut out);
        assert_eq!(out.len(), IMAGE_HEADER_SIZE);

        let mut out = Vec::new();
        RecordHeader {
            tag: TypeTag::STRING,
            object_size: 32,
            payload_len: 0,
        }
        .encode(&mut out);
        assert_eq!(out.len(), RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut out = Vec::new();
        header(0).encode(&mut out);
        out[0] = b'X';

        assert!(matches!(
            ImageHeader::decode(&out),
            Err(MemoryError::CorruptImage { offset: 0, .. })
        ));
    }

    #[test]
    fn test_header_detects_short_body() {
        let mut out = Vec::new();
        header(100).encode(&mut out);
        out.extend_from_slice(&[0u8; 10]);

        assert!(matches!(
            ImageHeader::decode(&out),
            Err(MemoryError::TruncatedImage { .. })
        ));
    }

    #[test]
    fn test_record_header_checks_payload_bounds() {
        let mut out = Vec::new();
        RecordHeader {
            tag: TypeTag::BUFFER,
            object_size: 64,
            payload_len: 40,
        }
        .encode(&mut out);
        out.extend_from_slice(&[0u8; 8]);

        assert!(matches!(
            RecordHeader::decode_at(&out, 0),
            Err(MemoryError::TruncatedImage { .. })
        ));
    }

    #[test]
    fn test_writer_records_reference_positions() {
        use crate::object::{SegmentId, SlotId};

        let target = ObjectRef::new(SegmentId(0), SlotId(4));
        let mut writer = RecordWriter::new();
        writer.write_u32(7);
        writer.write_ref(None);
        writer.write_ref(Some(target));

        let (payload, refs) = writer.into_parts();
        assert_eq!(payload.len(), 4 + 2 * REF_SIZE);
        assert_eq!(refs, vec![(12, target)]);
    }

    #[test]
    fn test_reader_rejects_oversized_count() {
        let mut image = Vec::new();
        let record = RecordHeader {
            tag: TypeTag::ARRAY,
            object_size: 32,
            payload_len: 4,
        };
        record.encode(&mut image);
        image.extend_from_slice(&1000u32.to_le_bytes());

        let resolved = FxHashMap::default();
        let mut reader = RecordReader::new(&image, 0, record, &resolved);
        assert!(matches!(
            reader.read_count(REF_SIZE),
            Err(MemoryError::CorruptImage { .. })
        ));
    }
}
