//! Envelope Module - object graph images
//!
//! `flatten` walks the graph depth-first from a root and writes one record
//! per object. The first visit of an object writes its record and remembers
//! identity -> image offset in a heap-resident [`MapTable`](crate::table::MapTable);
//! later visits only patch in that offset, so shared and cyclic structure is
//! written once.
//!
//! `unflatten` scans the records, reserves one slot per record, then decodes
//! each payload with references resolved to the reserved slots. The restored
//! graph is isomorphic to the saved one, sharing and cycles included.
//!
//! Both passes run with collection inhibited. If a restore fails part way,
//! the slots it reserved are unreachable and the next collection frees them.

pub mod image;

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use self::image::{
    ImageHeader, RecordHeader, RecordReader, RecordWriter, IMAGE_HEADER_SIZE, IMAGE_VERSION,
    RECORD_HEADER_SIZE, REF_SIZE,
};
use crate::error::{MemoryError, Result};
use crate::logging::{self, MemoryEvent};
use crate::memory::Memory;
use crate::object::header::{align_up, allocation_size, MIN_OBJECT_SIZE, OBJECT_GRAIN};
use crate::object::{ObjectRef, TypeTag};
use crate::table::{ListObject, ListTable, MapTable};

impl Memory {
    /// Serialize the graph reachable from `root`
    ///
    /// # Returns
    /// The image bytes, header included
    pub fn flatten(&mut self, root: ObjectRef) -> Result<Vec<u8>> {
        let mut memory = self.inhibit_collection();
        memory.flatten_graph(root)
    }

    fn flatten_graph(&mut self, root: ObjectRef) -> Result<Vec<u8>> {
        self.object(root)?;

        let visited = self.new_map_table()?;
        self.hold(visited);
        let result = self.write_records(root, visited);
        self.release(visited);

        let image = result?;
        log::debug!("flattened {} into {} bytes", root, image.len());
        Ok(image)
    }

    fn write_records(&mut self, root: ObjectRef, visited: ObjectRef) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        let mut patches = Vec::new();
        let mut stack = vec![root];
        let mut count: u64 = 0;

        while let Some(r) = stack.pop() {
            if self.map_contains(visited, r)? {
                continue;
            }

            let offset = IMAGE_HEADER_SIZE + body.len();
            let slot = self.heap().slot(r)?;
            let object = slot
                .object
                .as_deref()
                .ok_or(MemoryError::InvalidReference(r))?;

            let mut writer = RecordWriter::new();
            object.flatten(&mut writer)?;
            let (payload, refs) = writer.into_parts();

            let record = RecordHeader {
                tag: slot.header.type_tag(),
                object_size: to_u32(slot.header.size())?,
                payload_len: to_u32(payload.len())?,
            };
            record.encode(&mut body);
            body.extend_from_slice(&payload);

            let payload_start = offset + RECORD_HEADER_SIZE;
            for &(pos, target) in refs.iter().rev() {
                patches.push((payload_start + pos, target));
                stack.push(target);
            }

            self.map_put(visited, offset as i64, r)?;
            count += 1;
        }

        let mut image = Vec::with_capacity(IMAGE_HEADER_SIZE + body.len());
        ImageHeader {
            version: IMAGE_VERSION,
            root_offset: IMAGE_HEADER_SIZE as u64,
            object_count: count,
            body_length: body.len() as u64,
        }
        .encode(&mut image);
        image.extend_from_slice(&body);

        for (pos, target) in patches {
            let offset = self
                .map_get(visited, target)?
                .ok_or(MemoryError::InvalidReference(target))?;
            image[pos..pos + REF_SIZE].copy_from_slice(&(offset as u64).to_le_bytes());
        }

        if self.config().verbose {
            logging::log_event(MemoryEvent::ImageSaved {
                objects: count,
                bytes: image.len(),
            });
        }
        Ok(image)
    }

    /// Rebuild an object graph from an image
    ///
    /// # Returns
    /// The restored root, or a load failure
    /// ([`MemoryError::is_load_failure`]) for a malformed image
    pub fn unflatten(&mut self, image: &[u8]) -> Result<ObjectRef> {
        let mut memory = self.inhibit_collection();
        memory.read_records(image).map_err(|e| {
            if e.is_load_failure() {
                log::warn!("image rejected: {}", e);
            }
            e
        })
    }

    fn read_records(&mut self, image: &[u8]) -> Result<ObjectRef> {
        let header = ImageHeader::decode(image)?;

        let mut records = Vec::new();
        let mut offset = IMAGE_HEADER_SIZE;
        while offset < image.len() {
            let record = RecordHeader::decode_at(image, offset)?;
            let size = record.object_size as usize;
            if size < MIN_OBJECT_SIZE
                || align_up(size, OBJECT_GRAIN) != size
                || size > self.config().max_heap_size
            {
                return Err(MemoryError::corrupt(
                    offset,
                    format!("invalid object size {}", size),
                ));
            }
            if !self.types().contains(record.tag) {
                return Err(MemoryError::UnknownType(record.tag));
            }
            records.push((offset, record));
            offset = record.next_offset(offset);
        }

        if records.len() as u64 != header.object_count {
            return Err(MemoryError::corrupt(
                IMAGE_HEADER_SIZE,
                format!(
                    "header declares {} objects, body holds {}",
                    header.object_count,
                    records.len()
                ),
            ));
        }

        let mut resolved = FxHashMap::default();
        let mut reserved = Vec::with_capacity(records.len());
        for &(offset, record) in &records {
            let r = self.reserve(record.tag, record.object_size as usize)?;
            resolved.insert(offset as u64, r);
            reserved.push(r);
        }

        let root = resolved
            .get(&header.root_offset)
            .copied()
            .ok_or_else(|| {
                MemoryError::corrupt(
                    IMAGE_HEADER_SIZE,
                    format!("root offset {} does not name a record", header.root_offset),
                )
            })?;

        for (&(offset, record), &r) in records.iter().zip(&reserved) {
            let restore = self
                .types()
                .get(record.tag)
                .map(|info| info.restore)
                .ok_or(MemoryError::UnknownType(record.tag))?;

            let mut reader = RecordReader::new(image, offset, record, &resolved);
            let object = restore(&mut reader)?;
            if !reader.is_exhausted() {
                return Err(MemoryError::corrupt(
                    reader.offset(),
                    format!("{} bytes left in record", reader.remaining()),
                ));
            }
            if object.type_tag() != record.tag {
                return Err(MemoryError::corrupt(
                    offset,
                    format!("record {} restored as {}", record.tag, object.type_tag()),
                ));
            }
            let needed = allocation_size(object.data_size());
            if needed > record.object_size as usize {
                return Err(MemoryError::corrupt(
                    offset,
                    format!(
                        "{} needs {} bytes, record declares {}",
                        object.type_name(),
                        needed,
                        record.object_size
                    ),
                ));
            }
            self.heap_mut().install(r, object)?;
        }

        for (&(offset, record), &r) in records.iter().zip(&reserved) {
            self.check_restored(offset, record.tag, r)?;
        }

        if self.config().verbose {
            logging::log_event(MemoryEvent::ImageLoaded {
                objects: header.object_count,
                bytes: image.len(),
            });
        }
        Ok(root)
    }

    /// Check the references a restored table relies on
    ///
    /// A map table must own a bucket, and an expanded list a table large
    /// enough for its length.
    fn check_restored(&self, offset: usize, tag: TypeTag, r: ObjectRef) -> Result<()> {
        let (target, expected) = match tag {
            TypeTag::MAP_TABLE => (self.get::<MapTable>(r)?.bucket(), TypeTag::MAP_BUCKET),
            TypeTag::LIST => match self.get::<ListObject>(r)?.table() {
                Some(table) => (table, TypeTag::LIST_TABLE),
                None => return Ok(()),
            },
            _ => return Ok(()),
        };

        let found = self.type_tag(target)?;
        if found != expected {
            return Err(MemoryError::corrupt(
                offset,
                format!("{} refers to {} where {} belongs", tag, found, expected),
            ));
        }

        if tag == TypeTag::LIST {
            let len = self.get::<ListObject>(r)?.len();
            let size = self.get::<ListTable>(target)?.size();
            if len > size {
                return Err(MemoryError::corrupt(
                    offset,
                    format!("list length {} exceeds table size {}", len, size),
                ));
            }
        }
        Ok(())
    }

    /// Path of the image file inside `dir`
    pub fn image_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.config().image_file_name)
    }

    /// Flatten `root` into the image file in `dir`
    ///
    /// The image is written to a temporary file first and renamed into
    /// place, so an existing image is never left half written.
    pub fn save_image(&mut self, dir: &Path, root: ObjectRef) -> Result<PathBuf> {
        let image = self.flatten(root)?;
        let path = self.image_path(dir);
        let partial = path.with_extension("partial");

        fs::write(&partial, &image)?;
        fs::rename(&partial, &path)?;
        log::info!("saved image {} ({} bytes)", path.display(), image.len());
        Ok(path)
    }

    /// Restore the image file in `dir`
    pub fn restore_image(&mut self, dir: &Path) -> Result<ObjectRef> {
        let path = self.image_path(dir);
        let image = fs::read(&path)?;
        let root = self.unflatten(&image)?;
        log::info!("restored image {} ({} bytes)", path.display(), image.len());
        Ok(root)
    }
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| MemoryError::InvalidState {
        expected: "record field fitting in u32".to_string(),
        actual: value.to_string(),
    })
}
