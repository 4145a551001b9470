use crate::block_file::BlockFile;
use crate::error::{Result, StoreError};
use crate::types::Association;
use std::collections::VecDeque;
use std::path::Path;

/// Maximum byte length of a key, value or context field.
pub const MAX_FIELD_LEN: usize = 120;

// On-disk field: 1 length byte + up to MAX_FIELD_LEN content bytes.
const FIELD_LEN: usize = MAX_FIELD_LEN + 1;
const LINK_LEN: u64 = 8;

// Header: growth pointer (u64), free-list head (i64), bucket count (u64).
const GROW_POS: u64 = 0;
const FREE_POS: u64 = 8;
const BUCKETS_POS: u64 = 16;
const BUCKET_TABLE_START: u64 = 24;

// key[121] value[121] context[121] next(i64)
const RECORD_LEN: u64 = (FIELD_LEN as u64) * 3 + LINK_LEN;
const NEXT_FIELD_POS: u64 = (FIELD_LEN as u64) * 3;

// Disk encoding of "no record": -1, decoded to None in memory.
const NIL_LINK: i64 = -1;

fn encode_link(link: Option<u64>) -> i64 {
    match link {
        Some(off) => off as i64,
        None => NIL_LINK,
    }
}

fn decode_link(raw: i64) -> Result<Option<u64>> {
    if raw == NIL_LINK {
        Ok(None)
    } else if raw >= 0 {
        Ok(Some(raw as u64))
    } else {
        Err(StoreError::Corrupt(format!("invalid link value {raw}")))
    }
}

/// FNV-1a 64-bit. Bucket placement must be stable across process restarts
/// because the bucket count is persisted with the data.
fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[derive(Debug)]
struct Record {
    key: String,
    value: String,
    context: String,
    next: Option<u64>,
}

/// A snapshot of the associations matching one `search` call, in chain
/// (insertion) order. Mutating the map afterwards does not affect a
/// `Matches` already obtained.
#[derive(Debug, Clone, Default)]
pub struct Matches {
    items: VecDeque<Association>,
}

impl Matches {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl Iterator for Matches {
    type Item = Association;

    fn next(&mut self) -> Option<Association> {
        self.items.pop_front()
    }
}

/// Disk-resident multimap: a fixed-bucket hash table stored in a single
/// binary file, mapping a key to a set of (value, context) pairs through
/// singly-linked collision chains. Deleted record slots are recycled via
/// an on-disk free list before the file is grown.
#[derive(Debug)]
pub struct PersistentMultiMap {
    file: BlockFile,
    num_buckets: u64,
    grow_at: u64,
    free_head: Option<u64>,
}

impl PersistentMultiMap {
    /// Create an empty map with a fixed bucket count. Fails if the backing
    /// file already exists.
    pub fn create_new(path: impl AsRef<Path>, num_buckets: u64) -> Result<Self> {
        if num_buckets == 0 {
            return Err(StoreError::InvalidBucketCount);
        }
        let path = path.as_ref();
        let mut file = BlockFile::create_new(path)?;

        // All-sentinel bucket table, written as one block.
        let table = vec![NIL_LINK.to_le_bytes(); num_buckets as usize].concat();
        file.write_all_at(&table, BUCKET_TABLE_START)?;

        let mut map = Self {
            file,
            num_buckets,
            grow_at: BUCKET_TABLE_START + num_buckets * LINK_LEN,
            free_head: None,
        };
        map.flush_header()?;
        log::info!(
            "created multimap at {:?} with {} buckets",
            path,
            num_buckets
        );
        Ok(map)
    }

    /// Open an existing map, loading its header.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = BlockFile::open_existing(path)?;

        let grow_at = file.read_u64(GROW_POS)?;
        let free_head = decode_link(file.read_i64(FREE_POS)?)?;
        let num_buckets = file.read_u64(BUCKETS_POS)?;
        if num_buckets == 0 {
            return Err(StoreError::Corrupt("bucket count is zero".into()));
        }

        log::info!("opened multimap at {:?} with {} buckets", path, num_buckets);
        Ok(Self {
            file,
            num_buckets,
            grow_at,
            free_head,
        })
    }

    /// Flush the header and release the file handle. Safe to call when
    /// already closed.
    pub fn close(&mut self) -> Result<()> {
        if !self.file.is_open() {
            return Ok(());
        }
        self.flush_header()?;
        self.file.close();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_open()
    }

    pub fn num_buckets(&self) -> u64 {
        self.num_buckets
    }

    /// Insert one association. Rejects any field over [`MAX_FIELD_LEN`]
    /// bytes without writing. Chain order is insertion order, so the new
    /// record lands at the tail of its bucket chain.
    pub fn insert(&mut self, key: &str, value: &str, context: &str) -> Result<()> {
        check_field("key", key)?;
        check_field("value", value)?;
        check_field("context", context)?;

        let bucket_pos = self.bucket_pos(key);
        match self.read_link_at(bucket_pos)? {
            None => {
                let slot = self.alloc_slot()?;
                self.write_record(slot, key, value, context, None)?;
                self.write_link_at(bucket_pos, Some(slot))?;
            }
            Some(head) => {
                // Walk to the chain tail.
                let mut tail = head;
                loop {
                    match self.read_link_at(tail + NEXT_FIELD_POS)? {
                        Some(next) => tail = next,
                        None => break,
                    }
                }
                let slot = self.alloc_slot()?;
                self.write_record(slot, key, value, context, None)?;
                self.write_link_at(tail + NEXT_FIELD_POS, Some(slot))?;
            }
        }
        Ok(())
    }

    /// Collect every association whose stored key equals `key`, in chain
    /// order. Hash collisions may place other keys in the same chain; those
    /// are skipped. An empty `Matches` means the key is absent.
    pub fn search(&mut self, key: &str) -> Result<Matches> {
        let bucket_pos = self.bucket_pos(key);
        let mut items = VecDeque::new();

        let mut cursor = self.read_link_at(bucket_pos)?;
        while let Some(at) = cursor {
            let record = self.read_record(at)?;
            if record.key == key {
                items.push_back(Association {
                    key: record.key,
                    value: record.value,
                    context: record.context,
                });
            }
            cursor = record.next;
        }

        log::debug!("search '{}' found {} match(es)", key, items.len());
        Ok(Matches { items })
    }

    /// Remove every record whose (key, value, context) triple matches
    /// exactly, anywhere in the chain, returning each freed slot to the
    /// free list. Returns the number removed; 0 means nothing matched.
    pub fn erase(&mut self, key: &str, value: &str, context: &str) -> Result<usize> {
        let bucket_pos = self.bucket_pos(key);
        let mut removed = 0usize;

        let mut prev: Option<u64> = None;
        let mut cursor = self.read_link_at(bucket_pos)?;
        while let Some(at) = cursor {
            let record = self.read_record(at)?;
            if record.key == key && record.value == value && record.context == context {
                // Relink predecessor (or the bucket head) past this record
                // before the slot's next field is overwritten by the free
                // list.
                match prev {
                    None => self.write_link_at(bucket_pos, record.next)?,
                    Some(p) => self.write_link_at(p + NEXT_FIELD_POS, record.next)?,
                }
                self.free_slot(at)?;
                removed += 1;
            } else {
                prev = Some(at);
            }
            cursor = record.next;
        }

        if removed > 0 {
            log::debug!("erased {} record(s) for key '{}'", removed, key);
        }
        Ok(removed)
    }

    fn bucket_pos(&self, key: &str) -> u64 {
        let bucket = fnv1a_64(key.as_bytes()) % self.num_buckets;
        BUCKET_TABLE_START + bucket * LINK_LEN
    }

    /// Take a slot off the free list, or grow the file.
    fn alloc_slot(&mut self) -> Result<u64> {
        match self.free_head {
            Some(slot) => {
                self.free_head = self.read_link_at(slot + NEXT_FIELD_POS)?;
                Ok(slot)
            }
            None => {
                let slot = self.grow_at;
                self.grow_at += RECORD_LEN;
                Ok(slot)
            }
        }
    }

    /// Push a reclaimed slot onto the free-list head. Only the slot's next
    /// field is rewritten; the stale field bytes are never read again.
    fn free_slot(&mut self, slot: u64) -> Result<()> {
        self.write_link_at(slot + NEXT_FIELD_POS, self.free_head)?;
        self.free_head = Some(slot);
        Ok(())
    }

    fn flush_header(&mut self) -> Result<()> {
        self.file.write_u64(self.grow_at, GROW_POS)?;
        self.file.write_i64(encode_link(self.free_head), FREE_POS)?;
        self.file.write_u64(self.num_buckets, BUCKETS_POS)?;
        Ok(())
    }

    fn read_link_at(&mut self, pos: u64) -> Result<Option<u64>> {
        decode_link(self.file.read_i64(pos)?)
    }

    fn write_link_at(&mut self, pos: u64, link: Option<u64>) -> Result<()> {
        self.file.write_i64(encode_link(link), pos)
    }

    fn read_record(&mut self, at: u64) -> Result<Record> {
        let mut buf = [0u8; RECORD_LEN as usize];
        self.file.read_exact_at(&mut buf, at)?;

        let key = decode_field(&buf[..FIELD_LEN])?;
        let value = decode_field(&buf[FIELD_LEN..FIELD_LEN * 2])?;
        let context = decode_field(&buf[FIELD_LEN * 2..FIELD_LEN * 3])?;
        let mut link = [0u8; 8];
        link.copy_from_slice(&buf[FIELD_LEN * 3..]);
        let raw_next = i64::from_le_bytes(link);
        Ok(Record {
            key,
            value,
            context,
            next: decode_link(raw_next)?,
        })
    }

    fn write_record(
        &mut self,
        at: u64,
        key: &str,
        value: &str,
        context: &str,
        next: Option<u64>,
    ) -> Result<()> {
        let mut buf = [0u8; RECORD_LEN as usize];
        encode_field(&mut buf[..FIELD_LEN], key);
        encode_field(&mut buf[FIELD_LEN..FIELD_LEN * 2], value);
        encode_field(&mut buf[FIELD_LEN * 2..FIELD_LEN * 3], context);
        buf[FIELD_LEN * 3..].copy_from_slice(&encode_link(next).to_le_bytes());
        self.file.write_all_at(&buf, at)
    }
}

impl Drop for PersistentMultiMap {
    fn drop(&mut self) {
        if self.file.is_open() {
            if let Err(e) = self.flush_header() {
                log::warn!("failed to flush multimap header on drop: {e}");
            }
        }
    }
}

fn check_field(name: &'static str, field: &str) -> Result<()> {
    if field.len() > MAX_FIELD_LEN {
        return Err(StoreError::FieldTooLong {
            field: name,
            len: field.len(),
            limit: MAX_FIELD_LEN,
        });
    }
    Ok(())
}

fn encode_field(buf: &mut [u8], field: &str) {
    let bytes = field.as_bytes();
    buf[0] = bytes.len() as u8;
    buf[1..=bytes.len()].copy_from_slice(bytes);
}

fn decode_field(buf: &[u8]) -> Result<String> {
    let len = buf[0] as usize;
    if len > MAX_FIELD_LEN {
        return Err(StoreError::Corrupt(format!(
            "field length byte {len} exceeds limit"
        )));
    }
    String::from_utf8(buf[1..=len].to_vec())
        .map_err(|_| StoreError::Corrupt("field is not valid UTF-8".into()))
}
