//! # Page Layout and Operations
//!
//! Every volume file is one page. The page is self-describing: a fixed
//! header at offset 0, an offset index growing forward behind it, and
//! record bytes growing backward from the end. The two regions grow
//! toward each other; the gap between them is the free space.
//!
//! ```text
//! +--------------------------+  offset 0
//! |   PageHeader (80 bytes)  |
//! +--------------------------+  PAGE_HEADER_SIZE
//! |   page_index[count]      |  <- 4-byte entry offsets, grows forward
//! +--------------------------+
//! |        free space        |
//! +--------------------------+  last_offset
//! |   record bytes           |  <- entries, grows backward
//! +--------------------------+  length - 1
//! ```
//!
//! ## Header Layout (80 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       8     magic        "CHRONOPG"
//! 8       4     kind         Page kind (1 = index, 2 = metadata)
//! 12      4     count        Number of entries in the page
//! 16      4     last_offset  Lowest byte offset occupied by records
//! 20      4     sync_index   Published prefix of page_index
//! 24      8     length       Total page size in bytes
//! 32      4     open_count   Incremented by reuse()
//! 36      4     close_count  Incremented by close()
//! 40      4     page_id      Stable volume identifier
//! 44      4     min_id       Bounding box: smallest param_id
//! 48      4     max_id       Bounding box: largest param_id
//! 52      8     min_ts       Bounding box: earliest timestamp
//! 60      8     max_ts       Bounding box: latest timestamp
//! 68      12    reserved
//! ```
//!
//! `open_count - close_count` is 1 while the page is accepting writes and
//! 0 when it was cleanly closed; the pair survives crashes because the
//! header lives in the mapped file. The bounding box widens monotonically
//! with every append and allows O(1) rejection of out-of-range queries.
//!
//! ## Search
//!
//! `search` locates the boundary timestamp with an interpolated probe
//! (bounded to [`INTERPOLATION_SEARCH_QUOTA`] iterations and windows of
//! at least [`INTERPOLATION_SEARCH_CUTOFF`] slots), falls back to binary
//! search, then scans in the query direction, filtering by series and
//! time range. Timestamps are expected to be near-uniform, making the
//! interpolated phase O(1) in the common case.
//!
//! ## Zero-Copy Access
//!
//! The header is a zerocopy struct overlaid on the mapped bytes; the
//! offset index is accessed as a `[U32]` slice. No compiler layout
//! assumption leaks into the file format: every field is explicitly
//! little-endian and unaligned.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I64, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::entry::{EntryHeader, ENTRY_HEADER_SIZE};
use super::{INDEX_SLOT_SIZE, PAGE_HEADER_SIZE};
use crate::cursor::{CursorResult, InternalCursor};
use crate::error::{SearchError, WriteError};
use crate::types::{EntryOffset, ParamId, ScanDirection, SearchQuery, TimeStamp};

pub const PAGE_MAGIC: &[u8; 8] = b"CHRONOPG";

/// Interpolation probes give up after this many iterations.
pub const INTERPOLATION_SEARCH_QUOTA: u32 = 5;

/// Below this window width binary search beats another probe.
pub const INTERPOLATION_SEARCH_CUTOFF: usize = 16;

/// Insertion-sort shift budget per entry before `sort()` falls back to a
/// full stable sort (adversarially unordered input).
const SORT_SHIFT_BUDGET_PER_ENTRY: usize = 8;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Unknown = 0,
    Index = 1,
    Metadata = 2,
}

impl PageKind {
    pub fn from_u32(v: u32) -> Self {
        match v {
            1 => PageKind::Index,
            2 => PageKind::Metadata,
            _ => PageKind::Unknown,
        }
    }
}

/// Summary of the `(param_id, time)` pairs stored in a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBoundingBox {
    pub min_id: ParamId,
    pub max_id: ParamId,
    pub min_ts: TimeStamp,
    pub max_ts: TimeStamp,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageHeader {
    magic: [u8; 8],
    kind: U32,
    count: U32,
    last_offset: U32,
    sync_index: U32,
    length: U64,
    open_count: U32,
    close_count: U32,
    page_id: U32,
    min_id: U32,
    max_id: U32,
    min_ts: I64,
    max_ts: I64,
    reserved: [u8; 12],
}

const _: () = assert!(std::mem::size_of::<PageHeader>() == PAGE_HEADER_SIZE);

impl PageHeader {
    fn fresh(kind: PageKind, length: u64, page_id: u32) -> Self {
        Self {
            magic: *PAGE_MAGIC,
            kind: U32::new(kind as u32),
            count: U32::new(0),
            last_offset: U32::new((length - 1) as u32),
            sync_index: U32::new(0),
            length: U64::new(length),
            open_count: U32::new(0),
            close_count: U32::new(0),
            page_id: U32::new(page_id),
            min_id: U32::new(u32::MAX),
            max_id: U32::new(0),
            min_ts: I64::new(i64::MAX),
            max_ts: I64::new(0),
            reserved: [0u8; 12],
        }
    }

    pub fn kind(&self) -> PageKind {
        PageKind::from_u32(self.kind.get())
    }

    pub fn count(&self) -> u32 {
        self.count.get()
    }

    pub fn last_offset(&self) -> u32 {
        self.last_offset.get()
    }

    pub fn sync_index(&self) -> u32 {
        self.sync_index.get()
    }

    pub fn length(&self) -> u64 {
        self.length.get()
    }

    pub fn open_count(&self) -> u32 {
        self.open_count.get()
    }

    pub fn close_count(&self) -> u32 {
        self.close_count.get()
    }

    pub fn page_id(&self) -> u32 {
        self.page_id.get()
    }

    pub fn bounding_box(&self) -> PageBoundingBox {
        PageBoundingBox {
            min_id: self.min_id.get(),
            max_id: self.max_id.get(),
            min_ts: TimeStamp(self.min_ts.get()),
            max_ts: TimeStamp(self.max_ts.get()),
        }
    }

    fn reset_bounding_box(&mut self) {
        self.min_id = U32::new(u32::MAX);
        self.max_id = U32::new(0);
        self.min_ts = I64::new(i64::MAX);
        self.max_ts = I64::new(0);
    }

    fn widen_bounding_box(&mut self, param: ParamId, time: TimeStamp) {
        if param > self.max_id.get() {
            self.max_id = U32::new(param);
        }
        if param < self.min_id.get() {
            self.min_id = U32::new(param);
        }
        if time.0 > self.max_ts.get() {
            self.max_ts = I64::new(time.0);
        }
        if time.0 < self.min_ts.get() {
            self.min_ts = I64::new(time.0);
        }
    }

    pub fn inside_bounding_box(&self, param: ParamId, time: TimeStamp) -> bool {
        time.0 <= self.max_ts.get()
            && time.0 >= self.min_ts.get()
            && param <= self.max_id.get()
            && param >= self.min_id.get()
    }
}

fn validate(data: &[u8]) -> Result<()> {
    ensure!(
        data.len() >= PAGE_HEADER_SIZE,
        "page region of {} bytes cannot hold a header",
        data.len()
    );

    let header = PageHeader::ref_from_bytes(&data[..PAGE_HEADER_SIZE])
        .map_err(|e| eyre::eyre!("failed to read PageHeader: {:?}", e))?;

    ensure!(&header.magic == PAGE_MAGIC, "invalid page magic");
    ensure!(
        header.kind() != PageKind::Unknown,
        "invalid page kind: {}",
        header.kind.get()
    );
    ensure!(
        header.length() == data.len() as u64,
        "page header length {} disagrees with region of {} bytes",
        header.length(),
        data.len()
    );

    Ok(())
}

/// Read-only view of a page region.
#[derive(Clone, Copy)]
pub struct PageRef<'a> {
    data: &'a [u8],
}

/// Exclusive view of a page region.
pub struct PageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> PageRef<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self> {
        validate(data)?;
        Ok(Self { data })
    }

    pub fn header(&self) -> &PageHeader {
        // Validated at construction; the header prefix is always present.
        PageHeader::ref_from_bytes(&self.data[..PAGE_HEADER_SIZE]).unwrap_or_else(|_| unreachable!())
    }

    pub fn entry_count(&self) -> usize {
        self.header().count() as usize
    }

    /// Free bytes between the index tail and the record area.
    pub fn free_space(&self) -> usize {
        let header = self.header();
        let index_end = PAGE_HEADER_SIZE + header.count() as usize * INDEX_SLOT_SIZE;
        (header.last_offset() as usize).saturating_sub(index_end)
    }

    fn index_at(&self, index: usize) -> Option<EntryOffset> {
        if index >= self.entry_count() {
            return None;
        }
        let at = PAGE_HEADER_SIZE + index * INDEX_SLOT_SIZE;
        let raw: [u8; 4] = self.data[at..at + INDEX_SLOT_SIZE].try_into().ok()?;
        Some(u32::from_le_bytes(raw))
    }

    /// Entry header and payload at the given page offset.
    pub fn entry_at_offset(&self, offset: EntryOffset) -> Option<(&'a EntryHeader, &'a [u8])> {
        let start = offset as usize;
        if start + ENTRY_HEADER_SIZE > self.data.len() {
            return None;
        }
        let header = EntryHeader::ref_from_bytes(&self.data[start..start + ENTRY_HEADER_SIZE]).ok()?;
        let length = header.length() as usize;
        if length < ENTRY_HEADER_SIZE || start + length > self.data.len() {
            return None;
        }
        Some((header, &self.data[start + ENTRY_HEADER_SIZE..start + length]))
    }

    /// Entry header and payload at the given index position.
    pub fn entry_at(&self, index: usize) -> Option<(&'a EntryHeader, &'a [u8])> {
        self.entry_at_offset(self.index_at(index)?)
    }

    /// Copies the record at `index` into `dst`. Returns the record length
    /// on success, the negated length when `dst` is too small, and 0 when
    /// there is no such entry.
    pub fn copy_entry_at(&self, index: usize, dst: &mut [u8]) -> i64 {
        let Some(offset) = self.index_at(index) else {
            return 0;
        };
        let Some((header, _)) = self.entry_at_offset(offset) else {
            return 0;
        };
        let length = header.length() as usize;
        if length > dst.len() {
            return -(length as i64);
        }
        let start = offset as usize;
        dst[..length].copy_from_slice(&self.data[start..start + length]);
        length as i64
    }

    fn time_at(&self, index: usize) -> Option<i64> {
        self.entry_at(index).map(|(h, _)| h.time().0)
    }

    /// Streams every entry matching `query` into `cursor`, in query
    /// order. The locate phase is an interpolated search bounded to
    /// [`INTERPOLATION_SEARCH_QUOTA`] probes, then binary search; the
    /// scan phase walks the index until the far bound is crossed.
    pub fn search(&self, query: &SearchQuery, cursor: &mut dyn InternalCursor) {
        if !query.is_valid() {
            cursor.set_error(SearchError::BadQuery);
            return;
        }

        let count = self.entry_count();
        if count == 0 {
            cursor.complete();
            return;
        }

        let backward = query.direction == ScanDirection::Backward;
        let key = if backward {
            query.upperbound.0
        } else {
            query.lowerbound.0
        };

        let bbox = self.header().bounding_box();
        let max_index = count as i64 - 1;
        let mut begin: i64 = 0;
        let mut end: i64 = max_index;
        let mut probe_index: i64 = 0;
        let mut run_binary = true;

        if key >= bbox.min_ts.0 && key <= bbox.max_ts.0 {
            let mut lo = bbox.min_ts.0;
            let mut hi = bbox.max_ts.0;
            let mut quota = INTERPOLATION_SEARCH_QUOTA;

            while quota > 0 {
                quota -= 1;

                // On small windows binary search is cheaper than a probe.
                if end - begin < INTERPOLATION_SEARCH_CUTOFF as i64 || hi <= lo {
                    break;
                }

                let probe =
                    ((key - lo) as i128 * (end - begin) as i128 / (hi - lo) as i128) as i64;

                if probe <= begin || probe >= end {
                    break;
                }

                let Some(t_probe) = self.time_at(probe as usize) else {
                    cursor.complete();
                    return;
                };

                if t_probe < key {
                    begin = probe + 1;
                    let Some(t) = self.time_at(begin as usize) else {
                        cursor.complete();
                        return;
                    };
                    lo = t;
                } else {
                    end = probe - 1;
                    let Some(t) = self.time_at(end as usize) else {
                        cursor.complete();
                        return;
                    };
                    hi = t;
                }
            }
        } else if key > bbox.max_ts.0 {
            if backward {
                probe_index = end;
                run_binary = false;
            } else {
                cursor.complete();
                return;
            }
        } else {
            // key < bbox.min_ts
            if !backward {
                probe_index = begin;
                run_binary = false;
            } else {
                cursor.complete();
                return;
            }
        }

        if run_binary {
            while end >= begin {
                probe_index = begin + (end - begin) / 2;
                let Some(t_probe) = self.time_at(probe_index as usize) else {
                    cursor.complete();
                    return;
                };

                if t_probe == key {
                    break;
                } else if t_probe < key {
                    begin = probe_index + 1;
                    if begin == count as i64 {
                        break;
                    }
                } else {
                    end = probe_index - 1;
                    if end < 0 {
                        break;
                    }
                }
            }
        }

        let mut index = probe_index;
        loop {
            let Some(offset) = self.index_at(index as usize) else {
                cursor.complete();
                return;
            };
            let Some((header, _)) = self.entry_at_offset(offset) else {
                cursor.complete();
                return;
            };

            let time = header.time();
            let in_range = query.lowerbound <= time && time <= query.upperbound;
            if header.param_id() == query.param && in_range {
                if !cursor.put(CursorResult::new(offset, time)) {
                    return;
                }
            }

            if backward {
                if time < query.lowerbound || index == 0 {
                    cursor.complete();
                    return;
                }
                index -= 1;
            } else {
                if time > query.upperbound || index == max_index {
                    cursor.complete();
                    return;
                }
                index += 1;
            }
        }
    }
}

impl<'a> PageMut<'a> {
    /// Overlays an existing, previously formatted page region.
    pub fn new(data: &'a mut [u8]) -> Result<Self> {
        validate(data)?;
        Ok(Self { data })
    }

    /// Writes a fresh header over `data`, discarding prior contents.
    pub fn format(data: &'a mut [u8], kind: PageKind, page_id: u32) -> Result<Self> {
        ensure!(
            data.len() > PAGE_HEADER_SIZE + INDEX_SLOT_SIZE + ENTRY_HEADER_SIZE,
            "page region of {} bytes is too small to format",
            data.len()
        );
        ensure!(
            data.len() as u64 <= u32::MAX as u64,
            "page region of {} bytes is not addressable by a u32 offset",
            data.len()
        );
        ensure!(kind != PageKind::Unknown, "cannot format a page of unknown kind");

        let header = PageHeader::fresh(kind, data.len() as u64, page_id);
        data[..PAGE_HEADER_SIZE].copy_from_slice(header.as_bytes());
        Ok(Self { data })
    }

    pub fn as_ref(&self) -> PageRef<'_> {
        PageRef { data: self.data }
    }

    pub fn header(&self) -> &PageHeader {
        PageHeader::ref_from_bytes(&self.data[..PAGE_HEADER_SIZE]).unwrap_or_else(|_| unreachable!())
    }

    fn header_mut(&mut self) -> &mut PageHeader {
        PageHeader::mut_from_bytes(&mut self.data[..PAGE_HEADER_SIZE])
            .unwrap_or_else(|_| unreachable!())
    }

    pub fn entry_count(&self) -> usize {
        self.as_ref().entry_count()
    }

    pub fn free_space(&self) -> usize {
        self.as_ref().free_space()
    }

    fn set_index_at(&mut self, index: usize, offset: EntryOffset) {
        let at = PAGE_HEADER_SIZE + index * INDEX_SLOT_SIZE;
        self.data[at..at + INDEX_SLOT_SIZE].copy_from_slice(&offset.to_le_bytes());
    }

    /// Prepares the page for a new generation of writes: clears the entry
    /// count and bounding box, rewinds the record area, and increments
    /// `open_count`.
    pub fn reuse(&mut self) {
        let length = self.header().length();
        let header = self.header_mut();
        header.count = U32::new(0);
        header.sync_index = U32::new(0);
        header.last_offset = U32::new((length - 1) as u32);
        header.open_count = U32::new(header.open_count.get() + 1);
        header.reset_bounding_box();
    }

    /// Marks the page closed for writes.
    pub fn close(&mut self) {
        let header = self.header_mut();
        header.close_count = U32::new(header.close_count.get() + 1);
    }

    /// Restores the identity fields a rotation must preserve across a
    /// destructive remap.
    pub fn restore_counters(&mut self, page_id: u32, open_count: u32, close_count: u32) {
        let header = self.header_mut();
        header.page_id = U32::new(page_id);
        header.open_count = U32::new(open_count);
        header.close_count = U32::new(close_count);
    }

    /// Appends a pre-encoded record (header + payload in one buffer).
    pub fn add_entry(&mut self, record: &[u8]) -> Result<EntryOffset, WriteError> {
        if record.len() < ENTRY_HEADER_SIZE {
            return Err(WriteError::BadData);
        }

        let Ok(header) = EntryHeader::ref_from_prefix(record) else {
            return Err(WriteError::BadData);
        };
        if header.length() as usize != record.len() {
            return Err(WriteError::BadData);
        }

        let (param, time) = (header.param_id(), header.time());
        self.append_bytes(param, time, record, &[])
    }

    /// Appends a record from a borrowed payload range; the header is
    /// synthesized in place. The on-disk bytes are identical to
    /// [`PageMut::add_entry`] with the equivalent pre-encoded record.
    pub fn add_payload(
        &mut self,
        param: ParamId,
        time: TimeStamp,
        payload: &[u8],
    ) -> Result<EntryOffset, WriteError> {
        let length = (ENTRY_HEADER_SIZE + payload.len()) as u32;
        let header = EntryHeader::new(param, time, length);
        self.append_bytes(param, time, header.as_bytes(), payload)
    }

    fn append_bytes(
        &mut self,
        param: ParamId,
        time: TimeStamp,
        head: &[u8],
        tail: &[u8],
    ) -> Result<EntryOffset, WriteError> {
        let record_len = head.len() + tail.len();
        if record_len + INDEX_SLOT_SIZE > self.free_space() {
            return Err(WriteError::PageFull);
        }

        let count = self.entry_count();
        let new_offset = self.header().last_offset() as usize - record_len;

        self.data[new_offset..new_offset + head.len()].copy_from_slice(head);
        self.data[new_offset + head.len()..new_offset + record_len].copy_from_slice(tail);

        self.set_index_at(count, new_offset as u32);

        let header = self.header_mut();
        header.last_offset = U32::new(new_offset as u32);
        header.count = U32::new(count as u32 + 1);
        header.widen_bounding_box(param, time);

        Ok(new_offset as u32)
    }

    /// Sorts `page_index[0..count)` by `(time, param_id)`. Insertion sort
    /// handles the expected near-ordered input in O(n); when the shift
    /// budget is exhausted the remainder is finished by a stable sort.
    /// Equal keys keep their insertion order either way.
    pub fn sort(&mut self) {
        let view = self.as_ref();
        let count = view.entry_count();
        if count < 2 {
            return;
        }

        let mut items: Vec<(i64, u32, EntryOffset)> = Vec::with_capacity(count);
        for i in 0..count {
            let Some(offset) = view.index_at(i) else {
                return;
            };
            let Some((header, _)) = view.entry_at_offset(offset) else {
                return;
            };
            items.push((header.time().0, header.param_id(), offset));
        }

        let budget = count.saturating_mul(SORT_SHIFT_BUDGET_PER_ENTRY);
        if !insertion_sort_with_budget(&mut items, budget) {
            items.sort_by_key(|&(t, p, _)| (t, p));
        }

        for (i, &(_, _, offset)) in items.iter().enumerate() {
            self.set_index_at(i, offset);
        }
    }

    /// Publishes a batch of externally sorted offsets at the sync
    /// boundary, clamped to the entry count. Returns the number actually
    /// published; re-running with the same suffix is a no-op past the
    /// clamp.
    pub fn sync_indexes(&mut self, offsets: &[EntryOffset]) -> usize {
        let count = self.entry_count();
        let sync = self.header().sync_index() as usize;
        let n = offsets.len().min(count.saturating_sub(sync));

        for (i, &offset) in offsets[..n].iter().enumerate() {
            self.set_index_at(sync + i, offset);
        }

        let header = self.header_mut();
        header.sync_index = U32::new((sync + n) as u32);
        n
    }
}

/// Swap-based insertion sort on `(time, param)` keys; keeps the slice a
/// permutation at every step so an exhausted budget can hand off to a
/// full sort. Returns false when the budget ran out.
fn insertion_sort_with_budget(items: &mut [(i64, u32, EntryOffset)], mut budget: usize) -> bool {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && (items[j - 1].0, items[j - 1].1) > (items[j].0, items[j].1) {
            items.swap(j, j - 1);
            j -= 1;
            if budget == 0 {
                return false;
            }
            budget -= 1;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::RecordingCursor;
    use crate::storage::entry::encode_entry;

    const PAGE_SIZE: usize = 64 * 1024;

    fn formatted_page(data: &mut [u8]) -> PageMut<'_> {
        PageMut::format(data, PageKind::Index, 0).unwrap()
    }

    fn fill_series(page: &mut PageMut<'_>, param: ParamId, times: impl Iterator<Item = i64>) {
        for t in times {
            page.add_payload(param, TimeStamp(t), &t.to_le_bytes()).unwrap();
        }
    }

    #[test]
    fn header_is_80_bytes() {
        assert_eq!(std::mem::size_of::<PageHeader>(), 80);
    }

    #[test]
    fn format_initializes_counters_and_bbox() {
        let mut data = vec![0u8; PAGE_SIZE];
        let page = formatted_page(&mut data);
        let header = page.header();

        assert_eq!(header.kind(), PageKind::Index);
        assert_eq!(header.count(), 0);
        assert_eq!(header.sync_index(), 0);
        assert_eq!(header.last_offset(), PAGE_SIZE as u32 - 1);
        assert_eq!(header.length(), PAGE_SIZE as u64);
        assert_eq!(header.open_count(), 0);
        assert_eq!(header.close_count(), 0);

        let bbox = header.bounding_box();
        assert_eq!(bbox.min_id, u32::MAX);
        assert_eq!(bbox.max_id, 0);
        assert_eq!(bbox.min_ts, TimeStamp(i64::MAX));
        assert_eq!(bbox.max_ts, TimeStamp(0));
    }

    #[test]
    fn add_entry_roundtrips_through_index() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let mut record = Vec::new();
        encode_entry(42, TimeStamp(777), b"hello", &mut record);
        let offset = page.add_entry(&record).unwrap();

        assert_eq!(page.entry_count(), 1);

        let view = page.as_ref();
        let (header, payload) = view.entry_at(0).unwrap();
        assert_eq!(header.param_id(), 42);
        assert_eq!(header.time(), TimeStamp(777));
        assert_eq!(payload, b"hello");
        assert_eq!(view.entry_at_offset(offset).unwrap().0.param_id(), 42);
    }

    #[test]
    fn add_payload_matches_add_entry_bytes() {
        let mut data_a = vec![0u8; PAGE_SIZE];
        let mut data_b = vec![0u8; PAGE_SIZE];

        {
            let mut page = formatted_page(&mut data_a);
            let mut record = Vec::new();
            encode_entry(9, TimeStamp(55), b"payload", &mut record);
            page.add_entry(&record).unwrap();
        }
        {
            let mut page = formatted_page(&mut data_b);
            page.add_payload(9, TimeStamp(55), b"payload").unwrap();
        }

        assert_eq!(data_a, data_b);
    }

    #[test]
    fn add_entry_rejects_short_record() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        assert!(matches!(page.add_entry(&[0u8; 8]), Err(WriteError::BadData)));
    }

    #[test]
    fn add_entry_rejects_mismatched_length_field() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let mut record = Vec::new();
        encode_entry(1, TimeStamp(1), b"abc", &mut record);
        record.push(0); // trailing byte the length field does not cover

        assert!(matches!(page.add_entry(&record), Err(WriteError::BadData)));
    }

    #[test]
    fn page_overflows_when_free_space_is_gone() {
        let mut data = vec![0u8; 4096];
        let mut page = formatted_page(&mut data);

        let mut appended = 0u32;
        loop {
            match page.add_payload(1, TimeStamp(appended as i64), &[0u8; 100]) {
                Ok(_) => appended += 1,
                Err(WriteError::PageFull) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        assert!(appended > 0);
        assert_eq!(page.entry_count(), appended as usize);
        // Every subsequent attempt keeps failing the same way.
        assert!(matches!(
            page.add_payload(1, TimeStamp(0), &[0u8; 100]),
            Err(WriteError::PageFull)
        ));
    }

    #[test]
    fn free_space_shrinks_by_record_and_slot() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let before = page.free_space();
        page.add_payload(1, TimeStamp(0), &[0u8; 10]).unwrap();
        let after = page.free_space();

        assert_eq!(before - after, ENTRY_HEADER_SIZE + 10 + INDEX_SLOT_SIZE);
    }

    #[test]
    fn bounding_box_widens_with_appends() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        page.add_payload(5, TimeStamp(100), b"").unwrap();
        page.add_payload(3, TimeStamp(300), b"").unwrap();
        page.add_payload(8, TimeStamp(200), b"").unwrap();

        let bbox = page.header().bounding_box();
        assert_eq!(bbox.min_id, 3);
        assert_eq!(bbox.max_id, 8);
        assert_eq!(bbox.min_ts, TimeStamp(100));
        assert_eq!(bbox.max_ts, TimeStamp(300));

        assert!(page.header().inside_bounding_box(5, TimeStamp(150)));
        assert!(!page.header().inside_bounding_box(5, TimeStamp(301)));
        assert!(!page.header().inside_bounding_box(9, TimeStamp(150)));
    }

    #[test]
    fn reuse_resets_state_and_bumps_open_count() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        page.add_payload(1, TimeStamp(10), b"x").unwrap();
        page.close();
        page.reuse();

        let header = page.header();
        assert_eq!(header.count(), 0);
        assert_eq!(header.sync_index(), 0);
        assert_eq!(header.last_offset(), PAGE_SIZE as u32 - 1);
        assert_eq!(header.open_count(), 1);
        assert_eq!(header.close_count(), 1);
        assert_eq!(header.bounding_box().min_id, u32::MAX);
    }

    #[test]
    fn open_close_counters_track_lifecycle() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        page.reuse();
        assert_eq!(page.header().open_count() - page.header().close_count(), 1);

        page.close();
        assert_eq!(page.header().open_count(), page.header().close_count());
    }

    #[test]
    fn sort_is_a_permutation_and_idempotent() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let times = [50i64, 10, 40, 10, 30, 20, 60, 10];
        for (i, &t) in times.iter().enumerate() {
            page.add_payload(i as u32 % 3, TimeStamp(t), b"").unwrap();
        }

        let mut before: Vec<EntryOffset> =
            (0..times.len()).map(|i| page.as_ref().index_at(i).unwrap()).collect();

        page.sort();

        let after: Vec<EntryOffset> =
            (0..times.len()).map(|i| page.as_ref().index_at(i).unwrap()).collect();

        before.sort_unstable();
        let mut after_sorted = after.clone();
        after_sorted.sort_unstable();
        assert_eq!(before, after_sorted, "sort must be a permutation");

        let keys: Vec<(i64, u32)> = (0..times.len())
            .map(|i| {
                let (h, _) = page.as_ref().entry_at(i).unwrap();
                (h.time().0, h.param_id())
            })
            .collect();
        assert!(keys.windows(2).all(|w| w[0] <= w[1]), "index sorted by (time, param)");

        page.sort();
        let again: Vec<EntryOffset> =
            (0..times.len()).map(|i| page.as_ref().index_at(i).unwrap()).collect();
        assert_eq!(after, again, "sort must be idempotent");
    }

    #[test]
    fn sort_keeps_insertion_order_for_equal_keys() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let mut offsets = Vec::new();
        for i in 0..32 {
            offsets.push(page.add_payload(7, TimeStamp(0), &[i as u8]).unwrap());
        }
        // A later entry with a smaller key forces real sorting work.
        page.add_payload(1, TimeStamp(0), b"").unwrap();

        page.sort();

        let view = page.as_ref();
        let tail: Vec<EntryOffset> = (1..=32).map(|i| view.index_at(i).unwrap()).collect();
        assert_eq!(tail, offsets, "equal keys stay in insertion order");
    }

    #[test]
    fn sync_indexes_clamps_and_advances() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);

        let mut offsets = Vec::new();
        for t in 0..10 {
            offsets.push(page.add_payload(1, TimeStamp(t), b"").unwrap());
        }

        assert_eq!(page.sync_indexes(&offsets[..4]), 4);
        assert_eq!(page.header().sync_index(), 4);

        // Publishing more than remains is clamped to the entry count.
        assert_eq!(page.sync_indexes(&offsets), 6);
        assert_eq!(page.header().sync_index(), 10);

        // Idempotent once fully published.
        assert_eq!(page.sync_indexes(&offsets), 0);
        assert_eq!(page.header().sync_index(), 10);
    }

    #[test]
    fn forward_bounded_search_returns_inclusive_range() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 0..1000);

        let mut cursor = RecordingCursor::new();
        let query = SearchQuery::forward(1, TimeStamp(200), TimeStamp(300));
        page.as_ref().search(&query, &mut cursor);

        assert!(cursor.completed);
        assert!(cursor.error.is_none());
        assert_eq!(cursor.results.len(), 101);

        let times: Vec<i64> = cursor.timestamps().iter().map(|t| t.0).collect();
        assert_eq!(times, (200..=300).collect::<Vec<_>>());
    }

    #[test]
    fn search_filters_by_param() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);

        for t in 0..500i64 {
            page.add_payload((t % 2) as u32, TimeStamp(t), b"").unwrap();
        }

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::forward(0, TimeStamp(100), TimeStamp(110)), &mut cursor);

        let times: Vec<i64> = cursor.timestamps().iter().map(|t| t.0).collect();
        assert_eq!(times, vec![100, 102, 104, 106, 108, 110]);
    }

    #[test]
    fn backward_search_descends() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 0..1000);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::backward(1, TimeStamp(500), TimeStamp(999)), &mut cursor);

        assert!(cursor.completed);
        let times: Vec<i64> = cursor.timestamps().iter().map(|t| t.0).collect();
        assert!(!times.is_empty());
        assert!(times.windows(2).all(|w| w[0] >= w[1]), "backward emission descends");
        assert!(times.iter().all(|&t| (500..=999).contains(&t)));
    }

    #[test]
    fn backward_search_above_bbox_starts_at_top_and_finds_nothing() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 0..1000);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::backward(1, TimeStamp(2000), TimeStamp(3000)), &mut cursor);

        assert!(cursor.completed);
        assert!(cursor.results.is_empty());
    }

    #[test]
    fn forward_search_above_bbox_is_empty() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 0..1000);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::forward(1, TimeStamp::MAX, TimeStamp::MAX), &mut cursor);

        assert!(cursor.completed);
        assert!(cursor.results.is_empty());
    }

    #[test]
    fn forward_search_below_bbox_scans_from_start() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 100..200);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::forward(1, TimeStamp(0), TimeStamp(105)), &mut cursor);

        let times: Vec<i64> = cursor.timestamps().iter().map(|t| t.0).collect();
        assert_eq!(times, (100..=105).collect::<Vec<_>>());
    }

    #[test]
    fn backward_search_below_bbox_is_empty() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 100..200);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::backward(1, TimeStamp(0), TimeStamp(50)), &mut cursor);

        assert!(cursor.completed);
        assert!(cursor.results.is_empty());
    }

    #[test]
    fn invalid_bounds_report_bad_query() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);
        fill_series(&mut page, 1, 0..10);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::forward(1, TimeStamp(10), TimeStamp(5)), &mut cursor);

        assert_eq!(cursor.error, Some(SearchError::BadQuery));
        assert!(cursor.results.is_empty());
    }

    #[test]
    fn search_on_empty_page_completes_empty() {
        let mut data = vec![0u8; PAGE_SIZE];
        let page = formatted_page(&mut data);

        let mut cursor = RecordingCursor::new();
        page.as_ref()
            .search(&SearchQuery::forward(1, TimeStamp(0), TimeStamp(100)), &mut cursor);

        assert!(cursor.completed);
        assert!(cursor.results.is_empty());
    }

    #[test]
    fn point_query_roundtrips_every_entry() {
        let mut data = vec![0u8; 256 * 1024];
        let mut page = formatted_page(&mut data);

        for i in 0..100i64 {
            page.add_payload(i as u32 * 2, TimeStamp(i), b"").unwrap();
        }

        for i in 0..100i64 {
            let mut cursor = RecordingCursor::new();
            page.as_ref().search(
                &SearchQuery::forward(i as u32 * 2, TimeStamp(i), TimeStamp(i)),
                &mut cursor,
            );
            assert_eq!(cursor.results.len(), 1, "entry {} must be retrievable", i);
            assert_eq!(cursor.results[0].timestamp, TimeStamp(i));
        }
    }

    #[test]
    fn copy_entry_at_contract() {
        let mut data = vec![0u8; PAGE_SIZE];
        let mut page = formatted_page(&mut data);
        page.add_payload(1, TimeStamp(1), b"abcdef").unwrap();

        let record_len = (ENTRY_HEADER_SIZE + 6) as i64;
        let view = page.as_ref();

        let mut big = vec![0u8; 64];
        assert_eq!(view.copy_entry_at(0, &mut big), record_len);

        let mut small = vec![0u8; 4];
        assert_eq!(view.copy_entry_at(0, &mut small), -record_len);

        assert_eq!(view.copy_entry_at(5, &mut big), 0);
    }

    #[test]
    fn validate_rejects_foreign_bytes() {
        let data = vec![0u8; PAGE_SIZE];
        assert!(PageRef::new(&data).is_err());
    }
}
