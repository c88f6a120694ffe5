//! Byte layout of a whiteboard segment.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (64 bytes, cache padded)                              │
//! │   magic u64 | version u16 | event_count u16                  │
//! │   slot_count u16 | generations u16 | buffer_size u32 | rsvd  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Slot records (SLOT_COUNT × 4 bytes)                          │
//! │   write_index u16 | event_count u16                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Ring storage (SLOT_COUNT × GENERATIONS × BUFFER_SIZE bytes)  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every process sharing a segment must be built with the same constants.
//! The header records them so that a mismatching process fails to attach
//! instead of misreading memory.

use crate::error::{Error, Result};
use crate::slot::SlotId;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Magic number identifying a whiteboard segment.
pub const MAGIC: u64 = 0xfeed_a11d_eadb_eef6;

/// Format version this crate reads and writes.
pub const VERSION: u16 = 2207;

/// Number of message slots in a segment.
pub const SLOT_COUNT: usize = 256;

/// Number of generation buffers in each slot's ring.
pub const GENERATIONS: usize = 4;

/// Size in bytes of every generation buffer.
pub const BUFFER_SIZE: usize = 512;

/// Wrapping counter type used for per-slot and global event counts.
pub type EventCount = u16;

const _: () = assert!(SLOT_COUNT > 0 && SLOT_COUNT <= u16::MAX as usize);
const _: () = assert!(GENERATIONS >= 2 && GENERATIONS <= u16::MAX as usize);
const _: () = assert!(BUFFER_SIZE >= 8 && BUFFER_SIZE % 8 == 0);
const _: () = assert!(BUFFER_SIZE <= u32::MAX as usize);

/// Stored in `magic` while the first attacher sets the header up.
const INITIALIZING: u64 = !MAGIC;

/// How long an attacher waits for a concurrent initializer.
const INIT_TIMEOUT: Duration = Duration::from_secs(1);

/// Segment header.
#[derive(Debug)]
#[repr(C)]
pub struct Header {
    magic: AtomicU64,
    version: AtomicU16,
    event_count: AtomicU16,
    slot_count: AtomicU16,
    generations: AtomicU16,
    buffer_size: AtomicU32,
    _reserved: [u32; 11],
}

const _: () = assert!(std::mem::size_of::<Header>() == 64);

impl Header {
    #[inline(always)]
    pub fn magic(&self) -> u64 {
        self.magic.load(Ordering::Acquire)
    }

    /// Format version recorded by the process that initialized the segment.
    #[inline(always)]
    pub fn version(&self) -> u16 {
        self.version.load(Ordering::Acquire)
    }

    /// Global event counter, bumped by every publish to any slot.
    #[inline(always)]
    pub fn event_count(&self) -> EventCount {
        self.event_count.load(Ordering::Acquire)
    }

    /// `(slot_count, generations, buffer_size)` as recorded in the segment.
    pub fn geometry(&self) -> (u16, u16, u32) {
        (
            self.slot_count.load(Ordering::Acquire),
            self.generations.load(Ordering::Acquire),
            self.buffer_size.load(Ordering::Acquire),
        )
    }

    #[inline(always)]
    pub(crate) fn bump_event_count(&self) -> EventCount {
        self.event_count
            .fetch_add(1, Ordering::Release)
            .wrapping_add(1)
    }
}

/// Geometry this build expects to find in the header.
pub const fn expected_geometry() -> (u16, u16, u32) {
    (SLOT_COUNT as u16, GENERATIONS as u16, BUFFER_SIZE as u32)
}

/// Per-slot bookkeeping: the generation holding the latest publish and the
/// slot's event counter.
#[derive(Debug)]
#[repr(C)]
pub struct SlotRecord {
    write_index: AtomicU16,
    event_count: AtomicU16,
}

const _: () = assert!(std::mem::size_of::<SlotRecord>() == 4);

impl SlotRecord {
    #[inline(always)]
    pub fn write_index(&self) -> usize {
        self.write_index.load(Ordering::Acquire) as usize
    }

    #[inline(always)]
    pub fn event_count(&self) -> EventCount {
        self.event_count.load(Ordering::Acquire)
    }

    /// Makes `next` the current generation.
    ///
    /// Debug builds detect a second writer on the same slot: the index must
    /// still be `current`, i.e. nobody else advanced it since this writer
    /// loaded it.
    #[inline(always)]
    pub(crate) fn advance(&self, slot: SlotId, current: usize, next: usize) {
        if cfg!(debug_assertions) {
            if let Err(found) = self.write_index.compare_exchange(
                current as u16,
                next as u16,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                tracing::warn!(%slot, expected = current, found, "concurrent writer detected");
                panic!("slot {slot} was advanced by another writer");
            }
        } else {
            self.write_index.store(next as u16, Ordering::Release);
        }
    }

    #[inline(always)]
    pub(crate) fn bump_event_count(&self) -> EventCount {
        self.event_count
            .fetch_add(1, Ordering::Release)
            .wrapping_add(1)
    }
}

/// Successor of a generation index in the ring.
#[inline(always)]
pub const fn successor(index: usize) -> usize {
    (index + 1) % GENERATIONS
}

/// One generation buffer.
///
/// The writer copies into a buffer while readers may copy out of it; the
/// write index and event counters are what tell a reader which buffer is
/// complete. Readers must always copy, never hold references into it.
#[repr(C, align(8))]
pub struct Generation(UnsafeCell<[u8; BUFFER_SIZE]>);

impl Generation {
    #[inline(always)]
    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.0.get().cast()
    }

    /// Copies the whole buffer out.
    #[inline(always)]
    pub(crate) fn copy_out(&self) -> [u8; BUFFER_SIZE] {
        let mut bytes = [0u8; BUFFER_SIZE];
        self.read_into(&mut bytes);
        bytes
    }

    /// Copies the first `dst.len()` bytes of the buffer into `dst`.
    #[inline(always)]
    pub(crate) fn read_into(&self, dst: &mut [u8]) {
        assert!(dst.len() <= BUFFER_SIZE);
        unsafe {
            std::ptr::copy_nonoverlapping(self.as_mut_ptr(), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Copies `src` into the buffer starting at `offset`.
    #[inline(always)]
    pub(crate) fn write_at(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= BUFFER_SIZE);
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.as_mut_ptr().add(offset), src.len());
        }
    }
}

impl Debug for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generation")
            .field("ptr", &self.as_mut_ptr())
            .finish()
    }
}

/// The whole segment as it sits in memory.
///
/// An all-zero `Board` is a valid (uninitialized) value, so both a fresh
/// POSIX shared-memory object and a zeroed heap allocation can be viewed
/// as one directly.
#[derive(Debug)]
#[repr(C)]
pub struct Board {
    header: CachePadded<Header>,
    records: [SlotRecord; SLOT_COUNT],
    storage: [[Generation; GENERATIONS]; SLOT_COUNT],
}

unsafe impl Sync for Board {}
unsafe impl Send for Board {}

impl Board {
    /// Total size of a mapped segment in bytes.
    pub const SIZE: usize = std::mem::size_of::<Board>();

    #[inline(always)]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline(always)]
    pub fn record(&self, slot: SlotId) -> &SlotRecord {
        &self.records[slot.index()]
    }

    #[inline(always)]
    pub fn generation(&self, slot: SlotId, index: usize) -> &Generation {
        &self.storage[slot.index()][index % GENERATIONS]
    }

    /// Initializes a zero-filled board, or waits for a concurrent
    /// initializer to finish.
    ///
    /// Returns `true` if this call performed the initialization. A board
    /// that already carries a non-zero magic is left untouched.
    pub(crate) fn initialize(&self) -> Result<bool> {
        let header = self.header();
        match header
            .magic
            .compare_exchange(0, INITIALIZING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => {
                let (slots, generations, buffer_size) = expected_geometry();
                header.version.store(VERSION, Ordering::Relaxed);
                header.event_count.store(0, Ordering::Relaxed);
                header.slot_count.store(slots, Ordering::Relaxed);
                header.generations.store(generations, Ordering::Relaxed);
                header.buffer_size.store(buffer_size, Ordering::Relaxed);
                for record in &self.records {
                    record.write_index.store(0, Ordering::Relaxed);
                    record.event_count.store(0, Ordering::Relaxed);
                }
                header.magic.store(MAGIC, Ordering::Release);
                Ok(true)
            }
            Err(INITIALIZING) => {
                let deadline = Instant::now() + INIT_TIMEOUT;
                while header.magic() == INITIALIZING {
                    if Instant::now() >= deadline {
                        return Err(Error::Uninitialized);
                    }
                    std::thread::yield_now();
                }
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    /// Checks magic, version and geometry against this build.
    pub(crate) fn validate(&self) -> Result<()> {
        let header = self.header();
        match header.magic() {
            MAGIC => {}
            INITIALIZING => return Err(Error::Uninitialized),
            found => return Err(Error::InvalidMagic { found }),
        }
        let found = header.version();
        if found != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found,
            });
        }
        let found = header.geometry();
        if found != expected_geometry() {
            return Err(Error::GeometryMismatch {
                expected: expected_geometry(),
                found,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::alloc::{Layout, alloc_zeroed, dealloc};
    use std::ptr::NonNull;

    /// Zeroed board on the heap, freed on drop.
    pub(crate) struct ZeroedBoard(NonNull<Board>);

    impl ZeroedBoard {
        pub(crate) fn new() -> Self {
            let ptr = unsafe { alloc_zeroed(Layout::new::<Board>()) };
            Self(NonNull::new(ptr.cast()).expect("allocation failed"))
        }

        pub(crate) fn header_mut(&mut self) -> &mut Header {
            unsafe { &mut self.0.as_mut().header }
        }
    }

    impl std::ops::Deref for ZeroedBoard {
        type Target = Board;
        fn deref(&self) -> &Board {
            unsafe { self.0.as_ref() }
        }
    }

    impl Drop for ZeroedBoard {
        fn drop(&mut self) {
            unsafe { dealloc(self.0.as_ptr().cast(), Layout::new::<Board>()) }
        }
    }

    #[test]
    fn header_field_offsets_are_stable() {
        assert_eq!(std::mem::offset_of!(Header, magic), 0);
        assert_eq!(std::mem::offset_of!(Header, version), 8);
        assert_eq!(std::mem::offset_of!(Header, event_count), 10);
        assert_eq!(std::mem::offset_of!(Header, slot_count), 12);
        assert_eq!(std::mem::offset_of!(Header, generations), 14);
        assert_eq!(std::mem::offset_of!(Header, buffer_size), 16);
    }

    #[test]
    fn storage_follows_records() {
        let records = std::mem::offset_of!(Board, records);
        let storage = std::mem::offset_of!(Board, storage);
        assert!(records >= std::mem::size_of::<Header>());
        assert_eq!(storage, records + SLOT_COUNT * std::mem::size_of::<SlotRecord>());
        assert_eq!(storage % 8, 0);
        assert_eq!(
            Board::SIZE,
            storage + SLOT_COUNT * GENERATIONS * BUFFER_SIZE
        );
    }

    #[test]
    fn initialize_sets_header_and_zero_indices() {
        let board = ZeroedBoard::new();
        assert!(board.initialize().unwrap());

        let header = board.header();
        assert_eq!(header.magic(), 0xfeeda11deadbeef6);
        assert_eq!(header.version(), 2207);
        assert_eq!(header.event_count(), 0);
        assert_eq!(header.geometry(), expected_geometry());
        for slot in SlotId::all() {
            assert_eq!(board.record(slot).write_index(), 0);
            assert_eq!(board.record(slot).event_count(), 0);
        }
        board.validate().unwrap();
    }

    #[test]
    fn initialize_is_a_no_op_on_a_ready_board() {
        let board = ZeroedBoard::new();
        assert!(board.initialize().unwrap());
        let slot = SlotId::at(7);
        board.record(slot).advance(slot, 0, 1);
        board.record(slot).bump_event_count();

        assert!(!board.initialize().unwrap());
        assert_eq!(board.record(slot).write_index(), 1);
        assert_eq!(board.record(slot).event_count(), 1);
    }

    #[test]
    fn validate_rejects_foreign_magic() {
        let mut board = ZeroedBoard::new();
        board.header_mut().magic = AtomicU64::new(0x1234);
        assert!(matches!(
            board.validate(),
            Err(Error::InvalidMagic { found: 0x1234 })
        ));
    }

    #[test]
    fn validate_rejects_other_version() {
        let mut board = ZeroedBoard::new();
        board.initialize().unwrap();
        board.header_mut().version = AtomicU16::new(VERSION - 1);
        assert!(matches!(
            board.validate(),
            Err(Error::VersionMismatch { expected: VERSION, found }) if found == VERSION - 1
        ));
    }

    #[test]
    fn validate_rejects_other_geometry() {
        let mut board = ZeroedBoard::new();
        board.initialize().unwrap();
        board.header_mut().buffer_size = AtomicU32::new(256);
        match board.validate() {
            Err(Error::GeometryMismatch { expected, found }) => {
                assert_eq!(expected, expected_geometry());
                assert_eq!(found.2, 256);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stuck_initializer_times_out() {
        let mut board = ZeroedBoard::new();
        board.header_mut().magic = AtomicU64::new(INITIALIZING);
        assert!(matches!(board.initialize(), Err(Error::Uninitialized)));
        assert!(matches!(board.validate(), Err(Error::Uninitialized)));
    }

    #[test]
    fn successor_wraps_around_the_ring() {
        assert_eq!(successor(0), 1);
        assert_eq!(successor(GENERATIONS - 1), 0);
    }

    #[test]
    fn generation_copies_in_and_out() {
        let board = ZeroedBoard::new();
        let generation = board.generation(SlotId::at(2), 3);
        generation.write_at(4, &[1, 2, 3]);
        let bytes = generation.copy_out();
        assert_eq!(&bytes[..8], &[0, 0, 0, 0, 1, 2, 3, 0]);

        let mut prefix = [0u8; 6];
        generation.read_into(&mut prefix);
        assert_eq!(prefix, [0, 0, 0, 0, 1, 2]);
    }

    #[test]
    #[should_panic]
    fn generation_write_past_end_panics() {
        let board = ZeroedBoard::new();
        board
            .generation(SlotId::at(0), 0)
            .write_at(BUFFER_SIZE - 1, &[1, 2]);
    }
}
