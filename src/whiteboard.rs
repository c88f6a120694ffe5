use crate::array;
use crate::error::Result;
use crate::layout::{BUFFER_SIZE, Board, EventCount, GENERATIONS, SLOT_COUNT, successor};
use crate::name;
use crate::publish::Publisher;
use crate::region::{HeapRegion, Region, ShmRegion};
use crate::slot::{Fits, SlotId, Slotted, SlottedArray};
use bytemuck::Pod;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

/// How often [`Whiteboard::read_consistent`] retries a copy that raced with
/// a publish.
const READ_RETRIES: usize = 16;

/// A handle to a whiteboard segment.
///
/// Any number of handles, in any number of processes, may read a whiteboard
/// concurrently. Reads never block and never fail: they copy the most
/// recently published generation of a slot. Publishing goes through a
/// [`Publisher`] obtained from [`Whiteboard::publisher`].
///
/// Handles are cheap to clone and share one mapping. The mapping is
/// released when the last clone (and the last publisher created from it) is
/// dropped.
///
/// # Change Detection
///
/// Readers notice new data by comparing event counters ([`Self::event_count`],
/// [`Self::global_event_count`], or an [`EventCursor`]). Counters are 16 bit
/// and wrap; a reader that lets exactly a multiple of `2^16` publishes go by
/// between two checks sees no change.
///
/// # Stale Reads
///
/// A slot's ring holds [`GENERATIONS`] buffers. A reader that copies the
/// current buffer while the writer laps the ring may get a mix of two
/// messages; [`Self::read_consistent`] detects that case by re-checking the
/// slot's event counter.
#[derive(Debug)]
pub struct Whiteboard<R: Region = ShmRegion> {
    region: Arc<R>,
}

impl<R: Region> Clone for Whiteboard<R> {
    fn clone(&self) -> Self {
        Self {
            region: self.region.clone(),
        }
    }
}

impl Whiteboard<ShmRegion> {
    /// Creates or attaches the whiteboard `name`.
    ///
    /// A missing shared-memory object is created and initialized; an
    /// existing one is attached and validated. Attaching fails fast when the
    /// segment was created with another magic, format version or geometry.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidName`](crate::Error::InvalidName) for names POSIX
    ///   shared memory cannot use,
    /// - [`Error::Resource`](crate::Error::Resource) if the object cannot be
    ///   created, opened or mapped,
    /// - [`Error::InvalidMagic`](crate::Error::InvalidMagic),
    ///   [`Error::VersionMismatch`](crate::Error::VersionMismatch) or
    ///   [`Error::GeometryMismatch`](crate::Error::GeometryMismatch) if the
    ///   segment is not compatible with this build.
    pub fn open(name: &str) -> Result<Self> {
        let name = name::shm_name(name)?;
        let region = ShmRegion::open(&name)?;
        if region.board().initialize()? {
            tracing::info!(name = %name, "initialized whiteboard segment");
        }
        region.board().validate()?;
        Ok(Self { region })
    }

    /// Opens the whiteboard named by `WHITEBOARD_NAME`, or `"whiteboard"`.
    pub fn open_default() -> Result<Self> {
        Self::open(&name::default_name())
    }
}

impl Whiteboard<HeapRegion> {
    /// Creates a whiteboard in this process's heap.
    pub fn local() -> Self {
        let region = HeapRegion::new();
        let initialized = region.board().initialize();
        debug_assert!(
            matches!(initialized, Ok(true)),
            "zeroed heap board failed to initialize"
        );
        Self { region }
    }
}

impl<R: Region> Whiteboard<R> {
    #[inline(always)]
    pub(crate) fn board(&self) -> &Board {
        self.region.board()
    }

    /// Name of the backing shared-memory object.
    pub fn name(&self) -> Option<&str> {
        self.region.name()
    }

    /// Creates a publisher for this whiteboard.
    ///
    /// Only one writer may publish to a given slot at a time; see
    /// [`Publisher`].
    pub fn publisher(&self) -> Publisher<R> {
        Publisher::new(self.region.clone())
    }

    /// Format version recorded in the segment.
    ///
    /// Attaching already checked it against [`crate::VERSION`].
    pub fn version(&self) -> u16 {
        self.board().header().version()
    }

    /// Number of publishes to any slot so far, modulo `2^16`.
    #[inline(always)]
    pub fn global_event_count(&self) -> EventCount {
        self.board().header().event_count()
    }

    /// Number of publishes to `slot` so far, modulo `2^16`.
    #[inline(always)]
    pub fn event_count(&self, slot: SlotId) -> EventCount {
        self.board().record(slot).event_count()
    }

    /// Generation holding the most recent publish to `slot`.
    #[inline(always)]
    pub fn write_index(&self, slot: SlotId) -> usize {
        self.board().record(slot).write_index()
    }

    /// Copy of the most recently published buffer of `slot`.
    #[inline(always)]
    pub fn current(&self, slot: SlotId) -> [u8; BUFFER_SIZE] {
        let index = self.write_index(slot);
        self.board().generation(slot, index).copy_out()
    }

    /// Copy of the buffer the next publish to `slot` will overwrite.
    ///
    /// Its contents are stale or mid-write; this is meant for low-level
    /// producers that sit next to the writer, not for readers.
    pub fn next(&self, slot: SlotId) -> [u8; BUFFER_SIZE] {
        let index = successor(self.write_index(slot));
        self.board().generation(slot, index).copy_out()
    }

    /// Copy of the current message of `slot`, read as a `T`.
    pub fn get_from<T: Pod>(&self, slot: SlotId) -> T {
        let () = Fits::<T>::MESSAGE;
        let index = self.write_index(slot);
        let mut value = T::zeroed();
        self.board()
            .generation(slot, index)
            .read_into(bytemuck::bytes_of_mut(&mut value));
        value
    }

    /// Copy of the current message of `T`'s slot.
    pub fn get<T: Slotted>(&self) -> T {
        self.get_from(T::SLOT)
    }

    /// The length-prefixed sequence currently published in `slot`.
    ///
    /// A stored count larger than what fits for `T` is clamped.
    pub fn get_array<T: Pod>(&self, slot: SlotId) -> Vec<T> {
        let () = Fits::<T>::ELEMENT;
        array::decode(&self.current(slot))
    }

    /// The sequence currently published in `T`'s slot.
    pub fn get_slotted_array<T: SlottedArray>(&self) -> Vec<T> {
        self.get_array(T::SLOT)
    }

    /// Copies the current buffer of `slot` and verifies no publish landed
    /// while copying.
    ///
    /// Returns `None` if publishes kept racing the copy for a bounded number
    /// of attempts.
    ///
    /// Publishers fence their payload stores after the previous counter
    /// bump, so a copy that overlaps a lapping publish sees the counter move.
    pub fn read_consistent(&self, slot: SlotId) -> Option<Snapshot> {
        let record = self.board().record(slot);
        for _ in 0..READ_RETRIES {
            let event_count = record.event_count();
            let bytes = self.current(slot);
            fence(Ordering::Acquire);
            if record.event_count() == event_count {
                return Some(Snapshot { event_count, bytes });
            }
        }
        None
    }

    /// A cursor that reports publishes to `slot`.
    pub fn cursor(&self, slot: SlotId) -> EventCursor<R> {
        EventCursor::new(self.clone(), Some(slot))
    }

    /// A cursor that reports publishes to any slot.
    pub fn global_cursor(&self) -> EventCursor<R> {
        EventCursor::new(self.clone(), None)
    }

    /// Slot count of every whiteboard built with these constants.
    pub const fn slot_count() -> usize {
        SLOT_COUNT
    }

    /// Ring size of every slot.
    pub const fn generations() -> usize {
        GENERATIONS
    }
}

/// A buffer copy tagged with the slot event count it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    pub event_count: EventCount,
    pub bytes: [u8; BUFFER_SIZE],
}

impl Snapshot {
    /// The leading bytes read as a `T`.
    pub fn decode<T: Pod>(&self) -> T {
        let () = Fits::<T>::MESSAGE;
        bytemuck::pod_read_unaligned(&self.bytes[..std::mem::size_of::<T>()])
    }

    /// The bytes read as a length-prefixed sequence of `T`.
    pub fn array<T: Pod>(&self) -> Vec<T> {
        array::decode(&self.bytes)
    }
}

/// Remembers an event count and reports whether it moved.
///
/// ```ignore
/// let mut cursor = whiteboard.cursor(slot);
/// loop {
///     if cursor.poll() {
///         let value: u32 = whiteboard.get_from(slot);
///         // ...
///     }
///     std::thread::sleep(interval);
/// }
/// ```
#[derive(Debug)]
pub struct EventCursor<R: Region = ShmRegion> {
    whiteboard: Whiteboard<R>,
    slot: Option<SlotId>,
    seen: EventCount,
}

impl<R: Region> EventCursor<R> {
    fn new(whiteboard: Whiteboard<R>, slot: Option<SlotId>) -> Self {
        let mut cursor = Self {
            whiteboard,
            slot,
            seen: 0,
        };
        cursor.seen = cursor.load();
        cursor
    }

    #[inline(always)]
    fn load(&self) -> EventCount {
        match self.slot {
            Some(slot) => self.whiteboard.event_count(slot),
            None => self.whiteboard.global_event_count(),
        }
    }

    /// `true` if the counter changed since the last poll (or since the
    /// cursor was created). Remembers the new value.
    #[inline(always)]
    pub fn poll(&mut self) -> bool {
        let now = self.load();
        let changed = now != self.seen;
        self.seen = now;
        changed
    }

    /// Number of publishes since the last poll, modulo `2^16`, without
    /// remembering the new value.
    pub fn pending(&self) -> EventCount {
        self.load().wrapping_sub(self.seen)
    }

    /// The last counter value this cursor observed.
    pub fn seen(&self) -> EventCount {
        self.seen
    }
}
