use crate::array;
use crate::error::{Error, Result};
use crate::layout::{BUFFER_SIZE, Board, EventCount, Generation, successor};
use crate::region::{Region, ShmRegion};
use crate::slot::{Fits, SlotId, Slotted, SlottedArray};
use bytemuck::Pod;
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{Ordering, fence};

/// The writing handle of a whiteboard.
///
/// Publishing never blocks and provides **no backpressure**: every post
/// lands in the next generation of the slot's ring, overwriting whatever was
/// there. Readers that fall more than a ring behind see only the newest
/// messages.
///
/// # Protocol
///
/// Each publish to a slot performs, in this order:
///
/// 1. **Write** the payload into the generation after the current one.
/// 2. **Advance** the slot's write index to that generation (release store),
///    which makes it the current message.
/// 3. **Count** the publish in the slot's and then the global event counter.
///
/// A reader that observes the new write index or a new event count is
/// guaranteed to also observe the payload.
///
/// # Single Writer
///
/// At most one writer may publish to a given slot at any time, across all
/// processes attached to the segment. This is not enforced by a lock. The
/// `Publisher` is neither `Clone` nor `Sync`, so one instance cannot be used
/// from two threads at once, and debug builds panic when a slot's write
/// index was moved by someone else between steps 1 and 2. Different slots
/// may have different writers.
#[derive(Debug)]
pub struct Publisher<R: Region = ShmRegion> {
    region: Arc<R>,
    _not_sync: PhantomData<Cell<()>>,
}

impl<R: Region> Publisher<R> {
    pub(crate) fn new(region: Arc<R>) -> Self {
        Self {
            region,
            _not_sync: PhantomData,
        }
    }

    #[inline(always)]
    fn board(&self) -> &Board {
        self.region.board()
    }

    /// Runs the publish protocol for `slot`, with `write` filling the next
    /// generation. Returns the slot's new event count.
    #[inline(always)]
    fn publish(&self, slot: SlotId, write: impl FnOnce(&Generation)) -> EventCount {
        let board = self.board();
        let record = board.record(slot);
        let current = record.write_index();
        let next = successor(current);
        // Payload stores stay after the previous publish's counter bump.
        fence(Ordering::Release);
        write(board.generation(slot, next));
        record.advance(slot, current, next);
        self.count(slot)
    }

    #[inline(always)]
    fn count(&self, slot: SlotId) -> EventCount {
        let board = self.board();
        let count = board.record(slot).bump_event_count();
        board.header().bump_event_count();
        count
    }

    /// Posts a message to the slot bound to its type.
    ///
    /// Returns the slot's event count after the publish.
    #[inline(always)]
    pub fn post<T: Slotted>(&self, message: &T) -> EventCount {
        self.post_to(T::SLOT, message)
    }

    /// Posts a message to `slot`.
    ///
    /// The size of `T` is checked against the buffer size at compile time.
    #[inline(always)]
    pub fn post_to<T: Pod>(&self, slot: SlotId, message: &T) -> EventCount {
        let () = Fits::<T>::MESSAGE;
        self.publish(slot, |generation| {
            generation.write_at(0, bytemuck::bytes_of(message))
        })
    }

    /// Posts raw bytes to `slot`.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadTooLarge`] if `bytes` is longer than a generation
    /// buffer. Nothing is written in that case.
    pub fn post_bytes(&self, slot: SlotId, bytes: &[u8]) -> Result<EventCount> {
        if bytes.len() > BUFFER_SIZE {
            return Err(Error::PayloadTooLarge {
                size: bytes.len(),
                capacity: BUFFER_SIZE,
            });
        }
        Ok(self.publish(slot, |generation| generation.write_at(0, bytes)))
    }

    /// Posts a length-prefixed sequence of elements to `slot`.
    ///
    /// # Errors
    ///
    /// [`Error::PayloadTooLarge`] if more than
    /// [`array::capacity::<T>()`](crate::array::capacity) elements are given.
    /// Nothing is written in that case.
    pub fn post_array<T: Pod>(&self, slot: SlotId, elements: &[T]) -> Result<EventCount> {
        let () = Fits::<T>::ELEMENT;
        array::check(elements)?;
        Ok(self.publish(slot, |generation| array::encode_into(generation, elements)))
    }

    /// Posts a length-prefixed sequence to the slot bound to `T`.
    pub fn post_slotted_array<T: SlottedArray>(&self, elements: &[T]) -> Result<EventCount> {
        self.post_array(T::SLOT, elements)
    }

    /// Direct access to the generation the next publish to `slot` would
    /// fill.
    ///
    /// This is the first of the three low-level publish steps. Fill the
    /// buffer, then call [`Self::commit`] (or [`Self::increment_generation`]
    /// followed by [`Self::increment_event_counter`]).
    ///
    /// # Safety
    ///
    /// The caller must be the only writer of `slot` and must not keep the
    /// returned reference past the commit: once the write index moves on,
    /// readers may copy the buffer at any time and later publishes will
    /// overwrite it.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn next_mut(&self, slot: SlotId) -> &mut [u8; BUFFER_SIZE] {
        let next = successor(self.board().record(slot).write_index());
        fence(Ordering::Release);
        unsafe {
            &mut *self
                .board()
                .generation(slot, next)
                .as_mut_ptr()
                .cast::<[u8; BUFFER_SIZE]>()
        }
    }

    /// Makes the next generation of `slot` its current one.
    ///
    /// The index wraps to zero after the last generation.
    pub fn increment_generation(&self, slot: SlotId) {
        let record = self.board().record(slot);
        let current = record.write_index();
        record.advance(slot, current, successor(current));
    }

    /// Counts one publish to `slot`. Returns the slot's new event count.
    ///
    /// Both the slot's and the global counter wrap on overflow.
    pub fn increment_event_counter(&self, slot: SlotId) -> EventCount {
        self.count(slot)
    }

    /// Publishes whatever was written through [`Self::next_mut`].
    pub fn commit(&self, slot: SlotId) -> EventCount {
        self.increment_generation(slot);
        self.increment_event_counter(slot)
    }
}
