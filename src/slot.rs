//! Slot indices and static message-to-slot bindings.

use crate::array::COUNT_SIZE;
use crate::error::{Error, Result};
use crate::layout::{BUFFER_SIZE, SLOT_COUNT};
use bytemuck::Pod;
use std::fmt;
use std::marker::PhantomData;

/// A slot index known to be in `0..SLOT_COUNT`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(u16);

impl SlotId {
    /// Validates a runtime slot index.
    pub fn new(index: usize) -> Result<Self> {
        if index < SLOT_COUNT {
            Ok(Self(index as u16))
        } else {
            Err(Error::SlotOutOfRange {
                slot: index,
                count: SLOT_COUNT,
            })
        }
    }

    /// Slot index for use in constants.
    ///
    /// # Panics
    ///
    /// Panics if `index >= SLOT_COUNT`. In a `const` item this is a compile
    /// error.
    pub const fn at(index: usize) -> Self {
        assert!(index < SLOT_COUNT, "slot index out of range");
        Self(index as u16)
    }

    /// Slot index checked at compile time.
    ///
    /// `SlotId::of::<256>()` does not build.
    pub const fn of<const N: usize>() -> Self {
        const { assert!(N < SLOT_COUNT, "slot index out of range") };
        Self(N as u16)
    }

    #[inline(always)]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Every slot of a segment, in index order.
    pub fn all() -> impl Iterator<Item = SlotId> {
        (0..SLOT_COUNT as u16).map(SlotId)
    }
}

impl TryFrom<usize> for SlotId {
    type Error = Error;

    fn try_from(index: usize) -> Result<Self> {
        Self::new(index)
    }
}

impl From<SlotId> for usize {
    fn from(slot: SlotId) -> usize {
        slot.index()
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A message type that always lives in one slot.
///
/// ```ignore
/// #[derive(Clone, Copy, Pod, Zeroable)]
/// #[repr(C)]
/// struct Odometry { x: f64, y: f64 }
///
/// impl Slotted for Odometry {
///     const SLOT: SlotId = SlotId::at(3);
/// }
///
/// publisher.post(&Odometry { x: 1.0, y: 2.0 });
/// let odometry: Odometry = whiteboard.get();
/// ```
///
/// A type larger than a generation buffer fails to compile as soon as it is
/// posted or read.
pub trait Slotted: Pod {
    const SLOT: SlotId;
}

/// An element type whose length-prefixed sequences always live in one slot.
pub trait SlottedArray: Pod {
    const SLOT: SlotId;
}

/// Compile-time size checks, evaluated once per type.
pub(crate) struct Fits<T>(PhantomData<T>);

impl<T> Fits<T> {
    pub(crate) const MESSAGE: () = assert!(
        std::mem::size_of::<T>() <= BUFFER_SIZE,
        "message type does not fit into a whiteboard buffer"
    );

    pub(crate) const ELEMENT: () = assert!(
        std::mem::size_of::<T>() > 0 && std::mem::size_of::<T>() <= BUFFER_SIZE - COUNT_SIZE,
        "element type must be non-empty and fit into a whiteboard array buffer"
    );
}
