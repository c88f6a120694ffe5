//! # Whiteboard
//!
//! A shared-memory message bus: one writer per slot publishes fixed-size
//! messages, any number of readers in any number of processes observe them
//! without blocking.
//!
//! A whiteboard segment is a named POSIX shared-memory object holding
//! [`SLOT_COUNT`] slots. Each slot is a small ring of [`GENERATIONS`]
//! buffers of [`BUFFER_SIZE`] bytes plus a write index and an event counter.
//! Publishing writes into the generation after the current one, advances the
//! write index, then bumps the slot's and the global event counters; readers
//! copy the generation at the write index.
//!
//! ```no_run
//! use bytemuck::{Pod, Zeroable};
//! use whiteboard::{SlotId, Slotted, Whiteboard};
//!
//! #[derive(Clone, Copy, Pod, Zeroable)]
//! #[repr(C)]
//! struct Heading {
//!     degrees: f32,
//! }
//!
//! impl Slotted for Heading {
//!     const SLOT: SlotId = SlotId::at(3);
//! }
//!
//! let whiteboard = Whiteboard::open("robot")?;
//! whiteboard.publisher().post(&Heading { degrees: 90.0 });
//!
//! let heading: Heading = whiteboard.get();
//! assert_eq!(heading.degrees, 90.0);
//! # Ok::<(), whiteboard::Error>(())
//! ```
//!
//! ## Non-Blocking Behavior
//!
//! - **No locks:** posting and reading are plain memory copies ordered by
//!   release/acquire atomics. There are no syscalls once a segment is mapped.
//!
//! - **No backpressure:** a writer never waits for readers. A reader that
//!   falls a whole ring behind loses the overwritten messages and simply
//!   sees the newest one.
//!
//! - **No notifications:** readers poll event counters (see
//!   [`EventCursor`]) and bring their own sleep or backoff.
//!
//! - **Single writer per slot:** the caller must make sure no two writers
//!   publish to the same slot concurrently. Debug builds detect violations.
//!
//! ## Modules
//!
//! - [`layout`]: segment byte layout and build-time constants.
//! - [`array`]: length-prefixed element sequences inside one buffer.
//! - [`name`]: segment naming and the `WHITEBOARD_NAME` override.
//!
//! ## License
//!
//! Licensed under the terms of the **GNU Lesser General Public License**,
//! version 3.0, or (at your option) any later version.
//!
//! See <https://www.gnu.org/licenses/lgpl-3.0.html> for details.

#[cfg(not(unix))]
compile_error!("This crate only supports Unix-like operating systems.");

pub mod array;
mod error;
pub mod layout;
mod mmap;
pub mod name;
mod publish;
mod region;
mod slot;
mod whiteboard;

pub use error::{Error, Result};
pub use layout::{BUFFER_SIZE, EventCount, GENERATIONS, MAGIC, SLOT_COUNT, VERSION};
pub use publish::Publisher;
pub use region::{HeapRegion, Region, ShmRegion, unlink};
pub use slot::{SlotId, Slotted, SlottedArray};
pub use whiteboard::{EventCursor, Snapshot, Whiteboard};
