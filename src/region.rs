use crate::error::{Error, Result};
use crate::layout::Board;
use crate::{mmap, name};
use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::fmt::Debug;
use std::ptr::NonNull;
use std::sync::Arc;

/// Memory that holds a [`Board`].
///
/// Implemented by [`ShmRegion`] for inter-process whiteboards and by
/// [`HeapRegion`] for in-process ones. Both start out zero-filled, which is
/// the uninitialized board state.
pub trait Region: Debug + Send + Sync {
    /// The board living in this region.
    fn board(&self) -> &Board;

    /// Name of the backing object, if it has one.
    fn name(&self) -> Option<&str>;
}

/// A board on the heap, visible to this process only.
///
/// Used by [`Whiteboard::local`](crate::Whiteboard::local).
#[derive(Debug)]
pub struct HeapRegion {
    ptr: NonNull<Board>,
}

unsafe impl Send for HeapRegion {}
unsafe impl Sync for HeapRegion {}

impl HeapRegion {
    /// Allocates a zero-filled board.
    pub(crate) fn new() -> Arc<Self> {
        let layout = Layout::new::<Board>();
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr.cast::<Board>()) else {
            handle_alloc_error(layout)
        };
        Arc::new(Self { ptr })
    }
}

impl Region for HeapRegion {
    #[inline(always)]
    fn board(&self) -> &Board {
        unsafe { self.ptr.as_ref() }
    }

    fn name(&self) -> Option<&str> {
        None
    }
}

impl Drop for HeapRegion {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr().cast(), Layout::new::<Board>()) }
    }
}

/// A board in POSIX shared memory.
///
/// The mapping lives as long as the region; when the last `Arc<ShmRegion>`
/// is dropped, this process's view is unmapped. The shared-memory object
/// itself outlives every mapping until [`unlink`](crate::unlink) is called.
#[derive(Debug)]
pub struct ShmRegion {
    ptr: NonNull<Board>,
    name: String,
    created: bool,
}

unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Creates or opens the shared-memory object `name` and maps a board.
    ///
    /// `name` must already be in POSIX form (see [`name::shm_name`]).
    pub(crate) fn open(name: &str) -> Result<Arc<Self>> {
        let mapping =
            mmap::map_shared_memory(name, Board::SIZE).map_err(|source| Error::Resource {
                name: name.to_string(),
                source,
            })?;
        tracing::debug!(
            name,
            size = Board::SIZE,
            created = mapping.created,
            "mapped whiteboard segment"
        );
        Ok(Arc::new(Self {
            ptr: mapping.ptr.cast(),
            name: name.to_string(),
            created: mapping.created,
        }))
    }

    /// `true` if this process created the shared-memory object.
    pub fn created(&self) -> bool {
        self.created
    }
}

impl Region for ShmRegion {
    #[inline(always)]
    fn board(&self) -> &Board {
        unsafe { self.ptr.as_ref() }
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

impl Drop for ShmRegion {
    /// Unmaps this process's view of the segment.
    ///
    /// Other processes keep their mappings. A failing `munmap` is logged
    /// rather than turned into a panic inside `drop`.
    fn drop(&mut self) {
        match unsafe { mmap::unmap_shared_memory(self.ptr.cast(), Board::SIZE) } {
            Ok(()) => tracing::debug!(name = %self.name, "unmapped whiteboard segment"),
            Err(err) => {
                tracing::warn!(name = %self.name, error = %err, "failed to unmap whiteboard segment")
            }
        }
    }
}

/// Removes the shared-memory object backing the whiteboard `name`.
///
/// Processes that still have it mapped keep working on their view; the
/// next [`Whiteboard::open`](crate::Whiteboard::open) with this name creates
/// a fresh segment.
pub fn unlink(name: &str) -> Result<()> {
    let name = name::shm_name(name)?;
    mmap::unlink_shared_memory(&name).map_err(|source| Error::Resource {
        name: name.clone(),
        source,
    })?;
    tracing::debug!(name = %name, "unlinked whiteboard segment");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{MAGIC, VERSION};

    #[test]
    fn heap_region_starts_zeroed() {
        let region = HeapRegion::new();
        assert_eq!(region.board().header().magic(), 0);
        assert_eq!(region.board().header().event_count(), 0);
        assert!(region.name().is_none());
    }

    #[test]
    fn shm_region_reports_creation_once() {
        let name = format!("/wb-region-{}", std::process::id());
        let first = ShmRegion::open(&name).unwrap();
        let second = ShmRegion::open(&name).unwrap();
        assert!(first.created());
        assert!(!second.created());
        assert_eq!(second.name(), Some(name.as_str()));

        first.board().initialize().unwrap();
        assert_eq!(second.board().header().magic(), MAGIC);
        assert_eq!(second.board().header().version(), VERSION);

        drop(first);
        assert_eq!(second.board().header().magic(), MAGIC);
        drop(second);
        unlink(&name).unwrap();
    }

    #[test]
    fn unlink_missing_segment_is_a_resource_error() {
        let name = format!("wb-region-missing-{}", std::process::id());
        assert!(matches!(unlink(&name), Err(Error::Resource { .. })));
    }

    #[test]
    fn unlink_rejects_bad_name() {
        assert!(matches!(unlink("a/b"), Err(Error::InvalidName { .. })));
    }
}
