use std::ffi::CString;
use std::io;
use std::ptr::NonNull;

/// A mapped POSIX shared-memory object.
#[derive(Debug)]
pub(crate) struct Mapping {
    pub(crate) ptr: NonNull<u8>,
    /// `true` if this call created the object.
    pub(crate) created: bool,
}

fn c_name(shared_memory_name: &str) -> io::Result<CString> {
    CString::new(shared_memory_name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

/// Opens `shared_memory_name`, creating it with `size` zero bytes if it does
/// not exist yet, and maps `size` bytes of it read-write.
///
/// An existing object that is still empty (its creator has not sized it yet)
/// is sized here; one that is non-empty but smaller than `size` is rejected.
pub(crate) fn map_shared_memory(shared_memory_name: &str, size: usize) -> io::Result<Mapping> {
    let name = c_name(shared_memory_name)?;

    unsafe {
        let mut created = true;
        let mut fd = libc::shm_open(
            name.as_ptr(),
            libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
            0o600,
        );
        if fd == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(err);
            }
            created = false;
            fd = libc::shm_open(name.as_ptr(), libc::O_RDWR, 0o600);
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
        }

        let existing = if created {
            0
        } else {
            let mut stat: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut stat) == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
            stat.st_size as usize
        };

        if existing == 0 {
            if libc::ftruncate(fd, size as libc::off_t) == -1 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(err);
            }
        } else if existing < size {
            libc::close(fd);
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("shared memory object holds {existing} bytes, expected {size}"),
            ));
        }

        let addr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );

        libc::close(fd); // mapping stays valid
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        let ptr = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        Ok(Mapping { ptr, created })
    }
}

pub(crate) unsafe fn unmap_shared_memory(ptr: NonNull<u8>, size: usize) -> io::Result<()> {
    unsafe {
        if libc::munmap(ptr.as_ptr().cast(), size) == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

/// Removes the name of a shared-memory object. Existing mappings stay valid.
pub(crate) fn unlink_shared_memory(shared_memory_name: &str) -> io::Result<()> {
    let name = c_name(shared_memory_name)?;
    if unsafe { libc::shm_unlink(name.as_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!("/wb-mmap-{tag}-{}", std::process::id())
    }

    #[test]
    fn create_then_attach_shares_bytes() {
        let name = unique_name("share");
        let size = 4096;

        let a = map_shared_memory(&name, size).unwrap();
        assert!(a.created);
        let b = map_shared_memory(&name, size).unwrap();
        assert!(!b.created);

        unsafe {
            assert_eq!(*b.ptr.as_ptr().add(10), 0);
            *a.ptr.as_ptr().add(10) = 0xab;
            assert_eq!(*b.ptr.as_ptr().add(10), 0xab);
            unmap_shared_memory(a.ptr, size).unwrap();
            unmap_shared_memory(b.ptr, size).unwrap();
        }
        unlink_shared_memory(&name).unwrap();
    }

    #[test]
    fn attach_rejects_undersized_object() {
        let name = unique_name("small");
        let small = map_shared_memory(&name, 4096).unwrap();

        let err = map_shared_memory(&name, 8192).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        unsafe { unmap_shared_memory(small.ptr, 4096).unwrap() };
        unlink_shared_memory(&name).unwrap();
    }

    #[test]
    fn unlink_of_missing_name_fails() {
        let err = unlink_shared_memory(&unique_name("missing")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = map_shared_memory("/wb\0x", 16).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
