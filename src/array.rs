//! Length-prefixed element sequences inside a single generation buffer.
//!
//! ```text
//! [ count: u16 (native endian) | element 0 | element 1 | ... ]
//!   bytes 0–1                    bytes 2..
//! ```
//!
//! Elements are packed without padding, so they are read back unaligned.

use crate::error::{Error, Result};
use crate::layout::{BUFFER_SIZE, Generation};
use bytemuck::Pod;

/// Size of the element count prefix.
pub const COUNT_SIZE: usize = std::mem::size_of::<u16>();

/// Maximum number of `T` elements a buffer can carry.
pub const fn capacity<T>() -> usize {
    match std::mem::size_of::<T>() {
        0 => 0,
        size => (BUFFER_SIZE - COUNT_SIZE) / size,
    }
}

/// Rejects sequences that would overrun the buffer. Nothing has been
/// written when this fails.
pub(crate) fn check<T>(elements: &[T]) -> Result<()> {
    if elements.len() > capacity::<T>() {
        return Err(Error::PayloadTooLarge {
            size: COUNT_SIZE + std::mem::size_of_val(elements),
            capacity: BUFFER_SIZE,
        });
    }
    Ok(())
}

/// Writes `elements` with their count prefix. The caller has run [`check`].
pub(crate) fn encode_into<T: Pod>(generation: &Generation, elements: &[T]) {
    debug_assert!(elements.len() <= capacity::<T>());
    let count = elements.len() as u16;
    generation.write_at(0, &count.to_ne_bytes());
    generation.write_at(COUNT_SIZE, bytemuck::cast_slice(elements));
}

/// Reads a length-prefixed sequence out of `buffer`.
///
/// The stored count is clamped to what `buffer` can actually hold for `T`,
/// so reading with a mismatched element type yields fewer elements rather
/// than reading past the end.
pub fn decode<T: Pod>(buffer: &[u8]) -> Vec<T> {
    let size = std::mem::size_of::<T>();
    if size == 0 || buffer.len() < COUNT_SIZE {
        return Vec::new();
    }
    let stored = u16::from_ne_bytes([buffer[0], buffer[1]]) as usize;
    let count = stored.min((buffer.len() - COUNT_SIZE) / size);
    buffer[COUNT_SIZE..COUNT_SIZE + count * size]
        .chunks_exact(size)
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::tests::ZeroedBoard;
    use crate::slot::SlotId;

    #[test]
    fn capacity_accounts_for_count_prefix() {
        assert_eq!(capacity::<u8>(), BUFFER_SIZE - 2);
        assert_eq!(capacity::<u32>(), (BUFFER_SIZE - 2) / 4);
        assert_eq!(capacity::<[u8; 3]>(), (BUFFER_SIZE - 2) / 3);
        assert_eq!(capacity::<()>(), 0);
    }

    #[test]
    fn check_rejects_one_element_too_many() {
        let fits = vec![0u64; capacity::<u64>()];
        check(&fits).unwrap();

        let too_many = vec![0u64; capacity::<u64>() + 1];
        match check(&too_many) {
            Err(Error::PayloadTooLarge { size, capacity }) => {
                assert_eq!(size, 2 + too_many.len() * 8);
                assert_eq!(capacity, BUFFER_SIZE);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn encode_writes_count_then_packed_elements() {
        let board = ZeroedBoard::new();
        let generation = board.generation(SlotId::at(0), 0);
        encode_into(generation, &[0x0102u16, 0x0304]);

        let bytes = generation.copy_out();
        assert_eq!(u16::from_ne_bytes([bytes[0], bytes[1]]), 2);
        assert_eq!(u16::from_ne_bytes([bytes[2], bytes[3]]), 0x0102);
        assert_eq!(u16::from_ne_bytes([bytes[4], bytes[5]]), 0x0304);
    }

    #[test]
    fn decode_clamps_count_to_buffer() {
        let mut buffer = [0u8; BUFFER_SIZE];
        buffer[..2].copy_from_slice(&u16::MAX.to_ne_bytes());
        let values: Vec<u32> = decode(&buffer);
        assert_eq!(values.len(), capacity::<u32>());
    }

    #[test]
    fn decode_with_wider_element_type_clamps() {
        let board = ZeroedBoard::new();
        let generation = board.generation(SlotId::at(1), 2);
        let bytes: Vec<u8> = (0..capacity::<u8>()).map(|i| i as u8).collect();
        encode_into(generation, &bytes);

        let wide: Vec<u64> = decode(&generation.copy_out());
        assert_eq!(wide.len(), capacity::<u64>());
        assert_eq!(
            wide[0],
            u64::from_ne_bytes([0, 1, 2, 3, 4, 5, 6, 7])
        );
    }

    #[test]
    fn decode_of_short_or_empty_input() {
        assert!(decode::<u32>(&[]).is_empty());
        assert!(decode::<u32>(&[5]).is_empty());
        assert!(decode::<u32>(&[0, 0, 1, 2, 3, 4]).is_empty());
    }
}
