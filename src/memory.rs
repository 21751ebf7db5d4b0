use crate::{
    memory_units::{Bytes, Pages, RoundUpTo},
    types::Limits,
    Error,
};
use alloc::{rc::Rc, vec::Vec};
use core::{
    cell::{Cell, RefCell},
    fmt,
};
use wasmlite_core::{LittleEndianConvert, LoadInto, StoreFrom, TrapCode};

/// Size of a page of [linear memory][`MemoryInstance`] - 64KiB.
///
/// The size of a memory is always an integer multiple of a page size.
pub const LINEAR_MEMORY_PAGE_SIZE: Bytes = Bytes(65536);

/// Maximum number of pages a linear memory can have: 65536 pages, or 4GiB.
pub(crate) const LINEAR_MEMORY_MAX_PAGES: Pages = Pages(65536);

/// Reference to a linear memory (see [`MemoryInstance`] for details).
///
/// This reference has reference-counting semantics.
#[derive(Clone, Debug)]
pub struct MemoryRef(Rc<MemoryInstance>);

impl ::core::ops::Deref for MemoryRef {
    type Target = MemoryInstance;
    fn deref(&self) -> &MemoryInstance {
        &self.0
    }
}

/// Runtime representation of a linear memory (or `memory` for short).
///
/// A memory is a contiguous, mutable array of raw bytes. Wasm code can load
/// and store values from/to a linear memory at any byte address. A trap
/// occurs if an access is not within the bounds of the current memory size.
///
/// A memory is created with an initial size but can be grown dynamically,
/// up to an optional declared maximum and the 65536-page hard cap. Growing
/// reallocates the backing buffer; the new tail bytes are zero-initialized.
/// Wasm provides no way to shrink a memory.
pub struct MemoryInstance {
    limits: Limits,
    buffer: RefCell<Vec<u8>>,
    initial: Pages,
    current_size: Cell<usize>,
    maximum: Option<Pages>,
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoryInstance")
            .field("limits", &self.limits)
            .field("buffer.len", &self.buffer.borrow().len())
            .field("initial", &self.initial)
            .field("maximum", &self.maximum)
            .finish()
    }
}

impl MemoryInstance {
    /// Allocates a memory instance.
    ///
    /// The memory is allocated with the number of pages specified by
    /// `initial` and zero-filled. `maximum`, when given, limits how far the
    /// instance can [`grow`]; without it, growth is limited only by the
    /// 4GiB hard cap.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `initial` is greater than `maximum`, or if either
    /// exceeds `65536` pages.
    ///
    /// [`grow`]: #method.grow
    pub fn alloc(initial: Pages, maximum: Option<Pages>) -> Result<MemoryRef, Error> {
        if initial > LINEAR_MEMORY_MAX_PAGES {
            return Err(Error::Memory(format!(
                "initial size of {} pages exceeds the 65536 page cap",
                initial.0
            )));
        }
        if let Some(maximum) = maximum {
            if maximum > LINEAR_MEMORY_MAX_PAGES {
                return Err(Error::Memory(format!(
                    "maximum size of {} pages exceeds the 65536 page cap",
                    maximum.0
                )));
            }
            if initial > maximum {
                return Err(Error::Memory(format!(
                    "initial size {} exceeds the declared maximum {}",
                    initial.0, maximum.0
                )));
            }
        }

        let memory = MemoryInstance::new(initial, maximum);
        Ok(MemoryRef(Rc::new(memory)))
    }

    /// Creates a new linear memory instance.
    fn new(initial: Pages, maximum: Option<Pages>) -> Self {
        let limits = Limits::new(initial.0 as u32, maximum.map(|p| p.0 as u32));

        let initial_size: Bytes = initial.into();
        MemoryInstance {
            limits,
            buffer: RefCell::new(vec![0; initial_size.0]),
            initial,
            current_size: Cell::new(initial_size.0),
            maximum,
        }
    }

    /// Returns the linear memory limits this instance was declared with.
    pub(crate) fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Returns the number of pages this memory was created with.
    pub fn initial(&self) -> Pages {
        self.initial
    }

    /// Returns the maximum number of pages this memory can grow to, or
    /// `None` if only the hard cap applies.
    pub fn maximum(&self) -> Option<Pages> {
        self.maximum
    }

    /// Returns the current size of the linear memory in pages.
    pub fn current_size(&self) -> Pages {
        Bytes(self.current_size.get()).round_up_to()
    }

    /// Reads a value of type `T` from the given address, little-endian.
    ///
    /// # Errors
    ///
    /// Traps if `address + size_of::<T>()` is out of bounds.
    pub fn get_value<T: LittleEndianConvert>(&self, address: u32) -> Result<T, TrapCode> {
        let buffer = self.buffer.borrow();
        let mut bytes = <T as LittleEndianConvert>::Bytes::default();
        bytes.load_into(&buffer, address as usize)?;
        Ok(T::from_le_bytes(bytes))
    }

    /// Writes a value of type `T` at the given address, little-endian.
    ///
    /// # Errors
    ///
    /// Traps if `address + size_of::<T>()` is out of bounds.
    pub fn set_value<T: LittleEndianConvert>(&self, address: u32, value: T) -> Result<(), TrapCode> {
        let mut buffer = self.buffer.borrow_mut();
        value.into_le_bytes().store_from(&mut buffer, address as usize)
    }

    /// Copies data from the given offset in the memory into the `target`
    /// slice.
    ///
    /// # Errors
    ///
    /// Traps if the specified region is out of bounds.
    pub fn get_into(&self, offset: u32, target: &mut [u8]) -> Result<(), TrapCode> {
        let buffer = self.buffer.borrow();
        let region = checked_region(&buffer, offset as usize, target.len())?;
        target.copy_from_slice(&buffer[region.0..region.1]);
        Ok(())
    }

    /// Copies the `value` bytes into the memory at the given offset.
    ///
    /// # Errors
    ///
    /// Traps if the specified region is out of bounds.
    pub fn set(&self, offset: u32, value: &[u8]) -> Result<(), TrapCode> {
        let mut buffer = self.buffer.borrow_mut();
        let region = checked_region(&buffer, offset as usize, value.len())?;
        buffer[region.0..region.1].copy_from_slice(value);
        Ok(())
    }

    /// Increases the size of the linear memory by the given number of
    /// pages, zero-filling the new tail.
    ///
    /// Returns the previous memory size in pages on success.
    ///
    /// # Errors
    ///
    /// Returns `Err` without mutating the memory if the new size would
    /// exceed the declared maximum or the 65536 page hard cap.
    pub fn grow(&self, additional: Pages) -> Result<Pages, Error> {
        let size_before_grow: Pages = self.current_size();

        if additional == Pages(0) {
            return Ok(size_before_grow);
        }

        let new_size: Pages = size_before_grow + additional;
        let maximum = self.maximum.unwrap_or(LINEAR_MEMORY_MAX_PAGES);
        if new_size > maximum || new_size > LINEAR_MEMORY_MAX_PAGES {
            return Err(Error::Memory(format!(
                "cannot grow memory by {} pages when already at {}",
                additional.0, size_before_grow.0,
            )));
        }

        let new_buffer_length: Bytes = new_size.into();
        self.buffer.borrow_mut().resize(new_buffer_length.0, 0);
        self.current_size.set(new_buffer_length.0);

        Ok(size_before_grow)
    }

    /// Provides direct access to the underlying memory buffer.
    ///
    /// # Panics
    ///
    /// Any call that requires write access to the memory made within the
    /// closure will panic.
    pub fn with_direct_access<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R {
        let buf = self.buffer.borrow();
        f(&buf)
    }

    /// Provides direct mutable access to the underlying memory buffer.
    ///
    /// # Panics
    ///
    /// Any call that requires read or write access to the memory made
    /// within the closure will panic.
    pub fn with_direct_access_mut<R, F: FnOnce(&mut [u8]) -> R>(&self, f: F) -> R {
        let mut buf = self.buffer.borrow_mut();
        f(&mut buf)
    }
}

/// Bounds-checks `offset + size` against the buffer, returning the checked
/// byte range.
fn checked_region(buffer: &[u8], offset: usize, size: usize) -> Result<(usize, usize), TrapCode> {
    let end = offset
        .checked_add(size)
        .ok_or(TrapCode::MemoryAccessOutOfBounds)?;
    if end > buffer.len() {
        return Err(TrapCode::MemoryAccessOutOfBounds);
    }
    Ok((offset, end))
}

#[cfg(test)]
mod tests {
    use super::{MemoryInstance, LINEAR_MEMORY_PAGE_SIZE};
    use crate::memory_units::{ByteSize, Pages};
    use wasmlite_core::TrapCode;

    #[test]
    fn alloc() {
        let fixtures = [
            (0, None, true),
            (0, Some(0), true),
            (1, None, true),
            (1, Some(1), true),
            (0, Some(1), true),
            (1, Some(0), false),
            (65536, Some(65536), true),
            (65537, None, false),
            (65536, Some(0), false),
        ];

        for (index, &(initial, maybe_max, expected_ok)) in fixtures.iter().enumerate() {
            let initial: Pages = Pages(initial);
            let maximum: Option<Pages> = maybe_max.map(Pages);
            let result = MemoryInstance::alloc(initial, maximum);
            if result.is_ok() != expected_ok {
                panic!(
                    "unexpected error at {}, initial={:?}, max={:?}, expected={}, result={:?}",
                    index, initial, maybe_max, expected_ok, result,
                );
            }
        }
    }

    #[test]
    fn ensure_page_size() {
        assert_eq!(LINEAR_MEMORY_PAGE_SIZE, Pages::BYTE_SIZE);
    }

    #[test]
    fn memory_is_zeroed_at_init() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.with_direct_access(|buf| {
            assert_eq!(buf.len(), 65536);
            assert!(buf.iter().all(|&b| b == 0));
        });
    }

    #[test]
    fn grow_respects_maximum_and_reports_old_size() {
        let mem = MemoryInstance::alloc(Pages(1), Some(Pages(3))).unwrap();
        assert_eq!(mem.grow(Pages(1)).unwrap(), Pages(1));
        assert_eq!(mem.current_size(), Pages(2));
        // Over the declared maximum: no mutation.
        assert!(mem.grow(Pages(2)).is_err());
        assert_eq!(mem.current_size(), Pages(2));
        assert_eq!(mem.grow(Pages(0)).unwrap(), Pages(2));
    }

    #[test]
    fn grown_tail_is_zeroed() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.set(65532, &[1, 2, 3, 4]).unwrap();
        mem.grow(Pages(1)).unwrap();
        let mut buf = [0xFF; 8];
        mem.get_into(65532, &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn store_load_round_trip() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.set_value::<u32>(0, 0x12345678).unwrap();
        assert_eq!(mem.get_value::<u32>(0).unwrap(), 0x12345678);
        // Little-endian byte order in memory.
        let mut bytes = [0u8; 4];
        mem.get_into(0, &mut bytes).unwrap();
        assert_eq!(bytes, [0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn out_of_bounds_accesses_trap() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        assert_eq!(
            mem.get_value::<u64>(65533).unwrap_err(),
            TrapCode::MemoryAccessOutOfBounds
        );
        assert_eq!(
            mem.set_value::<u32>(u32::MAX, 1).unwrap_err(),
            TrapCode::MemoryAccessOutOfBounds
        );
        // The very last valid address for a byte.
        mem.set_value::<u8>(65535, 0xAB).unwrap();
        assert_eq!(mem.get_value::<u8>(65535).unwrap(), 0xAB);
    }
}
