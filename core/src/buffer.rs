//! Zero-copy views over native stream buffers.
//!
//! A view aliases exactly `nitems * element.size()` bytes of memory owned by
//! the native scheduler. Views are built by the gateway for one dispatch and
//! cannot outlive it: their lifetime is tied to the dispatch call, and every
//! access goes through a bounds-checked slice.

use std::os::raw::{c_int, c_void};

use blockgate_signals::{ElementType, ItemFormat};

use crate::error::{GatewayError, Result};

/// Complex sample with interleaved real/imaginary parts
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub const fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

/// Scalar types a view can be read as.
///
/// # Safety
///
/// Implementors must be plain old data: no padding, every bit pattern valid,
/// and `size_of::<Self>() == FORMAT.size()`.
pub unsafe trait Item: Copy + 'static {
    const FORMAT: ItemFormat;

    fn matches(format: ItemFormat) -> bool {
        format == Self::FORMAT
    }
}

unsafe impl Item for f32 {
    const FORMAT: ItemFormat = ItemFormat::Float32;
}
unsafe impl Item for f64 {
    const FORMAT: ItemFormat = ItemFormat::Float64;
}
unsafe impl Item for i8 {
    const FORMAT: ItemFormat = ItemFormat::Int8;
}
unsafe impl Item for i16 {
    const FORMAT: ItemFormat = ItemFormat::Int16;
}
unsafe impl Item for i32 {
    const FORMAT: ItemFormat = ItemFormat::Int32;
}
unsafe impl Item for i64 {
    const FORMAT: ItemFormat = ItemFormat::Int64;
}
unsafe impl Item for u8 {
    const FORMAT: ItemFormat = ItemFormat::UInt8;

    fn matches(format: ItemFormat) -> bool {
        matches!(format, ItemFormat::UInt8 | ItemFormat::Byte)
    }
}
unsafe impl Item for u16 {
    const FORMAT: ItemFormat = ItemFormat::UInt16;
}
unsafe impl Item for u32 {
    const FORMAT: ItemFormat = ItemFormat::UInt32;
}
unsafe impl Item for Complex<f32> {
    const FORMAT: ItemFormat = ItemFormat::Complex64;
}
unsafe impl Item for Complex<f64> {
    const FORMAT: ItemFormat = ItemFormat::Complex128;
}
unsafe impl Item for Complex<i8> {
    const FORMAT: ItemFormat = ItemFormat::ComplexInt8;
}
unsafe impl Item for Complex<i16> {
    const FORMAT: ItemFormat = ItemFormat::ComplexInt16;
}
unsafe impl Item for Complex<i32> {
    const FORMAT: ItemFormat = ItemFormat::ComplexInt32;
}

/// Raw bytes of a typed sample slice
pub fn item_bytes<T: Item>(items: &[T]) -> &[u8] {
    // SAFETY: `Item` types are padding-free POD, so their bytes are initialized.
    unsafe { std::slice::from_raw_parts(items.as_ptr() as *const u8, std::mem::size_of_val(items)) }
}

/// Mutable raw bytes of a typed sample slice
pub fn item_bytes_mut<T: Item>(items: &mut [T]) -> &mut [u8] {
    // SAFETY: as above, and any byte pattern written back is a valid `T`.
    unsafe {
        std::slice::from_raw_parts_mut(items.as_mut_ptr() as *mut u8, std::mem::size_of_val(items))
    }
}

fn checked_len(is_null: bool, element: ElementType, nitems: c_int) -> Result<usize> {
    if is_null {
        return Err(GatewayError::InvalidBuffer("null buffer address".to_string()));
    }
    let nitems = usize::try_from(nitems)
        .map_err(|_| GatewayError::InvalidBuffer(format!("negative item count {nitems}")))?;
    nitems
        .checked_mul(element.size())
        .filter(|len| *len <= isize::MAX as usize)
        .ok_or_else(|| GatewayError::InvalidBuffer(format!("{nitems} items of {element} overflow")))
}

fn check_typed<T: Item>(bytes: &[u8], element: ElementType) -> Result<usize> {
    if !T::matches(element.format()) {
        return Err(GatewayError::InvalidBuffer(format!(
            "port carries {element}, not {}",
            T::FORMAT.name()
        )));
    }
    if bytes.as_ptr().align_offset(std::mem::align_of::<T>()) != 0 {
        return Err(GatewayError::InvalidBuffer(format!(
            "buffer is not aligned for {}",
            T::FORMAT.name()
        )));
    }
    Ok(bytes.len() / std::mem::size_of::<T>())
}

fn checked_bytes_len(len: usize, element: ElementType) -> Result<usize> {
    if len % element.size() != 0 {
        return Err(GatewayError::InvalidBuffer(format!(
            "{len} bytes is not a whole number of {element} items"
        )));
    }
    Ok(len / element.size())
}

/// Read-only window over one input port
#[derive(Debug)]
pub struct InputView<'a> {
    bytes: &'a [u8],
    element: ElementType,
    nitems: usize,
}

impl<'a> InputView<'a> {
    /// Alias `nitems` items of `element` starting at `addr`.
    ///
    /// # Safety
    ///
    /// The caller guarantees the region is valid for reads and not mutated
    /// for the whole of `'a`.
    pub unsafe fn from_raw(
        addr: *const c_void,
        element: ElementType,
        nitems: c_int,
    ) -> Result<Self> {
        let len = checked_len(addr.is_null(), element, nitems)?;
        Ok(Self {
            bytes: std::slice::from_raw_parts(addr as *const u8, len),
            element,
            nitems: len / element.size(),
        })
    }

    pub fn from_bytes(bytes: &'a [u8], element: ElementType) -> Result<Self> {
        let nitems = checked_bytes_len(bytes.len(), element)?;
        Ok(Self {
            bytes,
            element,
            nitems,
        })
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.nitems
    }

    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bytes
    }

    /// Bytes of item `index`, or `None` past the end
    pub fn item(&self, index: usize) -> Option<&[u8]> {
        let size = self.element.size();
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.bytes.get(start..end)
    }

    /// Typed scalars, `len() * vlen` of them
    pub fn as_slice<T: Item>(&self) -> Result<&[T]> {
        let count = check_typed::<T>(self.bytes, self.element)?;
        // SAFETY: format, alignment and length checked above.
        Ok(unsafe { std::slice::from_raw_parts(self.bytes.as_ptr() as *const T, count) })
    }
}

/// Writable window over one output port. Writes land in native memory directly.
#[derive(Debug)]
pub struct OutputView<'a> {
    bytes: &'a mut [u8],
    element: ElementType,
    nitems: usize,
}

impl<'a> OutputView<'a> {
    /// Alias `nitems` items of `element` starting at `addr`.
    ///
    /// # Safety
    ///
    /// The caller guarantees the region is valid for reads and writes and not
    /// accessed through any other path for the whole of `'a`.
    pub unsafe fn from_raw(addr: *mut c_void, element: ElementType, nitems: c_int) -> Result<Self> {
        let len = checked_len(addr.is_null(), element, nitems)?;
        Ok(Self {
            bytes: std::slice::from_raw_parts_mut(addr as *mut u8, len),
            element,
            nitems: len / element.size(),
        })
    }

    pub fn from_bytes(bytes: &'a mut [u8], element: ElementType) -> Result<Self> {
        let nitems = checked_bytes_len(bytes.len(), element)?;
        Ok(Self {
            bytes,
            element,
            nitems,
        })
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.nitems
    }

    pub fn is_empty(&self) -> bool {
        self.nitems == 0
    }

    pub fn element(&self) -> ElementType {
        self.element
    }

    pub fn as_bytes(&self) -> &[u8] {
        &*self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.bytes
    }

    pub fn item(&self, index: usize) -> Option<&[u8]> {
        let size = self.element.size();
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.bytes.get(start..end)
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let size = self.element.size();
        let start = index.checked_mul(size)?;
        let end = start.checked_add(size)?;
        self.bytes.get_mut(start..end)
    }

    pub fn as_slice<T: Item>(&self) -> Result<&[T]> {
        let count = check_typed::<T>(&*self.bytes, self.element)?;
        // SAFETY: format, alignment and length checked above.
        Ok(unsafe { std::slice::from_raw_parts(self.bytes.as_ptr() as *const T, count) })
    }

    pub fn as_mut_slice<T: Item>(&mut self) -> Result<&mut [T]> {
        let count = check_typed::<T>(&*self.bytes, self.element)?;
        // SAFETY: format, alignment and length checked above; we hold the only borrow.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.bytes.as_mut_ptr() as *mut T, count) })
    }

    /// Copy as many whole items as fit from `input`. Returns the item count copied.
    pub fn copy_from(&mut self, input: &InputView<'_>) -> Result<usize> {
        if input.element().size() != self.element.size() {
            return Err(GatewayError::InvalidBuffer(format!(
                "cannot copy {} items into {} port",
                input.element(),
                self.element
            )));
        }
        let nitems = self.nitems.min(input.len());
        let len = nitems * self.element.size();
        self.bytes[..len].copy_from_slice(&input.as_bytes()[..len]);
        Ok(nitems)
    }
}
