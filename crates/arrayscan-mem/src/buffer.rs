//! Native buffers the storage engine fills during a submit.
//!
//! Capacities are counted in elements, not bytes. A buffer's capacity never
//! shrinks; growth replaces the whole set with one twice as large, and the
//! old allocation is dropped as a unit.

use serde::{Deserialize, Serialize};

use arrayscan_core::schema::Datatype;

use crate::error::{Error, Result};

/// Offsets are `u64` byte positions into the value buffer.
pub const OFFSET_WIDTH: usize = 8;
/// One validity byte per cell; zero means null.
pub const VALIDITY_WIDTH: usize = 1;

/// Owned, zeroed byte storage for `capacity` elements of `element_width` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBuffer {
    element_width: usize,
    capacity: usize,
    data: Vec<u8>,
}

impl NativeBuffer {
    pub fn new(element_width: usize, capacity: usize) -> Result<Self> {
        let len = capacity
            .checked_mul(element_width)
            .ok_or(Error::CapacityOverflow {
                elements: capacity,
                width: element_width,
            })?;
        let mut data = Vec::with_capacity(len);
        data.resize(len, 0u8);
        Ok(Self {
            element_width,
            capacity,
            data,
        })
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn element_width(&self) -> usize {
        self.element_width
    }

    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// A fresh, zeroed buffer with twice the capacity.
    pub fn doubled(&self) -> Result<Self> {
        let capacity = self.capacity.checked_mul(2).ok_or(Error::CapacityOverflow {
            elements: self.capacity,
            width: self.element_width,
        })?;
        Self::new(self.element_width, capacity)
    }
}

/// Element capacities of one field's buffers, as registered with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferLayout {
    /// Present iff the field is variable-length.
    pub offsets: Option<usize>,
    pub values: usize,
    /// Present iff the field is nullable.
    pub validity: Option<usize>,
}

/// Offset, value and validity buffers of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSet {
    pub offsets: Option<NativeBuffer>,
    pub values: NativeBuffer,
    pub validity: Option<NativeBuffer>,
}

impl BufferSet {
    pub fn allocate(datatype: Datatype, layout: BufferLayout) -> Result<Self> {
        let offsets = layout
            .offsets
            .map(|cap| NativeBuffer::new(OFFSET_WIDTH, cap))
            .transpose()?;
        let values = NativeBuffer::new(datatype.native_size(), layout.values)?;
        let validity = layout
            .validity
            .map(|cap| NativeBuffer::new(VALIDITY_WIDTH, cap))
            .transpose()?;
        Ok(Self {
            offsets,
            values,
            validity,
        })
    }

    pub fn layout(&self) -> BufferLayout {
        BufferLayout {
            offsets: self.offsets.as_ref().map(NativeBuffer::capacity),
            values: self.values.capacity(),
            validity: self.validity.as_ref().map(NativeBuffer::capacity),
        }
    }

    /// Every buffer doubled. `self` is left untouched.
    pub fn grown(&self) -> Result<Self> {
        Ok(Self {
            offsets: self.offsets.as_ref().map(NativeBuffer::doubled).transpose()?,
            values: self.values.doubled()?,
            validity: self
                .validity
                .as_ref()
                .map(NativeBuffer::doubled)
                .transpose()?,
        })
    }

    pub fn buffers(&self) -> impl Iterator<Item = &NativeBuffer> {
        self.offsets
            .iter()
            .chain(std::iter::once(&self.values))
            .chain(self.validity.iter())
    }

    pub fn nbytes(&self) -> usize {
        self.buffers().map(NativeBuffer::nbytes).sum()
    }
}

/// A field's buffer set, tagged with the name the engine knows it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBuffers {
    pub name: String,
    pub datatype: Datatype,
    pub set: BufferSet,
}

impl FieldBuffers {
    pub fn new(name: impl Into<String>, datatype: Datatype, set: BufferSet) -> Self {
        Self {
            name: name.into(),
            datatype,
            set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_matches_layout() {
        let layout = BufferLayout {
            offsets: Some(4),
            values: 32,
            validity: Some(4),
        };
        let set = BufferSet::allocate(Datatype::StringUtf8, layout).unwrap();
        assert_eq!(set.layout(), layout);
        assert_eq!(set.offsets.as_ref().unwrap().nbytes(), 32);
        assert_eq!(set.values.nbytes(), 32);
        assert_eq!(set.nbytes(), 32 + 32 + 4);
        assert_eq!(set.buffers().count(), 3);
    }

    #[test]
    fn fixed_field_has_values_only() {
        let layout = BufferLayout {
            offsets: None,
            values: 10,
            validity: None,
        };
        let set = BufferSet::allocate(Datatype::Float64, layout).unwrap();
        assert!(set.offsets.is_none() && set.validity.is_none());
        assert_eq!(set.nbytes(), 80);
    }

    #[test]
    fn grown_doubles_every_buffer() {
        let layout = BufferLayout {
            offsets: Some(3),
            values: 5,
            validity: Some(3),
        };
        let set = BufferSet::allocate(Datatype::Int32, layout).unwrap();
        let grown = set.grown().unwrap();
        assert_eq!(
            grown.layout(),
            BufferLayout {
                offsets: Some(6),
                values: 10,
                validity: Some(6),
            }
        );
        assert_eq!(grown.nbytes(), 2 * set.nbytes());
        assert_eq!(set.layout(), layout);
    }

    #[test]
    fn overflow_is_reported() {
        assert!(matches!(
            NativeBuffer::new(8, usize::MAX),
            Err(Error::CapacityOverflow { .. })
        ));
    }
}
