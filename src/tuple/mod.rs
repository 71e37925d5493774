pub mod schema;

use crate::pages::PageId;
use crate::tuple::schema::Schema;
use crate::types::{Types, Value};

/// Tuple meta + the tuple itself.
pub type Entry = (TupleMeta, Tuple);

/// Identifies a tuple slot on a table page.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    pub page_id: PageId,
    pub slot: u16,
}

impl Rid {
    pub fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for Rid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.page_id, self.slot)
    }
}

/// Timestamps below [`crate::txn::TXN_START_ID`] are commit timestamps; at
/// or above they name the transaction that owns the uncommitted write.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TupleMeta {
    pub ts: u64,
    pub is_deleted: bool,
}

impl TupleMeta {
    pub fn new(ts: u64, is_deleted: bool) -> Self {
        Self { ts, is_deleted }
    }
}

/// A tuple is a null bitmap followed by the packed column values. Nulls are
/// serialized as their type's default and masked back out on read.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    data: Box<[u8]>,
}

const NULL_BITMAP_SIZE: usize = std::mem::size_of::<u64>();

impl Tuple {
    pub fn new(values: Vec<Value>, schema: &Schema) -> Self {
        assert_eq!(values.len(), schema.len());
        let mut nulls = 0u64;
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u64.to_le_bytes());
        for (i, (value, field)) in values.iter().zip(schema.fields.iter()).enumerate() {
            if value.is_null() {
                nulls |= 1 << i;
                Value::default_of(&field.ty).write_bytes(&mut buf);
            } else {
                value.write_bytes(&mut buf);
            }
        }
        buf[..NULL_BITMAP_SIZE].copy_from_slice(&nulls.to_le_bytes());
        Self {
            data: buf.into_boxed_slice(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec().into_boxed_slice(),
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn null_bitmap(&self) -> u64 {
        u64::from_le_bytes(self.data[..NULL_BITMAP_SIZE].try_into().unwrap())
    }

    pub fn is_null_at(&self, idx: usize) -> bool {
        (self.null_bitmap() >> idx) & 1 == 1
    }

    pub fn value_at(&self, idx: usize, schema: &Schema) -> Value {
        assert!(idx < schema.len(), "column {idx} out of bounds");
        let mut offset = NULL_BITMAP_SIZE;
        for field in schema.fields.iter().take(idx) {
            offset += match field.ty {
                Types::Str => {
                    let len =
                        u16::from_le_bytes(self.data[offset..offset + 2].try_into().unwrap());
                    2 + len as usize
                }
                ty => ty.size(),
            };
        }
        if self.is_null_at(idx) {
            return Value::Null;
        }
        let (value, _) = Value::from_bytes(&schema.fields[idx].ty, &self.data[offset..]);
        value
    }

    pub fn values(&self, schema: &Schema) -> Vec<Value> {
        let nulls = self.null_bitmap();
        let mut values = Vec::with_capacity(schema.len());
        let mut offset = NULL_BITMAP_SIZE;
        for (i, field) in schema.fields.iter().enumerate() {
            let (value, consumed) = Value::from_bytes(&field.ty, &self.data[offset..]);
            offset += consumed;
            if (nulls >> i) & 1 == 1 {
                values.push(Value::Null);
            } else {
                values.push(value);
            }
        }
        values
    }

    /// Key tuple for an index: the named attributes projected out in order.
    pub fn key_from_tuple(&self, schema: &Schema, key_attrs: &[usize]) -> Tuple {
        let values = key_attrs
            .iter()
            .map(|i| self.value_at(*i, schema))
            .collect();
        Tuple::new(values, &schema.copy_schema(key_attrs))
    }
}
