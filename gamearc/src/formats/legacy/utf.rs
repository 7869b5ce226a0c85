//! CRI `@UTF` tables, the column store every CPK section is described with.
//!
//! All fields are big-endian. Offsets in the header are relative to byte 8 of
//! the table. Columns carry a storage class (absent, zero, constant, per-row)
//! and a value type; constant values are stored in the column definition.
//! Packets that do not start with `@UTF` are XOR-scrambled and get
//! [`descramble`]d first.

use std::io::{Cursor, Seek, SeekFrom};

use anyhow::{Context, Result};

use crate::core::error::FormatError;
use crate::core::reader::{read_u16, read_u32, read_u64, read_u8, string_at, Endian};

pub const MAGIC: &[u8; 4] = b"@UTF";

const STORAGE_MASK: u8 = 0xF0;
const STORAGE_NONE: u8 = 0x00;
const STORAGE_ZERO: u8 = 0x10;
const STORAGE_CONSTANT: u8 = 0x30;
const STORAGE_PER_ROW: u8 = 0x50;
const TYPE_MASK: u8 = 0x0F;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f32),
    Str(String),
    /// Range inside the table's data area.
    Data { offset: u64, size: u64 },
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(v) => Some(v),
            Value::Signed(v) => u64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    flags: u8,
    constant: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct UtfTable {
    pub name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Option<Value>>>,
}

/// Undo the table scrambling: each byte is XORed with the low byte of a
/// running multiplicative key.
pub fn descramble(packet: &mut [u8]) {
    let mut m: u32 = 0x655F;
    let t: u32 = 0x4115;
    for b in packet.iter_mut() {
        *b ^= (m & 0xFF) as u8;
        m = m.wrapping_mul(t);
    }
}

impl UtfTable {
    /// Parse a table packet, descrambling it when needed.
    pub fn parse(packet: &[u8]) -> Result<Self> {
        if packet.starts_with(MAGIC) {
            return Self::parse_plain(packet);
        }
        let mut owned = packet.to_vec();
        descramble(&mut owned);
        if !owned.starts_with(MAGIC) {
            return Err(FormatError::InvalidIdentifier("@UTF").into());
        }
        Self::parse_plain(&owned)
    }

    fn parse_plain(packet: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(packet);
        r.seek(SeekFrom::Start(4))?;
        let _table_size = read_u32(&mut r, Endian::Big)?;
        let _version = read_u16(&mut r, Endian::Big)?;
        let rows_at = read_u16(&mut r, Endian::Big)? as u64 + 8;
        let strings_at = read_u32(&mut r, Endian::Big)? as usize + 8;
        let _data_at = read_u32(&mut r, Endian::Big)? as u64 + 8;
        let name_offset = read_u32(&mut r, Endian::Big)? as usize;
        let column_count = read_u16(&mut r, Endian::Big)?;
        let row_length = read_u16(&mut r, Endian::Big)? as u64;
        let row_count = read_u32(&mut r, Endian::Big)?;

        let string = |offset: usize| -> Result<String> {
            string_at(packet, strings_at + offset)
                .ok_or_else(|| FormatError::Table(format!("string offset {offset:#x} outside table")).into())
        };
        let name = string(name_offset)?;

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let mut flags = read_u8(&mut r)?;
            if flags == 0 {
                r.seek(SeekFrom::Current(3))?;
                flags = read_u8(&mut r)?;
            }
            let column_name = string(read_u32(&mut r, Endian::Big)? as usize)?;
            let constant = if flags & STORAGE_MASK == STORAGE_CONSTANT {
                Some(read_value(&mut r, flags, &string).with_context(|| format!("@UTF column {column_name}"))?)
            } else {
                None
            };
            columns.push(Column {
                name: column_name,
                flags,
                constant,
            });
        }

        let mut rows = Vec::with_capacity(row_count.min(0x10000) as usize);
        for row in 0..row_count as u64 {
            r.seek(SeekFrom::Start(rows_at + row * row_length))?;
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                let value = match column.flags & STORAGE_MASK {
                    STORAGE_NONE => None,
                    STORAGE_ZERO => Some(Value::Unsigned(0)),
                    STORAGE_CONSTANT => column.constant.clone(),
                    STORAGE_PER_ROW => Some(read_value(&mut r, column.flags, &string)?),
                    other => {
                        return Err(FormatError::Table(format!("unknown storage class {other:#x}")).into())
                    }
                };
                values.push(value);
            }
            rows.push(values);
        }

        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(idx)?.as_ref()
    }

    pub fn get_u64(&self, row: usize, column: &str) -> Option<u64> {
        self.get(row, column)?.as_u64()
    }

    pub fn get_str(&self, row: usize, column: &str) -> Option<&str> {
        self.get(row, column)?.as_str()
    }
}

fn read_value<F>(r: &mut Cursor<&[u8]>, flags: u8, string: &F) -> Result<Value>
where
    F: Fn(usize) -> Result<String>,
{
    Ok(match flags & TYPE_MASK {
        0x00 => Value::Unsigned(read_u8(r)? as u64),
        0x01 => Value::Signed(read_u8(r)? as i8 as i64),
        0x02 => Value::Unsigned(read_u16(r, Endian::Big)? as u64),
        0x03 => Value::Signed(read_u16(r, Endian::Big)? as i16 as i64),
        0x04 => Value::Unsigned(read_u32(r, Endian::Big)? as u64),
        0x05 => Value::Signed(read_u32(r, Endian::Big)? as i32 as i64),
        0x06 => Value::Unsigned(read_u64(r, Endian::Big)?),
        0x07 => Value::Signed(read_u64(r, Endian::Big)? as i64),
        0x08 => Value::Float(f32::from_bits(read_u32(r, Endian::Big)?)),
        0x0A => Value::Str(string(read_u32(r, Endian::Big)? as usize)?),
        0x0B => {
            let offset = read_u32(r, Endian::Big)? as u64;
            let size = read_u32(r, Endian::Big)? as u64;
            Value::Data { offset, size }
        }
        other => return Err(FormatError::Table(format!("unknown column type {other:#x}")).into()),
    })
}
