//! Per-target primitive sizes, alignments and endianness.
//!
//! `int`, `double` and the pointer width are configurable per target; the
//! other basic types have sizes fixed by the language. Alignment equals
//! size for every basic type. The target also knows how to pack scalar
//! values into their memory representation.

use serde::{Deserialize, Serialize};
use smelt_ast::BasicTy;

/// Byte order of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Primitive size/alignment oracle for one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetInfo {
    pub endianness: Endianness,
    int_size: u32,
    ptr_size: u32,
    double_size: u32,
}

impl TargetInfo {
    pub fn new(endianness: Endianness, int_size: u32, ptr_size: u32, double_size: u32) -> Self {
        TargetInfo {
            endianness,
            int_size,
            ptr_size,
            double_size,
        }
    }

    /// 32-bit little-endian configuration with 8-byte doubles.
    pub fn little32() -> Self {
        TargetInfo::new(Endianness::Little, 4, 4, 8)
    }

    /// 32-bit big-endian configuration with 8-byte doubles.
    pub fn big32() -> Self {
        TargetInfo::new(Endianness::Big, 4, 4, 8)
    }

    pub fn size_of(&self, ty: BasicTy) -> u32 {
        match ty {
            BasicTy::Char | BasicTy::UChar => 1,
            BasicTy::Short | BasicTy::UShort => 2,
            BasicTy::Int | BasicTy::UInt => self.int_size,
            BasicTy::Long | BasicTy::ULong => 4,
            BasicTy::LongLong | BasicTy::ULongLong => 8,
            BasicTy::Float => 4,
            BasicTy::Double => self.double_size,
            BasicTy::LongDouble => 10,
        }
    }

    /// Alignment equals size for every basic type.
    pub fn alignment_of(&self, ty: BasicTy) -> u32 {
        self.size_of(ty)
    }

    pub fn int_size(&self) -> u32 {
        self.int_size
    }

    pub fn ptr_size(&self) -> u32 {
        self.ptr_size
    }

    pub fn ptr_alignment(&self) -> u32 {
        self.ptr_size
    }

    /// Packs an integer into `size` bytes in target byte order.
    /// Values are truncated two's-complement.
    pub fn pack_int(&self, value: i64, size: u32) -> Vec<u8> {
        let le = (value as u64).to_le_bytes();
        let mut bytes = le[..size as usize].to_vec();
        if self.endianness == Endianness::Big {
            bytes.reverse();
        }
        bytes
    }

    /// Packs a float into 4 or 8 bytes in target byte order.
    pub fn pack_float(&self, value: f64, size: u32) -> Vec<u8> {
        let mut bytes = match size {
            4 => (value as f32).to_bits().to_le_bytes().to_vec(),
            8 => value.to_bits().to_le_bytes().to_vec(),
            _ => panic!("unpackable float size {size}"),
        };
        if self.endianness == Endianness::Big {
            bytes.reverse();
        }
        bytes
    }
}
