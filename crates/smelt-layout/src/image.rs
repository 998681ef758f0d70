//! Memory images for global initializers.
//!
//! An image is an ordered sequence of parts: raw byte runs interleaved
//! with symbolic pointer relocations. Scalars pack in target byte order;
//! adjacent bit-fields accumulate into a bit buffer (LSB first) that is
//! flushed to bytes before any non-bit-field.

use serde::{Deserialize, Serialize};
use smelt_ast::{BasicTy, CompileError, Initializer, RecordKind, Type, TypeId};

use crate::service::LayoutService;
use crate::target::TargetInfo;
use crate::value::ConstVal;

/// One piece of a memory image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImagePart {
    Bytes(Vec<u8>),
    /// A pointer-sized reference to a symbol, resolved at link time.
    Reloc(String),
}

/// The memory image of one global's initial value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemImage {
    pub parts: Vec<ImagePart>,
}

impl MemImage {
    pub fn push_bytes(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.parts.push(ImagePart::Bytes(bytes));
        }
    }

    pub fn push_reloc(&mut self, symbol: String) {
        self.parts.push(ImagePart::Reloc(symbol));
    }

    pub fn extend(&mut self, other: MemImage) {
        self.parts.extend(other.parts);
    }

    /// Total size in bytes; relocations count as one pointer.
    pub fn byte_len(&self, target: &TargetInfo) -> u32 {
        self.parts
            .iter()
            .map(|p| match p {
                ImagePart::Bytes(b) => b.len() as u32,
                ImagePart::Reloc(_) => target.ptr_size(),
            })
            .sum()
    }

    /// Flattens to raw bytes; fails if any relocation remains.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for part in &self.parts {
            match part {
                ImagePart::Bytes(b) => out.extend_from_slice(b),
                ImagePart::Reloc(_) => return None,
            }
        }
        Some(out)
    }
}

/// Expands a value into `count` bits, LSB first.
pub fn value_to_bits(value: i64, count: u64) -> Vec<bool> {
    (0..count).map(|i| (value >> i) & 1 == 1).collect()
}

/// Packs bits (LSB first within each byte) into bytes, zero-padding the
/// final partial byte.
pub fn bits_to_bytes(bits: &[bool]) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &bit)| acc | ((bit as u8) << i))
        })
        .collect()
}

impl<'p> LayoutService<'p> {
    /// Creates the memory image for the initial value of a global.
    pub fn gen_global_ival(
        &self,
        typ: TypeId,
        ival: &Initializer,
    ) -> Result<MemImage, CompileError> {
        match self.lookup(typ)? {
            Type::Array { element, length } => {
                self.initialize_array(element, length.as_deref(), ival)
            }
            Type::Record(rec) if rec.kind == RecordKind::Struct => {
                self.initialize_struct(typ, ival)
            }
            Type::Record(_) => self.initialize_union(typ, ival),
            Type::Basic(_) | Type::Bool | Type::Pointer { .. } | Type::Enum(_) => {
                let expr = match ival {
                    Initializer::Expr(e) => e,
                    other => {
                        return Err(CompileError::layout(
                            format!("scalar initializer expected, got {other:?}"),
                            None,
                        ))
                    }
                };
                let mut image = MemImage::default();
                match self.eval(expr)? {
                    ConstVal::Ptr(symbol) => image.push_reloc(symbol),
                    value => image.push_bytes(self.pack_scalar(typ, &value)?),
                }
                Ok(image)
            }
            other => Err(CompileError::layout(
                format!("cannot create initializer image for {other:?}"),
                None,
            )),
        }
    }

    fn lookup(&self, typ: TypeId) -> Result<Type, CompileError> {
        // Cloned out so image construction can re-borrow the service.
        self.type_of(typ).cloned()
    }

    fn initialize_array(
        &self,
        element: TypeId,
        length: Option<&smelt_ast::Expr>,
        ival: &Initializer,
    ) -> Result<MemImage, CompileError> {
        let values = match ival {
            Initializer::Array(values) => values,
            other => {
                return Err(CompileError::layout(
                    format!("array initializer expected, got {other:?}"),
                    None,
                ))
            }
        };

        let element_size = self.size_of(element)?;
        let mut image = MemImage::default();
        for value in values {
            match value {
                Some(iv) => image.extend(self.gen_global_ival(element, iv)?),
                None => image.push_bytes(vec![0; element_size as usize]),
            }
        }

        let length = length.ok_or_else(|| {
            CompileError::layout("Size of array could not be determined", None)
        })?;
        let array_size = self.eval(length)?.as_int()? as usize;
        // Pad missing trailing elements with zeros.
        for _ in values.len()..array_size {
            image.push_bytes(vec![0; element_size as usize]);
        }
        Ok(image)
    }

    fn initialize_union(&self, typ: TypeId, ival: &Initializer) -> Result<MemImage, CompileError> {
        let (field_name, value) = match ival {
            Initializer::Union { field, value } => (field, value),
            other => {
                return Err(CompileError::layout(
                    format!("union initializer expected, got {other:?}"),
                    None,
                ))
            }
        };

        let field_typ = self.record_field_type(typ, field_name)?;
        let mut image = self.gen_global_ival(field_typ, value)?;

        let size = self.size_of(typ)?;
        let filled = image.byte_len(self.target());
        image.push_bytes(vec![0; (size - filled) as usize]);
        Ok(image)
    }

    fn initialize_struct(&self, typ: TypeId, ival: &Initializer) -> Result<MemImage, CompileError> {
        let values = match ival {
            Initializer::Struct(values) => values,
            other => {
                return Err(CompileError::layout(
                    format!("struct initializer expected, got {other:?}"),
                    None,
                ))
            }
        };
        let given = |name: &str| values.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        let rec = match self.lookup(typ)? {
            Type::Record(rec) => rec,
            _ => unreachable!("caller checked the record kind"),
        };

        let mut image = MemImage::default();
        let mut bits: Vec<bool> = Vec::new(); // working bit-field buffer

        for (name, field) in &rec.fields {
            if let Some(width) = &field.bit_width {
                let value = match given(name) {
                    Some(Initializer::Expr(e)) => self.eval(e)?.as_int()?,
                    Some(other) => {
                        return Err(CompileError::layout(
                            format!("bit-field initializer must be scalar, got {other:?}"),
                            None,
                        ))
                    }
                    None => 0,
                };
                let width = self.eval(width)?.as_int()? as u64;
                bits.extend(value_to_bits(value, width));
            } else {
                // Flush accumulated bit-field bits:
                if !bits.is_empty() {
                    image.push_bytes(bits_to_bytes(&bits));
                    bits.clear();
                }
                // Pad up to the field's byte offset:
                let field_offset = (self.field_bit_offset(typ, name)? / 8) as u32;
                let filled = image.byte_len(self.target());
                if filled < field_offset {
                    image.push_bytes(vec![0; (field_offset - filled) as usize]);
                }

                match given(name) {
                    Some(iv) => image.extend(self.gen_global_ival(field.typ, iv)?),
                    None => {
                        let field_size = self.size_of(field.typ)?;
                        image.push_bytes(vec![0; field_size as usize]);
                    }
                }
            }
        }

        // Purge last remaining bits:
        if !bits.is_empty() {
            image.push_bytes(bits_to_bytes(&bits));
        }

        // Trailing padding up to the struct's full size:
        let total = self.size_of(typ)?;
        let filled = image.byte_len(self.target());
        if filled < total {
            image.push_bytes(vec![0; (total - filled) as usize]);
        }
        Ok(image)
    }

    fn record_field_type(&self, typ: TypeId, field: &str) -> Result<TypeId, CompileError> {
        match self.lookup(typ)? {
            Type::Record(rec) => rec.fields.get(field).map(|f| f.typ).ok_or_else(|| {
                CompileError::layout(format!("no field named '{field}'"), None)
            }),
            other => Err(CompileError::layout(
                format!("not a struct or union: {other:?}"),
                None,
            )),
        }
    }

    /// Packs a scalar constant into the memory format of `typ`.
    pub fn pack_scalar(&self, typ: TypeId, value: &ConstVal) -> Result<Vec<u8>, CompileError> {
        let target = self.target();
        match self.lookup(typ)? {
            Type::Basic(b) => {
                let size = target.size_of(b);
                match (b, value) {
                    (BasicTy::Float | BasicTy::Double, v) => {
                        let v = match v {
                            ConstVal::Float(f) => *f,
                            ConstVal::Int(i) => *i as f64,
                            ConstVal::Ptr(_) => {
                                return Err(CompileError::layout(
                                    "cannot pack a symbol as float",
                                    None,
                                ))
                            }
                        };
                        Ok(target.pack_float(v, size))
                    }
                    (BasicTy::LongDouble, _) => {
                        Err(CompileError::layout("cannot pack long double", None))
                    }
                    (_, v) => Ok(target.pack_int(v.as_int()?, size)),
                }
            }
            Type::Bool | Type::Enum(_) => Ok(target.pack_int(value.as_int()?, target.int_size())),
            Type::Pointer { .. } => Ok(target.pack_int(value.as_int()?, target.ptr_size())),
            other => Err(CompileError::layout(
                format!("cannot pack {other:?}"),
                None,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use smelt_ast::{Expr, Field, Literal, ModuleId, Program, RecordDef, SourceLoc};

    fn lit(v: i64) -> Expr {
        Expr::Literal {
            value: Literal::Int(v),
            loc: SourceLoc::new(1, 1),
        }
    }

    fn iexpr(v: i64) -> Initializer {
        Initializer::Expr(lit(v))
    }

    fn setup() -> (TargetInfo, Program, ModuleId) {
        let target = TargetInfo::little32();
        let mut program = Program::new();
        let module = program.add_module("main");
        (target, program, module)
    }

    #[test]
    fn bits_roundtrip() {
        // 0b101 in 3 bits, LSB first.
        assert_eq!(value_to_bits(5, 3), vec![true, false, true]);
        assert_eq!(bits_to_bytes(&value_to_bits(5, 3)), vec![0x05]);
        assert_eq!(bits_to_bytes(&value_to_bits(0x1ff, 9)), vec![0xff, 0x01]);
    }

    #[test]
    fn scalar_int_image() {
        let (target, program, module) = setup();
        let svc = LayoutService::new(&target, &program, module);

        let image = svc.gen_global_ival(TypeId::INT, &iexpr(0x01020304)).unwrap();
        assert_eq!(image.to_bytes().unwrap(), vec![0x04, 0x03, 0x02, 0x01]);
        assert_eq!(image.byte_len(&target), 4);
    }

    #[test]
    fn scalar_int_image_big_endian() {
        let (_, program, module) = setup();
        let target = TargetInfo::big32();
        let svc = LayoutService::new(&target, &program, module);

        let image = svc.gen_global_ival(TypeId::INT, &iexpr(0x01020304)).unwrap();
        assert_eq!(image.to_bytes().unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn pointer_initializer_becomes_reloc() {
        let (target, mut program, module) = setup();
        program.add_global(module, "other", TypeId::INT);
        let ptr = program.types.pointer_to(TypeId::INT);
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(
                ptr,
                &Initializer::Expr(Expr::Identifier {
                    name: "other".into(),
                    loc: SourceLoc::new(1, 1),
                }),
            )
            .unwrap();
        assert_eq!(image.parts, vec![ImagePart::Reloc("other".into())]);
        // A relocation counts as one pointer.
        assert_eq!(image.byte_len(&target), 4);
    }

    #[test]
    fn array_pads_missing_elements() {
        let (target, mut program, module) = setup();
        let arr = program.types.register(Type::Array {
            element: TypeId::INT,
            length: Some(Box::new(lit(4))),
        });
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(arr, &Initializer::Array(vec![Some(iexpr(1)), None, Some(iexpr(3))]))
            .unwrap();
        let bytes = image.to_bytes().unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[3, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
    }

    #[test]
    fn union_zero_pads_to_full_size() {
        let (target, mut program, module) = setup();
        let u = program.types.register(Type::Record(RecordDef {
            kind: RecordKind::Union,
            name: Some("U".into()),
            fields: IndexMap::from([
                (
                    "c".to_string(),
                    Field {
                        typ: TypeId::CHAR,
                        bit_width: None,
                    },
                ),
                (
                    "i".to_string(),
                    Field {
                        typ: TypeId::INT,
                        bit_width: None,
                    },
                ),
            ]),
            complete: true,
        }));
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(
                u,
                &Initializer::Union {
                    field: "c".into(),
                    value: Box::new(iexpr(0x7f)),
                },
            )
            .unwrap();
        assert_eq!(image.to_bytes().unwrap(), vec![0x7f, 0, 0, 0]);
    }

    #[test]
    fn struct_image_with_padding_and_absent_fields() {
        let (target, mut program, module) = setup();
        // struct { char c; int i; }
        let s = program.types.register(Type::Record(RecordDef {
            kind: RecordKind::Struct,
            name: Some("S".into()),
            fields: IndexMap::from([
                (
                    "c".to_string(),
                    Field {
                        typ: TypeId::CHAR,
                        bit_width: None,
                    },
                ),
                (
                    "i".to_string(),
                    Field {
                        typ: TypeId::INT,
                        bit_width: None,
                    },
                ),
            ]),
            complete: true,
        }));
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(s, &Initializer::Struct(vec![("c".to_string(), iexpr(0xab))]))
            .unwrap();
        let bytes = image.to_bytes().unwrap();
        // c, 3 bytes padding, absent i zero-filled.
        assert_eq!(bytes, vec![0xab, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(bytes.len() as u32, svc.size_of(s).unwrap());
    }

    #[test]
    fn struct_image_flushes_bit_fields() {
        let (target, mut program, module) = setup();
        // struct { int a : 3; int b : 5; int c; }
        let s = program.types.register(Type::Record(RecordDef {
            kind: RecordKind::Struct,
            name: Some("S".into()),
            fields: IndexMap::from([
                (
                    "a".to_string(),
                    Field {
                        typ: TypeId::INT,
                        bit_width: Some(lit(3)),
                    },
                ),
                (
                    "b".to_string(),
                    Field {
                        typ: TypeId::INT,
                        bit_width: Some(lit(5)),
                    },
                ),
                (
                    "c".to_string(),
                    Field {
                        typ: TypeId::INT,
                        bit_width: None,
                    },
                ),
            ]),
            complete: true,
        }));
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(
                s,
                &Initializer::Struct(vec![
                    ("a".to_string(), iexpr(0b101)),
                    ("b".to_string(), iexpr(0b11111)),
                    ("c".to_string(), iexpr(1)),
                ]),
            )
            .unwrap();
        let bytes = image.to_bytes().unwrap();
        // a in bits 0..3, b in bits 3..8 -> 0b11111_101 = 0xfd, then pad
        // to offset 4, then c.
        assert_eq!(bytes, vec![0xfd, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn image_len_matches_size_of() {
        let (target, mut program, module) = setup();
        let arr = program.types.register(Type::Array {
            element: TypeId::SHORT,
            length: Some(Box::new(lit(3))),
        });
        let svc = LayoutService::new(&target, &program, module);

        let image = svc
            .gen_global_ival(arr, &Initializer::Array(vec![Some(iexpr(1))]))
            .unwrap();
        assert_eq!(image.byte_len(&target), svc.size_of(arr).unwrap());
    }
}
