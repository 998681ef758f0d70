//! The semantic type system the layout service and lowering operate on.
//!
//! All types have nominal identity via [`TypeId`], an index into the
//! [`TypeTable`]. The table pre-registers `void`, `bool`, `string` and the
//! C-ish basic set on construction. Aggregate types keep their fields and
//! constants in declaration order via [`IndexMap`].
//!
//! Array lengths and bit-field widths are compile-time constant
//! *expressions*, evaluated by the layout service on demand.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::Expr;

/// Unique identifier for a type. The inner value is an index into the
/// [`TypeTable`]'s type vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// The fixed-layout basic types. `int`, `double` and the pointer size are
/// target-configurable; the rest have sizes fixed by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BasicTy {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    LongDouble,
}

impl fmt::Display for BasicTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BasicTy::Char => "char",
            BasicTy::UChar => "unsigned char",
            BasicTy::Short => "short",
            BasicTy::UShort => "unsigned short",
            BasicTy::Int => "int",
            BasicTy::UInt => "unsigned int",
            BasicTy::Long => "long",
            BasicTy::ULong => "unsigned long",
            BasicTy::LongLong => "long long",
            BasicTy::ULongLong => "unsigned long long",
            BasicTy::Float => "float",
            BasicTy::Double => "double",
            BasicTy::LongDouble => "long double",
        };
        f.write_str(name)
    }
}

/// Struct or union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordKind {
    Struct,
    Union,
}

/// A single struct/union field. A field with `bit_width` set is a
/// bit-field; its width expression is evaluated at layout time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub typ: TypeId,
    pub bit_width: Option<Expr>,
}

/// Struct or union definition with declaration-ordered fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDef {
    pub kind: RecordKind,
    pub name: Option<String>,
    pub fields: IndexMap<String, Field>,
    /// `false` for forward declarations; sizing an incomplete record is a
    /// layout error.
    pub complete: bool,
}

/// Enum definition. Constants without an explicit value expression
/// continue from the previous value plus one, starting at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDef {
    pub name: Option<String>,
    pub constants: IndexMap<String, Option<Expr>>,
    pub complete: bool,
}

/// Function signature type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSig {
    pub params: Vec<TypeId>,
    pub return_type: TypeId,
}

/// A semantic type. Aggregates own their definitions; cross-references go
/// through [`TypeId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Basic(BasicTy),
    Bool,
    Void,
    /// Length-prefixed string; its value is an address.
    Str,
    Pointer { pointee: TypeId },
    /// `length` must evaluate to a compile-time constant; `None` marks an
    /// unsized array, which cannot be sized or laid out.
    Array {
        element: TypeId,
        length: Option<Box<Expr>>,
    },
    Record(RecordDef),
    Enum(EnumDef),
    Function(FunctionSig),
}

/// Registry of all types in a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeTable {
    /// Types indexed by TypeId.0
    types: Vec<Type>,
    /// Named type lookup (structs, unions, enums)
    names: HashMap<String, TypeId>,
    /// Next available ID
    next_id: u32,
}

/// Pre-registered TypeId constants for built-in types.
impl TypeId {
    pub const VOID: TypeId = TypeId(0);
    pub const BOOL: TypeId = TypeId(1);
    pub const STR: TypeId = TypeId(2);
    pub const CHAR: TypeId = TypeId(3);
    pub const UCHAR: TypeId = TypeId(4);
    pub const SHORT: TypeId = TypeId(5);
    pub const USHORT: TypeId = TypeId(6);
    pub const INT: TypeId = TypeId(7);
    pub const UINT: TypeId = TypeId(8);
    pub const LONG: TypeId = TypeId(9);
    pub const ULONG: TypeId = TypeId(10);
    pub const LONGLONG: TypeId = TypeId(11);
    pub const ULONGLONG: TypeId = TypeId(12);
    pub const FLOAT: TypeId = TypeId(13);
    pub const DOUBLE: TypeId = TypeId(14);
    pub const LONGDOUBLE: TypeId = TypeId(15);

    /// The front-end's `byte` type is `char`.
    pub const BYTE: TypeId = TypeId::CHAR;
}

impl TypeTable {
    /// Number of built-in types pre-registered on construction.
    const BUILTIN_COUNT: u32 = 16;

    /// Creates a table with `void`, `bool`, `string` and the basic set
    /// pre-registered at the [`TypeId`] constants above.
    pub fn new() -> Self {
        let types = vec![
            Type::Void,
            Type::Bool,
            Type::Str,
            Type::Basic(BasicTy::Char),
            Type::Basic(BasicTy::UChar),
            Type::Basic(BasicTy::Short),
            Type::Basic(BasicTy::UShort),
            Type::Basic(BasicTy::Int),
            Type::Basic(BasicTy::UInt),
            Type::Basic(BasicTy::Long),
            Type::Basic(BasicTy::ULong),
            Type::Basic(BasicTy::LongLong),
            Type::Basic(BasicTy::ULongLong),
            Type::Basic(BasicTy::Float),
            Type::Basic(BasicTy::Double),
            Type::Basic(BasicTy::LongDouble),
        ];

        TypeTable {
            types,
            names: HashMap::new(),
            next_id: Self::BUILTIN_COUNT,
        }
    }

    /// Registers a type and returns its new [`TypeId`].
    pub fn register(&mut self, ty: Type) -> TypeId {
        let id = TypeId(self.next_id);
        self.types.push(ty);
        self.next_id += 1;
        id
    }

    /// Registers a named type (struct, union, enum). A duplicate name
    /// silently shadows the previous entry; the front-end is expected to
    /// have rejected duplicates already.
    pub fn register_named(&mut self, name: &str, ty: Type) -> TypeId {
        let id = self.register(ty);
        self.names.insert(name.to_string(), id);
        id
    }

    /// Looks up a type by its [`TypeId`].
    pub fn get(&self, id: TypeId) -> Option<&Type> {
        self.types.get(id.0 as usize)
    }

    /// Looks up a named type's [`TypeId`] by name.
    pub fn get_by_name(&self, name: &str) -> Option<TypeId> {
        self.names.get(name).copied()
    }

    /// Registers a pointer to the given type, reusing an existing entry
    /// when one exists.
    pub fn pointer_to(&mut self, pointee: TypeId) -> TypeId {
        if let Some(existing) = self.find_pointer(pointee) {
            return existing;
        }
        self.register(Type::Pointer { pointee })
    }

    /// Finds a registered pointer type with the given pointee.
    pub fn find_pointer(&self, pointee: TypeId) -> Option<TypeId> {
        self.types
            .iter()
            .position(|t| matches!(t, Type::Pointer { pointee: p } if *p == pointee))
            .map(|i| TypeId(i as u32))
    }

    /// Returns `true` if the type is a pointer.
    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Some(Type::Pointer { .. }))
    }

    /// Returns `true` for "simple" types: pointers and base types.
    /// Assignment targets, call results and comparands must be simple.
    pub fn is_simple(&self, id: TypeId) -> bool {
        matches!(
            self.get(id),
            Some(Type::Basic(_) | Type::Bool | Type::Str | Type::Pointer { .. })
        )
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use crate::loc::SourceLoc;

    #[test]
    fn new_table_has_builtins() {
        let table = TypeTable::new();
        assert!(matches!(table.get(TypeId::VOID), Some(Type::Void)));
        assert!(matches!(table.get(TypeId::BOOL), Some(Type::Bool)));
        assert!(matches!(table.get(TypeId::STR), Some(Type::Str)));
        assert!(matches!(
            table.get(TypeId::INT),
            Some(Type::Basic(BasicTy::Int))
        ));
        assert!(matches!(
            table.get(TypeId::LONGDOUBLE),
            Some(Type::Basic(BasicTy::LongDouble))
        ));
    }

    #[test]
    fn byte_is_char() {
        assert_eq!(TypeId::BYTE, TypeId::CHAR);
    }

    #[test]
    fn register_returns_fresh_ids() {
        let mut table = TypeTable::new();
        let p = table.pointer_to(TypeId::INT);
        let q = table.pointer_to(TypeId::CHAR);
        assert_ne!(p, q);
        assert_eq!(p, TypeId(16));
        assert!(table.is_pointer(p));
        assert!(table.is_pointer(q));
    }

    #[test]
    fn register_named_lookup() {
        let mut table = TypeTable::new();
        let id = table.register_named(
            "Point",
            Type::Record(RecordDef {
                kind: RecordKind::Struct,
                name: Some("Point".into()),
                fields: IndexMap::from([
                    (
                        "x".to_string(),
                        Field {
                            typ: TypeId::INT,
                            bit_width: None,
                        },
                    ),
                    (
                        "y".to_string(),
                        Field {
                            typ: TypeId::INT,
                            bit_width: None,
                        },
                    ),
                ]),
                complete: true,
            }),
        );
        assert_eq!(table.get_by_name("Point"), Some(id));
        assert_eq!(table.get_by_name("Nope"), None);
    }

    #[test]
    fn simple_types() {
        let mut table = TypeTable::new();
        let ptr = table.pointer_to(TypeId::INT);
        let arr = table.register(Type::Array {
            element: TypeId::INT,
            length: Some(Box::new(Expr::Literal {
                value: Literal::Int(4),
                loc: SourceLoc::new(1, 1),
            })),
        });

        assert!(table.is_simple(TypeId::INT));
        assert!(table.is_simple(TypeId::BOOL));
        assert!(table.is_simple(TypeId::STR));
        assert!(table.is_simple(ptr));
        assert!(!table.is_simple(arr));
        assert!(!table.is_simple(TypeId::VOID));
    }

    #[test]
    fn record_fields_keep_declaration_order() {
        let fields = IndexMap::from([
            (
                "z".to_string(),
                Field {
                    typ: TypeId::INT,
                    bit_width: None,
                },
            ),
            (
                "a".to_string(),
                Field {
                    typ: TypeId::CHAR,
                    bit_width: None,
                },
            ),
        ]);
        let keys: Vec<&str> = fields.keys().map(|s| s.as_str()).collect();
        assert_eq!(keys, vec!["z", "a"]);
    }

    #[test]
    fn serde_roundtrip_table() {
        let mut table = TypeTable::new();
        table.register_named(
            "E",
            Type::Enum(EnumDef {
                name: Some("E".into()),
                constants: IndexMap::from([("A".to_string(), None)]),
                complete: true,
            }),
        );
        let json = serde_json::to_string(&table).unwrap();
        let back: TypeTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_by_name("E"), table.get_by_name("E"));
        assert_eq!(back.types.len(), table.types.len());
    }
}
