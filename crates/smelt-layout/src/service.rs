//! Size, alignment, record layout, enum values and compile-time
//! evaluation.
//!
//! The service answers layout questions for one module against one
//! target. Record layouts and enum value tables are computed on first
//! query and cached; caches are never invalidated and the service must be
//! confined to one thread (hence [`RefCell`], not locks).
//!
//! Record layout walks fields in declaration order maintaining a *bit*
//! offset: bit-fields are 1-bit aligned with their evaluated width,
//! everything else is byte-aligned with its byte size times eight. Union
//! fields all sit at offset zero.

use std::cell::RefCell;
use std::collections::HashMap;

use indexmap::IndexMap;
use smelt_ast::{
    ArithOp, BinOp, CompileError, Expr, Field, Literal, ModuleId, Program, RecordKind, Symbol,
    Type, TypeId, UnOp,
};

use crate::target::TargetInfo;
use crate::value::ConstVal;

/// Pads `offset` up to the next multiple of `align`.
pub(crate) fn required_padding(offset: u64, align: u64) -> u64 {
    if align == 0 {
        return 0;
    }
    (align - offset % align) % align
}

/// Layout oracle for one module of a program.
pub struct LayoutService<'p> {
    target: &'p TargetInfo,
    program: &'p Program,
    module: ModuleId,
    record_cache: RefCell<HashMap<TypeId, (u32, IndexMap<String, u64>)>>,
    enum_cache: RefCell<HashMap<TypeId, IndexMap<String, i64>>>,
}

impl<'p> LayoutService<'p> {
    pub fn new(target: &'p TargetInfo, program: &'p Program, module: ModuleId) -> Self {
        LayoutService {
            target,
            program,
            module,
            record_cache: RefCell::new(HashMap::new()),
            enum_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn target(&self) -> &TargetInfo {
        self.target
    }

    pub(crate) fn type_of(&self, id: TypeId) -> Result<&'p Type, CompileError> {
        self.program
            .types
            .get(id)
            .ok_or_else(|| CompileError::layout(format!("unknown type {id}"), None))
    }

    // -- size and alignment ----------------------------------------------

    /// Size of a type in whole bytes.
    pub fn size_of(&self, id: TypeId) -> Result<u32, CompileError> {
        match self.type_of(id)? {
            Type::Basic(b) => Ok(self.target.size_of(*b)),
            Type::Bool => Ok(self.target.int_size()),
            Type::Str => Ok(self.target.ptr_size()),
            Type::Void => Err(CompileError::layout("Storage size unknown", None)),
            Type::Pointer { .. } | Type::Function(_) => Ok(self.target.ptr_size()),
            Type::Array { element, length } => {
                let element_size = self.size_of(*element)?;
                let length = length.as_ref().ok_or_else(|| {
                    CompileError::layout("Size of array could not be determined", None)
                })?;
                let count = self.eval(length)?.as_int()?;
                Ok(element_size * count as u32)
            }
            Type::Record(rec) => {
                if !rec.complete {
                    return Err(CompileError::layout("Storage size unknown", None));
                }
                match rec.kind {
                    RecordKind::Struct => Ok(self.record_layout(id)?.0),
                    RecordKind::Union => {
                        let mut max = 0;
                        for field in rec.fields.values() {
                            max = max.max(self.size_of(field.typ)?);
                        }
                        Ok(max)
                    }
                }
            }
            Type::Enum(e) => {
                if !e.complete {
                    return Err(CompileError::layout("Storage size unknown", None));
                }
                Ok(self.target.int_size())
            }
        }
    }

    /// Alignment of a type in bytes.
    pub fn alignment_of(&self, id: TypeId) -> Result<u32, CompileError> {
        match self.type_of(id)? {
            Type::Basic(b) => Ok(self.target.alignment_of(*b)),
            Type::Bool => Ok(self.target.int_size()),
            Type::Str => Ok(self.target.ptr_alignment()),
            Type::Void => Err(CompileError::layout("Storage size unknown", None)),
            Type::Pointer { .. } | Type::Function(_) => Ok(self.target.ptr_alignment()),
            Type::Array { element, .. } => self.alignment_of(*element),
            Type::Record(rec) => {
                if !rec.complete {
                    return Err(CompileError::layout("Storage size unknown", None));
                }
                let mut max = 1;
                for field in rec.fields.values() {
                    max = max.max(self.field_alignment(field)?);
                }
                Ok(max)
            }
            Type::Enum(e) => {
                if !e.complete {
                    return Err(CompileError::layout("Storage size unknown", None));
                }
                Ok(self.target.int_size())
            }
        }
    }

    /// Alignment of a record field in bytes. Bit-fields align at 1.
    pub fn field_alignment(&self, field: &Field) -> Result<u32, CompileError> {
        if field.bit_width.is_some() {
            Ok(1)
        } else {
            self.alignment_of(field.typ)
        }
    }

    /// Validates a declared type: it must be sizeable.
    pub fn check_type(&self, id: TypeId) -> Result<(), CompileError> {
        self.size_of(id).map(|_| ())
    }

    // -- record layout ---------------------------------------------------

    /// Total size in bytes and per-field *bit* offsets, cached per type.
    pub fn record_layout(
        &self,
        id: TypeId,
    ) -> Result<(u32, IndexMap<String, u64>), CompileError> {
        if let Some(cached) = self.record_cache.borrow().get(&id) {
            return Ok(cached.clone());
        }

        let rec = match self.type_of(id)? {
            Type::Record(rec) => rec,
            other => {
                return Err(CompileError::layout(
                    format!("not a struct or union: {other:?}"),
                    None,
                ))
            }
        };
        if !rec.complete {
            return Err(CompileError::layout("Storage size unknown", None));
        }

        let mut offsets = IndexMap::new();
        let mut offset: u64 = 0; // offset in bits
        for (name, field) in &rec.fields {
            let (bit_size, alignment) = if let Some(width) = &field.bit_width {
                (self.eval(width)?.as_int()? as u64, 1)
            } else {
                (
                    self.size_of(field.typ)? as u64 * 8,
                    self.field_alignment(field)? as u64 * 8,
                )
            };

            offset += required_padding(offset, alignment);
            offsets.insert(name.clone(), offset);
            if rec.kind == RecordKind::Struct {
                offset += bit_size;
            }
        }

        // Finally align at 8 bits:
        offset += required_padding(offset, 8);
        let total = (offset / 8) as u32;

        let result = (total, offsets);
        self.record_cache.borrow_mut().insert(id, result.clone());
        Ok(result)
    }

    /// Byte offset of a field. Bit-field consumers should read the bit
    /// offset directly via [`field_bit_offset`](Self::field_bit_offset).
    pub fn offset_of(&self, id: TypeId, field: &str) -> Result<u32, CompileError> {
        Ok((self.field_bit_offset(id, field)? / 8) as u32)
    }

    /// Bit offset of a field within its record.
    pub fn field_bit_offset(&self, id: TypeId, field: &str) -> Result<u64, CompileError> {
        let (_, offsets) = self.record_layout(id)?;
        offsets.get(field).copied().ok_or_else(|| {
            CompileError::layout(format!("no field named '{field}'"), None)
        })
    }

    // -- enum values -----------------------------------------------------

    /// Integer values of an enum's constants, cached per type. Constants
    /// without an explicit value continue from the previous plus one,
    /// starting at zero.
    pub fn enum_values(&self, id: TypeId) -> Result<IndexMap<String, i64>, CompileError> {
        if let Some(cached) = self.enum_cache.borrow().get(&id) {
            return Ok(cached.clone());
        }

        let def = match self.type_of(id)? {
            Type::Enum(def) => def,
            other => {
                return Err(CompileError::layout(
                    format!("not an enum: {other:?}"),
                    None,
                ))
            }
        };

        let mut values = IndexMap::new();
        let mut value: i64 = 0;
        for (name, init) in &def.constants {
            if let Some(expr) = init {
                value = self.eval(expr)?.as_int()?;
            }
            values.insert(name.clone(), value);
            value += 1;
        }

        self.enum_cache.borrow_mut().insert(id, values.clone());
        Ok(values)
    }

    /// The value of one enum constant.
    pub fn enum_value(&self, id: TypeId, constant: &str) -> Result<i64, CompileError> {
        self.enum_values(id)?.get(constant).copied().ok_or_else(|| {
            CompileError::layout(format!("no enum constant named '{constant}'"), None)
        })
    }

    // -- compile-time evaluation -----------------------------------------

    /// Evaluates an expression right now, at compile time.
    pub fn eval(&self, expr: &Expr) -> Result<ConstVal, CompileError> {
        match expr {
            Expr::Binop { a, op, b, loc } => {
                let lhs = self.eval(a)?;
                let rhs = self.eval(b)?;
                let op = match op {
                    BinOp::Arith(op) => *op,
                    other => {
                        return Err(CompileError::unsupported(
                            format!("operator {other:?} is not constant-foldable"),
                            Some(*loc),
                        ))
                    }
                };
                self.eval_binop(lhs, op, rhs, *loc)
            }
            Expr::Unop { op, a, loc } => match op {
                UnOp::Neg => match self.eval(a)? {
                    ConstVal::Int(v) => Ok(ConstVal::Int(
                        v.checked_neg()
                            .ok_or(CompileError::Overflow { loc: Some(*loc) })?,
                    )),
                    ConstVal::Float(v) => Ok(ConstVal::Float(-v)),
                    ConstVal::Ptr(_) => Err(CompileError::unsupported(
                        "cannot negate a symbol",
                        Some(*loc),
                    )),
                },
                UnOp::AddressOf => Err(CompileError::unsupported(
                    "address-of is not constant-foldable",
                    Some(*loc),
                )),
            },
            Expr::Identifier { name, loc } => {
                let sym = self
                    .program
                    .resolve(self.module, None, name)
                    .ok_or_else(|| {
                        CompileError::unsupported(format!("unknown name '{name}'"), Some(*loc))
                    })?;
                match self.program.symbol(sym) {
                    Symbol::EnumConst(e) => Ok(ConstVal::Int(self.enum_value(e.owner, name)?)),
                    Symbol::Var(v) => Ok(ConstVal::Ptr(v.name.clone())),
                    Symbol::Func(f) => Ok(ConstVal::Ptr(f.name.clone())),
                    Symbol::Const(c) => self.eval(&c.value),
                    Symbol::Module(_) => Err(CompileError::unsupported(
                        format!("'{name}' is a module, not a constant"),
                        Some(*loc),
                    )),
                }
            }
            Expr::Literal { value, loc } => match value {
                Literal::Int(v) => Ok(ConstVal::Int(*v)),
                Literal::Float(v) => Ok(ConstVal::Float(*v)),
                Literal::Bool(v) => Ok(ConstVal::Int(*v as i64)),
                Literal::Str(_) => Err(CompileError::unsupported(
                    "string literals are not evaluable",
                    Some(*loc),
                )),
            },
            // No value conversion happens at this layer.
            Expr::TypeCast { a, .. } => self.eval(a),
            Expr::Sizeof { query, .. } => Ok(ConstVal::Int(self.size_of(*query)? as i64)),
            other => Err(CompileError::unsupported(
                "expression is not a compile-time constant",
                Some(other.loc()),
            )),
        }
    }

    fn eval_binop(
        &self,
        lhs: ConstVal,
        op: ArithOp,
        rhs: ConstVal,
        loc: smelt_ast::SourceLoc,
    ) -> Result<ConstVal, CompileError> {
        use ConstVal::{Float, Int};
        let overflow = CompileError::Overflow { loc: Some(loc) };

        match (lhs, rhs) {
            (Int(a), Int(b)) => {
                let v = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    // Integer division because the result type is integer.
                    ArithOp::Div => a.checked_div(b),
                    ArithOp::Shl => a.checked_shl(b as u32),
                    ArithOp::Shr => a.checked_shr(b as u32),
                    ArithOp::BitOr | ArithOp::BitAnd => {
                        return Err(CompileError::unsupported(
                            "bitwise operator is not constant-foldable",
                            Some(loc),
                        ))
                    }
                };
                v.map(Int).ok_or(overflow)
            }
            (a, b) => {
                let fa = match a {
                    Int(v) => v as f64,
                    Float(v) => v,
                    ConstVal::Ptr(_) => {
                        return Err(CompileError::unsupported(
                            "cannot fold symbol arithmetic",
                            Some(loc),
                        ))
                    }
                };
                let fb = match b {
                    Int(v) => v as f64,
                    Float(v) => v,
                    ConstVal::Ptr(_) => {
                        return Err(CompileError::unsupported(
                            "cannot fold symbol arithmetic",
                            Some(loc),
                        ))
                    }
                };
                let v = match op {
                    ArithOp::Add => fa + fb,
                    ArithOp::Sub => fa - fb,
                    ArithOp::Mul => fa * fb,
                    ArithOp::Div => fa / fb,
                    _ => {
                        return Err(CompileError::unsupported(
                            "shift on non-integers",
                            Some(loc),
                        ))
                    }
                };
                Ok(Float(v))
            }
        }
    }
}
