//! Property tests for the layout service and memory images.

use indexmap::IndexMap;
use proptest::prelude::*;

use smelt_ast::{Field, Initializer, ModuleId, Program, RecordDef, RecordKind, Type, TypeId};
use smelt_layout::{LayoutService, TargetInfo};

/// The pool of field types the generators draw from.
fn field_type(code: u8) -> TypeId {
    match code % 4 {
        0 => TypeId::CHAR,
        1 => TypeId::SHORT,
        2 => TypeId::INT,
        _ => TypeId::LONGLONG,
    }
}

fn make_struct(program: &mut Program, codes: &[u8]) -> TypeId {
    let mut fields = IndexMap::new();
    for (i, &code) in codes.iter().enumerate() {
        fields.insert(
            format!("f{i}"),
            Field {
                typ: field_type(code),
                bit_width: None,
            },
        );
    }
    program.types.register(Type::Record(RecordDef {
        kind: RecordKind::Struct,
        name: Some("S".into()),
        fields,
        complete: true,
    }))
}

fn setup() -> (TargetInfo, Program, ModuleId) {
    let target = TargetInfo::little32();
    let mut program = Program::new();
    let module = program.add_module("main");
    (target, program, module)
}

proptest! {
    /// Every field fits inside the struct, and the struct's alignment is
    /// the maximum field alignment.
    #[test]
    fn struct_layout_round_trip(codes in prop::collection::vec(any::<u8>(), 1..10)) {
        let (target, mut program, module) = setup();
        let s = make_struct(&mut program, &codes);
        let svc = LayoutService::new(&target, &program, module);

        let total = svc.size_of(s).unwrap();
        let mut max_align = 1;
        for (i, &code) in codes.iter().enumerate() {
            let name = format!("f{i}");
            let typ = field_type(code);
            let offset = svc.offset_of(s, &name).unwrap();
            let size = svc.size_of(typ).unwrap();
            prop_assert!(offset + size <= total);
            // Fields are aligned to their own alignment.
            prop_assert_eq!(offset % svc.alignment_of(typ).unwrap(), 0);
            max_align = max_align.max(svc.alignment_of(typ).unwrap());
        }
        prop_assert_eq!(svc.alignment_of(s).unwrap(), max_align);
    }

    /// Fields are laid out in declaration order without overlap; the sum
    /// of field sizes plus padding equals the struct size.
    #[test]
    fn struct_fields_do_not_overlap(codes in prop::collection::vec(any::<u8>(), 1..10)) {
        let (target, mut program, module) = setup();
        let s = make_struct(&mut program, &codes);
        let svc = LayoutService::new(&target, &program, module);

        let mut end = 0;
        for (i, &code) in codes.iter().enumerate() {
            let name = format!("f{i}");
            let offset = svc.offset_of(s, &name).unwrap();
            prop_assert!(offset >= end, "field {} overlaps its predecessor", name);
            end = offset + svc.size_of(field_type(code)).unwrap();
        }
        prop_assert_eq!(svc.size_of(s).unwrap(), end);
    }

    /// A zero-providing struct initializer fills the type exactly.
    #[test]
    fn empty_struct_image_len_matches_size(codes in prop::collection::vec(any::<u8>(), 1..10)) {
        let (target, mut program, module) = setup();
        let s = make_struct(&mut program, &codes);
        let svc = LayoutService::new(&target, &program, module);

        let image = svc.gen_global_ival(s, &Initializer::Struct(vec![])).unwrap();
        prop_assert_eq!(image.byte_len(&target), svc.size_of(s).unwrap());
        // All parts are bytes, so the flattened form exists too.
        prop_assert_eq!(image.to_bytes().unwrap().len() as u32, svc.size_of(s).unwrap());
    }

    /// Packing is byte-reversed between the two endiannesses.
    #[test]
    fn endianness_mirror(value in any::<i32>()) {
        let little = TargetInfo::little32();
        let big = TargetInfo::big32();

        let mut le = little.pack_int(value as i64, 4);
        let be = big.pack_int(value as i64, 4);
        le.reverse();
        prop_assert_eq!(le, be);
    }

    /// Array images cover the full array regardless of how many
    /// initializers were given.
    #[test]
    fn array_image_len_matches_size(len in 1u32..8, given in 0usize..8) {
        let (target, mut program, module) = setup();
        let arr = program.types.register(Type::Array {
            element: TypeId::INT,
            length: Some(Box::new(smelt_ast::Expr::Literal {
                value: smelt_ast::Literal::Int(len as i64),
                loc: smelt_ast::SourceLoc::new(1, 1),
            })),
        });
        let svc = LayoutService::new(&target, &program, module);

        let given = given.min(len as usize);
        let values: Vec<Option<Initializer>> = (0..given)
            .map(|i| {
                Some(Initializer::Expr(smelt_ast::Expr::Literal {
                    value: smelt_ast::Literal::Int(i as i64),
                    loc: smelt_ast::SourceLoc::new(1, 1),
                }))
            })
            .collect();
        let image = svc.gen_global_ival(arr, &Initializer::Array(values)).unwrap();
        prop_assert_eq!(image.byte_len(&target), svc.size_of(arr).unwrap());
    }
}

/// The documented example: 0x01020304 packs to 04 03 02 01 on
/// little-endian and 01 02 03 04 on big-endian.
#[test]
fn scalar_images_follow_target_order() {
    let (_, program, module) = setup();
    let init = Initializer::Expr(smelt_ast::Expr::Literal {
        value: smelt_ast::Literal::Int(0x01020304),
        loc: smelt_ast::SourceLoc::new(1, 1),
    });

    let little = TargetInfo::little32();
    let svc = LayoutService::new(&little, &program, module);
    let image = svc.gen_global_ival(TypeId::INT, &init).unwrap();
    assert_eq!(image.to_bytes().unwrap(), vec![0x04, 0x03, 0x02, 0x01]);

    let big = TargetInfo::big32();
    let svc = LayoutService::new(&big, &program, module);
    let image = svc.gen_global_ival(TypeId::INT, &init).unwrap();
    assert_eq!(image.to_bytes().unwrap(), vec![0x01, 0x02, 0x03, 0x04]);
}
