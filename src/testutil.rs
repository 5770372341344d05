//! Shared generators for in-crate property tests.
//!
//! The generator covers the registry-free fragment of the algebra so the
//! laws it feeds hold for any registry contents.

use quickcheck::{Arbitrary, Gen};

use crate::types::{ShapeProp, Type};

#[derive(Debug, Clone)]
pub(crate) struct TyGen(pub(crate) Type);

impl Arbitrary for TyGen {
    fn arbitrary(g: &mut Gen) -> Self {
        TyGen(arbitrary_ty(g, 3))
    }
}

fn leaf(g: &mut Gen) -> Type {
    g.choose(&[
        Type::Any,
        Type::None,
        Type::Dynamic,
        Type::Atom,
        Type::atom_lit("a"),
        Type::atom_lit("b"),
        Type::Number,
        Type::Float,
        Type::Pid,
        Type::Binary,
        Type::Nil,
        Type::AnyTuple,
        Type::AnyFun,
    ])
    .unwrap()
    .clone()
}

pub(crate) fn arbitrary_ty(g: &mut Gen, depth: usize) -> Type {
    if depth == 0 {
        return leaf(g);
    }
    match *g.choose(&[0u8, 0, 0, 1, 2, 3, 4, 5, 6]).unwrap() {
        1 => {
            let n = *g.choose(&[1usize, 2, 3]).unwrap();
            Type::Tuple((0..n).map(|_| arbitrary_ty(g, depth - 1)).collect())
        }
        2 => Type::list(arbitrary_ty(g, depth - 1)),
        3 => {
            let n = *g.choose(&[2usize, 3]).unwrap();
            Type::union((0..n).map(|_| arbitrary_ty(g, depth - 1)))
        }
        4 => {
            let n = *g.choose(&[0usize, 1, 2]).unwrap();
            Type::fun(
                (0..n).map(|_| arbitrary_ty(g, depth - 1)).collect(),
                arbitrary_ty(g, depth - 1),
            )
        }
        5 => Type::dict_map(arbitrary_ty(g, depth - 1), arbitrary_ty(g, depth - 1)),
        6 => Type::ShapeMap(
            ["k1", "k2"]
                .iter()
                .take(*g.choose(&[1usize, 2]).unwrap())
                .map(|key| ShapeProp {
                    key: key.to_string(),
                    ty: arbitrary_ty(g, depth - 1),
                    required: bool::arbitrary(g),
                })
                .collect(),
        ),
        _ => leaf(g),
    }
}

/// Whether `Dynamic` occurs anywhere in the type, not just at the top.
pub(crate) fn contains_dynamic_deep(ty: &Type) -> bool {
    match ty {
        Type::Dynamic => true,
        Type::Tuple(ts) | Type::Union(ts) => ts.iter().any(contains_dynamic_deep),
        Type::List(t) => contains_dynamic_deep(t),
        Type::Fun(f) => f.args.iter().any(contains_dynamic_deep) || contains_dynamic_deep(&f.res),
        Type::DictMap { key, value } => {
            contains_dynamic_deep(key) || contains_dynamic_deep(value)
        }
        Type::ShapeMap(props) => props.iter().any(|p| contains_dynamic_deep(&p.ty)),
        _ => false,
    }
}
