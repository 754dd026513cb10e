//! Elementwise arithmetic, comparisons, and the other broadcasting operators.
use super::{
    broadcast_args, broadcast_dims, dimensioned_input, gather_tensor_types, promoted_arith_type,
    scalar_type_of, TensorArgs,
};
use crate::common::Result;
use crate::dtype::ScalarType;
use crate::graph::{Kind, NodeId};
use crate::ivalue::IValue;
use crate::registry::{Ctx, Refinement, Registry};
use crate::schema::{self, Schema};
use crate::types::{static_dims, Type};

use std::sync::Arc;

lazy_static::lazy_static! {
    static ref EXPAND: Arc<Schema> = {
        let text = "aten::expand(Tensor(a) self, int[] size, *, bool implicit=False) -> Tensor(a)";
        match schema::parse(text) {
            Ok(s) => Arc::new(s),
            Err(e) => panic!("invalid expand schema: {}", e),
        }
    };
}

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "broadcasting_arithmetic",
        &[
            "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
            "aten::sub.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
            "aten::rsub.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
            "aten::mul.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::div.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::div.Tensor_mode(Tensor self, Tensor other, *, str? rounding_mode) -> Tensor",
            "aten::floor_divide(Tensor self, Tensor other) -> Tensor",
        ],
        broadcasting_arithmetic,
    );
    reg.register(
        "broadcasting",
        &[
            "aten::pow.Tensor_Tensor(Tensor self, Tensor exponent) -> Tensor",
            "aten::fmod.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::remainder.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::lerp.Scalar(Tensor self, Tensor end, Scalar weight) -> Tensor",
            "aten::lerp.Tensor(Tensor self, Tensor end, Tensor weight) -> Tensor",
            "aten::max.other(Tensor self, Tensor other) -> Tensor",
            "aten::min.other(Tensor self, Tensor other) -> Tensor",
            "aten::__and__.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::__or__.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::__xor__.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::__lshift__.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::__rshift__.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::__iand__.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::__ior__.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::__ixor__.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::__ilshift__.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::__irshift__.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::atan2(Tensor self, Tensor other) -> Tensor",
        ],
        broadcasting,
    );
    reg.register(
        "fused_accumulate",
        &[
            "aten::addcdiv(Tensor self, Tensor tensor1, Tensor tensor2, *, Scalar value=1) -> Tensor",
            "aten::addcmul(Tensor self, Tensor tensor1, Tensor tensor2, *, Scalar value=1) -> Tensor",
        ],
        fused_accumulate,
    );
    reg.register(
        "broadcasting_tensor_scalar_arithmetic",
        &[
            "aten::add.Scalar(Tensor self, Scalar other, Scalar alpha=1) -> Tensor",
            "aten::sub.Scalar(Tensor self, Scalar other, Scalar alpha=1) -> Tensor",
            "aten::rsub.Scalar(Tensor self, Scalar other, Scalar alpha=1) -> Tensor",
            "aten::mul.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::div.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::floor_divide.Scalar(Tensor self, Scalar other) -> Tensor",
        ],
        broadcasting_tensor_scalar_arithmetic,
    );
    reg.register(
        "broadcasting_tensor_scalar",
        &[
            "aten::pow.Tensor_Scalar(Tensor self, Scalar exponent) -> Tensor",
            "aten::fmod.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::remainder.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::pow.Scalar(Scalar self, Tensor exponent) -> Tensor",
            "aten::__and__.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::__or__.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::__xor__.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::__lshift__.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::__rshift__.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::__iand__.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::__ior__.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::__ixor__.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::__ilshift__.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::__irshift__.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
        ],
        broadcasting_tensor_scalar,
    );
    reg.register(
        "where",
        &["aten::where.self(Tensor condition, Tensor self, Tensor other) -> Tensor"],
        where_self,
    );
    reg.register(
        "strict_match",
        &[
            "aten::normal.Tensor_Tensor(Tensor mean, Tensor std, *, Generator? generator=None) -> Tensor",
            "aten::mm(Tensor self, Tensor mat2) -> Tensor",
            "aten::bmm(Tensor self, Tensor mat2) -> Tensor",
        ],
        strict_match,
    );
    reg.register(
        "comparison",
        &[
            "aten::lt.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::le.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::gt.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::ge.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::eq.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::ne.Tensor(Tensor self, Tensor other) -> Tensor",
            "aten::lt.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::le.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::gt.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::ge.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::eq.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::ne.Scalar(Tensor self, Scalar other) -> Tensor",
        ],
        comparison,
    );
}

fn is_division(ctx: &Ctx, n: NodeId) -> bool {
    matches!(ctx.graph.node(n).name(), "aten::div" | "aten::div_")
}

/// Materialize the broadcast of two operands with fully known sizes as explicit `aten::expand`
/// nodes placed before `n`, rewiring `n` to consume them.
fn insert_expands(ctx: &mut Ctx, n: NodeId, args: &mut TensorArgs) -> Result<()> {
    if !(ctx.config.expand_broadcasts && ctx.insert_expands) || args.len() != 2 {
        return Ok(());
    }
    let sizes: Option<Vec<Vec<u64>>> = args
        .iter()
        .map(|(_, t)| if t.is_complete() { t.concrete_sizes() } else { None })
        .collect();
    let sizes = match sizes {
        Some(s) => s,
        None => return Ok(()),
    };
    let (d0, d1) = (static_dims(&sizes[0][..]), static_dims(&sizes[1][..]));
    let expected: Vec<u64> = broadcast_dims(&[&d0[..], &d1[..]])?
        .iter()
        .filter_map(|d| d.static_size())
        .collect();
    for (ix, (input, t)) in args.iter_mut().enumerate() {
        if sizes[ix] == expected {
            continue;
        }
        let size_list = IValue::IntList(expected.iter().map(|s| *s as i64).collect());
        let size = ctx.graph.insert_constant_before(n, size_list);
        let implicit = ctx.graph.insert_constant_before(n, IValue::Bool(false));
        let src = ctx.graph.node(n).inputs[*input];
        let expanded = t.with_sizes(&expected[..]);
        let e = ctx.graph.insert_before(
            n,
            Kind::Op(EXPAND.clone()),
            &[src, size, implicit],
            vec![Type::Tensor(expanded.clone())],
        );
        let out = ctx.graph.node(e).outputs[0];
        ctx.graph.replace_input(n, *input, out);
        log::debug!(
            "inserted expand of %{} to {:?} before {}",
            src.index(),
            expected,
            ctx.graph.node(n).name()
        );
        *t = expanded;
    }
    Ok(())
}

fn broadcasting_arithmetic(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let mut args = match gather_tensor_types(ctx, n, false) {
        Some(args) => args,
        None => return Ok(Refinement::Declined),
    };
    assert!(args.len() >= 2, "binary arithmetic with {} tensors", args.len());
    let mut st = promoted_arith_type(ctx, n);
    if is_division(ctx, n) && st.map(|s| s.is_integral(false)).unwrap_or(false) {
        st = Some(ctx.config.default_dtype);
    }
    insert_expands(ctx, n, &mut args)?;
    Ok(Refinement::one(broadcast_args(&args, st)?))
}

fn broadcasting(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let args = match gather_tensor_types(ctx, n, false) {
        Some(args) => args,
        None => return Ok(Refinement::Declined),
    };
    assert!(args.len() >= 2, "binary operator with {} tensors", args.len());
    let (first, second) = match (args[0].1.scalar_type(), args[1].1.scalar_type()) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(Refinement::Declined),
    };
    let st = if first.promote(second) != first {
        second
    } else {
        first
    };
    Ok(Refinement::one(broadcast_args(&args, Some(st))?))
}

fn fused_accumulate(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let args = match gather_tensor_types(ctx, n, false) {
        Some(args) => args,
        None => return Ok(Refinement::Declined),
    };
    match args[0].1.scalar_type() {
        Some(st) => Ok(Refinement::one(broadcast_args(&args, Some(st))?)),
        None => Ok(Refinement::Declined),
    }
}

fn broadcasting_tensor_scalar_arithmetic(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let args = match gather_tensor_types(ctx, n, false) {
        Some(args) => args,
        None => return Ok(Refinement::Declined),
    };
    let scalar = match ctx.input_type(n, 1) {
        Some(ty) => scalar_type_of(ctx, ty),
        None => None,
    };
    let (first, second) = match (args[0].1.scalar_type(), scalar) {
        (Some(a), Some(b)) => (a, b),
        _ => return Ok(Refinement::Declined),
    };
    let int_tensor = first.is_integral(false);
    let st = if (int_tensor && second.is_floating())
        || (int_tensor && second.is_integral(false) && is_division(ctx, n))
    {
        ctx.config.default_dtype
    } else if first == ScalarType::Bool && second != ScalarType::Bool {
        first.promote(second)
    } else {
        first
    };
    Ok(Refinement::one(broadcast_args(&args, Some(st))?))
}

fn broadcasting_tensor_scalar(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    match gather_tensor_types(ctx, n, false) {
        Some(args) => {
            let st = args[0].1.scalar_type();
            Ok(Refinement::one(broadcast_args(&args, st)?))
        }
        None => Ok(Refinement::Declined),
    }
}

// The result takes its element type from `self`, not from the condition.
fn where_self(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    match gather_tensor_types(ctx, n, false) {
        Some(args) => {
            let st = args[1].1.scalar_type();
            Ok(Refinement::one(broadcast_args(&args, st)?))
        }
        None => Ok(Refinement::Declined),
    }
}

fn strict_match(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0).into())
}

fn comparison(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    match gather_tensor_types(ctx, n, false) {
        Some(args) => Ok(Refinement::one(broadcast_args(&args, Some(ScalarType::Bool))?)),
        None => Ok(Refinement::Declined),
    }
}
