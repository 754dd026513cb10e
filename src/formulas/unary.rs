//! Operators whose result is a function of their first tensor argument alone.
use super::dimensioned_input;
use crate::common::Result;
use crate::dtype::ScalarType;
use crate::graph::NodeId;
use crate::registry::{Ctx, Refinement, Registry};

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "first_input_type",
        &[
            "aten::alias(Tensor self) -> Tensor",
            "aten::erf(Tensor self) -> Tensor",
            "aten::erf_(Tensor self) -> Tensor",
            "aten::masked_fill.Scalar(Tensor self, Tensor mask, Scalar value) -> Tensor",
            "aten::masked_fill.Tensor(Tensor self, Tensor mask, Tensor value) -> Tensor",
            "aten::masked_fill_.Scalar(Tensor(a!) self, Tensor mask, Scalar value) -> Tensor(a!)",
            "aten::masked_fill_.Tensor(Tensor(a!) self, Tensor mask, Tensor value) -> Tensor(a!)",
            "aten::index_put.hacked_twin(Tensor self, Tensor[] indices, Tensor values, bool accumulate=False) -> Tensor",
            "aten::scatter.value(Tensor self, int dim, Tensor index, Scalar value) -> Tensor",
            "aten::select_scatter(Tensor self, Tensor src, int dim, int index) -> Tensor",
            "aten::slice_scatter(Tensor self, Tensor src, int dim=0, SymInt? start=None, SymInt? end=None, SymInt step=1) -> Tensor",
            "aten::floor_divide.Scalar(Tensor self, Scalar other) -> Tensor",
            "aten::floor_divide_.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::relu(Tensor self) -> Tensor",
            "aten::relu_(Tensor self) -> Tensor",
            "aten::pow.Tensor_Scalar(Tensor self, Scalar exponent) -> Tensor",
            "aten::gelu(Tensor self, *, str approximate='none') -> Tensor",
            "aten::relu6(Tensor self) -> Tensor",
            "aten::relu6_(Tensor self) -> Tensor",
            "aten::acos(Tensor self) -> Tensor",
            "aten::bitwise_not(Tensor self) -> Tensor",
            "aten::neg(Tensor self) -> Tensor",
            "aten::sigmoid(Tensor self) -> Tensor",
            "aten::logit(Tensor self, float? eps=None) -> Tensor",
            "aten::tanh(Tensor self) -> Tensor",
            "aten::asin(Tensor self) -> Tensor",
            "aten::atan(Tensor self) -> Tensor",
            "aten::ceil(Tensor self) -> Tensor",
            "aten::clone(Tensor self, *, MemoryFormat? memory_format=None) -> Tensor",
            "aten::contiguous(Tensor(a) self, *, MemoryFormat memory_format=contiguous_format) -> Tensor(a)",
            "aten::bernoulli(Tensor self, *, Generator? generator=None) -> Tensor",
            "aten::celu(Tensor self, Scalar alpha=1.0) -> Tensor",
            "aten::clamp(Tensor self, Scalar? min=None, Scalar? max=None) -> Tensor",
            "aten::clamp_max(Tensor self, Scalar max) -> Tensor",
            "aten::clamp_min(Tensor self, Scalar min) -> Tensor",
            "aten::alpha_dropout(Tensor input, float p, bool train) -> Tensor",
            "aten::bernoulli.p(Tensor self, float p, *, Generator? generator=None) -> Tensor",
            "aten::cos(Tensor self) -> Tensor",
            "aten::cosh(Tensor self) -> Tensor",
            "aten::digamma(Tensor self) -> Tensor",
            "aten::dropout(Tensor input, float p, bool train) -> Tensor",
            "aten::elu(Tensor self, Scalar alpha=1, Scalar scale=1, Scalar input_scale=1) -> Tensor",
            "aten::erfc(Tensor self) -> Tensor",
            "aten::erfinv(Tensor self) -> Tensor",
            "aten::exp(Tensor self) -> Tensor",
            "aten::expm1(Tensor self) -> Tensor",
            "aten::log(Tensor self) -> Tensor",
            "aten::log10(Tensor self) -> Tensor",
            "aten::log1p(Tensor self) -> Tensor",
            "aten::log2(Tensor self) -> Tensor",
            "aten::log_sigmoid(Tensor self) -> Tensor",
            "aten::floor(Tensor self) -> Tensor",
            "aten::frac(Tensor self) -> Tensor",
            "aten::flip(Tensor self, int[] dims) -> Tensor",
            "aten::feature_alpha_dropout(Tensor input, float p, bool train) -> Tensor",
            "aten::feature_dropout(Tensor input, float p, bool train) -> Tensor",
            "aten::hardshrink(Tensor self, Scalar lambd=0.5) -> Tensor",
            "aten::hardtanh(Tensor self, Scalar min_val=-1, Scalar max_val=1) -> Tensor",
            "aten::glu(Tensor self, int dim=-1) -> Tensor",
            "aten::inverse(Tensor self) -> Tensor",
            "aten::group_norm(Tensor input, int num_groups, Tensor? weight=None, Tensor? bias=None, float eps=1e-05, bool cudnn_enabled=True) -> Tensor",
            "aten::leaky_relu(Tensor self, Scalar negative_slope=0.01) -> Tensor",
            "aten::leaky_relu_(Tensor(a!) self, Scalar negative_slope=0.01) -> Tensor(a!)",
            "aten::lgamma(Tensor self) -> Tensor",
            "aten::mvlgamma(Tensor self, int p) -> Tensor",
            "aten::normal.float_Tensor(float mean, Tensor std, *, Generator? generator=None) -> Tensor",
            "aten::normal.Tensor_float(Tensor mean, float std=1, *, Generator? generator=None) -> Tensor",
            "aten::pin_memory(Tensor(a) self, Device? device=None) -> Tensor(a)",
            "aten::gelu_backward(Tensor grad_output, Tensor self, *, str approximate='none') -> Tensor",
            "aten::native_dropout_backward(Tensor grad_output, Tensor mask, float scale) -> Tensor",
            "aten::pinverse(Tensor self, float rcond=1e-15) -> Tensor",
            "aten::reciprocal(Tensor self) -> Tensor",
            "aten::round(Tensor self) -> Tensor",
            "aten::rrelu(Tensor self, Scalar lower=0.125, Scalar upper=0.3333333333333333, bool training=False, Generator? generator=None) -> Tensor",
            "aten::rsqrt(Tensor self) -> Tensor",
            "aten::selu(Tensor self) -> Tensor",
            "aten::sign(Tensor self) -> Tensor",
            "aten::sin(Tensor self) -> Tensor",
            "aten::sinh(Tensor self) -> Tensor",
            "aten::softplus(Tensor self, Scalar beta=1, Scalar threshold=20) -> Tensor",
            "aten::softshrink(Tensor self, Scalar lambd=0.5) -> Tensor",
            "aten::sqrt(Tensor self) -> Tensor",
            "aten::tan(Tensor self) -> Tensor",
            "aten::threshold(Tensor self, Scalar threshold, Scalar value) -> Tensor",
            "aten::tril(Tensor self, int diagonal=0) -> Tensor",
            "aten::triu(Tensor self, int diagonal=0) -> Tensor",
            "aten::trunc(Tensor self) -> Tensor",
            "aten::rot90(Tensor self, int k=1, int[] dims=[0,1]) -> Tensor",
            "aten::narrow(Tensor(a) self, int dim, int start, int length) -> Tensor(a)",
            "aten::zero_(Tensor(a!) self) -> Tensor(a!)",
            "aten::tanh_backward(Tensor grad_output, Tensor output) -> Tensor",
        ],
        first_input_type,
    );
    reg.register(
        "dimension_preserving",
        &[
            "aten::t(Tensor(a) self) -> Tensor(a)",
            "aten::permute(Tensor(a) self, int[] dims) -> Tensor(a)",
            "aten::transpose.int(Tensor(a) self, int dim0, int dim1) -> Tensor(a)",
        ],
        dimension_preserving,
    );
    reg.register(
        "complex_to_real",
        &["aten::abs(Tensor self) -> Tensor"],
        complex_to_real,
    );
    reg.register(
        "inplace_arithmetic",
        &[
            "aten::add_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)",
            "aten::add_.Scalar(Tensor(a!) self, Scalar other, Scalar alpha=1) -> Tensor(a!)",
            "aten::sub_.Tensor(Tensor(a!) self, Tensor other, *, Scalar alpha=1) -> Tensor(a!)",
            "aten::sub_.Scalar(Tensor(a!) self, Scalar other, Scalar alpha=1) -> Tensor(a!)",
            "aten::mul_.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::mul_.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::div_.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::div_.Scalar(Tensor(a!) self, Scalar other) -> Tensor(a!)",
            "aten::div_.Tensor_mode(Tensor(a!) self, Tensor other, *, str? rounding_mode) -> Tensor(a!)",
            "aten::floor_divide_.Tensor(Tensor(a!) self, Tensor other) -> Tensor(a!)",
            "aten::add_inplace(Tensor self, Tensor other, *, Scalar alpha) -> Tensor",
            "aten::sub_inplace(Tensor self, Tensor other, *, Scalar alpha) -> Tensor",
            "aten::mul_inplace(Tensor self, Tensor other) -> Tensor",
            "aten::div_inplace(Tensor self, Tensor other) -> Tensor",
        ],
        first_input_type,
    );
    reg.register(
        "detach",
        &["aten::detach(Tensor(a) self) -> Tensor(a)"],
        detach,
    );
}

pub(super) fn register_conversions(reg: &mut Registry) {
    reg.register(
        "to_dtype",
        &[
            "aten::to.dtype(Tensor(a) self, ScalarType dtype, bool non_blocking=False, bool copy=False, MemoryFormat? memory_format=None) -> Tensor(a)",
            "aten::to.dtype_layout(Tensor(a) self, *, ScalarType? dtype=None, Layout? layout=None, Device? device=None, bool? pin_memory=None, bool non_blocking=False, bool copy=False, MemoryFormat? memory_format=None) -> Tensor(a)",
        ],
        to_dtype,
    );
    reg.register(
        "to_device",
        &["aten::to.device(Tensor(a) self, Device device, ScalarType dtype, bool non_blocking=False, bool copy=False, MemoryFormat? memory_format=None) -> Tensor(a)"],
        to_device,
    );
    reg.register(
        "cast",
        &[
            "aten::_cast_Byte(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Char(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Double(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Float(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Half(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Int(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Long(Tensor self, bool non_blocking=False) -> Tensor",
            "aten::_cast_Short(Tensor self, bool non_blocking=False) -> Tensor",
        ],
        cast,
    );
    reg.register(
        "autocast",
        &[
            "aten::_autocast_to_reduced_precision(Tensor(a) self, bool cuda_enabled, bool cpu_enabled, ScalarType cuda_dtype, ScalarType cpu_dtype) -> Tensor(a)",
            "aten::_autocast_to_full_precision(Tensor(a) self, bool cuda_enabled, bool cpu_enabled) -> Tensor(a)",
        ],
        autocast,
    );
}

pub(super) fn first_input_type(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx.input_tensor(n, 0).into())
}

fn dimension_preserving(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0).into())
}

fn complex_to_real(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match dimensioned_input(ctx, n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    Ok(match t.scalar_type() {
        Some(st) if st.is_complex() => Refinement::one(t.with_scalar_type(Some(st.to_real()))),
        _ => Refinement::one(t),
    })
}

fn detach(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0)
        .map(|t| t.with_requires_grad(Some(false)))
        .into())
}

fn to_dtype(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    Ok(match ctx.get_dtype(n, "dtype") {
        Some(Some(st)) => Refinement::one(t.with_scalar_type(Some(st))),
        _ => Refinement::one(t),
    })
}

fn to_device(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    Ok(match ctx.get_device(n, "device") {
        Some(Some(d)) => Refinement::one(t.with_device(Some(d))),
        _ => Refinement::one(t),
    })
}

fn cast(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let st = match ctx.graph.node(n).name() {
        "aten::_cast_Byte" => ScalarType::Byte,
        "aten::_cast_Char" => ScalarType::Char,
        "aten::_cast_Double" => ScalarType::Double,
        "aten::_cast_Float" => ScalarType::Float,
        "aten::_cast_Half" => ScalarType::Half,
        "aten::_cast_Int" => ScalarType::Int,
        "aten::_cast_Long" => ScalarType::Long,
        "aten::_cast_Short" => ScalarType::Short,
        other => return err!("unknown cast operator {}", other),
    };
    Ok(ctx
        .named_tensor(n, "self")
        .map(|t| t.with_scalar_type(Some(st)))
        .into())
}

fn autocast(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let st = t.scalar_type();
    if ctx.graph.named_input(n, "cuda_dtype").is_some() {
        if st != Some(ScalarType::Float) {
            return Ok(Refinement::one(t));
        }
        let which = match ctx.get_bool(n, "cuda_enabled") {
            Some(true) => "cuda_dtype",
            Some(false) => "cpu_dtype",
            None => return Ok(Refinement::Declined),
        };
        return Ok(match ctx.get_dtype(n, which) {
            Some(Some(target)) => Refinement::one(t.with_scalar_type(Some(target))),
            _ => Refinement::Declined,
        });
    }
    match st {
        Some(ScalarType::Half) | Some(ScalarType::BFloat16) => {
            Ok(Refinement::one(t.with_scalar_type(Some(ScalarType::Float))))
        }
        _ => Ok(Refinement::one(t)),
    }
}

#[cfg(test)]
mod tests {
    use crate::dtype::{Device, ScalarType};
    use crate::graph::Graph;
    use crate::ivalue::IValue;
    use crate::fallback::NoExecutor;
    use crate::propagate::propagate_shapes;
    use crate::types::{TensorType, Type};

    fn float_input(g: &mut Graph, sizes: &[u64]) -> crate::graph::ValueId {
        g.add_input(Type::Tensor(TensorType::complete(
            ScalarType::Float,
            Device::CPU,
            sizes,
        )))
    }

    #[test]
    fn unary_keeps_sizes() {
        let mut g = Graph::new();
        let top = g.top();
        let x = float_input(&mut g, &[2, 3]);
        let n = g.append_op(top, "aten::relu(Tensor self) -> Tensor", &[x]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(g.ty(g.node(n).outputs[0]), g.ty(x));
    }

    #[test]
    fn transpose_forgets_sizes() {
        let mut g = Graph::new();
        let top = g.top();
        let x = float_input(&mut g, &[2, 3]);
        let n = g.append_op(top, "aten::t(Tensor(a) self) -> Tensor(a)", &[x]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let out = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(out.rank(), Some(2));
        assert_eq!(out.dims(), None);
        assert_eq!(out.scalar_type(), Some(ScalarType::Float));
    }

    #[test]
    fn abs_of_complex_is_real() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(Type::Tensor(TensorType::complete(
            ScalarType::ComplexDouble,
            Device::CPU,
            &[4],
        )));
        let n = g.append_op(top, "aten::abs(Tensor self) -> Tensor", &[x]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let out = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(out.scalar_type(), Some(ScalarType::Double));
        assert_eq!(out.rank(), Some(1));
    }

    #[test]
    fn to_and_cast_set_dtype() {
        let mut g = Graph::new();
        let top = g.top();
        let x = float_input(&mut g, &[3]);
        let dtype = g.constant(top, IValue::Int(ScalarType::Half as i64));
        let f = g.constant(top, IValue::Bool(false));
        let none = g.constant(top, IValue::None);
        let to = g
            .append_op(
                top,
                "aten::to.dtype(Tensor(a) self, ScalarType dtype, bool non_blocking=False, \
                 bool copy=False, MemoryFormat? memory_format=None) -> Tensor(a)",
                &[x, dtype, f, f, none],
            )
            .unwrap();
        let cast = g
            .append_op(
                top,
                "aten::_cast_Long(Tensor self, bool non_blocking=False) -> Tensor",
                &[x, f],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let to_ty = g.ty(g.node(to).outputs[0]).as_tensor().unwrap();
        assert_eq!(to_ty.scalar_type(), Some(ScalarType::Half));
        assert_eq!(to_ty.concrete_sizes(), Some(vec![3]));
        let cast_ty = g.ty(g.node(cast).outputs[0]).as_tensor().unwrap();
        assert_eq!(cast_ty.scalar_type(), Some(ScalarType::Long));
    }

    #[test]
    fn detach_clears_grad() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(Type::Tensor(
            TensorType::complete(ScalarType::Float, Device::CPU, &[3])
                .with_requires_grad(Some(true)),
        ));
        let n = g
            .append_op(top, "aten::detach(Tensor(a) self) -> Tensor(a)", &[x])
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let out = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(out.requires_grad(), Some(false));
        assert_eq!(out.rank(), Some(1));
    }
}
