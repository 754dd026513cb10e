//! Neural-network layers: convolutions, pooling, normalization, losses and dropout.
use super::dimensioned_input;
use crate::common::Result;
use crate::dtype::ScalarType;
use crate::graph::NodeId;
use crate::ivalue::IValue;
use crate::registry::{Ctx, Refinement, Registry};
use crate::types::{Dim, Type};

use smallvec::SmallVec;

/// Layers whose output has the rank, element type and device of their input.
pub(super) fn register_first_input(reg: &mut Registry) {
    reg.register(
        "nn_first_input",
        &[
            "aten::batch_norm(Tensor input, Tensor? weight, Tensor? bias, Tensor? running_mean, Tensor? running_var, bool training, float momentum, float eps, bool cudnn_enabled) -> Tensor",
            "aten::layer_norm(Tensor input, SymInt[] normalized_shape, Tensor? weight=None, Tensor? bias=None, float eps=1e-05, bool cudnn_enable=True) -> Tensor",
            "aten::instance_norm(Tensor input, Tensor? weight, Tensor? bias, Tensor? running_mean, Tensor? running_var, bool use_input_stats, float momentum, float eps, bool cudnn_enabled) -> Tensor",
            "aten::conv1d(Tensor input, Tensor weight, Tensor? bias=None, int[1] stride=1, int[1] padding=0, int[1] dilation=1, int groups=1) -> Tensor",
            "aten::conv2d(Tensor input, Tensor weight, Tensor? bias=None, int[2] stride=1, int[2] padding=0, int[2] dilation=1, int groups=1) -> Tensor",
            "aten::conv3d(Tensor input, Tensor weight, Tensor? bias=None, int[3] stride=1, int[3] padding=0, int[3] dilation=1, int groups=1) -> Tensor",
            "aten::conv_tbc(Tensor self, Tensor weight, Tensor bias, int pad=0) -> Tensor",
            "aten::conv_transpose1d(Tensor input, Tensor weight, Tensor? bias=None, int[1] stride=1, int[1] padding=0, int[1] output_padding=0, int groups=1, int[1] dilation=1) -> Tensor",
            "aten::conv_transpose2d.input(Tensor input, Tensor weight, Tensor? bias=None, int[2] stride=1, int[2] padding=0, int[2] output_padding=0, int groups=1, int[2] dilation=1) -> Tensor",
            "aten::conv_transpose3d.input(Tensor input, Tensor weight, Tensor? bias=None, int[3] stride=1, int[3] padding=0, int[3] output_padding=0, int groups=1, int[3] dilation=1) -> Tensor",
            "aten::convolution(Tensor input, Tensor weight, Tensor? bias, int[] stride, SymInt[] padding, int[] dilation, bool transposed, SymInt[] output_padding, int groups) -> Tensor",
            "aten::_convolution(Tensor input, Tensor weight, Tensor? bias, int[] stride, SymInt[] padding, int[] dilation, bool transposed, SymInt[] output_padding, int groups, bool benchmark, bool deterministic, bool cudnn_enabled, bool allow_tf32) -> Tensor",
            "aten::adaptive_avg_pool1d(Tensor self, int[1] output_size) -> Tensor",
            "aten::adaptive_avg_pool2d(Tensor self, SymInt[2] output_size) -> Tensor",
            "aten::adaptive_avg_pool3d(Tensor self, SymInt[3] output_size) -> Tensor",
            "aten::avg_pool1d(Tensor self, int[1] kernel_size, int[1] stride=[], int[1] padding=0, bool ceil_mode=False, bool count_include_pad=True) -> Tensor",
            "aten::avg_pool2d(Tensor self, int[2] kernel_size, int[2] stride=[], int[2] padding=0, bool ceil_mode=False, bool count_include_pad=True, int? divisor_override=None) -> Tensor",
            "aten::avg_pool3d(Tensor self, int[3] kernel_size, int[3] stride=[], int[3] padding=0, bool ceil_mode=False, bool count_include_pad=True, int? divisor_override=None) -> Tensor",
            "aten::max_pool1d(Tensor self, int[1] kernel_size, int[1] stride=[], int[1] padding=0, int[1] dilation=1, bool ceil_mode=False) -> Tensor",
            "aten::max_pool2d(Tensor self, int[2] kernel_size, int[2] stride=[], int[2] padding=0, int[2] dilation=1, bool ceil_mode=False) -> Tensor",
            "aten::max_pool3d(Tensor self, int[3] kernel_size, int[3] stride=[], int[3] padding=0, int[3] dilation=1, bool ceil_mode=False) -> Tensor",
            "aten::max_unpool2d(Tensor self, Tensor indices, SymInt[2] output_size) -> Tensor",
            "aten::max_unpool3d(Tensor self, Tensor indices, SymInt[3] output_size, int[3] stride, int[3] padding) -> Tensor",
            "aten::reflection_pad1d(Tensor self, SymInt[2] padding) -> Tensor",
            "aten::reflection_pad2d(Tensor self, SymInt[4] padding) -> Tensor",
            "aten::replication_pad1d(Tensor self, SymInt[2] padding) -> Tensor",
            "aten::replication_pad2d(Tensor self, SymInt[4] padding) -> Tensor",
            "aten::replication_pad3d(Tensor self, SymInt[6] padding) -> Tensor",
            "aten::upsample_bilinear2d(Tensor self, SymInt[2] output_size, bool align_corners, float? scales_h=None, float? scales_w=None) -> Tensor",
            "aten::upsample_linear1d(Tensor self, SymInt[1] output_size, bool align_corners, float? scales=None) -> Tensor",
            "aten::upsample_nearest1d(Tensor self, SymInt[1] output_size, float? scales=None) -> Tensor",
            "aten::upsample_nearest2d(Tensor self, SymInt[2] output_size, float? scales_h=None, float? scales_w=None) -> Tensor",
            "aten::upsample_nearest3d(Tensor self, SymInt[3] output_size, float? scales_d=None, float? scales_h=None, float? scales_w=None) -> Tensor",
            "aten::upsample_trilinear3d(Tensor self, SymInt[3] output_size, bool align_corners, float? scales_d=None, float? scales_h=None, float? scales_w=None) -> Tensor",
            "aten::prelu(Tensor self, Tensor weight) -> Tensor",
            "aten::hardswish(Tensor self) -> Tensor",
            "aten::hardswish_(Tensor(a!) self) -> Tensor(a!)",
        ],
        nn_first_input,
    );
}

pub(super) fn register(reg: &mut Registry) {
    reg.register(
        "nll_loss_backward",
        &["aten::nll_loss_backward(Tensor grad_output, Tensor self, Tensor target, Tensor? weight, int reduction, SymInt ignore_index, Tensor total_weight) -> Tensor"],
        nll_loss_backward,
    );
    reg.register(
        "batch_norm_stats",
        &["aten::batch_norm_stats(Tensor input, float eps) -> (Tensor, Tensor)"],
        batch_norm_stats,
    );
    reg.register(
        "native_layer_norm",
        &["aten::native_layer_norm(Tensor input, SymInt[] normalized_shape, Tensor? weight, Tensor? bias, float eps) -> (Tensor, Tensor, Tensor)"],
        native_layer_norm,
    );
    reg.register(
        "native_layer_norm_backward",
        &["aten::native_layer_norm_backward(Tensor grad_out, Tensor input, SymInt[] normalized_shape, Tensor mean, Tensor rstd, Tensor? weight, Tensor? bias, bool[3] output_mask) -> (Tensor, Tensor, Tensor)"],
        native_layer_norm_backward,
    );
    reg.register(
        "native_batch_norm",
        &["aten::native_batch_norm(Tensor input, Tensor? weight, Tensor? bias, Tensor? running_mean, Tensor? running_var, bool training, float momentum, float eps) -> (Tensor, Tensor, Tensor)"],
        native_batch_norm,
    );
    reg.register(
        "nll_loss_forward",
        &["aten::nll_loss_forward(Tensor self, Tensor target, Tensor? weight, int reduction, SymInt ignore_index) -> (Tensor output, Tensor total_weight)"],
        nll_loss_forward,
    );
    reg.register(
        "native_dropout",
        &["aten::native_dropout(Tensor input, float p, bool? train) -> (Tensor, Tensor)"],
        native_dropout,
    );
}

fn nn_first_input(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(dimensioned_input(ctx, n, 0).into())
}

fn nll_loss_backward(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(ctx.named_tensor(n, "self").into())
}

// Mean and inverse standard deviation per channel; half inputs accumulate in float.
fn batch_norm_stats(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match dimensioned_input(ctx, n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let t = if t.scalar_type() == Some(ScalarType::Half) {
        t.with_scalar_type(Some(ScalarType::Float))
    } else {
        t
    };
    let t = t.with_rank(Some(1));
    Ok(Refinement::tensors(vec![t.clone(), t]))
}

// The statistics keep the leading (batch) dimensions and are 1 over the normalized ones.
fn native_layer_norm(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let t = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let (rank, normalized) = match (t.rank(), ctx.get_int_list(n, "normalized_shape")) {
        (Some(r), Some(shape)) => (r, shape.len()),
        _ => return Ok(Refinement::Declined),
    };
    shape_assert!(
        normalized <= rank,
        "normalizing {} dimensions of a rank-{} tensor",
        normalized,
        rank
    );
    let axis = rank - normalized;
    let mut stat_dims: Vec<Dim> = (0..axis).map(|i| t.sym_dim(i)).collect();
    stat_dims.extend((axis..rank).map(|_| Dim::Static(1)));
    let stats = t.with_dims(stat_dims);
    Ok(Refinement::tensors(vec![
        t.dimensioned_only(),
        stats.clone(),
        stats,
    ]))
}

// Only the gradients requested by `output_mask` are refined.
fn native_layer_norm_backward(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let grad = match ctx.input_tensor(n, 0) {
        Some(t) => t,
        None => return Ok(Refinement::Declined),
    };
    let mask = match ctx.get_const(n, "output_mask") {
        Some(IValue::BoolList(m)) if m.len() == 3 => m,
        Some(IValue::List(l)) if l.len() == 3 => {
            match l.iter().map(IValue::to_bool).collect::<Option<Vec<_>>>() {
                Some(m) => m,
                None => return Ok(Refinement::Declined),
            }
        }
        _ => return Ok(Refinement::Declined),
    };
    let sources = [
        Some(grad),
        ctx.named_tensor(n, "weight"),
        ctx.named_tensor(n, "bias"),
    ];
    let mut res: SmallVec<[Type; 2]> = SmallVec::new();
    for (i, (wanted, src)) in mask.iter().zip(sources.iter()).enumerate() {
        res.push(match (wanted, src) {
            (true, Some(t)) => Type::Tensor(t.clone()),
            _ => ctx.output_type(n, i).clone(),
        });
    }
    Ok(Refinement::Refined(res))
}

fn native_batch_norm(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(match dimensioned_input(ctx, n, 0) {
        Some(t) => Refinement::tensors(vec![t.clone(), t.clone(), t]),
        None => Refinement::Declined,
    })
}

// Unreduced loss over a batch of class scores is per-sample; everything else is a scalar.
fn nll_loss_forward(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    let (t, reduction) = match (dimensioned_input(ctx, n, 0), ctx.get_int(n, "reduction")) {
        (Some(t), Some(r)) => (t, r),
        _ => return Ok(Refinement::Declined),
    };
    let output = if t.rank() == Some(2) && reduction == 0 {
        t.with_rank(Some(1))
    } else {
        t.with_rank(Some(0))
    };
    Ok(Refinement::tensors(vec![output, t.with_rank(Some(0))]))
}

fn native_dropout(ctx: &mut Ctx, n: NodeId) -> Result<Refinement> {
    Ok(match dimensioned_input(ctx, n, 0) {
        Some(t) => {
            let mask = t.with_scalar_type(Some(ScalarType::Bool));
            Refinement::tensors(vec![t, mask])
        }
        None => Refinement::Declined,
    })
}

#[cfg(test)]
mod tests {
    use crate::dtype::{Device, ScalarType};
    use crate::fallback::NoExecutor;
    use crate::graph::Graph;
    use crate::ivalue::IValue;
    use crate::propagate::propagate_shapes;
    use crate::types::{Dim, TensorType, Type};

    fn input(g: &mut Graph, st: ScalarType, sizes: &[u64]) -> crate::graph::ValueId {
        g.add_input(Type::Tensor(TensorType::complete(st, Device::CPU, sizes)))
    }

    #[test]
    fn conv_keeps_rank() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, ScalarType::Float, &[1, 3, 8, 8]);
        let w = input(&mut g, ScalarType::Float, &[4, 3, 3, 3]);
        let none = g.constant(top, IValue::None);
        let ones = g.constant(top, IValue::IntList(vec![1, 1]));
        let zeros = g.constant(top, IValue::IntList(vec![0, 0]));
        let groups = g.constant(top, IValue::Int(1));
        let n = g
            .append_op(
                top,
                "aten::conv2d(Tensor input, Tensor weight, Tensor? bias=None, int[2] stride=1, \
                 int[2] padding=0, int[2] dilation=1, int groups=1) -> Tensor",
                &[x, w, none, ones, zeros, ones, groups],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let t = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(t.rank(), Some(4));
        assert_eq!(t.dims(), None);
        assert_eq!(t.scalar_type(), Some(ScalarType::Float));
    }

    #[test]
    fn layer_norm_statistics() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, ScalarType::Float, &[2, 5, 16]);
        let shape = g.constant(top, IValue::IntList(vec![16]));
        let none = g.constant(top, IValue::None);
        let eps = g.constant(top, IValue::Double(1e-5));
        let n = g
            .append_op(
                top,
                "aten::native_layer_norm(Tensor input, SymInt[] normalized_shape, Tensor? weight, \
                 Tensor? bias, float eps) -> (Tensor, Tensor, Tensor)",
                &[x, shape, none, none, eps],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let outs = g.node(n).outputs.clone();
        assert_eq!(g.ty(outs[0]).as_tensor().unwrap().rank(), Some(3));
        let mean = g.ty(outs[1]).as_tensor().unwrap();
        assert_eq!(mean.concrete_sizes(), Some(vec![2, 5, 1]));
        assert_eq!(mean.dims().unwrap()[2], Dim::Static(1));
    }

    #[test]
    fn nll_loss_reduction() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, ScalarType::Float, &[8, 10]);
        let target = input(&mut g, ScalarType::Long, &[8]);
        let none = g.constant(top, IValue::None);
        let reduction = g.constant(top, IValue::Int(0));
        let ignore = g.constant(top, IValue::Int(-100));
        let n = g
            .append_op(
                top,
                "aten::nll_loss_forward(Tensor self, Tensor target, Tensor? weight, int reduction, \
                 SymInt ignore_index) -> (Tensor output, Tensor total_weight)",
                &[x, target, none, reduction, ignore],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let outs = g.node(n).outputs.clone();
        assert_eq!(g.ty(outs[0]).as_tensor().unwrap().rank(), Some(1));
        assert_eq!(g.ty(outs[1]).as_tensor().unwrap().rank(), Some(0));
    }

    #[test]
    fn dropout_mask_is_bool() {
        let mut g = Graph::new();
        let top = g.top();
        let x = input(&mut g, ScalarType::Float, &[4, 4]);
        let p = g.constant(top, IValue::Double(0.5));
        let train = g.constant(top, IValue::Bool(true));
        let n = g
            .append_op(
                top,
                "aten::native_dropout(Tensor input, float p, bool? train) -> (Tensor, Tensor)",
                &[x, p, train],
            )
            .unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let mask = g.ty(g.node(n).outputs[1]).as_tensor().unwrap();
        assert_eq!(mask.scalar_type(), Some(ScalarType::Bool));
        assert_eq!(mask.rank(), Some(2));
    }
}
