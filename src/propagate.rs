//! The propagation pass: walk a graph's blocks in program order and refine the type of every
//! value a node produces.
//!
//! Each node goes through a fixed sequence of stages, and the first one that can say something
//! about the node wins:
//!
//! 1. built-in handling of control flow and structural operators,
//! 2. concatenation, whose output size sums over its inputs,
//! 3. the formula [registry](crate::registry),
//! 4. nodes that produce no tensors need nothing more,
//! 5. running the operator on representative inputs (see [crate::fallback]),
//! 6. forgetting everything about the outputs.
//!
//! Conditionals join the types their branches produce. Loops are iterated until the types of
//! their carried values stop changing.
use crate::common::{wrap_dim, Failure, PropagationError, Result};
use crate::display::{NodeDisplay, Val};
use crate::dtype::{Device, ScalarType};
use crate::fallback::{self, Executor};
use crate::graph::{Attr, BlockId, Graph, Kind, NodeId, ValueId};
use crate::ivalue::IValue;
use crate::registry::{self, Ctx, Refinement};
use crate::types::{unshaped_type, Dim, TensorType, Type};

use itertools::Itertools;

/// Knobs for a propagation pass.
#[derive(Clone, Debug)]
pub struct Config {
    /// Materialize broadcasts between fully known operands as explicit `aten::expand` nodes.
    pub expand_broadcasts: bool,
    /// The element type of tensors built from Python floats, and of integer division.
    pub default_dtype: ScalarType,
    /// Iterations after which a loop whose types keep changing is considered a bug.
    pub max_loop_iterations: usize,
    /// Try running operators with no formula on representative inputs.
    pub run_fallback: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            expand_broadcasts: false,
            default_dtype: ScalarType::Float,
            max_loop_iterations: 64,
            run_fallback: true,
        }
    }
}

/// Refine the types in `g` in place, with the default [Config].
pub fn propagate_shapes(g: &mut Graph, exec: &dyn Executor) -> std::result::Result<(), PropagationError> {
    propagate_shapes_with(g, exec, &Config::default())
}

pub fn propagate_shapes_with(
    g: &mut Graph,
    exec: &dyn Executor,
    config: &Config,
) -> std::result::Result<(), PropagationError> {
    let top = g.top();
    let mut p = Propagator {
        graph: g,
        exec,
        config,
    };
    p.block(top, true)?;
    log::debug!("propagated shapes through {} nodes", p.graph.num_nodes());
    Ok(())
}

struct Propagator<'a> {
    graph: &'a mut Graph,
    exec: &'a dyn Executor,
    config: &'a Config,
}

impl<'a> Propagator<'a> {
    fn block(&mut self, b: BlockId, insert: bool) -> std::result::Result<(), PropagationError> {
        // Formulas may insert nodes into this block; those already have their types.
        let nodes = self.graph.block(b).nodes.clone();
        for n in nodes.into_iter() {
            let kind = self.graph.node(n).kind.clone();
            let res = match kind {
                Kind::If => {
                    let changed = self.process_if(n, insert)?;
                    log::trace!("conditional %{} changed types: {}", n.index(), changed);
                    Ok(())
                }
                Kind::Loop => {
                    self.process_loop(n, insert)?;
                    Ok(())
                }
                _ => self.node(n, insert),
            };
            match res {
                Ok(()) => {}
                Err(Failure::Shape(msg)) => {
                    log::warn!(
                        "forgetting the output types of {}: {}",
                        NodeDisplay(self.graph, n),
                        msg
                    );
                    self.set_unshaped(n);
                }
                Err(Failure::Fatal(msg)) => return Err(self.error(n, msg)),
            }
        }
        Ok(())
    }

    fn error(&self, n: NodeId, message: String) -> PropagationError {
        let g = &*self.graph;
        PropagationError {
            message,
            node: NodeDisplay(g, n).to_string(),
            inputs: g
                .node(n)
                .inputs
                .iter()
                .map(|v| format!("{} : {}", Val(*v), g.ty(*v)))
                .collect(),
        }
    }

    fn set_unshaped(&mut self, n: NodeId) {
        let outputs = self.graph.node(n).outputs.clone();
        for v in outputs.into_iter() {
            let t = unshaped_type(self.graph.ty(v));
            self.graph.set_type(v, t);
        }
    }

    fn set_output(&mut self, n: NodeId, i: usize, ty: Type) {
        let v = self.graph.node(n).outputs[i];
        self.graph.set_type(v, ty);
    }

    /// Join the branch outputs of a conditional into its outputs, reporting whether any output
    /// type changed.
    fn process_if(
        &mut self,
        n: NodeId,
        insert: bool,
    ) -> std::result::Result<bool, PropagationError> {
        let (then_b, else_b) = {
            let node = self.graph.node(n);
            (node.blocks[0], node.blocks[1])
        };
        self.block(then_b, insert)?;
        self.block(else_b, insert)?;
        let then_outs = self.graph.block(then_b).outputs.clone();
        let else_outs = self.graph.block(else_b).outputs.clone();
        let outputs = self.graph.node(n).outputs.clone();
        assert!(
            then_outs.len() == outputs.len() && else_outs.len() == outputs.len(),
            "conditional with {} outputs has branches producing {} and {}",
            outputs.len(),
            then_outs.len(),
            else_outs.len()
        );
        let mut changed = false;
        for ((out, t), e) in outputs.iter().zip(then_outs.iter()).zip(else_outs.iter()) {
            let merged = self.graph.ty(*t).merge(self.graph.ty(*e));
            if !merged.equivalent(self.graph.ty(*out)) {
                log::debug!("branches of {} join to {}", Val(*out), merged);
                changed = true;
            }
            self.graph.set_type(*out, merged);
        }
        Ok(changed)
    }

    fn process_loop(&mut self, n: NodeId, insert: bool) -> std::result::Result<(), PropagationError> {
        let lv = self.graph.loop_view(n);
        let counter = self.graph.ty(lv.max_trip_count).clone();
        self.graph.set_type(lv.current_trip_count, counter);
        for (param, input) in lv.body_carried_inputs.iter().zip(lv.carried_inputs.iter()) {
            let t = self.graph.ty(*input).clone();
            self.graph.set_type(*param, t);
        }
        let mut iterations = 0;
        loop {
            iterations += 1;
            if iterations > self.config.max_loop_iterations {
                panic!(
                    "loop types did not settle after {} iterations: {}",
                    self.config.max_loop_iterations,
                    NodeDisplay(self.graph, n)
                );
            }
            // Types are not settled yet, so nothing may be inserted.
            self.block(lv.body, false)?;
            let mut changed = false;
            for (param, out) in lv
                .body_carried_inputs
                .iter()
                .zip(lv.body_carried_outputs.iter())
            {
                let (merged, c) = self.graph.ty(*param).merge_changed(self.graph.ty(*out));
                if c {
                    self.graph.set_type(*param, merged);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        log::debug!("loop %{} settled after {} iterations", n.index(), iterations);
        self.block(lv.body, insert)?;
        // Zero-trip loops return their inputs, which the settled parameters cover.
        for (out, param) in lv
            .carried_outputs
            .iter()
            .zip(lv.body_carried_inputs.iter())
        {
            let t = self.graph.ty(*param).clone();
            self.graph.set_type(*out, t);
        }
        Ok(())
    }

    fn node(&mut self, n: NodeId, insert: bool) -> Result<()> {
        if self.builtin(n, insert)? {
            log::trace!("{}: built in", self.graph.node(n).name());
            return Ok(());
        }
        if self.concat(n)? {
            log::trace!("{}: concatenation", self.graph.node(n).name());
            return Ok(());
        }
        if self.apply_formula(n, insert)? {
            log::trace!("{}: formula", self.graph.node(n).name());
            return Ok(());
        }
        let produces_tensors = self.graph.node(n).outputs.iter().any(|v| {
            let t = self.graph.ty(*v);
            t.is_tensor() || t.contains_tensor()
        });
        if !produces_tensors {
            return Ok(());
        }
        if self.config.run_fallback && fallback::propagate_by_running(self.graph, n, self.exec)? {
            log::trace!("{}: ran on representative inputs", self.graph.node(n).name());
            return Ok(());
        }
        log::trace!("{}: no information", self.graph.node(n).name());
        self.set_unshaped(n);
        Ok(())
    }

    /// Apply the registered formula for `n`, if there is one. Returns whether it refined anything.
    fn apply_formula(&mut self, n: NodeId, insert: bool) -> Result<bool> {
        let entry = match self.graph.node(n).kind.schema() {
            Some(schema) => match registry::lookup(schema) {
                Some(e) => e,
                None => return Ok(false),
            },
            None => return Ok(false),
        };
        let refined = {
            let mut ctx = Ctx::new(&mut *self.graph, self.config, insert);
            (entry.formula)(&mut ctx, n)?
        };
        let types = match refined {
            Refinement::Declined => return Ok(false),
            Refinement::Refined(types) => types,
        };
        let outputs = self.graph.node(n).outputs.clone();
        assert_eq!(
            types.len(),
            outputs.len(),
            "formula {} produced {} types for {}",
            entry.category(),
            types.len(),
            NodeDisplay(self.graph, n)
        );
        for (v, t) in outputs.iter().zip(types.into_iter()) {
            let declared = unshaped_type(self.graph.ty(*v));
            assert!(
                t.is_subtype_of(&declared),
                "formula {} refined {} to {}, which is not a {}",
                entry.category(),
                Val(*v),
                t,
                declared
            );
            self.graph.set_type(*v, t);
        }
        Ok(true)
    }

    /// Operators with fixed semantics that do not go through the registry. Returns whether `n`
    /// was handled.
    fn builtin(&mut self, n: NodeId, insert: bool) -> Result<bool> {
        let node = self.graph.node(n);
        match &node.kind {
            Kind::Constant => {
                if let Some(Attr::Value(IValue::Tensor(t))) = node.attr("value") {
                    let ty = Type::Tensor(t.descriptor());
                    self.set_output(n, 0, ty);
                }
            }
            Kind::ListConstruct => {}
            Kind::TupleConstruct => {
                let ty = Type::tuple(node.inputs.iter().map(|v| self.graph.ty(*v).clone()).collect());
                self.set_output(n, 0, ty);
            }
            Kind::TupleUnpack => match self.graph.ty(node.inputs[0]).clone() {
                Type::Tuple(elts) => {
                    assert_eq!(
                        elts.len(),
                        node.outputs.len(),
                        "unpacking a tuple of {} into {} values",
                        elts.len(),
                        node.outputs.len()
                    );
                    for (i, t) in elts.iter().enumerate() {
                        self.set_output(n, i, t.clone());
                    }
                }
                _ => self.set_unshaped(n),
            },
            Kind::GetAttr => {
                let name = match node.attr("name") {
                    Some(Attr::Str(s)) => s.clone(),
                    _ => return err!("attribute read without a name"),
                };
                let ty = match self.graph.ty(node.inputs[0]) {
                    Type::Class(c) => c.attribute(&name).cloned(),
                    _ => None,
                };
                match ty {
                    Some(ty) => self.set_output(n, 0, ty),
                    None => self.set_unshaped(n),
                }
            }
            Kind::CallFunction | Kind::CallMethod | Kind::Grad | Kind::AutogradZero => {
                self.set_unshaped(n)
            }
            Kind::NumToTensor => {
                let st = match self.graph.ty(node.inputs[0]) {
                    Type::Int | Type::Bool => Some(ScalarType::Long),
                    Type::Float => Some(ScalarType::Double),
                    _ => None,
                };
                if let Some(st) = st {
                    let t = TensorType::new(Some(st), Some(Device::CPU), Some(0), Some(false));
                    self.set_output(n, 0, Type::Tensor(t));
                }
            }
            Kind::ConstantChunk => match self.graph.ty(node.inputs[0]).as_tensor() {
                Some(t) => {
                    let t = Type::Tensor(t.dimensioned_only());
                    for i in 0..node.outputs.len() {
                        self.set_output(n, i, t.clone());
                    }
                }
                None => self.set_unshaped(n),
            },
            Kind::UncheckedUnwrapOptional => self.unwrap_optional(n),
            Kind::Op(_) => match node.name() {
                "aten::_unwrap_optional" => self.unwrap_optional(n),
                "aten::item" | "aten::ScalarImplicit" => {
                    let ty = match self.graph.ty(node.inputs[0]).as_tensor() {
                        Some(t) => match t.scalar_type() {
                            Some(ScalarType::Bool) => Some(Type::Bool),
                            Some(st) if st.is_integral(false) => Some(Type::Int),
                            Some(st) if st.is_floating() => Some(Type::Float),
                            _ => None,
                        },
                        None => None,
                    };
                    if let Some(ty) = ty {
                        self.set_output(n, 0, ty);
                    }
                }
                "aten::Bool" | "aten::Int" | "aten::Float" | "aten::FloatImplicit"
                | "aten::IntImplicit" => {}
                "aten::tensor" => {
                    self.tensor_from_list(n);
                    // The length of a literal list fixes the leading dimension.
                    self.apply_formula(n, insert)?;
                }
                "aten::as_tensor" if !self.graph.ty(node.inputs[0]).is_tensor() => {
                    self.tensor_from_list(n);
                }
                _ => return Ok(false),
            },
            Kind::If | Kind::Loop | Kind::FusedConcat => return Ok(false),
        }
        Ok(true)
    }

    // Pass the unwrapped input through when it is already known not to be `None`.
    fn unwrap_optional(&mut self, n: NodeId) {
        let node = self.graph.node(n);
        let input = self.graph.ty(node.inputs[0]);
        let output = self.graph.ty(node.outputs[0]);
        if input.is_subtype_of(output) {
            let ty = input.clone();
            self.set_output(n, 0, ty);
        }
    }

    /// `aten::tensor` and `aten::as_tensor` of (nested) lists of numbers.
    fn tensor_from_list(&mut self, n: NodeId) {
        let node = self.graph.node(n);
        let mut elt = self.graph.ty(node.inputs[0]);
        let mut rank = 0;
        while let Type::List(inner) = elt {
            rank += 1;
            elt = &**inner;
        }
        let mut st = match elt {
            Type::Float => Some(self.config.default_dtype),
            Type::Int => Some(ScalarType::Long),
            Type::Bool => Some(ScalarType::Bool),
            _ => None,
        };
        let mut device = Device::CPU;
        if node.kind.schema().and_then(|s| s.argument_index("dtype")).is_some() {
            match self.graph.get_const(n, "dtype") {
                Some(IValue::None) => {}
                Some(v) => match v.to_scalar_type() {
                    Some(d) => st = Some(d),
                    None => return,
                },
                None => return,
            }
        }
        if node.kind.schema().and_then(|s| s.argument_index("device")).is_some() {
            match self.graph.get_const(n, "device") {
                Some(IValue::None) => {}
                Some(IValue::Device(d)) => device = d,
                _ => return,
            }
        }
        let t = TensorType::new(st, Some(device), Some(rank), None);
        self.set_output(n, 0, Type::Tensor(t));
    }

    /// `aten::cat` and `prim::FusedConcat`. Returns whether `n` is one of them.
    fn concat(&mut self, n: NodeId) -> Result<bool> {
        let node = self.graph.node(n);
        let (tensors, dim): (Vec<ValueId>, Option<i64>) = match &node.kind {
            Kind::FusedConcat => (
                node.inputs.to_vec(),
                match node.attr("dim") {
                    Some(Attr::Value(v)) => v.to_int(),
                    _ => None,
                },
            ),
            Kind::Op(s) if s.name == "aten::cat" && !node.inputs.is_empty() => {
                let list = node.inputs[0];
                let dim = self.graph.get_const(n, "dim").and_then(|v| v.to_int());
                match self.graph.producer(list) {
                    Some(p) if p.kind == Kind::ListConstruct => (p.inputs.to_vec(), dim),
                    _ => {
                        let ty = match self.graph.ty(list) {
                            Type::List(elt) => match &**elt {
                                Type::Tensor(t) => Type::Tensor(t.dimensioned_only()),
                                _ => Type::unshaped(),
                            },
                            _ => Type::unshaped(),
                        };
                        self.set_output(n, 0, ty);
                        return Ok(true);
                    }
                }
            }
            _ => return Ok(false),
        };
        let types: Vec<TensorType> = tensors
            .iter()
            .filter_map(|v| self.graph.ty(*v).as_tensor().cloned())
            .collect();
        let first = match types.first() {
            Some(t) => t.clone(),
            None => {
                self.set_unshaped(n);
                return Ok(true);
            }
        };
        let all_complete = types.len() == tensors.len() && types.iter().all(|t| t.is_complete());
        let ty = match dim {
            Some(dim) if all_complete => first.with_dims(concat_dims(&types[..], dim)?),
            _ => first.dimensioned_only(),
        };
        self.set_output(n, 0, Type::Tensor(ty));
        Ok(true)
    }
}

// Exact sizes of a concatenation of complete tensors. Inputs that disagree outside the
// concatenated dimension make the graph invalid.
fn concat_dims(types: &[TensorType], dim: i64) -> Result<Vec<Dim>> {
    let sizes: Vec<Vec<u64>> = types
        .iter()
        .map(|t| t.concrete_sizes().unwrap_or_default())
        .collect();
    let rank = sizes[0].len();
    let d = match wrap_dim(dim, rank) {
        Some(d) => d,
        None => return err!("concatenation dimension {} out of range for rank {}", dim, rank),
    };
    let mut res = sizes[0].clone();
    for s in sizes[1..].iter() {
        if s.len() != rank {
            return err!(
                "concatenated tensors have different ranks: {:?} and {:?}",
                sizes[0],
                s
            );
        }
        for (i, (a, b)) in res.iter().zip(s.iter()).enumerate() {
            if i != d && a != b {
                return err!(
                    "sizes of concatenated tensors must match except in dimension {}: {}",
                    d,
                    sizes.iter().map(|s| format!("{:?}", s)).join(" vs ")
                );
            }
        }
        res[d] += s[d];
    }
    Ok(res.into_iter().map(Dim::Static).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::NoExecutor;
    use crate::types::ClassType;
    use std::sync::Arc;

    const ADD: &str = "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor";
    const CAT: &str = "aten::cat(Tensor[] tensors, int dim=0) -> Tensor";

    fn float(rank: usize) -> Type {
        Type::Tensor(TensorType::new(
            Some(ScalarType::Float),
            Some(Device::CPU),
            Some(rank),
            None,
        ))
    }

    fn complete(sizes: &[u64]) -> Type {
        Type::Tensor(TensorType::complete(ScalarType::Float, Device::CPU, sizes))
    }

    fn cat(g: &mut Graph, xs: &[ValueId], dim: i64) -> NodeId {
        let top = g.top();
        let l = g.append_node(top, Kind::ListConstruct, xs, vec![Type::list(Type::unshaped())]);
        let l = g.node(l).outputs[0];
        let d = g.constant(top, IValue::Int(dim));
        g.append_op(top, CAT, &[l, d]).unwrap()
    }

    #[test]
    fn concat_sums_dimension() {
        let mut g = Graph::new();
        let a = g.add_input(complete(&[2, 3]));
        let b = g.add_input(complete(&[2, 5]));
        let n = cat(&mut g, &[a, b], 1);
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let t = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(t.concrete_sizes(), Some(vec![2, 8]));
    }

    #[test]
    fn concat_mismatch_is_an_error() {
        let mut g = Graph::new();
        let a = g.add_input(complete(&[2, 3]));
        let b = g.add_input(complete(&[2, 5]));
        cat(&mut g, &[a, b], 0);
        let e = propagate_shapes(&mut g, &NoExecutor).unwrap_err();
        assert!(e.message.contains("must match"), "{}", e);
        assert!(e.node.contains("aten::cat"));
        assert_eq!(e.inputs.len(), 2);
    }

    #[test]
    fn concat_of_ranked_inputs() {
        let mut g = Graph::new();
        let a = g.add_input(float(3));
        let b = g.add_input(complete(&[2, 5, 1]));
        let n = cat(&mut g, &[a, b], 1);
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let t = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(t.rank(), Some(3));
        assert_eq!(t.dims(), None);
    }

    #[test]
    fn branches_join() {
        let mut g = Graph::new();
        let top = g.top();
        let c = g.add_input(Type::Bool);
        let x = g.add_input(float(2));
        let y = g.add_input(Type::Tensor(TensorType::new(
            Some(ScalarType::Int),
            Some(Device::CPU),
            Some(2),
            None,
        )));
        let n = g.create_if(top, c, vec![Type::unshaped()]);
        let (t, e) = (g.node(n).blocks[0], g.node(n).blocks[1]);
        g.set_outputs(t, &[x]);
        g.set_outputs(e, &[y]);
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let out = g.ty(g.node(n).outputs[0]).as_tensor().unwrap();
        assert_eq!(out.rank(), Some(2));
        assert_eq!(out.scalar_type(), Some(ScalarType::Float));
    }

    #[test]
    fn conditional_reports_changes() {
        let mut g = Graph::new();
        let top = g.top();
        let c = g.add_input(Type::Bool);
        let x = g.add_input(float(2));
        let n = g.create_if(top, c, vec![Type::unshaped()]);
        let (t, e) = (g.node(n).blocks[0], g.node(n).blocks[1]);
        g.set_outputs(t, &[x]);
        g.set_outputs(e, &[x]);
        let config = Config::default();
        let mut p = Propagator {
            graph: &mut g,
            exec: &NoExecutor,
            config: &config,
        };
        assert!(p.process_if(n, true).unwrap());
        assert!(!p.process_if(n, true).unwrap());
    }

    #[test]
    fn loop_carried_rank_settles() {
        // x = ones(2, 2); for _ in range(n): x = x + x
        let mut g = Graph::new();
        let top = g.top();
        let trips = g.add_input(Type::Int);
        let x = g.add_input(float(2));
        let cond = g.constant(top, IValue::Bool(true));
        let l = g.create_loop(top, trips, cond, &[x]);
        let body = g.node(l).blocks[0];
        let body_x = g.block(body).params[1];
        let one = g.constant(body, IValue::Int(1));
        let add = g.append_op(body, ADD, &[body_x, body_x, one]).unwrap();
        let sum = g.node(add).outputs[0];
        let keep_going = g.constant(body, IValue::Bool(true));
        g.set_outputs(body, &[keep_going, sum]);
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let lv = g.loop_view(l);
        let out = g.ty(g.node(l).outputs[0]).as_tensor().unwrap();
        assert_eq!(out.rank(), Some(2));
        assert_eq!(out.scalar_type(), Some(ScalarType::Float));
        assert_eq!(g.ty(lv.current_trip_count), &Type::Int);
    }

    #[test]
    fn tuples_and_attributes() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(float(1));
        let obj = g.add_input(Type::Class(Arc::new(ClassType {
            name: "Module".into(),
            attributes: vec![("weight".into(), float(2))],
        })));
        let tup = g.append_node(top, Kind::TupleConstruct, &[x, x], vec![Type::Untyped]);
        let tup = g.node(tup).outputs[0];
        let un = g.append_node(
            top,
            Kind::TupleUnpack,
            &[tup],
            vec![Type::unshaped(), Type::unshaped()],
        );
        let w = g.append_node(top, Kind::GetAttr, &[obj], vec![Type::unshaped()]);
        g.set_attr(w, "name", Attr::Str("weight".into()));
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(g.ty(g.node(un).outputs[1]), &float(1));
        assert_eq!(g.ty(g.node(w).outputs[0]), &float(2));
    }

    #[test]
    fn num_to_tensor_and_item() {
        let mut g = Graph::new();
        let top = g.top();
        let i = g.add_input(Type::Int);
        let t = g.append_node(top, Kind::NumToTensor, &[i], vec![Type::unshaped()]);
        let t = g.node(t).outputs[0];
        let item = g.append_op(top, "aten::item(Tensor self) -> Scalar", &[t]).unwrap();
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        let tt = g.ty(t).as_tensor().unwrap();
        assert_eq!(tt.scalar_type(), Some(ScalarType::Long));
        assert_eq!(tt.rank(), Some(0));
        assert_eq!(g.ty(g.node(item).outputs[0]), &Type::Int);
    }

    #[test]
    fn unknown_ops_are_forgotten() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(float(2));
        let n = g
            .append_op(top, "custom::mystery(Tensor self) -> Tensor", &[x])
            .unwrap();
        let out = g.node(n).outputs[0];
        g.set_type(out, float(2));
        propagate_shapes(&mut g, &NoExecutor).unwrap();
        assert_eq!(g.ty(out), &Type::unshaped());
    }
}
