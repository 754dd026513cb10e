//! An arena-allocated SSA dataflow graph.
//!
//! Nodes, values and blocks live in flat vectors owned by [Graph] and are referred to by index.
//! Indices are never reused, so a handle stays valid for the lifetime of the graph even as
//! propagation inserts new nodes. Structured control flow (`prim::If`, `prim::Loop`) is expressed
//! with nested blocks owned by the control-flow node.
use crate::common::NumTy;
use crate::ivalue::IValue;
use crate::schema::{self, ParseError, Schema};
use crate::types::Type;

use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

macro_rules! handle {
    ($name:ident) => {
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
        pub struct $name(pub(crate) NumTy);
        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(NodeId);
handle!(ValueId);
handle!(BlockId);

#[derive(Clone, Debug, PartialEq)]
pub enum Kind {
    If,
    Loop,
    Constant,
    ListConstruct,
    TupleConstruct,
    TupleUnpack,
    GetAttr,
    CallFunction,
    CallMethod,
    AutogradZero,
    NumToTensor,
    ConstantChunk,
    Grad,
    UncheckedUnwrapOptional,
    FusedConcat,
    /// An operator call described by a schema.
    Op(Arc<Schema>),
}

impl Kind {
    pub fn name(&self) -> &str {
        use Kind::*;
        match self {
            If => "prim::If",
            Loop => "prim::Loop",
            Constant => "prim::Constant",
            ListConstruct => "prim::ListConstruct",
            TupleConstruct => "prim::TupleConstruct",
            TupleUnpack => "prim::TupleUnpack",
            GetAttr => "prim::GetAttr",
            CallFunction => "prim::CallFunction",
            CallMethod => "prim::CallMethod",
            AutogradZero => "prim::AutogradZero",
            NumToTensor => "prim::NumToTensor",
            ConstantChunk => "prim::ConstantChunk",
            Grad => "prim::grad",
            UncheckedUnwrapOptional => "prim::unchecked_unwrap_optional",
            FusedConcat => "prim::FusedConcat",
            Op(s) => &s.name[..],
        }
    }

    pub fn schema(&self) -> Option<&Arc<Schema>> {
        match self {
            Kind::Op(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Attr {
    Value(IValue),
    Str(String),
    Graph(Box<Graph>),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: Kind,
    pub inputs: SmallVec<[ValueId; 4]>,
    pub outputs: SmallVec<[ValueId; 2]>,
    pub blocks: SmallVec<[BlockId; 2]>,
    pub attrs: Vec<(String, Attr)>,
    pub owner: BlockId,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&Attr> {
        self.attrs.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }
    pub fn name(&self) -> &str {
        self.kind.name()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Def {
    Node(NodeId, usize),
    Param(BlockId, usize),
}

#[derive(Clone, Debug)]
pub struct Value {
    pub ty: Type,
    pub def: Def,
}

#[derive(Clone, Debug, Default)]
pub struct Block {
    pub params: Vec<ValueId>,
    pub nodes: Vec<NodeId>,
    pub outputs: Vec<ValueId>,
    pub owner: Option<NodeId>,
}

/// The values a `prim::Loop` node is wired up with.
///
/// Inputs are `(max_trip_count, start_condition, carried...)`; the body block's parameters are
/// `(trip_counter, carried...)` and its outputs are `(continue_condition, carried...)`.
#[derive(Clone, Debug)]
pub struct LoopView {
    pub max_trip_count: ValueId,
    pub start_condition: ValueId,
    pub carried_inputs: SmallVec<[ValueId; 4]>,
    pub body: BlockId,
    pub current_trip_count: ValueId,
    pub body_carried_inputs: SmallVec<[ValueId; 4]>,
    pub body_carried_outputs: SmallVec<[ValueId; 4]>,
    pub carried_outputs: SmallVec<[ValueId; 4]>,
}

#[derive(Clone, Debug)]
pub struct Graph {
    nodes: Vec<Node>,
    values: Vec<Value>,
    blocks: Vec<Block>,
    top: BlockId,
}

impl Default for Graph {
    fn default() -> Graph {
        Graph::new()
    }
}

impl Graph {
    pub fn new() -> Graph {
        Graph {
            nodes: Vec::new(),
            values: Vec::new(),
            blocks: vec![Default::default()],
            top: BlockId(0),
        }
    }

    pub fn top(&self) -> BlockId {
        self.top
    }
    pub fn node(&self, n: NodeId) -> &Node {
        &self.nodes[n.index()]
    }
    pub(crate) fn node_mut(&mut self, n: NodeId) -> &mut Node {
        &mut self.nodes[n.index()]
    }
    pub fn value(&self, v: ValueId) -> &Value {
        &self.values[v.index()]
    }
    pub fn block(&self, b: BlockId) -> &Block {
        &self.blocks[b.index()]
    }
    pub fn ty(&self, v: ValueId) -> &Type {
        &self.values[v.index()].ty
    }
    pub fn set_type(&mut self, v: ValueId, ty: Type) {
        self.values[v.index()].ty = ty;
    }
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
    pub fn inputs(&self) -> &[ValueId] {
        &self.blocks[self.top.index()].params[..]
    }
    pub fn outputs(&self) -> &[ValueId] {
        &self.blocks[self.top.index()].outputs[..]
    }
    pub(crate) fn values_mut(&mut self) -> impl Iterator<Item = &mut Value> {
        self.values.iter_mut()
    }
    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.iter_mut()
    }

    /// The node defining `v`, if it is not a block parameter.
    pub fn producer(&self, v: ValueId) -> Option<&Node> {
        match self.value(v).def {
            Def::Node(n, _) => Some(self.node(n)),
            Def::Param(..) => None,
        }
    }

    fn new_value(&mut self, ty: Type, def: Def) -> ValueId {
        let id = ValueId(self.values.len() as NumTy);
        self.values.push(Value { ty, def });
        id
    }

    fn new_block(&mut self, owner: NodeId) -> BlockId {
        let id = BlockId(self.blocks.len() as NumTy);
        self.blocks.push(Block {
            owner: Some(owner),
            ..Default::default()
        });
        id
    }

    pub fn add_block_param(&mut self, b: BlockId, ty: Type) -> ValueId {
        let ix = self.blocks[b.index()].params.len();
        let v = self.new_value(ty, Def::Param(b, ix));
        self.blocks[b.index()].params.push(v);
        v
    }

    /// Add an input to the graph's entry block.
    pub fn add_input(&mut self, ty: Type) -> ValueId {
        let top = self.top;
        self.add_block_param(top, ty)
    }

    fn create_node(
        &mut self,
        owner: BlockId,
        kind: Kind,
        inputs: &[ValueId],
        output_types: Vec<Type>,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as NumTy);
        let outputs = output_types
            .into_iter()
            .enumerate()
            .map(|(i, ty)| self.new_value(ty, Def::Node(id, i)))
            .collect();
        self.nodes.push(Node {
            kind,
            inputs: inputs.iter().cloned().collect(),
            outputs,
            blocks: smallvec![],
            attrs: Vec::new(),
            owner,
        });
        id
    }

    pub fn append_node(
        &mut self,
        b: BlockId,
        kind: Kind,
        inputs: &[ValueId],
        output_types: Vec<Type>,
    ) -> NodeId {
        let n = self.create_node(b, kind, inputs, output_types);
        self.blocks[b.index()].nodes.push(n);
        n
    }

    /// Create a node in the same block as `anchor`, placed immediately before it.
    pub fn insert_before(
        &mut self,
        anchor: NodeId,
        kind: Kind,
        inputs: &[ValueId],
        output_types: Vec<Type>,
    ) -> NodeId {
        let b = self.node(anchor).owner;
        let n = self.create_node(b, kind, inputs, output_types);
        let nodes = &mut self.blocks[b.index()].nodes;
        let pos = nodes
            .iter()
            .position(|x| *x == anchor)
            .unwrap_or(nodes.len());
        nodes.insert(pos, n);
        n
    }

    pub fn set_attr(&mut self, n: NodeId, name: &str, attr: Attr) {
        let attrs = &mut self.nodes[n.index()].attrs;
        match attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, a)) => *a = attr,
            None => attrs.push((name.into(), attr)),
        }
    }

    /// Append a call to the operator described by `schema`. Outputs are declared with the types
    /// in the schema's return list.
    pub fn append_op(
        &mut self,
        b: BlockId,
        schema: &str,
        inputs: &[ValueId],
    ) -> Result<NodeId, ParseError> {
        let schema = schema::parse(schema)?;
        Ok(self.append_schema_op(b, Arc::new(schema), inputs))
    }

    pub fn append_schema_op(&mut self, b: BlockId, schema: Arc<Schema>, inputs: &[ValueId]) -> NodeId {
        assert!(
            schema.is_vararg || inputs.len() == schema.arguments.len(),
            "{} expects {} inputs, got {}",
            schema.name,
            schema.arguments.len(),
            inputs.len()
        );
        let outs = schema.returns.iter().map(|r| r.ty.to_type()).collect();
        self.append_node(b, Kind::Op(schema), inputs, outs)
    }

    fn constant_type(v: &IValue) -> Type {
        match v {
            // Tensor constants are refined by propagation.
            IValue::Tensor(_) => Type::unshaped(),
            v => v.type_of(),
        }
    }

    /// Append a `prim::Constant` holding `v`, returning its output.
    pub fn constant(&mut self, b: BlockId, v: IValue) -> ValueId {
        let ty = Graph::constant_type(&v);
        let n = self.append_node(b, Kind::Constant, &[], vec![ty]);
        self.set_attr(n, "value", Attr::Value(v));
        self.node(n).outputs[0]
    }

    pub fn insert_constant_before(&mut self, anchor: NodeId, v: IValue) -> ValueId {
        let ty = Graph::constant_type(&v);
        let n = self.insert_before(anchor, Kind::Constant, &[], vec![ty]);
        self.set_attr(n, "value", Attr::Value(v));
        self.node(n).outputs[0]
    }

    /// Append a `prim::If` with empty then and else blocks.
    pub fn create_if(&mut self, b: BlockId, cond: ValueId, output_types: Vec<Type>) -> NodeId {
        let n = self.append_node(b, Kind::If, &[cond], output_types);
        let then_b = self.new_block(n);
        let else_b = self.new_block(n);
        self.nodes[n.index()].blocks.extend(vec![then_b, else_b]);
        n
    }

    /// Append a `prim::Loop` carrying `carried`. The body block receives a trip counter and one
    /// parameter per carried value, each declared with the carried value's current type.
    pub fn create_loop(
        &mut self,
        b: BlockId,
        max_trip_count: ValueId,
        cond: ValueId,
        carried: &[ValueId],
    ) -> NodeId {
        let mut inputs = vec![max_trip_count, cond];
        inputs.extend(carried.iter().cloned());
        let tys: Vec<Type> = carried.iter().map(|v| self.ty(*v).clone()).collect();
        let n = self.append_node(b, Kind::Loop, &inputs[..], tys.clone());
        let body = self.new_block(n);
        self.nodes[n.index()].blocks.push(body);
        self.add_block_param(body, Type::Int);
        for ty in tys.into_iter() {
            self.add_block_param(body, ty);
        }
        n
    }

    pub fn loop_view(&self, n: NodeId) -> LoopView {
        let node = self.node(n);
        assert_eq!(node.kind, Kind::Loop, "loop_view called on {}", node.name());
        let body = node.blocks[0];
        let block = self.block(body);
        assert!(
            block.outputs.len() == block.params.len(),
            "malformed loop body: {} params, {} outputs",
            block.params.len(),
            block.outputs.len()
        );
        LoopView {
            max_trip_count: node.inputs[0],
            start_condition: node.inputs[1],
            carried_inputs: node.inputs[2..].iter().cloned().collect(),
            body,
            current_trip_count: block.params[0],
            body_carried_inputs: block.params[1..].iter().cloned().collect(),
            body_carried_outputs: block.outputs[1..].iter().cloned().collect(),
            carried_outputs: node.outputs.iter().cloned().collect(),
        }
    }

    pub fn set_outputs(&mut self, b: BlockId, outputs: &[ValueId]) {
        self.blocks[b.index()].outputs = outputs.to_vec();
    }

    pub fn replace_input(&mut self, n: NodeId, i: usize, v: ValueId) {
        self.nodes[n.index()].inputs[i] = v;
    }

    /// The literal value of `v`: either a `prim::Constant`, or a list built only from constants.
    pub fn constant_of(&self, v: ValueId) -> Option<IValue> {
        let node = self.producer(v)?;
        match node.kind {
            Kind::Constant => match node.attr("value") {
                Some(Attr::Value(iv)) => Some(iv.clone()),
                Some(Attr::Str(s)) => Some(IValue::Str(s.as_str().into())),
                // A constant with no payload is None.
                None => Some(IValue::None),
                Some(Attr::Graph(_)) => None,
            },
            Kind::ListConstruct => {
                let elts = node
                    .inputs
                    .iter()
                    .map(|i| self.constant_of(*i))
                    .collect::<Option<Vec<_>>>()?;
                if elts.iter().all(|e| matches!(e, IValue::Int(_))) && !elts.is_empty() {
                    elts.iter().map(IValue::to_int).collect::<Option<_>>().map(IValue::IntList)
                } else {
                    Some(IValue::List(elts))
                }
            }
            _ => None,
        }
    }

    pub fn is_constant(&self, v: ValueId) -> bool {
        self.constant_of(v).is_some()
    }

    /// The input bound to the schema argument `name`.
    pub fn named_input(&self, n: NodeId, name: &str) -> Option<ValueId> {
        let node = self.node(n);
        let ix = node.kind.schema()?.argument_index(name)?;
        node.inputs.get(ix).cloned()
    }

    /// The literal bound to `name`, either as a constant input or as an attribute.
    pub fn get_const(&self, n: NodeId, name: &str) -> Option<IValue> {
        if let Some(v) = self.named_input(n, name) {
            return self.constant_of(v);
        }
        match self.node(n).attr(name)? {
            Attr::Value(v) => Some(v.clone()),
            Attr::Str(s) => Some(IValue::Str(s.as_str().into())),
            Attr::Graph(_) => None,
        }
    }

    /// The length of a list value, when it can be determined without running anything.
    pub fn list_size(&self, v: ValueId) -> Option<usize> {
        if let Some(c) = self.constant_of(v) {
            return c.list_len();
        }
        let node = self.producer(v)?;
        if node.kind == Kind::ListConstruct {
            Some(node.inputs.len())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TensorType;

    #[test]
    fn build_and_query() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(Type::unshaped());
        let dim = g.constant(top, IValue::Int(1));
        let keep = g.constant(top, IValue::Bool(false));
        let none = g.constant(top, IValue::None);
        let n = g
            .append_op(
                top,
                "aten::sum.dim_IntList(Tensor self, int[1] dim, bool keepdim=False, *, ScalarType? dtype=None) -> Tensor",
                &[x, dim, keep, none],
            )
            .unwrap();
        assert_eq!(g.node(n).name(), "aten::sum");
        assert_eq!(g.named_input(n, "keepdim"), Some(keep));
        assert_eq!(g.get_const(n, "dim"), Some(IValue::Int(1)));
        assert_eq!(g.get_const(n, "dtype"), Some(IValue::None));
        assert_eq!(g.get_const(n, "self"), None);
        assert_eq!(*g.ty(g.node(n).outputs[0]), Type::unshaped());
    }

    #[test]
    fn lists_and_insertion() {
        let mut g = Graph::new();
        let top = g.top();
        let x = g.add_input(Type::unshaped());
        let a = g.constant(top, IValue::Int(2));
        let b = g.add_input(Type::Int);
        let l1 = g.append_node(top, Kind::ListConstruct, &[a, a], vec![Type::list(Type::Int)]);
        let l1 = g.node(l1).outputs[0];
        let l2 = g.append_node(top, Kind::ListConstruct, &[a, b], vec![Type::list(Type::Int)]);
        let l2 = g.node(l2).outputs[0];
        assert_eq!(g.constant_of(l1), Some(IValue::IntList(vec![2, 2])));
        assert_eq!(g.constant_of(l2), None);
        assert_eq!(g.list_size(l2), Some(2));
        assert_eq!(g.list_size(x), None);

        let n = g
            .append_op(top, "aten::view(Tensor(a) self, int[] size) -> Tensor(a)", &[x, l1])
            .unwrap();
        let c = g.insert_constant_before(n, IValue::Int(7));
        let cnode = match g.value(c).def {
            Def::Node(cn, _) => cn,
            Def::Param(..) => panic!("constant defined by a parameter"),
        };
        let nodes = &g.block(top).nodes;
        assert_eq!(nodes[nodes.len() - 2], cnode);
        assert_eq!(*nodes.last().unwrap(), n);
        g.replace_input(n, 1, l2);
        assert_eq!(g.node(n).inputs[1], l2);
    }

    #[test]
    fn loop_wiring() {
        let mut g = Graph::new();
        let top = g.top();
        let t = TensorType::unshaped().with_rank(Some(2));
        let x = g.add_input(Type::Tensor(t.clone()));
        let trips = g.constant(top, IValue::Int(10));
        let cond = g.constant(top, IValue::Bool(true));
        let l = g.create_loop(top, trips, cond, &[x]);
        let view = g.node(l).blocks[0];
        assert_eq!(g.block(view).params.len(), 2);
        assert_eq!(*g.ty(g.block(view).params[1]), Type::Tensor(t));
        let p = g.block(view).params[1];
        g.set_outputs(view, &[cond, p]);
        let lv = g.loop_view(l);
        assert_eq!(lv.carried_inputs.as_slice(), &[x]);
        assert_eq!(lv.body_carried_outputs.as_slice(), &[p]);
        assert_eq!(lv.carried_outputs.len(), 1);
    }
}
