//! The table of shape-transfer formulas, keyed by operator schema.
//!
//! An entry pairs a set of schemas with a [Formula]. The table is built the first time it is used
//! and is read-only afterwards. When several entries claim the same schema, the one registered
//! first wins.
use crate::common::Result;
use crate::dtype::{Device, ScalarType};
use crate::formulas;
use crate::graph::{Graph, NodeId};
use crate::ivalue::IValue;
use crate::propagate::Config;
use crate::schema::{self, Schema};
use crate::types::{TensorType, Type};

use hashbrown::HashMap;
use smallvec::SmallVec;

/// The result of applying a formula to a node.
#[derive(Clone, Debug, PartialEq)]
pub enum Refinement {
    /// The formula cannot say anything about this node.
    Declined,
    /// One type per output of the node.
    Refined(SmallVec<[Type; 2]>),
}

impl Refinement {
    pub fn one(t: TensorType) -> Refinement {
        Refinement::Refined(smallvec::smallvec![Type::Tensor(t)])
    }
    pub fn tensors(ts: impl IntoIterator<Item = TensorType>) -> Refinement {
        Refinement::Refined(ts.into_iter().map(Type::Tensor).collect())
    }
}

impl From<Option<TensorType>> for Refinement {
    fn from(t: Option<TensorType>) -> Refinement {
        match t {
            Some(t) => Refinement::one(t),
            None => Refinement::Declined,
        }
    }
}

/// Everything a formula can see while it runs.
pub struct Ctx<'a> {
    pub(crate) graph: &'a mut Graph,
    pub(crate) config: &'a Config,
    /// Whether formulas may insert new nodes ahead of the node they are looking at.
    pub(crate) insert_expands: bool,
}

impl<'a> Ctx<'a> {
    pub(crate) fn new(graph: &'a mut Graph, config: &'a Config, insert_expands: bool) -> Ctx<'a> {
        Ctx {
            graph,
            config,
            insert_expands,
        }
    }

    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// The type of input `i`, if it is a tensor.
    pub fn input_tensor(&self, n: NodeId, i: usize) -> Option<TensorType> {
        let v = *self.graph.node(n).inputs.get(i)?;
        self.graph.ty(v).as_tensor().cloned()
    }

    pub fn input_type(&self, n: NodeId, i: usize) -> Option<&Type> {
        let v = *self.graph.node(n).inputs.get(i)?;
        Some(self.graph.ty(v))
    }

    pub fn num_outputs(&self, n: NodeId) -> usize {
        self.graph.node(n).outputs.len()
    }

    pub fn output_type(&self, n: NodeId, i: usize) -> &Type {
        self.graph.ty(self.graph.node(n).outputs[i])
    }

    pub fn get_const(&self, n: NodeId, name: &str) -> Option<IValue> {
        self.graph.get_const(n, name)
    }

    pub fn get_int(&self, n: NodeId, name: &str) -> Option<i64> {
        self.get_const(n, name)?.to_int()
    }

    pub fn get_bool(&self, n: NodeId, name: &str) -> Option<bool> {
        self.get_const(n, name)?.to_bool()
    }

    pub fn get_int_list(&self, n: NodeId, name: &str) -> Option<Vec<i64>> {
        self.get_const(n, name)?.to_int_list()
    }

    /// An optional element-type argument: `None` if it is not a literal, `Some(None)` if it is
    /// the literal `None`.
    pub fn get_dtype(&self, n: NodeId, name: &str) -> Option<Option<ScalarType>> {
        match self.get_const(n, name)? {
            IValue::None => Some(None),
            v => v.to_scalar_type().map(Some),
        }
    }

    /// Like [Ctx::get_dtype], for devices.
    pub fn get_device(&self, n: NodeId, name: &str) -> Option<Option<Device>> {
        match self.get_const(n, name)? {
            IValue::None => Some(None),
            v => v.to_device().map(Some),
        }
    }

    pub fn named_tensor(&self, n: NodeId, name: &str) -> Option<TensorType> {
        let v = self.graph.named_input(n, name)?;
        self.graph.ty(v).as_tensor().cloned()
    }
}

pub(crate) type Formula = for<'a, 'b> fn(&'b mut Ctx<'a>, NodeId) -> Result<Refinement>;

pub struct Entry {
    category: &'static str,
    schemas: Vec<Schema>,
    pub(crate) formula: Formula,
}

impl Entry {
    /// A short name for the family of operators this entry covers.
    pub fn category(&self) -> &'static str {
        self.category
    }
    pub fn schemas(&self) -> &[Schema] {
        &self.schemas[..]
    }
}

#[derive(Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Add an entry. The schemas are part of the static catalog, so a malformed one is a bug.
    pub(crate) fn register(&mut self, category: &'static str, schemas: &[&str], formula: Formula) {
        let ix = self.entries.len();
        let mut parsed = Vec::with_capacity(schemas.len());
        for s in schemas.iter() {
            let schema = match schema::parse(s) {
                Ok(schema) => schema,
                Err(e) => panic!("invalid schema in formula table {:?}: {}", s, e),
            };
            self.index.entry(schema.key()).or_insert(ix);
            parsed.push(schema);
        }
        self.entries.push(Entry {
            category,
            schemas: parsed,
            formula,
        });
    }

    pub fn get(&self, schema: &Schema) -> Option<&Entry> {
        self.index.get(&schema.key()).map(|ix| &self.entries[*ix])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn build() -> Registry {
        let mut reg = Registry::default();
        formulas::register_all(&mut reg);
        log::debug!(
            "built formula registry: {} entries, {} schemas",
            reg.entries.len(),
            reg.index.len()
        );
        reg
    }
}

lazy_static::lazy_static! {
    static ref REGISTRY: Registry = Registry::build();
}

/// The entry whose schema set contains `schema`, if any.
pub fn lookup(schema: &Schema) -> Option<&'static Entry> {
    REGISTRY.get(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Schema {
        schema::parse(s).unwrap()
    }

    #[test]
    fn lookup_ignores_names_and_defaults() {
        let e = lookup(&key(
            "aten::add.Tensor(Tensor self, Tensor other, *, Scalar alpha=1) -> Tensor",
        ))
        .unwrap();
        assert_eq!(e.category(), "broadcasting_arithmetic");
        assert!(lookup(&key("aten::frobnicate(Tensor self) -> Tensor")).is_none());
    }

    #[test]
    fn first_registration_wins() {
        // pow with a scalar exponent appears in two families; the identity family comes first.
        let e = lookup(&key("aten::pow.Tensor_Scalar(Tensor self, Scalar exponent) -> Tensor"))
            .unwrap();
        assert_eq!(e.category(), "first_input_type");
        let e = lookup(&key("aten::pow.Scalar(Scalar self, Tensor exponent) -> Tensor")).unwrap();
        assert_eq!(e.category(), "broadcasting_tensor_scalar");
    }

    #[test]
    fn every_entry_is_reachable() {
        for e in REGISTRY.entries.iter() {
            assert!(!e.schemas().is_empty(), "{}", e.category());
            assert!(
                e.schemas().iter().any(|s| lookup(s).map(|x| x.category()) == Some(e.category())),
                "entry {} is shadowed entirely",
                e.category()
            );
        }
    }
}
