//! Type descriptors and the lattice they form.
//!
//! Every value in a graph carries exactly one [Type]. Propagation only ever replaces a value's
//! type with a new one; descriptors themselves are immutable. The interesting case is
//! [TensorType], where each of rank, per-dimension sizes, element type, device and
//! gradient-requirement may independently be unknown (`None`). Knowing more of these fields makes
//! a descriptor more specific, and [Type::merge] computes the least upper bound of two
//! descriptors at a control-flow join: whatever the two sides disagree on is forgotten.
use crate::dtype::{Device, ScalarType};

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub type SymbolId = u32;

static NEXT_SYMBOL: AtomicU32 = AtomicU32::new(0);

/// The size of a single tensor dimension.
///
/// Two symbolic dimensions are only known to be equal if they carry the same id.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum Dim {
    Static(u64),
    Symbolic(SymbolId),
}

impl Dim {
    pub fn fresh() -> Dim {
        Dim::Symbolic(NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed))
    }
    pub fn static_size(self) -> Option<u64> {
        match self {
            Dim::Static(s) => Some(s),
            Dim::Symbolic(_) => None,
        }
    }
    pub fn is_static(self) -> bool {
        self.static_size().is_some()
    }
    fn merge(self, other: Dim) -> Dim {
        if self == other {
            self
        } else {
            Dim::fresh()
        }
    }
    fn equivalent(self, other: Dim) -> bool {
        match (self, other) {
            (Dim::Static(x), Dim::Static(y)) => x == y,
            (Dim::Symbolic(_), Dim::Symbolic(_)) => true,
            _ => false,
        }
    }
}

pub type Dims = Vec<Dim>;

pub fn static_dims(sizes: &[u64]) -> Dims {
    sizes.iter().cloned().map(Dim::Static).collect()
}

// A rank-0 tensor has no dimensions to be unsure about.
fn rank_only_dims(rank: Option<usize>) -> Option<Dims> {
    match rank {
        Some(0) => Some(Dims::new()),
        _ => None,
    }
}

/// What is known about a tensor-typed value. The all-`None` descriptor is the "unshaped" tensor.
///
/// Invariant: if `dims` is present, `dims.len() == rank`.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct TensorType {
    rank: Option<usize>,
    dims: Option<Dims>,
    scalar_type: Option<ScalarType>,
    device: Option<Device>,
    requires_grad: Option<bool>,
}

impl TensorType {
    pub fn unshaped() -> TensorType {
        Default::default()
    }

    pub fn new(
        scalar_type: Option<ScalarType>,
        device: Option<Device>,
        rank: Option<usize>,
        requires_grad: Option<bool>,
    ) -> TensorType {
        TensorType {
            rank,
            dims: rank_only_dims(rank),
            scalar_type,
            device,
            requires_grad,
        }
    }

    /// A fully known descriptor with static sizes.
    pub fn complete(scalar_type: ScalarType, device: Device, sizes: &[u64]) -> TensorType {
        TensorType::unshaped()
            .with_scalar_type(Some(scalar_type))
            .with_device(Some(device))
            .with_dims(static_dims(sizes))
    }

    pub fn rank(&self) -> Option<usize> {
        self.rank
    }
    pub fn dims(&self) -> Option<&[Dim]> {
        self.dims.as_ref().map(|d| &d[..])
    }
    pub fn scalar_type(&self) -> Option<ScalarType> {
        self.scalar_type
    }
    pub fn device(&self) -> Option<Device> {
        self.device
    }
    pub fn requires_grad(&self) -> Option<bool> {
        self.requires_grad
    }

    /// The sizes of every dimension, if all of them are static.
    pub fn concrete_sizes(&self) -> Option<Vec<u64>> {
        self.dims.as_ref()?.iter().map(|d| d.static_size()).collect()
    }

    /// Size of dimension `dim` if it is static, otherwise a fresh symbol.
    pub fn sym_dim(&self, dim: usize) -> Dim {
        match self.dims.as_ref().and_then(|d| d.get(dim)) {
            Some(d @ Dim::Static(_)) => *d,
            _ => Dim::fresh(),
        }
    }

    pub fn is_unshaped(&self) -> bool {
        *self == TensorType::unshaped()
    }

    /// Whether a concrete tensor matching this descriptor could be built.
    pub fn is_complete(&self) -> bool {
        self.scalar_type.is_some() && self.device.is_some() && self.concrete_sizes().is_some()
    }

    /// Replace the rank; per-dimension sizes are forgotten.
    pub fn with_rank(&self, rank: Option<usize>) -> TensorType {
        TensorType {
            rank,
            dims: rank_only_dims(rank),
            ..self.clone()
        }
    }
    pub fn with_dims(&self, dims: Dims) -> TensorType {
        TensorType {
            rank: Some(dims.len()),
            dims: Some(dims),
            ..self.clone()
        }
    }
    pub fn with_sizes(&self, sizes: &[u64]) -> TensorType {
        self.with_dims(static_dims(sizes))
    }
    pub fn with_scalar_type(&self, scalar_type: Option<ScalarType>) -> TensorType {
        TensorType {
            scalar_type,
            ..self.clone()
        }
    }
    pub fn with_device(&self, device: Option<Device>) -> TensorType {
        TensorType {
            device,
            ..self.clone()
        }
    }
    pub fn with_requires_grad(&self, requires_grad: Option<bool>) -> TensorType {
        TensorType {
            requires_grad,
            ..self.clone()
        }
    }

    /// Forget per-dimension sizes, keeping the rank.
    pub fn dimensioned_only(&self) -> TensorType {
        TensorType {
            dims: rank_only_dims(self.rank),
            ..self.clone()
        }
    }

    /// Lattice join. Element types that disagree are promoted.
    pub fn merge(&self, other: &TensorType) -> TensorType {
        fn same<T: PartialEq + Copy>(a: Option<T>, b: Option<T>) -> Option<T> {
            match (a, b) {
                (Some(a), Some(b)) if a == b => Some(a),
                _ => None,
            }
        }
        let rank = same(self.rank, other.rank);
        let dims = match (&self.dims, &other.dims) {
            (Some(d1), Some(d2)) if d1.len() == d2.len() => Some(
                d1.iter()
                    .zip(d2.iter())
                    .map(|(x, y)| x.merge(*y))
                    .collect(),
            ),
            _ => None,
        };
        let scalar_type = match (self.scalar_type, other.scalar_type) {
            (Some(a), Some(b)) => Some(a.promote(b)),
            _ => None,
        };
        TensorType {
            rank,
            dims,
            scalar_type,
            device: same(self.device, other.device),
            requires_grad: same(self.requires_grad, other.requires_grad),
        }
    }

    /// Is `self` at least as specific as `other`? Element types are ordered by promotion.
    pub fn is_subtype_of(&self, other: &TensorType) -> bool {
        fn sub<T: PartialEq>(a: &Option<T>, b: &Option<T>) -> bool {
            b.is_none() || a == b
        }
        let scalar_ok = match (self.scalar_type, other.scalar_type) {
            (_, None) => true,
            (Some(a), Some(b)) => a.promote(b) == b,
            (None, Some(_)) => false,
        };
        let dims_ok = match (&self.dims, &other.dims) {
            (_, None) => true,
            (None, Some(d2)) => self.rank == Some(d2.len()) && d2.iter().all(|d| !d.is_static()),
            (Some(d1), Some(d2)) => {
                d1.len() == d2.len()
                    && d1.iter().zip(d2.iter()).all(|(x, y)| match y {
                        Dim::Symbolic(_) => true,
                        Dim::Static(_) => x == y,
                    })
            }
        };
        sub(&self.rank, &other.rank)
            && dims_ok
            && scalar_ok
            && sub(&self.device, &other.device)
            && sub(&self.requires_grad, &other.requires_grad)
    }

    fn equivalent(&self, other: &TensorType) -> bool {
        let dims_eq = match (&self.dims, &other.dims) {
            (None, None) => true,
            (Some(d1), Some(d2)) => {
                d1.len() == d2.len() && d1.iter().zip(d2.iter()).all(|(x, y)| x.equivalent(*y))
            }
            _ => false,
        };
        dims_eq
            && self.rank == other.rank
            && self.scalar_type == other.scalar_type
            && self.device == other.device
            && self.requires_grad == other.requires_grad
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct ClassType {
    pub name: String,
    pub attributes: Vec<(String, Type)>,
}

impl ClassType {
    pub fn attribute(&self, name: &str) -> Option<&Type> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}

#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum Type {
    Tensor(TensorType),
    Int,
    Float,
    Bool,
    /// Int or Float, not yet known which.
    Number,
    Str,
    NoneType,
    Device,
    List(Arc<Type>),
    Tuple(Arc<[Type]>),
    Optional(Arc<Type>),
    Class(Arc<ClassType>),
    /// Nothing is known about the value.
    Untyped,
}

impl From<TensorType> for Type {
    fn from(t: TensorType) -> Type {
        Type::Tensor(t)
    }
}

impl Type {
    pub fn unshaped() -> Type {
        Type::Tensor(TensorType::unshaped())
    }
    pub fn list(t: Type) -> Type {
        Type::List(Arc::new(t))
    }
    pub fn tuple(ts: Vec<Type>) -> Type {
        Type::Tuple(ts.into())
    }
    pub fn optional(t: Type) -> Type {
        Type::Optional(Arc::new(t))
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            _ => None,
        }
    }
    pub fn is_tensor(&self) -> bool {
        self.as_tensor().is_some()
    }
    pub fn is_number(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Number | Type::Bool)
    }

    pub fn contained(&self) -> Vec<&Type> {
        match self {
            Type::List(t) | Type::Optional(t) => vec![&**t],
            Type::Tuple(ts) => ts.iter().collect(),
            Type::Class(c) => c.attributes.iter().map(|(_, t)| t).collect(),
            _ => vec![],
        }
    }

    /// Does a tensor appear anywhere inside this type (not counting the type itself)?
    pub fn contains_tensor(&self) -> bool {
        self.contained()
            .into_iter()
            .any(|t| t.is_tensor() || t.contains_tensor())
    }

    /// Rebuild a container type with new contained types, in the order of [Type::contained].
    pub fn with_contained(&self, mut contained: Vec<Type>) -> Type {
        match self {
            Type::List(_) | Type::Optional(_) => {
                assert_eq!(contained.len(), 1);
                let inner = contained.pop().unwrap_or_else(Type::unshaped);
                if let Type::List(_) = self {
                    Type::list(inner)
                } else {
                    Type::optional(inner)
                }
            }
            Type::Tuple(_) => Type::tuple(contained),
            Type::Class(c) => {
                assert_eq!(contained.len(), c.attributes.len());
                Type::Class(Arc::new(ClassType {
                    name: c.name.clone(),
                    attributes: c
                        .attributes
                        .iter()
                        .map(|(n, _)| n.clone())
                        .zip(contained.into_iter())
                        .collect(),
                }))
            }
            t => {
                assert!(contained.is_empty());
                t.clone()
            }
        }
    }

    /// Is `self` at least as specific as `other`?
    pub fn is_subtype_of(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (_, Untyped) => true,
            (Tensor(t1), Tensor(t2)) => t1.is_subtype_of(t2),
            (Int, Number) | (Float, Number) => true,
            (NoneType, Optional(_)) => true,
            (t, Optional(o)) if !matches!(t, Optional(_)) => t.is_subtype_of(o),
            (Optional(a), Optional(b)) => a.is_subtype_of(b),
            (List(a), List(b)) => a.is_subtype_of(b),
            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.is_subtype_of(y))
            }
            (Class(a), Class(b)) => {
                a.name == b.name
                    && a.attributes.len() == b.attributes.len()
                    && a.attributes
                        .iter()
                        .zip(b.attributes.iter())
                        .all(|((n1, t1), (n2, t2))| n1 == n2 && t1.is_subtype_of(t2))
            }
            (a, b) => a == b,
        }
    }

    /// The least upper bound of two descriptors.
    ///
    /// Panics if the two types are of incompatible kinds; a well-formed graph never joins, say, a
    /// tensor with an integer.
    pub fn merge(&self, other: &Type) -> Type {
        use Type::*;
        match (self, other) {
            (Untyped, _) | (_, Untyped) => Untyped,
            (Tensor(t1), Tensor(t2)) => Tensor(t1.merge(t2)),
            (a, b) if a == b => a.clone(),
            (Int, Float) | (Float, Int) | (Number, Int) | (Int, Number) | (Number, Float)
            | (Float, Number) => Number,
            (NoneType, Optional(t)) | (Optional(t), NoneType) => Optional(t.clone()),
            (NoneType, t) | (t, NoneType) if !matches!(t, Optional(_)) => {
                Type::optional(t.clone())
            }
            (Optional(a), Optional(b)) => Type::optional(a.merge(b)),
            (Optional(a), b) | (b, Optional(a)) => Type::optional(a.merge(b)),
            (List(a), List(b)) => Type::list(a.merge(b)),
            (Tuple(a), Tuple(b)) if a.len() == b.len() => {
                Type::tuple(a.iter().zip(b.iter()).map(|(x, y)| x.merge(y)).collect())
            }
            (Class(a), Class(b)) if a.name == b.name => {
                let merged = a
                    .attributes
                    .iter()
                    .zip(b.attributes.iter())
                    .map(|((_, x), (_, y))| x.merge(y))
                    .collect();
                self.with_contained(merged)
            }
            (a, b) => panic!("cannot merge incompatible types {} and {}", a, b),
        }
    }

    /// Merge, and report whether the result differs from `self`.
    pub fn merge_changed(&self, other: &Type) -> (Type, bool) {
        let merged = self.merge(other);
        let changed = !merged.equivalent(self);
        (merged, changed)
    }

    /// Structural equality, except that any two symbolic dimensions compare equal.
    pub fn equivalent(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (Tensor(t1), Tensor(t2)) => t1.equivalent(t2),
            (List(a), List(b)) | (Optional(a), Optional(b)) => a.equivalent(b),
            (Tuple(a), Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equivalent(y))
            }
            (Class(a), Class(b)) => {
                a.name == b.name
                    && a.attributes.len() == b.attributes.len()
                    && a.attributes
                        .iter()
                        .zip(b.attributes.iter())
                        .all(|((n1, t1), (n2, t2))| n1 == n2 && t1.equivalent(t2))
            }
            (a, b) => a == b,
        }
    }
}

/// Memoizes [unshape] on container types, keyed by the address of their shared contents.
///
/// Each cached entry keeps its key alive, so an address cannot be recycled for a different type
/// while the cache exists.
#[derive(Default)]
pub struct TypeCache {
    cache: HashMap<usize, (Type, Type)>,
}

impl TypeCache {
    fn key(t: &Type) -> Option<usize> {
        match t {
            Type::List(a) | Type::Optional(a) => Some(Arc::as_ptr(a) as *const u8 as usize),
            Type::Tuple(a) => Some(a.as_ptr() as *const u8 as usize),
            Type::Class(a) => Some(Arc::as_ptr(a) as *const u8 as usize),
            _ => None,
        }
    }
    pub fn len(&self) -> usize {
        self.cache.len()
    }
}

/// Replace every tensor type nested anywhere in `t` with the unshaped tensor.
pub fn unshape(t: &Type, cache: &mut TypeCache) -> Type {
    if t.is_tensor() {
        return Type::unshaped();
    }
    let key = match TypeCache::key(t) {
        Some(k) => k,
        None => return t.clone(),
    };
    if let Some((_, cached)) = cache.cache.get(&key) {
        return cached.clone();
    }
    let contained = t.contained().into_iter().map(|c| unshape(c, cache)).collect();
    let res = t.with_contained(contained);
    cache.cache.insert(key, (t.clone(), res.clone()));
    res
}

/// [unshape] without a cache shared across calls.
pub fn unshaped_type(t: &Type) -> Type {
    unshape(t, &mut TypeCache::default())
}
