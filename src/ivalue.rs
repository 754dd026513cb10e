//! Concrete values: graph literals, and the inputs and outputs of representative execution.
use crate::dtype::{Device, ScalarType};
use crate::types::{TensorType, Type};

use ndarray::{ArrayD, IxDyn};
use std::fmt;
use std::sync::Arc;

/// A concrete tensor. Elements are stored as `f64` whatever the logical element type is; only
/// the shape and metadata matter for propagation.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    pub data: ArrayD<f64>,
    pub scalar_type: ScalarType,
    pub device: Device,
    pub requires_grad: bool,
}

impl Tensor {
    pub fn zeros(scalar_type: ScalarType, device: Device, sizes: &[u64]) -> Tensor {
        let shape: Vec<usize> = sizes.iter().map(|s| *s as usize).collect();
        Tensor {
            data: ArrayD::zeros(IxDyn(&shape[..])),
            scalar_type,
            device,
            requires_grad: false,
        }
    }

    /// A rank-0 tensor holding `v`.
    pub fn scalar(v: f64, scalar_type: ScalarType) -> Tensor {
        Tensor {
            data: ArrayD::from_elem(IxDyn(&[]), v),
            scalar_type,
            device: Device::CPU,
            requires_grad: false,
        }
    }

    pub fn from_array(data: ArrayD<f64>, scalar_type: ScalarType) -> Tensor {
        Tensor {
            data,
            scalar_type,
            device: Device::CPU,
            requires_grad: false,
        }
    }

    pub fn sizes(&self) -> Vec<u64> {
        self.data.shape().iter().map(|s| *s as u64).collect()
    }

    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    /// The most specific descriptor this tensor is an instance of.
    pub fn descriptor(&self) -> TensorType {
        TensorType::complete(self.scalar_type, self.device, &self.sizes()[..])
            .with_requires_grad(Some(self.requires_grad))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IValue {
    None,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Arc<str>),
    IntList(Vec<i64>),
    DoubleList(Vec<f64>),
    BoolList(Vec<bool>),
    Device(Device),
    ScalarType(ScalarType),
    Tensor(Tensor),
    List(Vec<IValue>),
    Tuple(Vec<IValue>),
}

impl IValue {
    pub fn is_none(&self) -> bool {
        matches!(self, IValue::None)
    }

    pub fn to_int(&self) -> Option<i64> {
        match self {
            IValue::Int(i) => Some(*i),
            IValue::Bool(b) => Some(*b as i64),
            IValue::ScalarType(st) => Some(*st as i64),
            _ => None,
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            IValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_double(&self) -> Option<f64> {
        match self {
            IValue::Double(d) => Some(*d),
            IValue::Int(i) => Some(*i as f64),
            IValue::Bool(b) => Some(*b as i64 as f64),
            _ => None,
        }
    }

    pub fn to_int_list(&self) -> Option<Vec<i64>> {
        match self {
            IValue::IntList(l) => Some(l.clone()),
            IValue::List(l) => l.iter().map(IValue::to_int).collect(),
            _ => None,
        }
    }

    /// Element types may be stored either as their numeric code or directly.
    pub fn to_scalar_type(&self) -> Option<ScalarType> {
        use std::convert::TryFrom;
        match self {
            IValue::ScalarType(st) => Some(*st),
            IValue::Int(i) => ScalarType::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn to_device(&self) -> Option<Device> {
        match self {
            IValue::Device(d) => Some(*d),
            _ => None,
        }
    }

    pub fn to_tensor(&self) -> Option<&Tensor> {
        match self {
            IValue::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn list_len(&self) -> Option<usize> {
        match self {
            IValue::IntList(l) => Some(l.len()),
            IValue::DoubleList(l) => Some(l.len()),
            IValue::BoolList(l) => Some(l.len()),
            IValue::List(l) => Some(l.len()),
            _ => None,
        }
    }

    /// The type of this value as a graph would declare it.
    pub fn type_of(&self) -> Type {
        match self {
            IValue::None => Type::NoneType,
            IValue::Bool(_) => Type::Bool,
            IValue::Int(_) | IValue::ScalarType(_) => Type::Int,
            IValue::Double(_) => Type::Float,
            IValue::Str(_) => Type::Str,
            IValue::IntList(_) => Type::list(Type::Int),
            IValue::DoubleList(_) => Type::list(Type::Float),
            IValue::BoolList(_) => Type::list(Type::Bool),
            IValue::Device(_) => Type::Device,
            IValue::Tensor(t) => Type::Tensor(t.descriptor()),
            IValue::List(l) => Type::list(match l.first() {
                Some(x) => x.type_of(),
                None => Type::Untyped,
            }),
            IValue::Tuple(l) => Type::tuple(l.iter().map(IValue::type_of).collect()),
        }
    }
}

impl fmt::Display for IValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter, l: &[T]) -> fmt::Result {
            write!(f, "[")?;
            for (i, x) in l.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", x)?;
            }
            write!(f, "]")
        }
        match self {
            IValue::None => write!(f, "None"),
            IValue::Bool(b) => write!(f, "{}", b),
            IValue::Int(i) => write!(f, "{}", i),
            IValue::Double(d) => write!(f, "{:?}", d),
            IValue::Str(s) => write!(f, "{:?}", &**s),
            IValue::IntList(l) => list(f, l),
            IValue::DoubleList(l) => list(f, l),
            IValue::BoolList(l) => list(f, l),
            IValue::Device(d) => write!(f, "\"{}\"", d),
            IValue::ScalarType(st) => write!(f, "{}", *st as i64),
            IValue::Tensor(t) => write!(f, "<Tensor {:?}>", t.sizes()),
            IValue::List(l) => list(f, l),
            IValue::Tuple(l) => {
                write!(f, "(")?;
                for (i, x) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", x)?;
                }
                write!(f, ")")
            }
        }
    }
}
