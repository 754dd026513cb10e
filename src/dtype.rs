//! Element types, devices, and the numeric promotion table.
use std::fmt;

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScalarType {
    Bool = 0,
    Byte = 1,
    Char = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    Half = 6,
    BFloat16 = 7,
    Float = 8,
    Double = 9,
    ComplexHalf = 10,
    ComplexFloat = 11,
    ComplexDouble = 12,
}

static_map!(
    SCALAR_TYPES<&'static str, ScalarType>,
    ["bool", ScalarType::Bool],
    ["uint8", ScalarType::Byte],
    ["int8", ScalarType::Char],
    ["int16", ScalarType::Short],
    ["int32", ScalarType::Int],
    ["int64", ScalarType::Long],
    ["float16", ScalarType::Half],
    ["bfloat16", ScalarType::BFloat16],
    ["float32", ScalarType::Float],
    ["float64", ScalarType::Double],
    ["complex32", ScalarType::ComplexHalf],
    ["complex64", ScalarType::ComplexFloat],
    ["complex128", ScalarType::ComplexDouble]
);

impl std::convert::TryFrom<i64> for ScalarType {
    type Error = ();
    fn try_from(code: i64) -> std::result::Result<ScalarType, ()> {
        use ScalarType::*;
        Ok(match code {
            0 => Bool,
            1 => Byte,
            2 => Char,
            3 => Short,
            4 => Int,
            5 => Long,
            6 => Half,
            7 => BFloat16,
            8 => Float,
            9 => Double,
            10 => ComplexHalf,
            11 => ComplexFloat,
            12 => ComplexDouble,
            _ => return Err(()),
        })
    }
}

impl ScalarType {
    pub fn from_name(s: &str) -> Option<ScalarType> {
        SCALAR_TYPES.get(s).cloned()
    }

    pub fn name(self) -> &'static str {
        use ScalarType::*;
        match self {
            Bool => "Bool",
            Byte => "Byte",
            Char => "Char",
            Short => "Short",
            Int => "Int",
            Long => "Long",
            Half => "Half",
            BFloat16 => "BFloat16",
            Float => "Float",
            Double => "Double",
            ComplexHalf => "ComplexHalf",
            ComplexFloat => "ComplexFloat",
            ComplexDouble => "ComplexDouble",
        }
    }

    pub fn is_floating(self) -> bool {
        use ScalarType::*;
        matches!(self, Half | BFloat16 | Float | Double)
    }

    pub fn is_complex(self) -> bool {
        use ScalarType::*;
        matches!(self, ComplexHalf | ComplexFloat | ComplexDouble)
    }

    pub fn is_integral(self, include_bool: bool) -> bool {
        use ScalarType::*;
        match self {
            Byte | Char | Short | Int | Long => true,
            Bool => include_bool,
            _ => false,
        }
    }

    /// The real counterpart of a complex type; other types map to themselves.
    pub fn to_real(self) -> ScalarType {
        use ScalarType::*;
        match self {
            ComplexHalf => Half,
            ComplexFloat => Float,
            ComplexDouble => Double,
            t => t,
        }
    }

    fn to_complex(self) -> ScalarType {
        use ScalarType::*;
        match self {
            Half => ComplexHalf,
            Double => ComplexDouble,
            t if t.is_complex() => t,
            _ => ComplexFloat,
        }
    }

    // Position within a category; wider types have larger widths.
    fn width(self) -> u32 {
        use ScalarType::*;
        match self {
            Bool => 1,
            Byte | Char => 8,
            Short | Half | BFloat16 | ComplexHalf => 16,
            Int | Float | ComplexFloat => 32,
            Long | Double | ComplexDouble => 64,
        }
    }

    fn category(self) -> u32 {
        if self == ScalarType::Bool {
            0
        } else if self.is_integral(false) {
            1
        } else if self.is_floating() {
            2
        } else {
            3
        }
    }

    /// The type two operands promote to: higher categories (bool, integral, floating, complex)
    /// win, and within a category the wider type wins.
    pub fn promote(self, other: ScalarType) -> ScalarType {
        use ScalarType::*;
        if self == other {
            return self;
        }
        let (c1, c2) = (self.category(), other.category());
        if c1 != c2 {
            let (hi, lo) = if c1 > c2 { (self, other) } else { (other, self) };
            // complex + double widens the complex type.
            if hi.is_complex() && lo.is_floating() {
                return hi.to_real().promote(lo).to_complex();
            }
            return hi;
        }
        match (self, other) {
            (Byte, Char) | (Char, Byte) => Short,
            (Half, BFloat16) | (BFloat16, Half) => Float,
            _ if self.width() >= other.width() => self,
            _ => other,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum DeviceKind {
    Cpu,
    Cuda,
    Meta,
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct Device {
    pub kind: DeviceKind,
    pub index: Option<u32>,
}

impl Device {
    pub const CPU: Device = Device {
        kind: DeviceKind::Cpu,
        index: None,
    };
    pub fn cuda(index: u32) -> Device {
        Device {
            kind: DeviceKind::Cuda,
            index: Some(index),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Meta => "meta",
        };
        match self.index {
            Some(i) => write!(f, "{}:{}", kind, i),
            None => write!(f, "{}", kind),
        }
    }
}
