use std::fmt;

// DType: Element types a tensor can hold
//
// Tensors are generic over their element type, so the DType tag is not needed
// to dispatch arithmetic. It is the runtime answer to `Tensor::dtype()`.
//
//   F16: 16-bit IEEE half float (feature "half")
//   BF16: 16-bit brain float (feature "half")
//   F32: 32-bit float, the default workhorse
//   F64: 64-bit float, for high-precision work and gradient checks
//   U8: unsigned byte
//   U32: unsigned 32-bit int
//   I32: signed 32-bit int, convenient for exact algebra tests
//   I64: signed 64-bit int

/// Enum of all supported numeric element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    F16,
    BF16,
    F32,
    F64,
    U8,
    U32,
    I32,
    I64,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::U8 => "u8",
            DType::U32 => "u32",
            DType::I32 => "i32",
            DType::I64 => "i64",
        };
        write!(f, "{}", s)
    }
}

// WithDType: Numeric element types
//
// Any tensor can hold any `Copy` element (comparisons produce `bool`
// tensors), but arithmetic, reductions and matrix products need a numeric
// element. This trait is that bound, plus the mapping to the DType tag.

/// Trait implemented by Rust types that can take part in tensor arithmetic.
pub trait WithDType:
    Copy
    + Default
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + 'static
    + num_traits::Num
    + num_traits::NumAssign
    + num_traits::NumCast
{
    /// The corresponding DType enum variant.
    const DTYPE: DType;

    /// Convert this value to f64 (for generic numeric code).
    fn to_f64(self) -> f64;

    /// Create a value of this type from f64.
    fn from_f64(v: f64) -> Self;
}

macro_rules! with_dtype_primitive {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl WithDType for $ty {
                const DTYPE: DType = DType::$dtype;
                fn to_f64(self) -> f64 {
                    self as f64
                }
                fn from_f64(v: f64) -> Self {
                    v as $ty
                }
            }
        )*
    };
}

with_dtype_primitive!(
    f32 => F32,
    f64 => F64,
    u8 => U8,
    u32 => U32,
    i32 => I32,
    i64 => I64,
);

#[cfg(feature = "half")]
impl WithDType for half::f16 {
    const DTYPE: DType = DType::F16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::f16::from_f64(v)
    }
}

#[cfg(feature = "half")]
impl WithDType for half::bf16 {
    const DTYPE: DType = DType::BF16;
    fn to_f64(self) -> f64 {
        self.to_f32() as f64
    }
    fn from_f64(v: f64) -> Self {
        half::bf16::from_f64(v)
    }
}
