use std::io::{Read, Write};

use crate::error::Result;
use crate::shape::Shape;
use crate::tensor::Tensor;

// Persistence: field-by-field binary dump and load
//
// A value is persisted by writing its fields in a fixed order and read back by
// loading the same fields, in the same order, into an existing value. There is
// no header and no shape information in the stream: the reader already has a
// value of the right type, so the type carries everything needed.
//
//   primitives   little-endian bytes (`bool` is one byte, 0 or 1)
//   Tensor       its elements in row-major order
//   tuples       each field in order
//   structs      the fields listed in `persist_fields!`
//
// A short stream surfaces as `Error::Io` (unexpected EOF).

/// Write a value's persistable fields.
pub trait Dump {
    fn dump(&self, out: &mut dyn Write) -> Result<()>;
}

/// Overwrite a value's persistable fields with data read from `input`.
pub trait Load {
    fn load(&mut self, input: &mut dyn Read) -> Result<()>;
}

macro_rules! persist_le_bytes {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Dump for $ty {
                fn dump(&self, out: &mut dyn Write) -> Result<()> {
                    out.write_all(&self.to_le_bytes())?;
                    Ok(())
                }
            }

            impl Load for $ty {
                fn load(&mut self, input: &mut dyn Read) -> Result<()> {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    input.read_exact(&mut buf)?;
                    *self = <$ty>::from_le_bytes(buf);
                    Ok(())
                }
            }
        )*
    };
}

persist_le_bytes!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

#[cfg(feature = "half")]
persist_le_bytes!(half::f16, half::bf16);

// usize is persisted as u64 so the stream does not depend on the target.
impl Dump for usize {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        (*self as u64).dump(out)
    }
}

impl Load for usize {
    fn load(&mut self, input: &mut dyn Read) -> Result<()> {
        let mut wide = 0u64;
        wide.load(input)?;
        *self = match usize::try_from(wide) {
            Ok(v) => v,
            Err(_) => crate::bail!("persisted size {} does not fit in usize", wide),
        };
        Ok(())
    }
}

impl Dump for bool {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        u8::from(*self).dump(out)
    }
}

impl Load for bool {
    fn load(&mut self, input: &mut dyn Read) -> Result<()> {
        let mut byte = 0u8;
        byte.load(input)?;
        *self = match byte {
            0 => false,
            1 => true,
            other => crate::bail!("invalid bool byte {}", other),
        };
        Ok(())
    }
}

impl<E: Copy + Dump, S: Shape> Dump for Tensor<E, S> {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        for x in self.iter() {
            x.dump(out)?;
        }
        Ok(())
    }
}

impl<E: Copy + Load, S: Shape> Load for Tensor<E, S> {
    fn load(&mut self, input: &mut dyn Read) -> Result<()> {
        for x in self.as_mut_slice() {
            x.load(input)?;
        }
        Ok(())
    }
}

impl<T: Dump + ?Sized> Dump for &T {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        (**self).dump(out)
    }
}

impl<T: Dump + ?Sized> Dump for &mut T {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        (**self).dump(out)
    }
}

impl<T: Load + ?Sized> Load for &mut T {
    fn load(&mut self, input: &mut dyn Read) -> Result<()> {
        (**self).load(input)
    }
}

impl<T: Dump> Dump for [T] {
    fn dump(&self, out: &mut dyn Write) -> Result<()> {
        for x in self {
            x.dump(out)?;
        }
        Ok(())
    }
}

impl<T: Load> Load for [T] {
    fn load(&mut self, input: &mut dyn Read) -> Result<()> {
        for x in self {
            x.load(input)?;
        }
        Ok(())
    }
}

macro_rules! persist_tuple {
    ($($name:ident . $idx:tt),+) => {
        impl<$($name: Dump),+> Dump for ($($name,)+) {
            fn dump(&self, out: &mut dyn Write) -> Result<()> {
                $(self.$idx.dump(out)?;)+
                Ok(())
            }
        }

        impl<$($name: Load),+> Load for ($($name,)+) {
            fn load(&mut self, input: &mut dyn Read) -> Result<()> {
                $(self.$idx.load(input)?;)+
                Ok(())
            }
        }
    };
}

persist_tuple!(A.0);
persist_tuple!(A.0, B.1);
persist_tuple!(A.0, B.1, C.2);
persist_tuple!(A.0, B.1, C.2, D.3);
persist_tuple!(A.0, B.1, C.2, D.3, E.4);
persist_tuple!(A.0, B.1, C.2, D.3, E.4, F.5);

/// Dump a value into a fresh byte buffer.
pub fn to_bytes<T: Dump + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.dump(&mut buf)?;
    Ok(buf)
}

/// Load a value's fields from a byte slice, returning the unread remainder.
pub fn load_from_bytes<'a, T: Load + ?Sized>(value: &mut T, mut bytes: &'a [u8]) -> Result<&'a [u8]> {
    value.load(&mut bytes)?;
    Ok(bytes)
}

/// Implement [`Dump`] and [`Load`] for a struct by walking the listed fields
/// in order.
///
/// ```
/// use fixgrad_core::{persist_fields, persist, Rank1, Tensor};
///
/// #[derive(Default)]
/// struct Affine {
///     weight: Tensor<f32, Rank1<3>>,
///     bias: f32,
///     steps: u64,
/// }
///
/// persist_fields!(Affine { weight, bias, steps });
///
/// let a = Affine { weight: Tensor::from([1.0, 2.0, 3.0]), bias: 0.5, steps: 7 };
/// let bytes = persist::to_bytes(&a).unwrap();
/// let mut b = Affine::default();
/// persist::load_from_bytes(&mut b, &bytes).unwrap();
/// assert_eq!(b.weight, a.weight);
/// assert_eq!(b.steps, 7);
/// ```
#[macro_export]
macro_rules! persist_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::Dump for $ty {
            fn dump(&self, out: &mut dyn ::std::io::Write) -> $crate::Result<()> {
                $($crate::Dump::dump(&self.$field, out)?;)*
                Ok(())
            }
        }

        impl $crate::Load for $ty {
            fn load(&mut self, input: &mut dyn ::std::io::Read) -> $crate::Result<()> {
                $($crate::Load::load(&mut self.$field, input)?;)*
                Ok(())
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::shape::{Rank0, Rank2};

    #[test]
    fn test_primitives_roundtrip() {
        let bytes = to_bytes(&(123i32, 1.23f32, 1.234f64, b'a', 1_234_567u64)).unwrap();
        assert_eq!(bytes.len(), 4 + 4 + 8 + 1 + 8);
        let mut back = (0i32, 0f32, 0f64, 0u8, 0u64);
        let rest = load_from_bytes(&mut back, &bytes).unwrap();
        assert!(rest.is_empty());
        assert_eq!(back, (123, 1.23, 1.234, b'a', 1_234_567));
    }

    #[test]
    fn test_little_endian_layout() {
        assert_eq!(to_bytes(&0x0102_0304u32).unwrap(), vec![4, 3, 2, 1]);
        assert_eq!(to_bytes(&true).unwrap(), vec![1]);
        assert_eq!(to_bytes(&7usize).unwrap().len(), 8);
    }

    #[test]
    fn test_tensors_in_sequence() {
        let t1 = Tensor::<i32, Rank2<2, 3>>::from([[1, 2, 0], [3, 4, 5]]);
        let t2 = Tensor::<i32, Rank0>::from(3);
        let t3 = Tensor::<f32, Rank2<4, 3>>::try_from_iter((1..=12).map(|i| 1.0 / i as f32)).unwrap();
        let bytes = to_bytes(&(&t1, &t2, &t3)).unwrap();
        assert_eq!(bytes.len(), (6 + 1 + 12) * 4);

        let mut l1 = Tensor::<i32, Rank2<2, 3>>::zeros();
        let mut l2 = Tensor::<i32, Rank0>::zeros();
        let mut l3 = Tensor::<f32, Rank2<4, 3>>::zeros();
        load_from_bytes(&mut (&mut l1, &mut l2, &mut l3), &bytes).unwrap();
        assert_eq!(l1, t1);
        assert_eq!(l2, t2);
        assert_eq!(l3, t3);
    }

    #[test]
    fn test_short_read_is_io_error() {
        let mut t = Tensor::<f64, Rank2<2, 2>>::zeros();
        let err = load_from_bytes(&mut t, &[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_invalid_bool() {
        let mut b = false;
        let err = load_from_bytes(&mut b, &[2]).unwrap_err();
        assert_eq!(err.to_string(), "invalid bool byte 2");
    }

    struct Pair {
        first: Tensor<i64, Rank2<1, 2>>,
        second: bool,
    }

    persist_fields!(Pair { first, second });

    #[test]
    fn test_persist_fields_macro() {
        let p = Pair {
            first: Tensor::from([[-1, 9]]),
            second: true,
        };
        let bytes = to_bytes(&p).unwrap();
        let mut q = Pair {
            first: Tensor::zeros(),
            second: false,
        };
        load_from_bytes(&mut q, &bytes).unwrap();
        assert_eq!(q.first, p.first);
        assert!(q.second);
    }
}
