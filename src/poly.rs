pub mod bma;
pub mod brown;
pub mod evaluate;
pub mod gcd;
pub mod parse;
pub mod polynomial;
pub mod univariate;
pub mod zippel;

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::ops::{Add, AddAssign, Sub};
use std::sync::Arc;

use smartstring::{LazyCompact, SmartString};

use crate::utils;

/// The number of exponents that fit on the stack before a monomial spills to the heap.
pub const INLINED_EXPONENTS: usize = 6;

/// An unsigned integer type used to store the exponent of a variable.
/// The choice of type limits the maximal degree of the polynomials that
/// can be represented, and operations that overflow it panic.
pub trait Exponent:
    Hash
    + Debug
    + Display
    + Ord
    + Add<Output = Self>
    + Sub<Output = Self>
    + AddAssign
    + Clone
    + Copy
    + PartialEq
    + Eq
    + Send
    + Sync
    + 'static
{
    fn zero() -> Self;
    fn one() -> Self;
    /// Convert the exponent to `u32`. This is always possible, as `u32` is the largest supported exponent type.
    fn to_u32(&self) -> u32;
    /// Convert from `u32`. This function panics if the exponent is too large.
    fn from_u32(n: u32) -> Self;
    fn is_zero(&self) -> bool;
    fn checked_add(&self, other: &Self) -> Option<Self>;
    fn gcd(&self, other: &Self) -> Self;
}

macro_rules! impl_exponent {
    ($t:ty) => {
        impl Exponent for $t {
            #[inline]
            fn zero() -> Self {
                0
            }

            #[inline]
            fn one() -> Self {
                1
            }

            #[inline]
            fn to_u32(&self) -> u32 {
                *self as u32
            }

            #[inline]
            fn from_u32(n: u32) -> Self {
                match <$t>::try_from(n) {
                    Ok(e) => e,
                    Err(_) => panic!("Exponent {} too large for {}", n, stringify!($t)),
                }
            }

            #[inline]
            fn is_zero(&self) -> bool {
                *self == 0
            }

            #[inline]
            fn checked_add(&self, other: &Self) -> Option<Self> {
                <$t>::checked_add(*self, *other)
            }

            #[inline]
            fn gcd(&self, other: &Self) -> Self {
                utils::gcd_unsigned(*self as u64, *other as u64) as Self
            }
        }
    };
}

impl_exponent!(u8);
impl_exponent!(u16);
impl_exponent!(u32);

/// A named polynomial variable.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Variable(SmartString<LazyCompact>);

impl Variable {
    pub fn new(name: &str) -> Variable {
        Variable(name.into())
    }

    pub fn name(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Variable {
    fn from(name: &str) -> Variable {
        Variable::new(name)
    }
}

impl Display for Variable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Create a shared variable list from names.
pub fn variables(names: &[&str]) -> Arc<Vec<Variable>> {
    Arc::new(names.iter().map(|n| Variable::new(n)).collect())
}

#[cfg(test)]
mod test {
    use super::{variables, Exponent};

    #[test]
    fn exponent_bounds() {
        assert_eq!(<u8 as Exponent>::from_u32(255), 255u8);
        assert_eq!(<u16 as Exponent>::checked_add(&65535, &1), None);
        assert_eq!(<u32 as Exponent>::gcd(&12, &18), 6);
    }

    #[test]
    #[should_panic]
    fn exponent_overflow() {
        <u8 as Exponent>::from_u32(256);
    }

    #[test]
    fn variable_list() {
        let vars = variables(&["x", "y"]);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[1].name(), "y");
        assert_eq!(format!("{}", vars[0]), "x");
    }
}
