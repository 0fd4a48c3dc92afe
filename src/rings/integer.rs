use std::{
    cmp::Ordering,
    fmt::{Display, Error, Formatter},
    ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign},
};

use rand::Rng;
use rug::{ops::Pow, ops::RemRounding, Integer as ArbitraryPrecisionInteger};

use crate::utils;

use super::{
    finite_field::{FiniteField, FiniteFieldCore, FiniteFieldWorkspace, ToFiniteField},
    EuclideanDomain, Field, Ring,
};

#[derive(Clone, Copy, PartialEq, Debug)]
pub struct IntegerRing;

impl IntegerRing {
    pub fn new() -> IntegerRing {
        IntegerRing
    }
}

impl Default for IntegerRing {
    fn default() -> Self {
        IntegerRing
    }
}

/// An arbitrary-precision integer. Values that fit in an `i64` are always stored
/// as [Integer::Natural], so that structural equality is numerical equality.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Integer {
    Natural(i64),
    Large(ArbitraryPrecisionInteger),
}

impl ToFiniteField<u32> for Integer {
    fn to_finite_field(&self, field: &FiniteField<u32>) -> <FiniteField<u32> as Ring>::Element {
        match self {
            &Integer::Natural(n) => field.to_element(n.rem_euclid(field.get_prime() as i64) as u32),
            Integer::Large(r) => field.to_element(r.mod_u(field.get_prime())),
        }
    }
}

impl ToFiniteField<u64> for Integer {
    fn to_finite_field(&self, field: &FiniteField<u64>) -> <FiniteField<u64> as Ring>::Element {
        match self {
            &Integer::Natural(n) => {
                field.to_element((n as i128).rem_euclid(field.get_prime() as i128) as u64)
            }
            Integer::Large(r) => {
                let m = r.clone().rem_euc(ArbitraryPrecisionInteger::from(field.get_prime()));
                field.to_element(m.to_u64().unwrap_or(0))
            }
        }
    }
}

impl From<i64> for Integer {
    #[inline]
    fn from(n: i64) -> Self {
        Integer::Natural(n)
    }
}

impl From<ArbitraryPrecisionInteger> for Integer {
    #[inline]
    fn from(r: ArbitraryPrecisionInteger) -> Self {
        Integer::from_large(r)
    }
}

impl Integer {
    pub fn new(num: i64) -> Integer {
        Integer::Natural(num)
    }

    /// Store `r` inline if it fits.
    #[inline]
    fn from_large(r: ArbitraryPrecisionInteger) -> Integer {
        match r.to_i64() {
            Some(n) => Integer::Natural(n),
            None => Integer::Large(r),
        }
    }

    #[inline]
    fn to_large(&self) -> ArbitraryPrecisionInteger {
        match self {
            Integer::Natural(n) => ArbitraryPrecisionInteger::from(*n),
            Integer::Large(r) => r.clone(),
        }
    }

    /// Convert an element of a prime field to the standard representative in `[0,p)`.
    pub fn from_finite_field<UField: FiniteFieldWorkspace>(
        field: &FiniteField<UField>,
        element: &<FiniteField<UField> as Ring>::Element,
    ) -> Integer
    where
        FiniteField<UField>: FiniteFieldCore<UField>,
    {
        Integer::from_u64(field.from_element(element).to_u64())
    }

    /// Convert an element of a prime field to the symmetric representative in `(-p/2,p/2]`.
    pub fn from_finite_field_symmetric<UField: FiniteFieldWorkspace>(
        field: &FiniteField<UField>,
        element: &<FiniteField<UField> as Ring>::Element,
    ) -> Integer
    where
        FiniteField<UField>: FiniteFieldCore<UField>,
    {
        let p = field.get_prime().to_u64();
        let n = field.from_element(element).to_u64();
        if n > p / 2 {
            Integer::Natural(-((p - n) as i64))
        } else {
            Integer::from_u64(n)
        }
    }

    /// The prime of the field as an integer.
    pub fn from_prime<UField: FiniteFieldWorkspace>(field: &FiniteField<UField>) -> Integer
    where
        FiniteField<UField>: FiniteFieldCore<UField>,
    {
        Integer::from_u64(field.get_prime().to_u64())
    }

    pub fn from_u64(n: u64) -> Integer {
        if n <= i64::MAX as u64 {
            Integer::Natural(n as i64)
        } else {
            Integer::Large(ArbitraryPrecisionInteger::from(n))
        }
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Integer::Natural(n) => Some(*n),
            Integer::Large(_) => None,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Integer::Natural(n) => *n < 0,
            Integer::Large(r) => r.cmp0() == Ordering::Less,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Integer::Natural(0))
    }

    pub fn abs(&self) -> Integer {
        match self {
            Integer::Natural(n) => match n.checked_abs() {
                Some(a) => Integer::Natural(a),
                None => Integer::Large(ArbitraryPrecisionInteger::from(*n).abs()),
            },
            Integer::Large(r) => Integer::Large(r.clone().abs()),
        }
    }

    /// The number of bits needed to store the absolute value.
    pub fn bits(&self) -> u64 {
        match self {
            Integer::Natural(n) => 64 - n.unsigned_abs().leading_zeros() as u64,
            Integer::Large(r) => r.as_abs().significant_bits() as u64,
        }
    }

    pub fn pow(&self, e: u64) -> Integer {
        if e > u32::MAX as u64 {
            panic!("Power of exponentation is larger than 2^32: {}", e);
        }
        let e = e as u32;

        match self {
            Integer::Natural(n1) => {
                if let Some(pn) = n1.checked_pow(e) {
                    Integer::Natural(pn)
                } else {
                    Integer::from_large(ArbitraryPrecisionInteger::from(*n1).pow(e))
                }
            }
            Integer::Large(r) => Integer::from_large(r.clone().pow(e)),
        }
    }

    /// Combine `self mod modulus` with `residue mod p` into the unique
    /// representative modulo `modulus * p` in the symmetric range.
    /// This is Garner's method with the mixed-radix digit computed in the prime field.
    pub fn chinese_remainder<UField: FiniteFieldWorkspace>(
        &self,
        modulus: &Integer,
        residue: &<FiniteField<UField> as Ring>::Element,
        field: &FiniteField<UField>,
    ) -> Integer
    where
        FiniteField<UField>: FiniteFieldCore<UField>,
        Integer: ToFiniteField<UField>,
    {
        let own = self.to_finite_field(field);
        let m = modulus.to_finite_field(field);
        let digit = field.div(&field.sub(residue, &own), &m);

        let new_modulus = modulus * &Integer::from_prime(field);
        let mut r = self + &(modulus * &Integer::from_finite_field(field, &digit));

        if &r * &Integer::Natural(2) > new_modulus {
            r -= &new_modulus;
        }
        r
    }
}

impl Display for Integer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Integer::Natural(n) => n.fmt(f),
            Integer::Large(r) => r.fmt(f),
        }
    }
}

impl Display for IntegerRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Z")
    }
}

impl PartialOrd for Integer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Integer {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Integer::Natural(n1), Integer::Natural(n2)) => n1.cmp(n2),
            (Integer::Natural(n1), Integer::Large(n2)) => {
                n2.partial_cmp(n1).unwrap_or(Ordering::Equal).reverse()
            }
            (Integer::Large(n1), Integer::Natural(n2)) => {
                n1.partial_cmp(n2).unwrap_or(Ordering::Equal)
            }
            (Integer::Large(n1), Integer::Large(n2)) => n1.cmp(n2),
        }
    }
}

impl Ring for IntegerRing {
    type Element = Integer;

    #[inline]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a + b
    }

    #[inline]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a - b
    }

    #[inline]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        a * b
    }

    #[inline]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a += b;
    }

    #[inline]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a -= b;
    }

    #[inline]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a *= b;
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        -a
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        Integer::Natural(0)
    }

    #[inline]
    fn one(&self) -> Self::Element {
        Integer::Natural(1)
    }

    #[inline]
    fn nth(&self, n: i64) -> Self::Element {
        Integer::Natural(n)
    }

    fn pow(&self, b: &Self::Element, e: u64) -> Self::Element {
        b.pow(e)
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.is_zero()
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        matches!(a, Integer::Natural(1))
    }

    fn one_is_gcd_unit() -> bool {
        true
    }

    fn is_characteristic_zero(&self) -> bool {
        true
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        Integer::Natural(rng.gen_range(range.0..range.1))
    }

    fn fmt_display(&self, element: &Self::Element, f: &mut Formatter<'_>) -> Result<(), Error> {
        element.fmt(f)
    }
}

impl EuclideanDomain for IntegerRing {
    fn rem(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.quot_rem(a, b).1
    }

    /// Euclidean division, with a remainder in `[0, |b|)`.
    fn quot_rem(&self, a: &Self::Element, b: &Self::Element) -> (Self::Element, Self::Element) {
        if let (Integer::Natural(a), Integer::Natural(b)) = (a, b) {
            if let (Some(q), Some(r)) = (a.checked_div_euclid(*b), a.checked_rem_euclid(*b)) {
                return (Integer::Natural(q), Integer::Natural(r));
            }
        }

        let (q, r) = a.to_large().div_rem_euc(b.to_large());
        (Integer::from_large(q), Integer::from_large(r))
    }

    fn gcd(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        match (a, b) {
            (Integer::Natural(n1), Integer::Natural(n2)) => {
                Integer::from_u64(utils::gcd_signed(*n1, *n2))
            }
            (Integer::Natural(n1), Integer::Large(r2))
            | (Integer::Large(r2), Integer::Natural(n1)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(*n1).gcd(r2))
            }
            (Integer::Large(r1), Integer::Large(r2)) => Integer::from_large(r1.clone().gcd(r2)),
        }
    }
}

impl<'a, 'b> Add<&'b Integer> for &'a Integer {
    type Output = Integer;

    fn add(self, rhs: &'b Integer) -> Integer {
        match (self, rhs) {
            (Integer::Natural(n1), Integer::Natural(n2)) => match n1.checked_add(*n2) {
                Some(n) => Integer::Natural(n),
                None => Integer::from_large(
                    ArbitraryPrecisionInteger::from(*n1) + ArbitraryPrecisionInteger::from(*n2),
                ),
            },
            (Integer::Natural(n1), Integer::Large(r2))
            | (Integer::Large(r2), Integer::Natural(n1)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(*n1) + r2)
            }
            (Integer::Large(r1), Integer::Large(r2)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(r1 + r2))
            }
        }
    }
}

impl<'a, 'b> Sub<&'b Integer> for &'a Integer {
    type Output = Integer;

    fn sub(self, rhs: &'b Integer) -> Integer {
        match (self, rhs) {
            (Integer::Natural(n1), Integer::Natural(n2)) => match n1.checked_sub(*n2) {
                Some(n) => Integer::Natural(n),
                None => Integer::from_large(
                    ArbitraryPrecisionInteger::from(*n1) - ArbitraryPrecisionInteger::from(*n2),
                ),
            },
            (Integer::Natural(n1), Integer::Large(r2)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(*n1) - r2)
            }
            (Integer::Large(r1), Integer::Natural(n2)) => {
                Integer::from_large(r1.clone() - ArbitraryPrecisionInteger::from(*n2))
            }
            (Integer::Large(r1), Integer::Large(r2)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(r1 - r2))
            }
        }
    }
}

impl<'a, 'b> Mul<&'b Integer> for &'a Integer {
    type Output = Integer;

    fn mul(self, rhs: &'b Integer) -> Integer {
        match (self, rhs) {
            (Integer::Natural(n1), Integer::Natural(n2)) => match n1.checked_mul(*n2) {
                Some(n) => Integer::Natural(n),
                None => Integer::from_large(
                    ArbitraryPrecisionInteger::from(*n1) * ArbitraryPrecisionInteger::from(*n2),
                ),
            },
            (Integer::Natural(n1), Integer::Large(r2))
            | (Integer::Large(r2), Integer::Natural(n1)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(*n1) * r2)
            }
            (Integer::Large(r1), Integer::Large(r2)) => {
                Integer::from_large(ArbitraryPrecisionInteger::from(r1 * r2))
            }
        }
    }
}

/// Division rounding towards zero.
impl<'a, 'b> Div<&'b Integer> for &'a Integer {
    type Output = Integer;

    fn div(self, rhs: &'b Integer) -> Integer {
        if let (Integer::Natural(n1), Integer::Natural(n2)) = (self, rhs) {
            if let Some(n) = n1.checked_div(*n2) {
                return Integer::Natural(n);
            }
        }

        Integer::from_large(self.to_large() / rhs.to_large())
    }
}

impl<'a> Neg for &'a Integer {
    type Output = Integer;

    fn neg(self) -> Self::Output {
        match self {
            Integer::Natural(n) => match n.checked_neg() {
                Some(neg) => Integer::Natural(neg),
                None => Integer::Large(-ArbitraryPrecisionInteger::from(*n)),
            },
            Integer::Large(r) => Integer::from_large(-r.clone()),
        }
    }
}

impl<'a> AddAssign<&'a Integer> for Integer {
    fn add_assign(&mut self, rhs: &'a Integer) {
        *self = &*self + rhs;
    }
}

impl<'a> SubAssign<&'a Integer> for Integer {
    fn sub_assign(&mut self, rhs: &'a Integer) {
        *self = &*self - rhs;
    }
}

impl<'a> MulAssign<&'a Integer> for Integer {
    fn mul_assign(&mut self, rhs: &'a Integer) {
        *self = &*self * rhs;
    }
}

#[cfg(test)]
mod test {
    use crate::rings::finite_field::{FiniteFieldCore, ToFiniteField, Zp, Zp64};
    use crate::rings::{EuclideanDomain, Ring};

    use super::{Integer, IntegerRing};

    #[test]
    fn overflow_roundtrip() {
        let a = Integer::Natural(i64::MAX);
        let b = &a + &Integer::Natural(1);
        assert!(matches!(b, Integer::Large(_)));

        let c = &b - &Integer::Natural(1);
        assert_eq!(c, a);

        let d = &b * &b;
        let e = &d / &b;
        assert_eq!(e, b);
        assert_eq!(-&Integer::Natural(i64::MIN), b);
        assert_eq!(b.bits(), 64);
        assert_eq!(Integer::Natural(-8).bits(), 4);
        assert_eq!(Integer::Natural(0).bits(), 0);
    }

    #[test]
    fn euclidean() {
        let z = IntegerRing::new();
        let (q, r) = z.quot_rem(&Integer::Natural(-7), &Integer::Natural(3));
        assert_eq!((q, r), (Integer::Natural(-3), Integer::Natural(2)));

        let big = Integer::Natural(3).pow(50);
        let g = z.gcd(&big, &Integer::Natural(-81));
        assert_eq!(g, Integer::Natural(81));
        assert_eq!(z.gcd(&Integer::Natural(0), &Integer::Natural(-5)), Integer::Natural(5));
    }

    #[test]
    fn crt() {
        let target = &Integer::Natural(-123456789123456789) * &Integer::Natural(1000000007);

        let p1 = Zp64::new(18446744073709551557);
        let p2 = Zp64::new(18446744073709551533);

        let mut acc = Integer::from_finite_field_symmetric(&p1, &target.to_finite_field(&p1));
        let m = Integer::from_prime(&p1);
        acc = acc.chinese_remainder(&m, &target.to_finite_field(&p2), &p2);

        assert_eq!(acc, target);
    }

    #[test]
    fn crt_small() {
        let f1 = Zp::new(7);
        let f2 = Zp::new(11);
        let r = Integer::Natural(3).chinese_remainder(
            &Integer::Natural(7),
            &f2.to_element(2),
            &f2,
        );
        // 24 = 3 mod 7, 2 mod 11, symmetric range is (-38, 38]
        assert_eq!(r, Integer::Natural(24));

        let s = Integer::from_finite_field_symmetric(&f1, &f1.nth(-3));
        assert_eq!(s, Integer::Natural(-3));
    }
}
