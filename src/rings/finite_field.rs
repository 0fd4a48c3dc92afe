//! Prime fields `Z/pZ` for odd machine-word primes, using Montgomery arithmetic.

use rand::Rng;
use std::fmt::{Debug, Display, Error, Formatter};
use std::hash::Hash;

use super::{EuclideanDomain, EvaluationField, Field, Ring};

const HENSEL_LIFTING_MASK: [u8; 128] = [
    255, 85, 51, 73, 199, 93, 59, 17, 15, 229, 195, 89, 215, 237, 203, 33, 31, 117, 83, 105, 231,
    125, 91, 49, 47, 5, 227, 121, 247, 13, 235, 65, 63, 149, 115, 137, 7, 157, 123, 81, 79, 37, 3,
    153, 23, 45, 11, 97, 95, 181, 147, 169, 39, 189, 155, 113, 111, 69, 35, 185, 55, 77, 43, 129,
    127, 213, 179, 201, 71, 221, 187, 145, 143, 101, 67, 217, 87, 109, 75, 161, 159, 245, 211, 233,
    103, 253, 219, 177, 175, 133, 99, 249, 119, 141, 107, 193, 191, 21, 243, 9, 135, 29, 251, 209,
    207, 165, 131, 25, 151, 173, 139, 225, 223, 53, 19, 41, 167, 61, 27, 241, 239, 197, 163, 57,
    183, 205, 171, 1,
];

/// A 32-bit prime field.
pub type Zp = FiniteField<u32>;
/// A 64-bit prime field.
pub type Zp64 = FiniteField<u64>;

/// An unsigned machine word that can hold the prime of a [FiniteField].
pub trait FiniteFieldWorkspace:
    Copy + Clone + Display + Debug + Eq + Hash + Ord + Send + Sync + 'static
{
    fn to_u64(&self) -> u64;
    /// Truncating conversion from `u64`. The caller guarantees that `n` fits.
    fn from_u64(n: u64) -> Self;
}

impl FiniteFieldWorkspace for u32 {
    #[inline(always)]
    fn to_u64(&self) -> u64 {
        *self as u64
    }

    #[inline(always)]
    fn from_u64(n: u64) -> Self {
        n as u32
    }
}

impl FiniteFieldWorkspace for u64 {
    #[inline(always)]
    fn to_u64(&self) -> u64 {
        *self
    }

    #[inline(always)]
    fn from_u64(n: u64) -> Self {
        n
    }
}

pub trait FiniteFieldCore<UField: FiniteFieldWorkspace>:
    Field<Element = FiniteFieldElement<UField>>
{
    /// Create a new finite field with modulus prime `p`.
    fn new(p: UField) -> Self;
    fn get_prime(&self) -> UField;
    /// Convert a number to a representative in a prime field.
    fn to_element(&self, a: UField) -> Self::Element;
    /// Convert a number from the finite field to standard form `[0,p)`.
    fn from_element(&self, a: &Self::Element) -> UField;
}

pub trait ToFiniteField<UField: FiniteFieldWorkspace>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn to_finite_field(&self, field: &FiniteField<UField>) -> <FiniteField<UField> as Ring>::Element;
}

/// A number in a finite field, stored in Montgomery form.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FiniteFieldElement<UField>(pub(crate) UField);

/// The field `Z/pZ` for an odd prime `p`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FiniteField<UField> {
    p: UField,
    m: UField,
    one: FiniteFieldElement<UField>,
}

impl<UField: Display> Display for FiniteField<UField> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Z_{}", self.p)
    }
}

/// Compute `a^-1 mod p` for `0 < a < p` with the extended Euclidean algorithm.
fn inverse_mod(a: u64, p: u64) -> u64 {
    let (mut t, mut new_t) = (0i128, 1i128);
    let (mut r, mut new_r) = (p as i128, a as i128);
    while new_r != 0 {
        let q = r / new_r;
        (t, new_t) = (new_t, t - q * new_t);
        (r, new_r) = (new_r, r - q * new_r);
    }

    assert!(r == 1, "{} is not invertible mod {}", a, p);
    if t < 0 {
        t += p as i128;
    }
    t as u64
}

impl Zp {
    /// Create a new field from an odd prime `p`.
    pub fn new(p: u32) -> Zp {
        if p % 2 == 0 {
            panic!("Even modulus {} is not supported", p);
        }

        FiniteField {
            p,
            m: Self::inv_2_32(p),
            one: FiniteFieldElement(((1u64 << 32) % p as u64) as u32),
        }
    }

    /// Returns -a^-1 mod 2^32.
    fn inv_2_32(a: u32) -> u32 {
        let mut ret: u32 = HENSEL_LIFTING_MASK[((a >> 1) & 127) as usize] as u32;
        ret = ret.wrapping_mul(a.wrapping_mul(ret).wrapping_add(2));
        ret = ret.wrapping_mul(a.wrapping_mul(ret).wrapping_add(2));
        ret
    }
}

impl Zp64 {
    /// Create a new field from an odd prime `p`.
    pub fn new(p: u64) -> Zp64 {
        if p % 2 == 0 {
            panic!("Even modulus {} is not supported", p);
        }

        FiniteField {
            p,
            m: Self::inv_2_64(p),
            one: FiniteFieldElement(((1u128 << 64) % p as u128) as u64),
        }
    }

    /// Returns -a^-1 mod 2^64.
    fn inv_2_64(a: u64) -> u64 {
        let mut ret: u64 = HENSEL_LIFTING_MASK[((a >> 1) & 127) as usize] as u64;
        ret = ret.wrapping_mul(a.wrapping_mul(ret).wrapping_add(2));
        ret = ret.wrapping_mul(a.wrapping_mul(ret).wrapping_add(2));
        ret = ret.wrapping_mul(a.wrapping_mul(ret).wrapping_add(2));
        ret
    }
}

impl FiniteFieldCore<u32> for Zp {
    fn new(p: u32) -> Zp {
        Zp::new(p)
    }

    #[inline(always)]
    fn get_prime(&self) -> u32 {
        self.p
    }

    #[inline(always)]
    fn to_element(&self, a: u32) -> FiniteFieldElement<u32> {
        FiniteFieldElement((((a as u64) << 32) % self.p as u64) as u32)
    }

    #[inline(always)]
    fn from_element(&self, a: &FiniteFieldElement<u32>) -> u32 {
        self.mul(a, &FiniteFieldElement(1)).0
    }
}

impl FiniteFieldCore<u64> for Zp64 {
    fn new(p: u64) -> Zp64 {
        Zp64::new(p)
    }

    #[inline(always)]
    fn get_prime(&self) -> u64 {
        self.p
    }

    #[inline(always)]
    fn to_element(&self, a: u64) -> FiniteFieldElement<u64> {
        FiniteFieldElement((((a as u128) << 64) % self.p as u128) as u64)
    }

    #[inline(always)]
    fn from_element(&self, a: &FiniteFieldElement<u64>) -> u64 {
        self.mul(a, &FiniteFieldElement(1)).0
    }
}

impl Ring for Zp {
    type Element = FiniteFieldElement<u32>;

    #[inline(always)]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let t = a.0 as u64 + b.0 as u64;
        if t >= self.p as u64 {
            FiniteFieldElement((t - self.p as u64) as u32)
        } else {
            FiniteFieldElement(t as u32)
        }
    }

    #[inline(always)]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if a.0 >= b.0 {
            FiniteFieldElement(a.0 - b.0)
        } else {
            FiniteFieldElement(a.0 + (self.p - b.0))
        }
    }

    #[inline(always)]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let t = a.0 as u64 * b.0 as u64;
        let m = (t as u32).wrapping_mul(self.m);
        let (t, overflow) = t.overflowing_add(m as u64 * self.p as u64);
        let u = (t >> 32) as u32;

        if overflow {
            FiniteFieldElement(u.wrapping_sub(self.p))
        } else if u >= self.p {
            FiniteFieldElement(u - self.p)
        } else {
            FiniteFieldElement(u)
        }
    }

    #[inline(always)]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.add(a, b);
    }

    #[inline(always)]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.sub(a, b);
    }

    #[inline(always)]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, b);
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        if a.0 == 0 {
            *a
        } else {
            FiniteFieldElement(self.p - a.0)
        }
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        FiniteFieldElement(0)
    }

    #[inline]
    fn one(&self) -> Self::Element {
        self.one
    }

    fn nth(&self, n: i64) -> Self::Element {
        self.to_element(n.rem_euclid(self.p as i64) as u32)
    }

    fn pow(&self, b: &Self::Element, mut e: u64) -> Self::Element {
        let mut b = *b;
        let mut x = self.one;
        while e != 0 {
            if e & 1 != 0 {
                x = self.mul(&x, &b);
            }
            b = self.mul(&b, &b);
            e /= 2;
        }
        x
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.0 == 0
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        *a == self.one
    }

    fn one_is_gcd_unit() -> bool {
        true
    }

    fn is_characteristic_zero(&self) -> bool {
        false
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        self.nth(rng.gen_range(range.0..range.1))
    }

    fn fmt_display(&self, element: &Self::Element, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.from_element(element))
    }
}

impl Ring for Zp64 {
    type Element = FiniteFieldElement<u64>;

    #[inline(always)]
    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let t = a.0 as u128 + b.0 as u128;
        if t >= self.p as u128 {
            FiniteFieldElement((t - self.p as u128) as u64)
        } else {
            FiniteFieldElement(t as u64)
        }
    }

    #[inline(always)]
    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if a.0 >= b.0 {
            FiniteFieldElement(a.0 - b.0)
        } else {
            FiniteFieldElement(a.0 + (self.p - b.0))
        }
    }

    #[inline(always)]
    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let t = a.0 as u128 * b.0 as u128;
        let m = (t as u64).wrapping_mul(self.m);
        let (t, overflow) = t.overflowing_add(m as u128 * self.p as u128);
        let u = (t >> 64) as u64;

        if overflow {
            FiniteFieldElement(u.wrapping_sub(self.p))
        } else if u >= self.p {
            FiniteFieldElement(u - self.p)
        } else {
            FiniteFieldElement(u)
        }
    }

    #[inline(always)]
    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.add(a, b);
    }

    #[inline(always)]
    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.sub(a, b);
    }

    #[inline(always)]
    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, b);
    }

    #[inline]
    fn neg(&self, a: &Self::Element) -> Self::Element {
        if a.0 == 0 {
            *a
        } else {
            FiniteFieldElement(self.p - a.0)
        }
    }

    #[inline]
    fn zero(&self) -> Self::Element {
        FiniteFieldElement(0)
    }

    #[inline]
    fn one(&self) -> Self::Element {
        self.one
    }

    fn nth(&self, n: i64) -> Self::Element {
        self.to_element((n as i128).rem_euclid(self.p as i128) as u64)
    }

    fn pow(&self, b: &Self::Element, mut e: u64) -> Self::Element {
        let mut b = *b;
        let mut x = self.one;
        while e != 0 {
            if e & 1 != 0 {
                x = self.mul(&x, &b);
            }
            b = self.mul(&b, &b);
            e /= 2;
        }
        x
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.0 == 0
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        *a == self.one
    }

    fn one_is_gcd_unit() -> bool {
        true
    }

    fn is_characteristic_zero(&self) -> bool {
        false
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        self.nth(rng.gen_range(range.0..range.1))
    }

    fn fmt_display(&self, element: &Self::Element, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.from_element(element))
    }
}

impl<UField: FiniteFieldWorkspace> EuclideanDomain for FiniteField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    #[inline]
    fn rem(&self, _: &Self::Element, _: &Self::Element) -> Self::Element {
        self.zero()
    }

    #[inline]
    fn quot_rem(&self, a: &Self::Element, b: &Self::Element) -> (Self::Element, Self::Element) {
        (self.div(a, b), self.zero())
    }

    #[inline]
    fn gcd(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if Self::is_zero(a) && Self::is_zero(b) {
            self.zero()
        } else {
            self.one()
        }
    }
}

impl<UField: FiniteFieldWorkspace> Field for FiniteField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    #[inline]
    fn div(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.mul(a, &self.inv(b))
    }

    #[inline]
    fn div_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, &self.inv(b));
    }

    /// Computes x^-1 mod p.
    fn inv(&self, a: &Self::Element) -> Self::Element {
        assert!(!Self::is_zero(a), "0 is not invertible");
        let p = self.get_prime().to_u64();
        let x = self.from_element(a).to_u64();
        self.to_element(UField::from_u64(inverse_mod(x, p)))
    }
}

impl<UField: FiniteFieldWorkspace> EvaluationField for FiniteField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn size(&self) -> u64 {
        self.get_prime().to_u64()
    }

    fn element_at(&self, n: u64) -> Self::Element {
        self.to_element(UField::from_u64(n))
    }
}

/// Do a deterministic Miller test to check if `n` is a prime.
/// Since `n` is a `u64`, a basis of only 7 witnesses has to be tested.
pub fn is_prime_u64(n: u64) -> bool {
    // shortest SPRP basis from Jim Sinclair for testing primality of u64
    let witnesses: [u64; 7] = [2, 325, 9375, 28178, 450775, 9780504, 1795265022];

    if n < 2 {
        return false;
    }

    if n % 2 == 0 {
        return n == 2;
    }

    let mut s = 0;
    let mut d = n - 1;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }

    let f = Zp64::new(n);
    let neg_one = f.neg(&f.one());

    'test: for a in witnesses {
        let a = f.to_element(a);

        if Zp64::is_zero(&a) {
            continue;
        }

        let mut x = f.pow(&a, d);

        if f.is_one(&x) || x == neg_one {
            continue;
        }

        for _ in 0..s {
            x = f.mul(&x, &x);

            if f.is_one(&x) {
                return false;
            }
            if x == neg_one {
                continue 'test;
            }
        }

        return false;
    }

    true
}

/// Returns the smallest prime larger than `n`, or `None` when it does not fit in a `u64`.
pub fn next_prime(n: u64) -> Option<u64> {
    PrimeIteratorU64::new(n).next()
}

/// Sample a random prime in `[2, bound)`. Returns `None` when `bound <= 2`.
pub fn random_prime_below(bound: u64, rng: &mut impl rand::RngCore) -> Option<u64> {
    if bound <= 2 {
        return None;
    }

    loop {
        let n = rng.gen_range(2..bound);
        if is_prime_u64(n) {
            return Some(n);
        }
    }
}

/// An interator over consecutive 64-bit primes.
pub struct PrimeIteratorU64 {
    current_number: u64,
}

impl PrimeIteratorU64 {
    /// Create a new prime iterator that yields primes larger than `start`.
    pub fn new(start: u64) -> PrimeIteratorU64 {
        PrimeIteratorU64 {
            current_number: start.max(1),
        }
    }
}

impl Iterator for PrimeIteratorU64 {
    type Item = u64;

    /// Yield the next prime or `None` if `u64::MAX` has been reached.
    fn next(&mut self) -> Option<u64> {
        while self.current_number < u64::MAX {
            self.current_number += 1;

            if is_prime_u64(self.current_number) {
                return Some(self.current_number);
            }
        }

        None
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn arithmetic_u32() {
        let field = Zp::new(17);
        let a = field.to_element(12);
        let b = field.to_element(9);

        assert_eq!(field.from_element(&field.add(&a, &b)), 4);
        assert_eq!(field.from_element(&field.sub(&b, &a)), 14);
        assert_eq!(field.from_element(&field.mul(&a, &b)), 6);
        assert_eq!(field.from_element(&field.neg(&a)), 5);
        assert_eq!(field.from_element(&field.nth(-3)), 14);
        assert_eq!(field.from_element(&field.div(&a, &b)), 7);

        let inv = field.inv(&a);
        assert!(field.is_one(&field.mul(&a, &inv)));
    }

    #[test]
    fn arithmetic_u64() {
        let p = 18446744073709551557;
        let field = Zp64::new(p);
        let a = field.to_element(p - 1);
        let b = field.to_element(p - 2);

        assert_eq!(field.from_element(&field.mul(&a, &b)), 2);
        assert_eq!(field.from_element(&field.add(&a, &b)), p - 3);
        assert_eq!(field.from_element(&field.pow(&b, p - 1)), 1);

        let inv = field.inv(&b);
        assert!(field.is_one(&field.mul(&inv, &b)));
    }

    #[test]
    fn fermat() {
        let field = Zp::new(43051);
        let a = field.to_element(12345);
        assert!(field.is_one(&field.pow(&a, 43050)));
    }

    #[test]
    #[should_panic]
    fn zero_inverse() {
        let field = Zp::new(17);
        field.inv(&field.zero());
    }

    #[test]
    fn primes() {
        assert!(is_prime_u64(2));
        assert!(is_prime_u64(43051));
        assert!(is_prime_u64((1 << 61) - 1));
        assert!(is_prime_u64(18446744073709551557));
        assert!(!is_prime_u64(561));
        assert!(!is_prime_u64(1));
        assert!(!is_prime_u64(18446744073709551559));

        assert_eq!(next_prime(100), Some(101));
        assert_eq!(next_prime(18446744073709551557), None);
        assert_eq!(
            PrimeIteratorU64::new(10).take(4).collect::<Vec<_>>(),
            vec![11, 13, 17, 19]
        );

        let mut rng = StdRng::seed_from_u64(7);
        let p = random_prime_below(1 << 40, &mut rng).unwrap();
        assert!(p < 1 << 40 && is_prime_u64(p));
        assert_eq!(random_prime_below(2, &mut rng), None);
    }
}
