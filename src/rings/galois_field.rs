//! Extension fields `GF(p^n)` of the odd prime fields.
//!
//! An element is a polynomial of degree below `n` in the generator `a`, with
//! coefficients in `Z/pZ`, reduced modulo a monic irreducible polynomial.

use std::fmt::{Display, Error, Formatter};

use rand::Rng;
use smallvec::{smallvec, SmallVec};

use crate::poly::univariate::UnivariatePolynomial;
use crate::poly::Variable;

use super::finite_field::{FiniteField, FiniteFieldCore, FiniteFieldElement, FiniteFieldWorkspace};
use super::{EuclideanDomain, EvaluationField, Field, Ring};

/// The largest supported extension degree.
pub const MAX_EXTENSION_DEGREE: usize = 16;

/// An element of a [GaloisField], stored with the constant coefficient first
/// and without trailing zeros.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GaloisFieldElement<UField>(SmallVec<[FiniteFieldElement<UField>; 4]>);

impl<UField> GaloisFieldElement<UField> {
    /// The coefficients in the generator, lowest power first.
    pub fn coefficients(&self) -> &[FiniteFieldElement<UField>] {
        &self.0
    }
}

/// The field `GF(p^n) = Z/pZ[a] / (m(a))` for a monic irreducible `m` of degree `n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GaloisField<UField> {
    base: FiniteField<UField>,
    degree: usize,
    /// The coefficients of `m` below the leading one.
    modulus: [FiniteFieldElement<UField>; MAX_EXTENSION_DEGREE],
}

impl<UField: FiniteFieldWorkspace> Display for GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GF({}^{})", self.base.get_prime(), self.degree)
    }
}

impl<UField: FiniteFieldWorkspace> GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    /// Create the extension of `base` defined by `minimal_poly`, which must be
    /// monic and irreducible.
    pub fn new(
        base: FiniteField<UField>,
        minimal_poly: &UnivariatePolynomial<FiniteField<UField>>,
    ) -> Self {
        let degree = minimal_poly.degree();
        assert!(
            (1..=MAX_EXTENSION_DEGREE).contains(&degree),
            "Extension degree {} is not supported",
            degree
        );
        assert!(
            base.is_one(&minimal_poly.lcoeff()),
            "Minimal polynomial {} is not monic",
            minimal_poly
        );

        let mut modulus = [base.zero(); MAX_EXTENSION_DEGREE];
        modulus[..degree].copy_from_slice(&minimal_poly.coefficients[..degree]);
        GaloisField {
            base,
            degree,
            modulus,
        }
    }

    /// Construct `GF(p^degree)`. The irreducible polynomial is determined automatically.
    pub fn find(base: FiniteField<UField>, degree: usize) -> Self {
        assert!(
            (1..=MAX_EXTENSION_DEGREE).contains(&degree),
            "Extension degree {} is not supported",
            degree
        );

        let p = base.get_prime().to_u64();
        let mut coeffs = vec![0; degree + 1];
        coeffs[degree] = 1;

        if degree == 1 {
            return Self::new(base, &polynomial_from_u64(&base, &coeffs));
        }

        // try shape x^n+k2*x+k for cheap reduction
        for k2 in 0..p {
            for k in 1..p {
                coeffs[0] = k;
                coeffs[1] = k2;

                let f = polynomial_from_u64(&base, &coeffs);
                if is_irreducible(&f) {
                    return Self::new(base, &f);
                }
            }
        }

        let mut r = rand::thread_rng();
        loop {
            for c in &mut coeffs[..degree] {
                *c = r.gen_range(0..p);
            }

            let f = polynomial_from_u64(&base, &coeffs);
            if is_irreducible(&f) {
                return Self::new(base, &f);
            }
        }
    }

    pub fn base(&self) -> &FiniteField<UField> {
        &self.base
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// The monic polynomial that defines the extension.
    pub fn minimal_poly(&self) -> UnivariatePolynomial<FiniteField<UField>> {
        let mut f = UnivariatePolynomial::new(&self.base, Some(self.degree + 1), Variable::new("a"));
        f.coefficients.extend_from_slice(&self.modulus[..self.degree]);
        f.coefficients.push(self.base.one());
        f
    }

    /// The generator `a` of the extension.
    pub fn generator(&self) -> GaloisFieldElement<UField> {
        self.reduce(smallvec![self.base.zero(), self.base.one()])
    }

    /// The element `sum_i coeffs[i] * a^i`.
    pub fn element(&self, coeffs: &[u64]) -> GaloisFieldElement<UField> {
        let p = self.base.get_prime().to_u64();
        self.reduce(
            coeffs
                .iter()
                .map(|c| self.base.to_element(UField::from_u64(c % p)))
                .collect(),
        )
    }

    /// Embed an element of the prime field.
    pub fn from_base(&self, c: &FiniteFieldElement<UField>) -> GaloisFieldElement<UField> {
        trim(smallvec![*c])
    }

    /// Reduce the coefficients modulo the minimal polynomial.
    fn reduce(&self, mut c: SmallVec<[FiniteFieldElement<UField>; 4]>) -> GaloisFieldElement<UField> {
        let n = self.degree;
        for k in (n..c.len()).rev() {
            let t = c[k];
            if FiniteField::<UField>::is_zero(&t) {
                continue;
            }
            for (i, m) in self.modulus[..n].iter().enumerate() {
                self.base.sub_mul_assign(&mut c[k - n + i], &t, m);
            }
        }
        c.truncate(n);
        trim(c)
    }

    fn to_univariate(&self, a: &GaloisFieldElement<UField>) -> UnivariatePolynomial<FiniteField<UField>> {
        let mut f = UnivariatePolynomial::new(&self.base, Some(a.0.len()), Variable::new("a"));
        f.coefficients.extend_from_slice(&a.0);
        f
    }
}

fn trim<UField: FiniteFieldWorkspace>(
    mut c: SmallVec<[FiniteFieldElement<UField>; 4]>,
) -> GaloisFieldElement<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    while c.last().map_or(false, FiniteField::<UField>::is_zero) {
        c.pop();
    }
    GaloisFieldElement(c)
}

/// A monic polynomial over `base` with coefficients `coeffs` in standard form.
fn polynomial_from_u64<UField: FiniteFieldWorkspace>(
    base: &FiniteField<UField>,
    coeffs: &[u64],
) -> UnivariatePolynomial<FiniteField<UField>>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    let mut f = UnivariatePolynomial::new(base, Some(coeffs.len()), Variable::new("a"));
    f.coefficients = coeffs
        .iter()
        .map(|c| base.to_element(UField::from_u64(*c)))
        .collect();
    f
}

/// Ben-Or's test: `f` of degree `n` is irreducible if `gcd(x^(p^i) - x, f) = 1`
/// for all `i <= n/2`.
fn is_irreducible<UField: FiniteFieldWorkspace>(f: &UnivariatePolynomial<FiniteField<UField>>) -> bool
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    let p = f.field.get_prime().to_u64();
    let x = f.monomial(f.field.one(), 1);
    let mut h = x.clone();
    for _ in 0..f.degree() / 2 {
        h = h.pow_mod(p, f);
        if !(&h - &x).gcd(f).is_one() {
            return false;
        }
    }
    true
}

impl<UField: FiniteFieldWorkspace> Ring for GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    type Element = GaloisFieldElement<UField>;

    fn add(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let (long, short) = if a.0.len() >= b.0.len() { (a, b) } else { (b, a) };
        let mut c = long.0.clone();
        for (x, y) in c.iter_mut().zip(&short.0) {
            self.base.add_assign(x, y);
        }
        trim(c)
    }

    fn sub(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        let mut c = a.0.clone();
        if c.len() < b.0.len() {
            c.resize(b.0.len(), self.base.zero());
        }
        for (x, y) in c.iter_mut().zip(&b.0) {
            self.base.sub_assign(x, y);
        }
        trim(c)
    }

    fn mul(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        if a.0.is_empty() || b.0.is_empty() {
            return self.zero();
        }

        let mut c: SmallVec<[_; 4]> = smallvec![self.base.zero(); a.0.len() + b.0.len() - 1];
        for (i, x) in a.0.iter().enumerate() {
            for (j, y) in b.0.iter().enumerate() {
                self.base.add_mul_assign(&mut c[i + j], x, y);
            }
        }
        self.reduce(c)
    }

    fn add_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.add(a, b);
    }

    fn sub_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.sub(a, b);
    }

    fn mul_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.mul(a, b);
    }

    fn neg(&self, a: &Self::Element) -> Self::Element {
        GaloisFieldElement(a.0.iter().map(|x| self.base.neg(x)).collect())
    }

    fn zero(&self) -> Self::Element {
        GaloisFieldElement(SmallVec::new())
    }

    fn one(&self) -> Self::Element {
        GaloisFieldElement(smallvec![self.base.one()])
    }

    fn nth(&self, n: i64) -> Self::Element {
        trim(smallvec![self.base.nth(n)])
    }

    fn pow(&self, b: &Self::Element, mut e: u64) -> Self::Element {
        let mut b = b.clone();
        let mut x = self.one();
        while e != 0 {
            if e & 1 != 0 {
                x = self.mul(&x, &b);
            }
            e /= 2;
            if e != 0 {
                b = self.mul(&b, &b);
            }
        }
        x
    }

    #[inline]
    fn is_zero(a: &Self::Element) -> bool {
        a.0.is_empty()
    }

    #[inline]
    fn is_one(&self, a: &Self::Element) -> bool {
        a.0.len() == 1 && self.base.is_one(&a.0[0])
    }

    fn one_is_gcd_unit() -> bool {
        true
    }

    fn is_characteristic_zero(&self) -> bool {
        false
    }

    fn sample(&self, rng: &mut impl rand::RngCore, range: (i64, i64)) -> Self::Element {
        let n = rng.gen_range(range.0..range.1);
        self.element_at(n.unsigned_abs() % self.size())
    }

    fn fmt_display(&self, element: &Self::Element, f: &mut Formatter<'_>) -> Result<(), Error> {
        if element.0.is_empty() {
            return f.write_str("0");
        }

        let nterms = element.0.iter().filter(|c| !FiniteField::<UField>::is_zero(c)).count();
        if nterms > 1 {
            f.write_str("(")?;
        }

        let mut first = true;
        for (i, c) in element.0.iter().enumerate().rev() {
            if FiniteField::<UField>::is_zero(c) {
                continue;
            }
            if !first {
                f.write_str("+")?;
            }
            first = false;

            let c = self.base.from_element(c).to_u64();
            if i == 0 {
                write!(f, "{}", c)?;
                continue;
            }
            if c != 1 {
                write!(f, "{}*", c)?;
            }
            if i == 1 {
                f.write_str("a")?;
            } else {
                write!(f, "a^{}", i)?;
            }
        }

        if nterms > 1 {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl<UField: FiniteFieldWorkspace> EuclideanDomain for GaloisField<UField>
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

impl<UField: FiniteFieldWorkspace> Field for GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    #[inline]
    fn div(&self, a: &Self::Element, b: &Self::Element) -> Self::Element {
        self.mul(a, &self.inv(b))
    }

    #[inline]
    fn div_assign(&self, a: &mut Self::Element, b: &Self::Element) {
        *a = self.div(a, b);
    }

    /// Invert `a` with the extended Euclidean algorithm on its representative.
    fn inv(&self, a: &Self::Element) -> Self::Element {
        assert!(!Self::is_zero(a), "0 is not invertible");

        // s0 * a = r0 and s1 * a = r1 modulo the minimal polynomial
        let mut r0 = self.minimal_poly();
        let mut r1 = self.to_univariate(a);
        let mut s0 = r0.zero();
        let mut s1 = r0.one();
        while !r1.is_zero() {
            let (q, r) = r0.quot_rem(&r1);
            let s = &s0 - &(&q * &s1);
            r0 = r1;
            r1 = r;
            s0 = s1;
            s1 = s;
        }

        // r0 is a nonzero constant as the minimal polynomial is irreducible
        let s0 = s0.mul_coeff(&self.base.inv(&r0.lcoeff()));
        self.reduce(s0.coefficients.into_iter().collect())
    }
}

impl<UField: FiniteFieldWorkspace> EvaluationField for GaloisField<UField>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    fn size(&self) -> u64 {
        self.base.size().saturating_pow(self.degree as u32)
    }

    /// The element whose coefficients are the base-`p` digits of `n`.
    fn element_at(&self, mut n: u64) -> Self::Element {
        let p = self.base.size();
        let mut c = SmallVec::new();
        while n > 0 && c.len() < self.degree {
            c.push(self.base.element_at(n % p));
            n /= p;
        }
        trim(c)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use crate::poly::univariate::UnivariatePolynomial;
    use crate::poly::Variable;
    use crate::rings::finite_field::{FiniteFieldCore, Zp};
    use crate::rings::{EvaluationField, Field, Ring};

    use super::{is_irreducible, polynomial_from_u64, GaloisField};

    fn gf49() -> GaloisField<u32> {
        let base = Zp::new(7);
        GaloisField::new(base, &polynomial_from_u64(&base, &[1, 0, 1]))
    }

    #[test]
    fn arithmetic() {
        let field = gf49();
        let a = field.generator();
        let a1 = field.add(&a, &field.one());

        assert_eq!(field.mul(&a, &a), field.nth(-1));
        assert_eq!(field.mul(&a1, &a1), field.element(&[0, 2]));
        assert_eq!(field.sub(&a1, &a), field.one());
        assert!(GaloisField::<u32>::is_zero(&field.sub(&a1, &a1)));
        assert!(field.is_one(&field.pow(&a, 4)));
        assert_eq!(field.inv(&a1), field.element(&[4, 3]));
        assert_eq!(field.div(&field.one(), &a), field.neg(&a));
    }

    #[test]
    fn display() {
        let field = gf49();
        assert_eq!(field.to_string(), "GF(7^2)");
        assert_eq!(format!("{}", Printed(&field, &field.element(&[4, 3]))), "(3*a+4)");
        assert_eq!(format!("{}", Printed(&field, &field.generator())), "a");
        assert_eq!(format!("{}", Printed(&field, &field.element(&[0, 5]))), "5*a");
        assert_eq!(format!("{}", Printed(&field, &field.zero())), "0");
    }

    #[test]
    fn enumerate_elements() {
        let field = gf49();
        assert_eq!(field.size(), 49);

        let elements: HashSet<_> = (0..field.size()).map(|n| field.element_at(n)).collect();
        assert_eq!(elements.len(), 49);

        for x in elements.iter().filter(|x| !GaloisField::<u32>::is_zero(x)) {
            assert!(field.is_one(&field.mul(x, &field.inv(x))));
            assert!(field.is_one(&field.pow(x, 48)));
        }
    }

    #[test]
    fn irreducibility() {
        let base = Zp::new(5);
        // x^2+1 = (x+2)*(x+3) mod 5
        assert!(!is_irreducible(&polynomial_from_u64(&base, &[1, 0, 1])));
        assert!(is_irreducible(&polynomial_from_u64(&base, &[2, 0, 1])));
        // (x^2+2)*(x^2+3) has no roots but is reducible
        assert!(!is_irreducible(&polynomial_from_u64(&base, &[1, 0, 0, 0, 1])));
    }

    #[test]
    fn find_extension() {
        let field = GaloisField::find(Zp::new(3), 4);
        assert_eq!(field.size(), 81);
        assert!(is_irreducible(&field.minimal_poly()));

        for n in 1..field.size() {
            let x = field.element_at(n);
            assert!(field.is_one(&field.pow(&x, 80)));
        }

        let prime = GaloisField::find(Zp::new(101), 1);
        assert_eq!(prime.size(), 101);
        let x = prime.element(&[57]);
        assert!(prime.is_one(&prime.mul(&x, &prime.inv(&x))));
    }

    #[test]
    #[should_panic]
    fn non_monic_minimal_poly() {
        let base = Zp::new(7);
        let mut f = UnivariatePolynomial::new(&base, None, Variable::new("a"));
        f.coefficients = vec![base.to_element(1), base.to_element(3)];
        GaloisField::new(base, &f);
    }

    struct Printed<'a>(&'a GaloisField<u32>, &'a <GaloisField<u32> as Ring>::Element);

    impl<'a> std::fmt::Display for Printed<'a> {
        fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            self.0.fmt_display(self.1, f)
        }
    }
}
