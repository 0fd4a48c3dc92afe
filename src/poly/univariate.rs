//! Dense univariate polynomials, used for the univariate GCD path and for
//! root finding in the Berlekamp-Massey interpolation.

use std::fmt::Display;
use std::ops::{Add, Mul, Neg, Sub};

use rand::thread_rng;

use crate::rings::finite_field::{FiniteField, FiniteFieldCore, FiniteFieldWorkspace};
use crate::rings::integer::{Integer, IntegerRing};
use crate::rings::{EuclideanDomain, Field, Ring};

use super::polynomial::MultivariatePolynomial;
use super::{Exponent, Variable};

/// A dense polynomial in one variable, stored with the lowest degree first.
/// The last coefficient is nonzero, unless the polynomial is zero, in which
/// case there are no coefficients at all.
#[derive(Clone, PartialEq, Debug)]
pub struct UnivariatePolynomial<F: Ring> {
    pub coefficients: Vec<F::Element>,
    pub field: F,
    pub variable: Variable,
}

impl<F: Ring> UnivariatePolynomial<F> {
    pub fn new(field: &F, cap: Option<usize>, variable: Variable) -> Self {
        Self {
            coefficients: Vec::with_capacity(cap.unwrap_or(0)),
            field: *field,
            variable,
        }
    }

    #[inline]
    pub fn zero(&self) -> Self {
        Self::new(&self.field, None, self.variable.clone())
    }

    pub fn constant(&self, coeff: F::Element) -> Self {
        self.monomial(coeff, 0)
    }

    #[inline]
    pub fn one(&self) -> Self {
        self.constant(self.field.one())
    }

    /// `coeff * x^exp`.
    pub fn monomial(&self, coeff: F::Element, exp: usize) -> Self {
        if F::is_zero(&coeff) {
            return self.zero();
        }

        let mut coefficients = vec![self.field.zero(); exp + 1];
        coefficients[exp] = coeff;
        Self {
            coefficients,
            field: self.field,
            variable: self.variable.clone(),
        }
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.coefficients.is_empty()
    }

    #[inline]
    pub fn is_one(&self) -> bool {
        self.coefficients.len() == 1 && self.field.is_one(&self.coefficients[0])
    }

    #[inline]
    pub fn is_constant(&self) -> bool {
        self.coefficients.len() <= 1
    }

    /// The degree of the polynomial. The zero polynomial has degree 0.
    #[inline]
    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn lcoeff(&self) -> F::Element {
        self.coefficients
            .last()
            .cloned()
            .unwrap_or_else(|| self.field.zero())
    }

    /// Remove leading zero coefficients.
    pub(crate) fn truncate(&mut self) {
        while let Some(c) = self.coefficients.last() {
            if !F::is_zero(c) {
                break;
            }
            self.coefficients.pop();
        }
    }

    /// Evaluate the polynomial at `x` using Horner's scheme.
    pub fn evaluate(&self, x: &F::Element) -> F::Element {
        let mut res = self.field.zero();
        for c in self.coefficients.iter().rev() {
            self.field.mul_assign(&mut res, x);
            self.field.add_assign(&mut res, c);
        }
        res
    }

    pub fn mul_coeff(mut self, c: &F::Element) -> Self {
        for cc in &mut self.coefficients {
            self.field.mul_assign(cc, c);
        }
        self.truncate();
        self
    }

    /// Multiply by `x^exp`.
    pub fn mul_exp(mut self, exp: usize) -> Self {
        if self.is_zero() || exp == 0 {
            return self;
        }

        self.coefficients
            .splice(0..0, std::iter::repeat(self.field.zero()).take(exp));
        self
    }

    pub fn pow(&self, mut e: usize) -> Self {
        let mut x = self.clone();
        let mut res = self.one();
        while e != 0 {
            if e & 1 != 0 {
                res = &res * &x;
            }
            e /= 2;
            if e != 0 {
                x = &x * &x;
            }
        }
        res
    }
}

impl<F: Ring> Display for UnivariatePolynomial<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }

        struct Coeff<'a, F: Ring>(&'a F, &'a F::Element);
        impl<'a, F: Ring> Display for Coeff<'a, F> {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                self.0.fmt_display(self.1, f)
            }
        }

        let mut first = true;
        for (e, c) in self.coefficients.iter().enumerate().rev() {
            if F::is_zero(c) {
                continue;
            }

            let c = Coeff(&self.field, c).to_string();
            let (sign, body) = match c.strip_prefix('-') {
                Some(b) => ("-", b),
                None => (if first { "" } else { "+" }, c.as_str()),
            };
            first = false;
            f.write_str(sign)?;

            match e {
                0 => f.write_str(body)?,
                _ => {
                    if body != "1" {
                        write!(f, "{}*", body)?;
                    }
                    if e == 1 {
                        write!(f, "{}", self.variable)?;
                    } else {
                        write!(f, "{}^{}", self.variable, e)?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl<'a, 'b, F: Ring> Add<&'a UnivariatePolynomial<F>> for &'b UnivariatePolynomial<F> {
    type Output = UnivariatePolynomial<F>;

    fn add(self, other: &'a UnivariatePolynomial<F>) -> Self::Output {
        let (long, short) = if self.coefficients.len() >= other.coefficients.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut res = long.clone();
        for (c, s) in res.coefficients.iter_mut().zip(&short.coefficients) {
            self.field.add_assign(c, s);
        }
        res.truncate();
        res
    }
}

impl<'a, 'b, F: Ring> Sub<&'a UnivariatePolynomial<F>> for &'b UnivariatePolynomial<F> {
    type Output = UnivariatePolynomial<F>;

    fn sub(self, other: &'a UnivariatePolynomial<F>) -> Self::Output {
        self + &(-other.clone())
    }
}

impl<F: Ring> Sub for UnivariatePolynomial<F> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        &self - &other
    }
}

impl<F: Ring> Neg for UnivariatePolynomial<F> {
    type Output = Self;

    fn neg(mut self) -> Self::Output {
        for c in &mut self.coefficients {
            *c = self.field.neg(c);
        }
        self
    }
}

impl<'a, 'b, F: Ring> Mul<&'a UnivariatePolynomial<F>> for &'b UnivariatePolynomial<F> {
    type Output = UnivariatePolynomial<F>;

    fn mul(self, other: &'a UnivariatePolynomial<F>) -> Self::Output {
        if self.is_zero() || other.is_zero() {
            return self.zero();
        }

        let mut coefficients =
            vec![self.field.zero(); self.coefficients.len() + other.coefficients.len() - 1];
        for (i, a) in self.coefficients.iter().enumerate() {
            if F::is_zero(a) {
                continue;
            }
            for (j, b) in other.coefficients.iter().enumerate() {
                self.field.add_mul_assign(&mut coefficients[i + j], a, b);
            }
        }

        let mut res = UnivariatePolynomial {
            coefficients,
            field: self.field,
            variable: self.variable.clone(),
        };
        res.truncate();
        res
    }
}

impl<F: EuclideanDomain> UnivariatePolynomial<F> {
    /// The gcd of all coefficients.
    pub fn content(&self) -> F::Element {
        let mut c = self.field.zero();
        for cc in &self.coefficients {
            c = self.field.gcd(&c, cc);
            if F::one_is_gcd_unit() && self.field.is_one(&c) {
                break;
            }
        }
        c
    }

    /// Divide every coefficient by `c`. The division must be exact.
    pub fn div_coeff(mut self, c: &F::Element) -> Self {
        for cc in &mut self.coefficients {
            let (q, r) = self.field.quot_rem(cc, c);
            debug_assert!(F::is_zero(&r));
            *cc = q;
        }
        self
    }

    pub fn make_primitive(self) -> Self {
        let c = self.content();
        if F::is_zero(&c) || self.field.is_one(&c) {
            return self;
        }
        self.div_coeff(&c)
    }

    /// Compute the pseudo-remainder `lc(div)^k * self mod div`, where `k` is
    /// the number of reduction steps.
    pub fn pseudo_rem(&self, div: &Self) -> Self {
        assert!(!div.is_zero(), "Cannot divide by 0 polynomial");

        let m = div.degree();
        let lc = div.lcoeff();

        let mut r = self.clone();
        while !r.is_zero() && r.degree() >= m {
            let shift = r.degree() - m;
            let lr = r.lcoeff();

            for c in &mut r.coefficients {
                self.field.mul_assign(c, &lc);
            }
            for (i, c) in div.coefficients.iter().enumerate() {
                self.field
                    .sub_mul_assign(&mut r.coefficients[i + shift], &lr, c);
            }
            r.truncate();
        }

        r
    }

    /// Return `Some(self / div)` if the division is exact.
    pub fn divides(&self, div: &Self) -> Option<Self> {
        assert!(!div.is_zero(), "Cannot divide by 0 polynomial");

        if self.is_zero() {
            return Some(self.clone());
        }
        if self.degree() < div.degree() {
            return None;
        }

        let m = div.degree();
        let lc = div.lcoeff();
        let mut r = self.coefficients.clone();
        let mut q = vec![self.field.zero(); self.degree() - m + 1];

        for i in (0..q.len()).rev() {
            let (c, rem) = self.field.quot_rem(&r[i + m], &lc);
            if !F::is_zero(&rem) {
                return None;
            }
            if F::is_zero(&c) {
                continue;
            }

            for (j, d) in div.coefficients.iter().enumerate() {
                self.field.sub_mul_assign(&mut r[i + j], &c, d);
            }
            q[i] = c;
        }

        if r.iter().any(|c| !F::is_zero(c)) {
            return None;
        }

        let mut res = UnivariatePolynomial {
            coefficients: q,
            field: self.field,
            variable: self.variable.clone(),
        };
        res.truncate();
        Some(res)
    }

    /// The gcd via the primitive polynomial remainder sequence. The result
    /// is only defined up to a unit of the coefficient ring.
    pub fn gcd_prs(&self, other: &Self) -> Self {
        if self.is_zero() {
            return other.clone();
        }
        if other.is_zero() {
            return self.clone();
        }

        let c = self.field.gcd(&self.content(), &other.content());

        let (mut a, mut b) = if self.degree() >= other.degree() {
            (self.clone().make_primitive(), other.clone().make_primitive())
        } else {
            (other.clone().make_primitive(), self.clone().make_primitive())
        };

        while !b.is_constant() {
            let r = a.pseudo_rem(&b);
            a = b;
            b = r.make_primitive();
        }

        if !b.is_zero() {
            // coprime up to content
            return self.constant(c);
        }

        a.mul_coeff(&c)
    }
}

impl<F: Field> UnivariatePolynomial<F> {
    pub fn make_monic(self) -> Self {
        if self.is_zero() || self.field.is_one(&self.lcoeff()) {
            return self;
        }
        let inv = self.field.inv(&self.lcoeff());
        self.mul_coeff(&inv)
    }

    /// Euclidean division over a field.
    pub fn quot_rem(&self, div: &Self) -> (Self, Self) {
        assert!(!div.is_zero(), "Cannot divide by 0 polynomial");

        if self.is_zero() || self.degree() < div.degree() {
            return (self.zero(), self.clone());
        }

        let m = div.degree();
        let inv = self.field.inv(&div.lcoeff());
        let mut r = self.coefficients.clone();
        let mut q = vec![self.field.zero(); self.degree() - m + 1];

        for i in (0..q.len()).rev() {
            let c = self.field.mul(&r[i + m], &inv);
            if F::is_zero(&c) {
                continue;
            }
            for (j, d) in div.coefficients.iter().enumerate() {
                self.field.sub_mul_assign(&mut r[i + j], &c, d);
            }
            q[i] = c;
        }

        r.truncate(m);
        let mut q = UnivariatePolynomial {
            coefficients: q,
            field: self.field,
            variable: self.variable.clone(),
        };
        let mut r = UnivariatePolynomial {
            coefficients: r,
            field: self.field,
            variable: self.variable.clone(),
        };
        q.truncate();
        r.truncate();
        (q, r)
    }

    #[inline]
    pub fn rem(&self, div: &Self) -> Self {
        self.quot_rem(div).1
    }

    /// The monic gcd, computed with Euclid's algorithm.
    pub fn gcd(&self, other: &Self) -> Self {
        let (mut c, mut d) = if self.degree() >= other.degree() {
            (self.clone(), other.clone())
        } else {
            (other.clone(), self.clone())
        };

        while !d.is_zero() {
            let r = c.rem(&d);
            c = d;
            d = r;
        }

        c.make_monic()
    }

    /// Compute `self * other mod m`.
    pub fn mul_mod(&self, other: &Self, m: &Self) -> Self {
        (self * other).rem(m)
    }

    /// Compute `self^e mod m`.
    pub fn pow_mod(&self, mut e: u64, m: &Self) -> Self {
        let mut x = self.rem(m);
        let mut res = self.one().rem(m);
        while e != 0 {
            if e & 1 != 0 {
                res = res.mul_mod(&x, m);
            }
            e /= 2;
            if e != 0 {
                x = x.mul_mod(&x, m);
            }
        }
        res
    }
}

impl<UField: FiniteFieldWorkspace> UnivariatePolynomial<FiniteField<UField>>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    /// Find all roots, if the polynomial is a product of distinct linear
    /// factors. Otherwise, return `None`.
    ///
    /// The distinct-degree part `gcd(f, x^p - x)` is split with random
    /// Cantor-Zassenhaus splittings `gcd(g, (x + a)^((p - 1)/2) - 1)`.
    pub fn distinct_roots(&self) -> Option<Vec<<FiniteField<UField> as Ring>::Element>> {
        if self.is_zero() {
            return None;
        }

        let f = self.clone().make_monic();
        if f.is_constant() {
            return Some(vec![]);
        }

        let p = self.field.get_prime().to_u64();
        let x = f.monomial(self.field.one(), 1);

        let g = f.gcd(&(x.pow_mod(p, &f) - x.rem(&f)));
        if g.degree() != f.degree() {
            return None;
        }

        let mut rng = thread_rng();
        let range = (0, p.min(i64::MAX as u64) as i64);

        let mut roots = Vec::with_capacity(f.degree());
        let mut stack = vec![g];
        while let Some(h) = stack.pop() {
            match h.degree() {
                0 => {}
                1 => roots.push(self.field.neg(&h.coefficients[0])),
                _ => loop {
                    let a = self.field.sample(&mut rng, range);
                    let shifted = &x + &h.constant(a);
                    let s = &shifted.pow_mod((p - 1) / 2, &h) - &h.one();
                    let k = h.gcd(&s);

                    if k.degree() > 0 && k.degree() < h.degree() {
                        let (q, _) = h.quot_rem(&k);
                        stack.push(k);
                        stack.push(q.make_monic());
                        break;
                    }
                },
            }
        }

        Some(roots)
    }
}

impl UnivariatePolynomial<IntegerRing> {
    /// Make the leading coefficient positive.
    pub fn normalize_sign(self) -> Self {
        if self.lcoeff().is_negative() {
            -self
        } else {
            self
        }
    }

    /// The number of bits of the largest coefficient in absolute value.
    pub fn max_coeff_bits(&self) -> u64 {
        self.coefficients.iter().map(Integer::bits).max().unwrap_or(0)
    }
}

impl<F: Ring, E: Exponent> MultivariatePolynomial<F, E> {
    /// Convert to a dense univariate polynomial in `x`. All other variables
    /// must be absent.
    pub fn to_univariate(&self, x: usize) -> UnivariatePolynomial<F> {
        let mut res = UnivariatePolynomial::new(
            &self.field,
            Some(self.degree(x).to_u32() as usize + 1),
            self.variables[x].clone(),
        );

        if self.is_zero() {
            return res;
        }

        res.coefficients = vec![self.field.zero(); self.degree(x).to_u32() as usize + 1];
        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            debug_assert!(e
                .iter()
                .enumerate()
                .all(|(i, ee)| i == x || ee.is_zero()));
            res.coefficients[e[x].to_u32() as usize] = c.clone();
        }
        res
    }

    /// Convert a univariate polynomial back to a polynomial in `x`, in the
    /// context of `self`.
    pub fn from_univariate(&self, p: &UnivariatePolynomial<F>, x: usize) -> Self {
        let mut res = self.zero_with_capacity(p.coefficients.len());
        let mut e = vec![E::zero(); self.nvars()];
        for (i, c) in p.coefficients.iter().enumerate() {
            e[x] = E::from_u32(i as u32);
            res.append_monomial_back(c.clone(), &e);
        }
        res
    }
}

#[cfg(test)]
mod test {
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::{FiniteFieldCore, Zp};
    use crate::rings::integer::{Integer, IntegerRing};
    use crate::rings::Ring;

    use super::UnivariatePolynomial;

    fn zuni(s: &str) -> UnivariatePolynomial<IntegerRing> {
        MultivariatePolynomial::<_, u16>::parse(s, &IntegerRing::new(), variables(&["x"]))
            .unwrap()
            .to_univariate(0)
    }

    fn puni(s: &str, p: u32) -> UnivariatePolynomial<Zp> {
        MultivariatePolynomial::<_, u16>::parse(s, &Zp::new(p), variables(&["x"]))
            .unwrap()
            .to_univariate(0)
    }

    #[test]
    fn arithmetic() {
        let a = zuni("x+1");
        let b = zuni("x-1");
        assert_eq!(&a * &b, zuni("x^2-1"));
        assert_eq!(&a - &a, zuni("0"));
        assert_eq!(a.pow(3), zuni("x^3+3*x^2+3*x+1"));
        assert_eq!(a.clone().mul_exp(2), zuni("x^3+x^2"));
        assert_eq!(zuni("2*x^2-x+3").evaluate(&Integer::new(2)), Integer::new(9));
        assert_eq!(zuni("-2*x^3+x-5").to_string(), "-2*x^3+x-5");
    }

    #[test]
    fn pseudo_division() {
        let a = zuni("x^3+x+1");
        let b = zuni("2*x+1");
        assert_eq!(a.pseudo_rem(&b), zuni("3"));
        assert_eq!(zuni("2*x^2+3*x+1").divides(&b), Some(zuni("x+1")));
        assert_eq!(zuni("2*x^2+3*x+2").divides(&b), None);
    }

    #[test]
    fn gcd_integer() {
        let a = zuni("(x+1)*(x-2)");
        let b = zuni("(x+1)*(x+3)");
        assert_eq!(a.gcd_prs(&b).normalize_sign(), zuni("x+1"));

        let a = zuni("6*(2*x+1)*(x^2+7)");
        let b = zuni("-4*(2*x+1)*(x-5)");
        assert_eq!(a.gcd_prs(&b).normalize_sign(), zuni("4*x+2"));

        assert_eq!(zuni("x^2+1").gcd_prs(&zuni("x+1")), zuni("1"));
    }

    #[test]
    fn gcd_finite_field() {
        let a = puni("3*(x+1)*(x+5)*(x^2+2)", 17);
        let b = puni("5*(x+1)*(x^2+2)*(x+4)", 17);
        assert_eq!(a.gcd(&b), puni("(x+1)*(x^2+2)", 17));
        assert!(a.gcd(&puni("x+6", 17)).is_one());

        let (q, r) = puni("x^3+2*x+1", 17).quot_rem(&puni("x+1", 17));
        assert_eq!(q, puni("x^2-x+3", 17));
        assert_eq!(r, puni("-2", 17));
    }

    #[test]
    fn roots() {
        let field = Zp::new(17);
        let f = puni("(x-1)*(x-2)*(x-5)*(x+3)", 17);
        let mut roots: Vec<u32> = f
            .distinct_roots()
            .unwrap()
            .iter()
            .map(|r| field.from_element(r))
            .collect();
        roots.sort_unstable();
        assert_eq!(roots, vec![1, 2, 5, 14]);

        // irreducible over Z_7 and a repeated root
        assert_eq!(puni("x^2+1", 7).distinct_roots(), None);
        assert_eq!(puni("(x-1)^2", 7).distinct_roots(), None);
        assert_eq!(puni("4", 7).distinct_roots(), Some(vec![]));
    }

    #[test]
    fn pow_mod() {
        let field = Zp::new(13);
        let m = puni("x^2+1", 13);
        let x = puni("x", 13);
        // x^2 = -1 mod m, so x^13 = x * (x^2)^6 = x
        assert_eq!(x.pow_mod(13, &m), x);
        assert_eq!(x.pow_mod(2, &m), puni("12", 13));
        assert!(field.is_one(&x.pow_mod(4, &m).lcoeff()));
    }

    #[test]
    fn conversion() {
        let vars = variables(&["x", "y"]);
        let p = MultivariatePolynomial::<_, u16>::parse("3*y^4-y+2", &IntegerRing::new(), vars)
            .unwrap();
        let u = p.to_univariate(1);
        assert_eq!(u.degree(), 4);
        assert_eq!(u.variable.name(), "y");
        assert_eq!(p.from_univariate(&u, 1), p);
    }
}
