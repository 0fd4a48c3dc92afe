use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use ahash::HashMap;
use smallvec::{smallvec, SmallVec};

use crate::rings::finite_field::{
    FiniteField, FiniteFieldCore, FiniteFieldWorkspace, ToFiniteField,
};
use crate::rings::integer::{Integer, IntegerRing};
use crate::rings::{EuclideanDomain, Field, Ring};

use super::{Exponent, Variable, INLINED_EXPONENTS};

/// A sparse multivariate polynomial over the ring `F`.
///
/// Terms are kept in ascending lexicographic order of their exponent vectors,
/// with variable `0` the most significant, so the leading term is the last one.
/// There are no zero coefficients and no repeated monomials.
#[derive(Clone)]
pub struct MultivariatePolynomial<F: Ring, E: Exponent = u16> {
    // the i-th monomial is coefficients[i] * x^exponents[i * nvars..(i + 1) * nvars]
    pub coefficients: Vec<F::Element>,
    pub exponents: Vec<E>,
    pub field: F,
    pub variables: Arc<Vec<Variable>>,
}

impl<F: Ring, E: Exponent> MultivariatePolynomial<F, E> {
    /// Constructs a zero polynomial. Prefer [MultivariatePolynomial::zero] on
    /// an existing polynomial, so that the context is inherited.
    #[inline]
    pub fn new(field: &F, cap: Option<usize>, variables: Arc<Vec<Variable>>) -> Self {
        Self {
            coefficients: Vec::with_capacity(cap.unwrap_or(0)),
            exponents: Vec::with_capacity(cap.unwrap_or(0) * variables.len()),
            field: *field,
            variables,
        }
    }

    /// Constructs a zero polynomial, inheriting the field and variable map from `self`.
    #[inline]
    pub fn zero(&self) -> Self {
        Self::new(&self.field, None, self.variables.clone())
    }

    #[inline]
    pub fn zero_with_capacity(&self, cap: usize) -> Self {
        Self::new(&self.field, Some(cap), self.variables.clone())
    }

    /// Constructs a constant polynomial, inheriting the field and variable map from `self`.
    #[inline]
    pub fn constant(&self, coeff: F::Element) -> Self {
        if F::is_zero(&coeff) {
            return self.zero();
        }

        Self {
            coefficients: vec![coeff],
            exponents: vec![E::zero(); self.nvars()],
            field: self.field,
            variables: self.variables.clone(),
        }
    }

    #[inline]
    pub fn one(&self) -> Self {
        self.constant(self.field.one())
    }

    /// Constructs a polynomial with a single term.
    #[inline]
    pub fn monomial(&self, coeff: F::Element, exponents: Vec<E>) -> Self {
        debug_assert_eq!(self.nvars(), exponents.len());

        if F::is_zero(&coeff) {
            return self.zero();
        }

        Self {
            coefficients: vec![coeff],
            exponents,
            field: self.field,
            variables: self.variables.clone(),
        }
    }

    /// The polynomial `x_var`.
    pub fn variable(&self, var: usize) -> Self {
        let mut e = vec![E::zero(); self.nvars()];
        e[var] = E::one();
        self.monomial(self.field.one(), e)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.coefficients.is_empty()
    }

    #[inline]
    pub fn is_one(&self) -> bool {
        self.nterms() == 1
            && self.field.is_one(&self.coefficients[0])
            && self.exponents.iter().all(|x| x.is_zero())
    }

    /// Returns the number of terms in the polynomial.
    #[inline]
    pub fn nterms(&self) -> usize {
        self.coefficients.len()
    }

    /// Returns the number of variables in the polynomial.
    #[inline]
    pub fn nvars(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if the polynomial is constant.
    #[inline]
    pub fn is_constant(&self) -> bool {
        match self.nterms() {
            0 => true,
            1 => self.exponents.iter().all(|e| e.is_zero()),
            _ => false,
        }
    }

    /// Get the constant term of the polynomial.
    #[inline]
    pub fn get_constant(&self) -> F::Element {
        if self.is_zero() || !self.exponents(0).iter().all(|e| e.is_zero()) {
            return self.field.zero();
        }

        self.coefficients[0].clone()
    }

    /// Returns the slice for the exponents of the specified monomial.
    #[inline]
    pub fn exponents(&self, index: usize) -> &[E] {
        &self.exponents[index * self.nvars()..(index + 1) * self.nvars()]
    }

    #[inline]
    pub fn exponents_mut(&mut self, index: usize) -> &mut [E] {
        let nvars = self.nvars();
        &mut self.exponents[index * nvars..(index + 1) * nvars]
    }

    /// Returns an iterator over the exponents of every monomial.
    #[inline]
    pub fn exponents_iter(&self) -> impl Iterator<Item = &[E]> + '_ {
        (0..self.nterms()).map(move |i| self.exponents(i))
    }

    /// The exponents of the leading monomial.
    #[inline]
    pub fn last_exponents(&self) -> &[E] {
        assert!(!self.is_zero(), "The zero polynomial has no leading monomial");
        self.exponents(self.nterms() - 1)
    }

    /// Get a copy of the variable list.
    pub fn get_vars(&self) -> Arc<Vec<Variable>> {
        self.variables.clone()
    }

    /// Assert that both polynomials live in the same ring.
    #[inline]
    pub fn check_context(&self, other: &Self) {
        assert_eq!(self.field, other.field, "Polynomials have different fields");
        assert_eq!(
            self.variables, other.variables,
            "Polynomials have different variable maps"
        );
    }

    /// Reverse the monomial ordering in-place.
    fn reverse(&mut self) {
        let nterms = self.nterms();
        let nvars = self.nvars();
        if nterms < 2 {
            return;
        }

        self.coefficients.reverse();
        for i in 0..nterms / 2 {
            for v in 0..nvars {
                self.exponents
                    .swap(i * nvars + v, (nterms - 1 - i) * nvars + v);
            }
        }
    }

    /// Check if the polynomial is sorted and has only non-zero coefficients.
    pub fn check_consistency(&self) {
        assert_eq!(self.exponents.len(), self.nterms() * self.nvars());

        for c in &self.coefficients {
            if F::is_zero(c) {
                panic!("Inconsistent polynomial (0 coefficient): {}", self);
            }
        }

        for t in 1..self.nterms() {
            match self.exponents(t).cmp(self.exponents(t - 1)) {
                Ordering::Equal => panic!("Inconsistent polynomial (equal monomials): {}", self),
                Ordering::Less => panic!(
                    "Inconsistent polynomial (wrong monomial ordering): {}",
                    self
                ),
                Ordering::Greater => {}
            }
        }
    }

    /// Append a monomial that is larger than or equal to the current leading monomial.
    #[inline]
    pub(crate) fn append_monomial_back(&mut self, coefficient: F::Element, exponents: &[E]) {
        if F::is_zero(&coefficient) {
            return;
        }

        let nterms = self.nterms();
        if nterms > 0 && exponents == self.last_exponents() {
            self.field
                .add_assign(&mut self.coefficients[nterms - 1], &coefficient);

            if F::is_zero(&self.coefficients[nterms - 1]) {
                self.coefficients.pop();
                self.exponents.truncate((nterms - 1) * self.nvars());
            }
        } else {
            debug_assert!(nterms == 0 || exponents > self.last_exponents());
            self.coefficients.push(coefficient);
            self.exponents.extend_from_slice(exponents);
        }
    }

    /// Add a monomial to the polynomial, keeping the terms sorted.
    pub fn append_monomial(&mut self, coefficient: F::Element, exponents: &[E]) {
        if F::is_zero(&coefficient) {
            return;
        }
        if self.nvars() != exponents.len() {
            panic!(
                "nvars mismatched: got {}, expected {}",
                exponents.len(),
                self.nvars()
            );
        }

        if self.is_zero() || self.last_exponents() <= exponents {
            self.append_monomial_back(coefficient, exponents);
            return;
        }

        // binary search over the monomials, which are unique
        let (mut l, mut r) = (0, self.nterms());
        while l < r {
            let m = (l + r) / 2;
            match self.exponents(m).cmp(exponents) {
                Ordering::Less => l = m + 1,
                Ordering::Greater => r = m,
                Ordering::Equal => {
                    self.field
                        .add_assign(&mut self.coefficients[m], &coefficient);
                    if F::is_zero(&self.coefficients[m]) {
                        self.coefficients.remove(m);
                        let i = m * self.nvars();
                        self.exponents.drain(i..i + self.nvars());
                    }
                    return;
                }
            }
        }

        self.coefficients.insert(l, coefficient);
        let i = l * self.nvars();
        self.exponents.splice(i..i, exponents.iter().cloned());
    }

    /// Build a polynomial from unsorted terms, merging duplicates.
    pub(crate) fn from_unsorted_terms(
        &self,
        mut terms: Vec<(SmallVec<[E; INLINED_EXPONENTS]>, F::Element)>,
    ) -> Self {
        terms.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        let mut res = self.zero_with_capacity(terms.len());
        for (e, c) in terms {
            res.append_monomial_back(c, &e);
        }
        res
    }

    /// Multiply every coefficient with `other`.
    pub fn mul_coeff(mut self, other: &F::Element) -> Self {
        if F::is_zero(other) {
            return self.zero();
        }

        for c in &mut self.coefficients {
            self.field.mul_assign(c, other);
        }

        self
    }

    /// Map the coefficients to the ring `field` using `f`, dropping zeros.
    pub fn map_coeff<U: Ring, T: Fn(&F::Element) -> U::Element>(
        &self,
        f: T,
        field: U,
    ) -> MultivariatePolynomial<U, E> {
        let mut coefficients = Vec::with_capacity(self.coefficients.len());
        let mut exponents = Vec::with_capacity(self.exponents.len());

        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            let nc = f(c);
            if !U::is_zero(&nc) {
                coefficients.push(nc);
                exponents.extend_from_slice(e);
            }
        }

        MultivariatePolynomial {
            coefficients,
            exponents,
            field,
            variables: self.variables.clone(),
        }
    }

    /// Add `exponents` to every exponent.
    pub fn mul_exp(mut self, exponents: &[E]) -> Self {
        debug_assert_eq!(self.nvars(), exponents.len());

        let nvars = self.nvars();
        for e in self.exponents.chunks_mut(nvars.max(1)) {
            for (e1, e2) in e.iter_mut().zip(exponents) {
                *e1 = match e1.checked_add(e2) {
                    Some(s) => s,
                    None => panic!("Overflow in adding exponents"),
                };
            }
        }

        self
    }

    #[inline]
    pub(crate) fn mul_monomial(self, coefficient: &F::Element, exponents: &[E]) -> Self {
        self.mul_coeff(coefficient).mul_exp(exponents)
    }

    /// Get the degree of the variable `x`.
    pub fn degree(&self, x: usize) -> E {
        self.exponents_iter()
            .map(|e| e[x])
            .max()
            .unwrap_or(E::zero())
    }

    /// The degree in every variable.
    pub fn degrees(&self) -> Vec<E> {
        let mut d = vec![E::zero(); self.nvars()];
        for e in self.exponents_iter() {
            for (dd, ee) in d.iter_mut().zip(e) {
                if *ee > *dd {
                    *dd = *ee;
                }
            }
        }
        d
    }

    /// The exponent of `x` in the leading monomial.
    pub fn ldegree(&self, x: usize) -> E {
        if self.is_zero() {
            return E::zero();
        }
        self.last_exponents()[x]
    }

    /// Get the leading coefficient.
    pub fn lcoeff(&self) -> F::Element {
        match self.coefficients.last() {
            Some(c) => c.clone(),
            None => self.field.zero(),
        }
    }

    /// The minimal exponent of every variable.
    pub fn monomial_content(&self) -> Vec<E> {
        if self.is_zero() {
            return vec![E::zero(); self.nvars()];
        }

        let mut m = self.exponents(0).to_vec();
        for e in self.exponents_iter().skip(1) {
            for (mm, ee) in m.iter_mut().zip(e) {
                if *ee < *mm {
                    *mm = *ee;
                }
            }
        }
        m
    }

    /// The gcd of `e_v - shift_v` over all monomials, for every variable `v`.
    /// A variable whose exponent is always `shift_v` gets stride `0`.
    pub fn exponent_strides(&self, shift: &[E]) -> Vec<E> {
        let mut s = vec![E::zero(); self.nvars()];
        for e in self.exponents_iter() {
            for ((ss, ee), sh) in s.iter_mut().zip(e).zip(shift) {
                *ss = ss.gcd(&(*ee - *sh));
            }
        }
        s
    }

    /// Substitute `x_v -> x_v^stride_v * x_v^shift_v` in reverse: every exponent
    /// `e_v` becomes `(e_v - shift_v) / stride_v`. A stride of `0` is treated as `1`.
    pub fn deflate(&self, shift: &[E], stride: &[E]) -> Self {
        let mut res = self.clone();
        let nvars = self.nvars();
        for e in res.exponents.chunks_mut(nvars.max(1)) {
            for ((ee, sh), st) in e.iter_mut().zip(shift).zip(stride) {
                let d = (*ee - *sh).to_u32();
                let st = st.to_u32().max(1);
                debug_assert!(d % st == 0);
                *ee = E::from_u32(d / st);
            }
        }
        res
    }

    /// The inverse of [MultivariatePolynomial::deflate].
    pub fn inflate(&self, shift: &[E], stride: &[E]) -> Self {
        let mut res = self.clone();
        let nvars = self.nvars();
        for e in res.exponents.chunks_mut(nvars.max(1)) {
            for ((ee, sh), st) in e.iter_mut().zip(shift).zip(stride) {
                let n = ee.to_u32() * st.to_u32().max(1) + sh.to_u32();
                *ee = E::from_u32(n);
            }
        }
        res
    }

    /// Get the leading coefficient of the polynomial viewed as a
    /// univariate polynomial in `x`.
    pub fn univariate_lcoeff(&self, x: usize) -> Self {
        if self.is_zero() {
            return self.zero();
        }

        let d = self.degree(x);
        let mut lcoeff = self.zero();
        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            if e[x] == d {
                let mut ne: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::from_slice(e);
                ne[x] = E::zero();
                lcoeff.append_monomial_back(c.clone(), &ne);
            }
        }

        lcoeff
    }

    /// Change the order of the variables in the polynomial, using `order`,
    /// so that new variable `i` is old variable `order[i]`.
    /// The map can also be reversed, by setting `inverse` to `true`.
    pub fn rearrange(&self, order: &[usize], inverse: bool) -> Self {
        let nvars = self.nvars();
        debug_assert_eq!(order.len(), nvars);

        let mut terms = Vec::with_capacity(self.nterms());
        for (c, er) in self.coefficients.iter().zip(self.exponents_iter()) {
            let mut e: SmallVec<[E; INLINED_EXPONENTS]> = smallvec![E::zero(); nvars];
            for x in 0..nvars {
                if !inverse {
                    e[x] = er[order[x]];
                } else {
                    e[order[x]] = er[x];
                }
            }
            terms.push((e, c.clone()));
        }

        let mut vm = self.variables.as_ref().clone();
        for x in 0..nvars {
            if !inverse {
                vm[x] = self.variables[order[x]].clone();
            } else {
                vm[order[x]] = self.variables[x].clone();
            }
        }

        let mut res = self.from_unsorted_terms(terms);
        res.variables = Arc::new(vm);
        res
    }

    /// Powers `v^0, ..., v^d`.
    fn powers(&self, v: &F::Element, d: usize) -> Vec<F::Element> {
        let mut p = Vec::with_capacity(d + 1);
        p.push(self.field.one());
        for i in 0..d {
            p.push(self.field.mul(&p[i], v));
        }
        p
    }

    /// Replace the variable `n` by the element `v`.
    pub fn replace(&self, n: usize, v: &F::Element) -> Self {
        let pows = self.powers(v, self.degree(n).to_u32() as usize);

        let mut terms = Vec::with_capacity(self.nterms());
        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            let mut ne: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::from_slice(e);
            ne[n] = E::zero();
            terms.push((ne, self.field.mul(c, &pows[e[n].to_u32() as usize])));
        }

        self.from_unsorted_terms(terms)
    }

    /// Evaluate the polynomial at the point `r`.
    pub fn replace_all(&self, r: &[F::Element]) -> F::Element {
        let mut res = self.field.zero();

        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            let mut c = c.clone();
            for (i, v) in r.iter().zip(e) {
                if !v.is_zero() {
                    self.field
                        .mul_assign(&mut c, &self.field.pow(i, v.to_u32() as u64));
                }
            }

            self.field.add_assign(&mut res, &c);
        }

        res
    }

    /// Replace all variables in `r` by their values, leaving a polynomial in `v` only.
    /// `cache[n]` holds the powers of the value of variable `n` computed so far and
    /// is extended when needed.
    pub fn replace_all_except(
        &self,
        v: usize,
        r: &[(usize, F::Element)],
        cache: &mut [Vec<F::Element>],
    ) -> Self {
        let mut dense = vec![self.field.zero(); self.degree(v).to_u32() as usize + 1];

        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            let mut c = c.clone();
            for (n, vv) in r {
                let p = e[*n].to_u32() as usize;
                if p == 0 {
                    continue;
                }

                let pc = &mut cache[*n];
                if pc.is_empty() {
                    pc.push(self.field.one());
                }
                while pc.len() <= p {
                    let next = self.field.mul(&pc[pc.len() - 1], vv);
                    pc.push(next);
                }
                self.field.mul_assign(&mut c, &pc[p]);
            }

            self.field
                .add_assign(&mut dense[e[v].to_u32() as usize], &c);
        }

        let mut res = self.zero_with_capacity(dense.len());
        let mut e = vec![E::zero(); self.nvars()];
        for (k, c) in dense.into_iter().enumerate() {
            e[v] = E::from_u32(k as u32);
            res.append_monomial_back(c, &e);
        }

        res
    }

    /// Compute `self^pow`.
    pub fn pow(&self, mut pow: usize) -> Self {
        if pow == 0 {
            return self.one();
        }

        let mut x = self.clone();
        let mut y = self.one();
        while pow != 1 {
            if pow % 2 == 1 {
                y = &y * &x;
                pow -= 1;
            }

            x = &x * &x;
            pow /= 2;
        }

        x * &y
    }

    /// View the polynomial as a univariate polynomial in `x` with multivariate
    /// coefficients. The list is sorted by strictly decreasing degree in `x`,
    /// and the coefficients do not depend on `x`.
    pub fn to_univariate_polynomial_list(&self, x: usize) -> Vec<(Self, E)> {
        if self.is_zero() {
            return vec![];
        }

        // monomials with equal degree in `x` keep their relative order
        let mut indices: Vec<usize> = (0..self.nterms()).collect();
        indices.sort_by(|a, b| self.exponents(*b)[x].cmp(&self.exponents(*a)[x]));

        let mut result: Vec<(Self, E)> = vec![];
        let mut e: SmallVec<[E; INLINED_EXPONENTS]> = smallvec![E::zero(); self.nvars()];
        for i in indices {
            let d = self.exponents(i)[x];
            if result.last().map(|(_, ld)| *ld != d).unwrap_or(true) {
                result.push((self.zero(), d));
            }

            e.copy_from_slice(self.exponents(i));
            e[x] = E::zero();
            if let Some((p, _)) = result.last_mut() {
                p.coefficients.push(self.coefficients[i].clone());
                p.exponents.extend_from_slice(&e);
            }
        }

        result
    }

    /// Split the polynomial into polynomials in `xs` (if `include` is true)
    /// or in the complement of `xs`, grouped by the remaining exponents.
    pub fn to_multivariate_polynomial_list(
        &self,
        xs: &[usize],
        include: bool,
    ) -> HashMap<SmallVec<[E; INLINED_EXPONENTS]>, Self> {
        let mut tm: HashMap<SmallVec<[E; INLINED_EXPONENTS]>, Self> = HashMap::default();
        let mut e_not_in_xs: SmallVec<[E; INLINED_EXPONENTS]> = smallvec![E::zero(); self.nvars()];
        let mut e_in_xs: SmallVec<[E; INLINED_EXPONENTS]> = smallvec![E::zero(); self.nvars()];

        for (c, e) in self.coefficients.iter().zip(self.exponents_iter()) {
            e_not_in_xs.copy_from_slice(e);
            for x in e_in_xs.iter_mut() {
                *x = E::zero();
            }

            for x in xs {
                e_in_xs[*x] = e_not_in_xs[*x];
                e_not_in_xs[*x] = E::zero();
            }

            let (key, value) = if include {
                (&e_not_in_xs, &e_in_xs)
            } else {
                (&e_in_xs, &e_not_in_xs)
            };

            // monomials sharing a key keep their relative order
            let p = tm.entry(key.clone()).or_insert_with(|| self.zero());
            p.coefficients.push(c.clone());
            p.exponents.extend_from_slice(value);
        }

        tm
    }

    /// Plain sparse product: all term products, sorted and merged.
    fn mul_sparse(&self, rhs: &Self) -> Self {
        let nvars = self.nvars();
        let mut terms = Vec::with_capacity(self.nterms() * rhs.nterms());
        for (c1, e1) in self.coefficients.iter().zip(self.exponents_iter()) {
            for (c2, e2) in rhs.coefficients.iter().zip(rhs.exponents_iter()) {
                let mut e: SmallVec<[E; INLINED_EXPONENTS]> = SmallVec::with_capacity(nvars);
                e.extend(e1.iter().zip(e2).map(|(a, b)| *a + *b));
                terms.push((e, self.field.mul(c1, c2)));
            }
        }

        self.from_unsorted_terms(terms)
    }

    /// Merge `self + sign * other` where both are sorted.
    fn merge(&self, other: &Self, negate: bool) -> Self {
        self.check_context(other);

        let mut res = self.zero_with_capacity(self.nterms() + other.nterms());
        let (mut i, mut j) = (0, 0);

        let other_coeff = |j: usize| {
            if negate {
                self.field.neg(&other.coefficients[j])
            } else {
                other.coefficients[j].clone()
            }
        };

        while i < self.nterms() && j < other.nterms() {
            match self.exponents(i).cmp(other.exponents(j)) {
                Ordering::Less => {
                    res.coefficients.push(self.coefficients[i].clone());
                    res.exponents.extend_from_slice(self.exponents(i));
                    i += 1;
                }
                Ordering::Greater => {
                    res.coefficients.push(other_coeff(j));
                    res.exponents.extend_from_slice(other.exponents(j));
                    j += 1;
                }
                Ordering::Equal => {
                    let c = self.field.add(&self.coefficients[i], &other_coeff(j));
                    if !F::is_zero(&c) {
                        res.coefficients.push(c);
                        res.exponents.extend_from_slice(self.exponents(i));
                    }
                    i += 1;
                    j += 1;
                }
            }
        }

        for k in i..self.nterms() {
            res.coefficients.push(self.coefficients[k].clone());
            res.exponents.extend_from_slice(self.exponents(k));
        }

        for k in j..other.nterms() {
            res.coefficients.push(other_coeff(k));
            res.exponents.extend_from_slice(other.exponents(k));
        }

        res
    }
}

impl<F: Ring, E: Exponent> std::fmt::Debug for MultivariatePolynomial<F, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.is_zero() {
            return write!(f, "[]");
        }
        write!(f, "[ ")?;
        for (i, (c, e)) in self.coefficients.iter().zip(self.exponents_iter()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{{ {:?}, {:?} }}", c, e)?;
        }
        write!(f, " ]")
    }
}

/// Terms are printed from the leading monomial down, for example `3*x^2*y-x+5`.
impl<F: Ring, E: Exponent> Display for MultivariatePolynomial<F, E> {
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

        for i in (0..self.nterms()).rev() {
            let e = self.exponents(i);
            let is_const = e.iter().all(|x| x.is_zero());
            let c = Coeff(&self.field, &self.coefficients[i]).to_string();

            let (sign, body) = match c.strip_prefix('-') {
                Some(b) => ("-", b),
                None => (if i + 1 == self.nterms() { "" } else { "+" }, c.as_str()),
            };
            f.write_str(sign)?;

            let mut first = true;
            if body != "1" || is_const {
                f.write_str(body)?;
                first = false;
            }

            for (v, p) in self.variables.iter().zip(e) {
                if p.is_zero() {
                    continue;
                }
                if !first {
                    f.write_str("*")?;
                }
                first = false;

                if p.to_u32() == 1 {
                    write!(f, "{}", v)?;
                } else {
                    write!(f, "{}^{}", v, p)?;
                }
            }
        }

        Ok(())
    }
}

impl<F: Ring, E: Exponent> PartialEq for MultivariatePolynomial<F, E> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.variables == other.variables
            && self.exponents == other.exponents
            && self.coefficients == other.coefficients
    }
}

impl<F: Ring, E: Exponent> Eq for MultivariatePolynomial<F, E> {}

impl<F: Ring, E: Exponent> Add for MultivariatePolynomial<F, E> {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        if self.is_zero() {
            return other;
        }
        if other.is_zero() {
            return self;
        }
        self.merge(&other, false)
    }
}

impl<'a, 'b, F: Ring, E: Exponent> Add<&'a MultivariatePolynomial<F, E>>
    for &'b MultivariatePolynomial<F, E>
{
    type Output = MultivariatePolynomial<F, E>;

    fn add(self, other: &'a MultivariatePolynomial<F, E>) -> Self::Output {
        self.merge(other, false)
    }
}

impl<F: Ring, E: Exponent> Sub for MultivariatePolynomial<F, E> {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        if other.is_zero() {
            return self;
        }
        self.merge(&other, true)
    }
}

impl<'a, 'b, F: Ring, E: Exponent> Sub<&'a MultivariatePolynomial<F, E>>
    for &'b MultivariatePolynomial<F, E>
{
    type Output = MultivariatePolynomial<F, E>;

    fn sub(self, other: &'a MultivariatePolynomial<F, E>) -> Self::Output {
        self.merge(other, true)
    }
}

impl<F: Ring, E: Exponent> Neg for MultivariatePolynomial<F, E> {
    type Output = Self;

    fn neg(mut self) -> Self::Output {
        for c in &mut self.coefficients {
            *c = self.field.neg(c);
        }
        self
    }
}

impl<'a, 'b, F: Ring, E: Exponent> Mul<&'a MultivariatePolynomial<F, E>>
    for &'b MultivariatePolynomial<F, E>
{
    type Output = MultivariatePolynomial<F, E>;

    #[inline]
    fn mul(self, rhs: &'a MultivariatePolynomial<F, E>) -> Self::Output {
        self.check_context(rhs);

        if self.is_zero() || rhs.is_zero() {
            return self.zero();
        }

        if self.nterms() == 1 {
            return rhs
                .clone()
                .mul_monomial(&self.coefficients[0], &self.exponents);
        }

        if rhs.nterms() == 1 {
            return self
                .clone()
                .mul_monomial(&rhs.coefficients[0], &rhs.exponents);
        }

        self.mul_sparse(rhs)
    }
}

impl<'a, F: Ring, E: Exponent> Mul<&'a MultivariatePolynomial<F, E>>
    for MultivariatePolynomial<F, E>
{
    type Output = MultivariatePolynomial<F, E>;

    #[inline]
    fn mul(self, rhs: &'a MultivariatePolynomial<F, E>) -> Self::Output {
        (&self) * rhs
    }
}

impl<'a, 'b, F: EuclideanDomain, E: Exponent> Div<&'a MultivariatePolynomial<F, E>>
    for &'b MultivariatePolynomial<F, E>
{
    type Output = MultivariatePolynomial<F, E>;

    fn div(self, other: &'a MultivariatePolynomial<F, E>) -> Self::Output {
        self.divides(other)
            .unwrap_or_else(|| panic!("No clean division of {} by {}", self, other))
    }
}

impl<F: EuclideanDomain, E: Exponent> MultivariatePolynomial<F, E> {
    /// Get the content from the coefficients.
    pub fn content(&self) -> F::Element {
        let mut c = match self.coefficients.first() {
            Some(c) => c.clone(),
            None => return self.field.zero(),
        };

        for cc in self.coefficients.iter().skip(1) {
            if F::one_is_gcd_unit() && self.field.is_one(&c) {
                break;
            }

            c = self.field.gcd(&c, cc);
        }
        c
    }

    /// Divide every coefficient by `other`. The division must be exact.
    pub fn div_coeff(mut self, other: &F::Element) -> Self {
        for c in &mut self.coefficients {
            let (quot, rem) = self.field.quot_rem(c, other);
            debug_assert!(F::is_zero(&rem));
            *c = quot;
        }
        self
    }

    /// Make the polynomial primitive by removing the content.
    pub fn make_primitive(self) -> Self {
        let c = self.content();
        if F::is_zero(&c) {
            return self;
        }
        self.div_coeff(&c)
    }

    /// Return `Some(self / div)` if `div` divides `self` exactly.
    pub fn divides(&self, div: &Self) -> Option<Self> {
        if div.is_zero() {
            panic!("Cannot divide by 0 polynomial");
        }

        if self.is_zero() {
            return Some(self.clone());
        }

        if !F::is_zero(&self.field.rem(&self.lcoeff(), &div.lcoeff())) {
            return None;
        }

        if (0..self.nvars()).any(|v| self.degree(v) < div.degree(v)) {
            return None;
        }

        if self.field.is_characteristic_zero() {
            // the evaluation at x_i = 0 and at x_i = 1 must divide
            let c = div.get_constant();
            if !F::is_zero(&c) && !F::is_zero(&self.field.rem(&self.get_constant(), &c)) {
                return None;
            }

            let mut num = self.field.zero();
            for c in &self.coefficients {
                self.field.add_assign(&mut num, c);
            }
            let mut den = self.field.zero();
            for c in &div.coefficients {
                self.field.add_assign(&mut den, c);
            }

            if !F::is_zero(&den) && !F::is_zero(&self.field.rem(&num, &den)) {
                return None;
            }
        }

        let (q, r) = self.quot_rem(div, true);
        if r.is_zero() {
            Some(q)
        } else {
            None
        }
    }

    /// Compute the remainder `self % div`.
    pub fn rem(&self, div: &Self) -> Self {
        self.quot_rem(div, false).1
    }

    /// Divide by `div`, reducing the leading term of the running remainder
    /// whenever the leading monomial of `div` divides it and the coefficient
    /// division is exact. Terms that cannot be reduced move to the remainder.
    /// With `abort_on_remainder`, the first such term stops the division
    /// and a nonzero remainder is returned.
    pub fn quot_rem(&self, div: &Self, abort_on_remainder: bool) -> (Self, Self) {
        if div.is_zero() {
            panic!("Cannot divide by 0 polynomial");
        }
        self.check_context(div);

        if self.is_zero() {
            return (self.clone(), self.clone());
        }

        let nvars = self.nvars();
        let div_lc = div.lcoeff();
        let div_lm = div.last_exponents().to_vec();

        // both are built from the largest monomial down
        let mut q = self.zero();
        let mut r = self.zero();

        let mut rest = self.clone();
        let mut shift = vec![E::zero(); nvars];
        while !rest.is_zero() {
            let k = rest.nterms() - 1;
            let lm = rest.exponents(k);

            if lm.iter().zip(&div_lm).all(|(a, b)| a >= b) {
                let (quot, rem) = self.field.quot_rem(&rest.coefficients[k], &div_lc);
                if F::is_zero(&rem) {
                    for ((s, a), b) in shift.iter_mut().zip(lm).zip(&div_lm) {
                        *s = *a - *b;
                    }

                    q.coefficients.push(quot.clone());
                    q.exponents.extend_from_slice(&shift);

                    let t = div.clone().mul_monomial(&quot, &shift);
                    rest = rest.merge(&t, true);
                    continue;
                }
            }

            if abort_on_remainder {
                q.reverse();
                return (q, self.one());
            }

            r.coefficients.push(rest.coefficients.swap_remove(k));
            r.exponents.extend_from_slice(&rest.exponents[k * nvars..]);
            rest.exponents.truncate(k * nvars);
        }

        q.reverse();
        r.reverse();

        (q, r)
    }
}

impl<F: Field, E: Exponent> MultivariatePolynomial<F, E> {
    /// Make the leading coefficient `1`.
    pub fn make_monic(self) -> Self {
        if self.is_zero() || self.field.is_one(&self.lcoeff()) {
            return self;
        }

        let ci = self.field.inv(&self.lcoeff());
        self.mul_coeff(&ci)
    }
}

impl<E: Exponent> MultivariatePolynomial<IntegerRing, E> {
    /// Reduce the coefficients modulo the prime of `field`.
    pub fn to_finite_field<UField: FiniteFieldWorkspace>(
        &self,
        field: &FiniteField<UField>,
    ) -> MultivariatePolynomial<FiniteField<UField>, E>
    where
        FiniteField<UField>: FiniteFieldCore<UField>,
        Integer: ToFiniteField<UField>,
    {
        self.map_coeff(|c| c.to_finite_field(field), *field)
    }

    /// The number of bits of the largest coefficient in absolute value.
    pub fn max_coeff_bits(&self) -> u64 {
        self.coefficients.iter().map(|c| c.bits()).max().unwrap_or(0)
    }
}

impl<UField: FiniteFieldWorkspace, E: Exponent> MultivariatePolynomial<FiniteField<UField>, E>
where
    FiniteField<UField>: FiniteFieldCore<UField>,
{
    /// Lift to the integers using the symmetric representatives in `(-p/2, p/2]`.
    pub fn to_integer_symmetric(&self) -> MultivariatePolynomial<IntegerRing, E> {
        self.map_coeff(
            |c| Integer::from_finite_field_symmetric(&self.field, c),
            IntegerRing::new(),
        )
    }
}

#[cfg(test)]
mod test {
    use smallvec::{smallvec, SmallVec};

    use crate::poly::{variables, Variable, INLINED_EXPONENTS};
    use crate::rings::finite_field::{FiniteFieldCore, Zp};
    use crate::rings::integer::{Integer, IntegerRing};
    use crate::rings::Ring;

    use super::MultivariatePolynomial;

    fn zpoly(s: &str) -> MultivariatePolynomial<IntegerRing, u16> {
        MultivariatePolynomial::parse(s, &IntegerRing::new(), variables(&["x", "y", "z"])).unwrap()
    }

    #[test]
    fn append_keeps_order() {
        let mut p = zpoly("0");
        p.append_monomial(Integer::new(3), &[1, 0, 0]);
        p.append_monomial(Integer::new(2), &[0, 2, 0]);
        p.append_monomial(Integer::new(5), &[0, 2, 1]);
        p.append_monomial(Integer::new(-2), &[0, 2, 0]);
        p.append_monomial(Integer::new(1), &[0, 0, 0]);
        p.check_consistency();

        assert_eq!(p.nterms(), 3);
        assert_eq!(p, zpoly("3*x+5*y^2*z+1"));
        assert_eq!(p.lcoeff(), Integer::new(3));
        assert_eq!(p.last_exponents(), &[1, 0, 0]);
    }

    #[test]
    fn arithmetic() {
        let a = zpoly("x+y");
        let b = zpoly("x-y");
        assert_eq!(&a * &b, zpoly("x^2-y^2"));
        assert_eq!(&a + &b, zpoly("2*x"));
        assert_eq!(&a - &a, zpoly("0"));
        assert_eq!(a.pow(3), zpoly("x^3+3*x^2*y+3*x*y^2+y^3"));
        assert_eq!(-a.clone(), zpoly("-x-y"));
    }

    #[test]
    fn division() {
        let a = zpoly("(x+y+1)*(2*x-z^2)");
        let b = zpoly("2*x-z^2");
        assert_eq!(a.divides(&b), Some(zpoly("x+y+1")));
        assert_eq!(a.divides(&zpoly("x+2")), None);
        assert_eq!(zpoly("4*x+2").divides(&zpoly("2")), Some(zpoly("2*x+1")));
        assert_eq!(zpoly("4*x+3").divides(&zpoly("2")), None);

        let (q, r) = zpoly("x^2+y").quot_rem(&zpoly("x+1"), false);
        assert_eq!(q, zpoly("x-1"));
        assert_eq!(r, zpoly("y+1"));
    }

    #[test]
    fn division_finite_field() {
        let field = Zp::new(7);
        let vars = variables(&["x", "y"]);
        let a = MultivariatePolynomial::<_, u8>::parse("3*x^2*y+x", &field, vars.clone()).unwrap();
        let b = MultivariatePolynomial::<_, u8>::parse("3*x*y+1", &field, vars).unwrap();
        assert_eq!(a.divides(&b).map(|q| q.to_string()), Some("x".to_owned()));
        assert!(field.is_one(&b.make_monic().lcoeff()));
    }

    #[test]
    fn views() {
        let p = zpoly("3*x^2*y+x^2*z+y*z+5");
        let list = p.to_univariate_polynomial_list(0);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].1, 2);
        assert_eq!(list[0].0, zpoly("3*y+z"));
        assert_eq!(list[1].1, 0);
        assert_eq!(list[1].0, zpoly("y*z+5"));
        for (c, _) in &list {
            c.check_consistency();
        }

        let groups = p.to_multivariate_polynomial_list(&[1, 2], true);
        assert_eq!(groups.len(), 2);
        let key: SmallVec<[u16; INLINED_EXPONENTS]> = smallvec![2, 0, 0];
        assert_eq!(groups[&key], zpoly("3*y+z"));

        assert_eq!(p.univariate_lcoeff(2), zpoly("x^2+y"));
        assert_eq!(p.degrees(), vec![2, 1, 1]);
    }

    #[test]
    fn substitution() {
        let p = zpoly("x^2*y+x*z^3+2");
        assert_eq!(p.replace(0, &Integer::new(2)), zpoly("4*y+2*z^3+2"));
        assert_eq!(
            p.replace_all(&[Integer::new(1), Integer::new(2), Integer::new(-1)]),
            Integer::new(3)
        );

        let mut cache = vec![vec![]; 3];
        let r = p.replace_all_except(
            0,
            &[(1, Integer::new(3)), (2, Integer::new(2))],
            &mut cache,
        );
        assert_eq!(r, zpoly("3*x^2+8*x+2"));
    }

    #[test]
    fn rearrange_roundtrip() {
        let p = zpoly("x^3*y+y^2*z+7*z");
        let order = [2, 0, 1];
        let q = p.rearrange(&order, false);
        q.check_consistency();
        assert_eq!(q.variables[0], Variable::new("z"));
        assert_eq!(q.rearrange(&order, true), p);
    }

    #[test]
    fn deflation() {
        let p = zpoly("x^7*y^2+x^3*y^4+x");
        let shift = p.monomial_content();
        assert_eq!(shift, vec![1, 0, 0]);
        let stride = p.exponent_strides(&shift);
        assert_eq!(stride, vec![2, 2, 0]);

        let d = p.deflate(&shift, &stride);
        assert_eq!(d, zpoly("x^3*y+x*y^2+1"));
        assert_eq!(d.inflate(&shift, &stride), p);
    }

    #[test]
    fn content_and_conversion() {
        let p = zpoly("-6*x^2+4*y-10");
        assert_eq!(p.content(), Integer::new(2));
        assert_eq!(p.clone().make_primitive(), zpoly("-3*x^2+2*y-5"));

        let field = Zp::new(5);
        let m = p.to_finite_field(&field);
        assert_eq!(m.nterms(), 2);
        assert_eq!(field.from_element(&m.lcoeff()), 4);
        assert_eq!(m.to_integer_symmetric(), zpoly("-x^2-y"));
        assert_eq!(p.max_coeff_bits(), 4);
    }

    #[test]
    fn display() {
        assert_eq!(zpoly("-x^2*y+3*z-1").to_string(), "-x^2*y+3*z-1");
        assert_eq!(zpoly("0").to_string(), "0");
        assert_eq!(zpoly("2*y*z+1").to_string(), "2*y*z+1");
    }

    #[test]
    #[should_panic]
    fn inconsistent() {
        let mut p = zpoly("x+1");
        p.coefficients.reverse();
        p.exponents.reverse();
        p.check_consistency();
    }
}
