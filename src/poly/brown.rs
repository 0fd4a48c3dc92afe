//! Brown's dense modular gcd algorithm, and the Chinese remaindering loop
//! over word-sized primes that lifts modular gcds to the integers.

use std::cmp::{max, min, Ordering};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, instrument};

use crate::rings::finite_field::{FiniteFieldCore, PrimeIteratorU64, ToFiniteField, Zp64};
use crate::rings::integer::{Integer, IntegerRing};
use crate::rings::{EuclideanDomain, EvaluationField, Field, Ring};
use crate::utils;

use super::evaluate::{ImageError, NewtonInterpolator, PointSampler};
use super::gcd::{GcdConfig, GcdError};
use super::polynomial::MultivariatePolynomial;
use super::univariate::UnivariatePolynomial;
use super::Exponent;

/// The integer image of a gcd, reconstructed from its images modulo the primes
/// in `primes` with Garner's algorithm. The coefficients are kept in the
/// symmetric range around zero.
#[derive(Clone, Debug)]
pub struct CrtAccumulator<E: Exponent> {
    pub poly: MultivariatePolynomial<IntegerRing, E>,
    pub modulus: Integer,
    pub primes: Vec<u64>,
}

impl<E: Exponent> CrtAccumulator<E> {
    pub fn new(template: &MultivariatePolynomial<IntegerRing, E>) -> Self {
        Self {
            poly: template.zero(),
            modulus: Integer::new(1),
            primes: vec![],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }

    /// Forget all images.
    pub fn reset(&mut self) {
        self.poly = self.poly.zero();
        self.modulus = Integer::new(1);
        self.primes.clear();
    }

    /// Merge the image `gp` modulo a prime that has not been merged before.
    /// Returns `false` if no coefficient changed.
    pub fn merge(&mut self, gp: &MultivariatePolynomial<Zp64, E>) -> bool {
        let field = gp.field;
        let p = field.get_prime();
        assert!(
            !self.primes.contains(&p),
            "Prime {} is merged a second time",
            p
        );

        if self.primes.is_empty() {
            self.poly = gp.to_integer_symmetric();
            self.modulus = Integer::from_u64(p);
            self.primes.push(p);
            return true;
        }

        let zero_p = field.zero();
        let zero = Integer::new(0);
        let mut changed = false;
        let mut res = self.poly.zero_with_capacity(max(self.poly.nterms(), gp.nterms()));

        let mut merge_term = |res: &mut MultivariatePolynomial<IntegerRing, E>,
                              c: &Integer,
                              r: &<Zp64 as Ring>::Element,
                              e: &[E]| {
            let n = c.chinese_remainder(&self.modulus, r, &field);
            if &n != c {
                changed = true;
            }
            if !n.is_zero() {
                res.coefficients.push(n);
                res.exponents.extend_from_slice(e);
            }
        };

        // both polynomials are sorted, so walk the union of their supports
        let (mut i, mut j) = (0, 0);
        while i < self.poly.nterms() || j < gp.nterms() {
            let ord = if i == self.poly.nterms() {
                Ordering::Greater
            } else if j == gp.nterms() {
                Ordering::Less
            } else {
                self.poly.exponents(i).cmp(gp.exponents(j))
            };

            match ord {
                Ordering::Less => {
                    merge_term(
                        &mut res,
                        &self.poly.coefficients[i],
                        &zero_p,
                        self.poly.exponents(i),
                    );
                    i += 1;
                }
                Ordering::Greater => {
                    merge_term(&mut res, &zero, &gp.coefficients[j], gp.exponents(j));
                    j += 1;
                }
                Ordering::Equal => {
                    merge_term(
                        &mut res,
                        &self.poly.coefficients[i],
                        &gp.coefficients[j],
                        self.poly.exponents(i),
                    );
                    i += 1;
                    j += 1;
                }
            }
        }

        self.poly = res;
        self.modulus *= &Integer::from_u64(p);
        self.primes.push(p);
        changed
    }
}

/// An upper bound on the number of bits of the coefficients of the gcd of `a` and `b`,
/// obtained from the Landau-Mignotte bound of their Kronecker substitution.
pub fn gcd_bit_bound<E: Exponent>(
    a: &MultivariatePolynomial<IntegerRing, E>,
    b: &MultivariatePolynomial<IntegerRing, E>,
    vars: &[usize],
    gamma: &Integer,
) -> u64 {
    let main = vars[0];
    let mut n = 1 + min(a.degree(main), b.degree(main)).to_u32() as u64;
    for v in &vars[1..] {
        n = n.saturating_mul(max(a.degree(*v), b.degree(*v)).to_u32() as u64 + 1);
    }

    let excess = |p: &MultivariatePolynomial<IntegerRing, E>| {
        utils::clog2(p.nterms() as u64) / 2 + p.max_coeff_bits() - p.lcoeff().bits()
    };

    n.saturating_add(gamma.bits())
        .saturating_add(min(excess(a), excess(b)))
}

/// Create a thread pool for the prime batches, when more than one thread is requested.
pub(crate) fn thread_pool(threads: usize) -> Option<ThreadPool> {
    if threads <= 1 {
        return None;
    }

    match ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(e) => {
            debug!("Could not create a thread pool, continuing serially: {}", e);
            None
        }
    }
}

/// Apply `f` to every prime of the batch, on the pool if there is one.
/// The results are returned in the order of the primes.
pub(crate) fn map_primes<T: Send>(
    pool: Option<&ThreadPool>,
    primes: &[u64],
    f: impl Fn(u64) -> T + Sync + Send,
) -> Vec<T> {
    match pool {
        Some(pool) => pool.install(|| primes.par_iter().map(|p| f(*p)).collect()),
        None => primes.iter().map(|p| f(*p)).collect(),
    }
}

/// Hands out fresh primes, skipping the ones for which one of the `leading`
/// integers vanishes.
pub(crate) struct PrimeSource {
    primes: PrimeIteratorU64,
    leading: Vec<Integer>,
    used: usize,
    max_primes: Option<usize>,
}

impl PrimeSource {
    pub fn new(config: &GcdConfig, leading: Vec<Integer>) -> Self {
        Self {
            primes: PrimeIteratorU64::new(config.prime_start),
            leading,
            used: 0,
            max_primes: config.max_primes,
        }
    }

    /// Get the next good prime, or `None` when the primes are exhausted.
    pub fn next_prime(&mut self) -> Option<u64> {
        loop {
            if self.max_primes.map(|m| self.used >= m).unwrap_or(false) {
                return None;
            }

            let p = self.primes.next()?;
            if p == 2 {
                continue;
            }
            self.used += 1;

            let field = Zp64::new(p);
            if self
                .leading
                .iter()
                .all(|c| !Zp64::is_zero(&c.to_finite_field(&field)))
            {
                return Some(p);
            }

            debug!("Skipping prime {}: leading coefficient vanishes", p);
        }
    }

    /// Get up to `n` fresh primes.
    pub fn next_batch(&mut self, n: usize) -> Vec<u64> {
        let mut batch = Vec::with_capacity(n);
        while batch.len() < n {
            match self.next_prime() {
                Some(p) => batch.push(p),
                None => break,
            }
        }
        batch
    }
}

/// Compute the gcd of primitive integer polynomials `a` and `b` in the variables
/// `vars` from modular images computed by `image`, combined with Chinese remaindering.
///
/// The images are normalized to have leading coefficient `gcd(lc(a), lc(b))`.
/// An image with a smaller leading monomial than the accumulated one shows that
/// the earlier primes were unlucky, and an image with a larger one is unlucky itself.
/// When merging a new image does not change the accumulated polynomial, its
/// primitive part is checked by trial division.
#[instrument(level = "debug", skip_all)]
pub(crate) fn gcd_crt_loop<E: Exponent>(
    a: &MultivariatePolynomial<IntegerRing, E>,
    b: &MultivariatePolynomial<IntegerRing, E>,
    vars: &[usize],
    config: &GcdConfig,
    image: impl Fn(
            &MultivariatePolynomial<Zp64, E>,
            &MultivariatePolynomial<Zp64, E>,
        ) -> Result<MultivariatePolynomial<Zp64, E>, ImageError>
        + Sync
        + Send,
) -> Result<MultivariatePolynomial<IntegerRing, E>, GcdError> {
    let gamma = a.field.gcd(&a.lcoeff(), &b.lcoeff());
    let bits = gcd_bit_bound(a, b, vars, &gamma);
    debug!("gamma={}, bit bound={}", gamma, bits);

    let mut primes = PrimeSource::new(config, vec![a.lcoeff(), b.lcoeff()]);
    let pool = thread_pool(config.threads);
    let mut acc = CrtAccumulator::new(a);
    let mut current_lm: Vec<E> = vec![];
    let mut restarts = 0;
    let mut failures = 0;

    loop {
        let batch = primes.next_batch(config.threads.max(1));
        if batch.is_empty() {
            debug!("Ran out of primes after {} images", acc.primes.len());
            return Err(GcdError::PrimesExhausted);
        }

        let images = map_primes(pool.as_ref(), &batch, |p| {
            let field = Zp64::new(p);
            image(&a.to_finite_field(&field), &b.to_finite_field(&field))
        });

        for (p, gp) in batch.into_iter().zip(images) {
            let gp = match gp {
                Ok(gp) => gp,
                Err(e) => {
                    debug!("Unlucky prime {}: {:?}", p, e);
                    failures += 1;
                    if failures > config.max_unlucky_points {
                        return Err(GcdError::PrimesExhausted);
                    }
                    continue;
                }
            };
            failures = 0;

            if gp.is_constant() {
                return Ok(a.one());
            }

            let field = gp.field;
            let gp = gp.make_monic().mul_coeff(&gamma.to_finite_field(&field));

            if acc.is_empty() {
                current_lm = gp.last_exponents().to_vec();
            } else {
                match gp.last_exponents().cmp(&current_lm) {
                    Ordering::Less => {
                        debug!("Unlucky earlier primes: {:?} vs {:?}", gp.last_exponents(), current_lm);
                        acc.reset();
                        current_lm = gp.last_exponents().to_vec();
                    }
                    Ordering::Greater => {
                        debug!("Unlucky prime {}: leading monomial too large", p);
                        continue;
                    }
                    Ordering::Equal => {}
                }
            }

            if !acc.merge(&gp) {
                let g = acc.poly.clone().make_primitive();
                if a.divides(&g).is_some() && b.divides(&g).is_some() {
                    debug!("Converged after {} primes", acc.primes.len());
                    return Ok(g);
                }

                debug!("Trial division failed");
            }

            if acc.poly.max_coeff_bits() > bits + 1 {
                restarts += 1;
                if restarts > config.max_restarts {
                    return Err(GcdError::RestartLimit);
                }

                debug!("Coefficient bound exceeded: restarting");
                acc.reset();
            }
        }
    }
}

impl<F: Ring, E: Exponent> MultivariatePolynomial<F, E> {
    /// Get the leading coefficient with respect to the variables `vars[..n - 1]`,
    /// as a polynomial in the last variable of `vars`. The variables must be
    /// sorted and all other variables must be absent.
    pub(crate) fn lcoeff_last_varorder(&self, vars: &[usize]) -> Self {
        let Some((lastvar, rest)) = vars.split_last() else {
            return self.clone();
        };

        if rest.is_empty() || self.is_zero() {
            return self.clone();
        }

        let last = self.last_exponents();
        let mut start = self.nterms() - 1;
        while start > 0 && rest.iter().all(|v| self.exponents(start - 1)[*v] == last[*v]) {
            start -= 1;
        }

        let mut res = self.zero_with_capacity(self.nterms() - start);
        let mut e = vec![E::zero(); self.nvars()];
        for i in start..self.nterms() {
            e[*lastvar] = self.exponents(i)[*lastvar];
            res.append_monomial_back(self.coefficients[i].clone(), &e);
        }
        res
    }
}

/// Get the gcd of the coefficients of `p` in the variables `vars[..n - 1]`, as
/// a monic polynomial in the last variable of `vars`.
pub(crate) fn content_last_var<F: Field, E: Exponent>(
    p: &MultivariatePolynomial<F, E>,
    vars: &[usize],
) -> UnivariatePolynomial<F> {
    let lastvar = vars[vars.len() - 1];
    let mut content = p.zero().to_univariate(lastvar);

    for (_, c) in p.to_multivariate_polynomial_list(&[lastvar], true) {
        content = content.gcd(&c.to_univariate(lastvar));
        if content.is_constant() {
            break;
        }
    }

    content
}

/// Compute the monic gcd of `a` and `b` in the variables `vars` over a finite field
/// with Brown's dense algorithm.
///
/// The last variable is interpolated densely from the gcds of the images at
/// random points, which are computed recursively. Each image is scaled by
/// `gamma`, the gcd of the leading coefficients in the other variables, so
/// that the interpolant is a multiple of the gcd.
#[instrument(level = "trace", skip_all, fields(%a, %b))]
pub(crate) fn brown_modular<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    vars: &[usize],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<F, E>, ImageError> {
    let main = vars[0];
    if vars.len() == 1 {
        let g = a.to_univariate(main).gcd(&b.to_univariate(main));
        return Ok(a.from_univariate(&g, main));
    }

    let lastvar = vars[vars.len() - 1];
    let sub_vars = &vars[..vars.len() - 1];

    let ca = content_last_var(a, vars);
    let cb = content_last_var(b, vars);
    let content = a.from_univariate(&ca.gcd(&cb), lastvar);
    let a = a / &a.from_univariate(&ca, lastvar);
    let b = b / &b.from_univariate(&cb, lastvar);

    let lca = a.lcoeff_last_varorder(vars).to_univariate(lastvar);
    let lcb = b.lcoeff_last_varorder(vars).to_univariate(lastvar);
    let gamma = lca.gcd(&lcb);

    let bound = gamma.degree() + min(a.degree(lastvar), b.degree(lastvar)).to_u32() as usize;

    let mut sampler = PointSampler::new(&a.field);
    let mut interpolator = NewtonInterpolator::new(&a, lastvar);
    let mut current_lm: Vec<E> = vec![];
    let mut failure_count = 0;

    loop {
        let Some(v) = sampler.sample(config.max_unlucky_points, |v| {
            !F::is_zero(&lca.evaluate(v)) && !F::is_zero(&lcb.evaluate(v))
        }) else {
            debug!("Ran out of evaluation points for {}", a.variables[lastvar]);
            return Err(ImageError::BadCurrentImage);
        };

        let av = a.replace(lastvar, &v);
        let bv = b.replace(lastvar, &v);
        let gv = brown_modular(&av, &bv, sub_vars, config)?;

        if gv.is_constant() {
            return Ok(content.make_monic());
        }

        if interpolator.npoints() == 0 {
            current_lm = gv.last_exponents().to_vec();
        } else {
            match gv.last_exponents().cmp(&current_lm) {
                Ordering::Less => {
                    debug!("Unlucky earlier points: {:?} vs {:?}", gv.last_exponents(), current_lm);
                    interpolator.reset();
                    current_lm = gv.last_exponents().to_vec();
                }
                Ordering::Greater => {
                    failure_count += 1;
                    if failure_count > config.max_unlucky_points {
                        return Err(ImageError::BadCurrentImage);
                    }
                    continue;
                }
                Ordering::Equal => {}
            }
        }

        let gv = gv.make_monic().mul_coeff(&gamma.evaluate(&v));
        let changed = interpolator.add_point(&v, &gv);

        if !changed || interpolator.npoints() > bound {
            let h = interpolator.poly();
            let h = h / &h.from_univariate(&content_last_var(h, vars), lastvar);

            if a.divides(&h).is_some() && b.divides(&h).is_some() {
                return Ok((h * &content).make_monic());
            }

            if interpolator.npoints() > bound + 1 {
                debug!("Interpolation in {} does not converge: restarting", a.variables[lastvar]);
                interpolator.reset();
            }
        }
    }
}

/// Compute the gcd of primitive integer polynomials with Brown's algorithm.
pub(crate) fn gcd_brown<E: Exponent>(
    a: &MultivariatePolynomial<IntegerRing, E>,
    b: &MultivariatePolynomial<IntegerRing, E>,
    vars: &[usize],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<IntegerRing, E>, GcdError> {
    gcd_crt_loop(a, b, vars, config, |ap, bp| brown_modular(ap, bp, vars, config))
}

#[cfg(test)]
mod test {
    use crate::poly::gcd::GcdConfig;
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::{Zp, Zp64};
    use crate::rings::integer::{Integer, IntegerRing};

    use super::{brown_modular, gcd_brown, CrtAccumulator};

    fn zpoly(s: &str, vars: &[&str]) -> MultivariatePolynomial<IntegerRing, u16> {
        MultivariatePolynomial::parse(s, &IntegerRing::new(), variables(vars)).unwrap()
    }

    #[test]
    fn crt_merge() {
        let vars = ["x", "y"];
        let g = zpoly("123456789012*x^2*y-987654321*y+5", &vars);

        let mut acc = CrtAccumulator::new(&g);
        let mut changed = vec![];
        for p in [1000003u64, 1000033, 1000037, 1000039] {
            changed.push(acc.merge(&g.to_finite_field(&Zp64::new(p))));
        }

        assert_eq!(changed, [true, true, false, false]);
        assert_eq!(acc.poly, g);
        assert_eq!(acc.primes.len(), 4);

        acc.reset();
        assert!(acc.is_empty());
        assert_eq!(acc.modulus, Integer::new(1));
    }

    #[test]
    #[should_panic]
    fn crt_merge_twice() {
        let g = zpoly("x+1", &["x"]);
        let mut acc = CrtAccumulator::new(&g);
        acc.merge(&g.to_finite_field(&Zp64::new(1000003)));
        acc.merge(&g.to_finite_field(&Zp64::new(1000003)));
    }

    #[test]
    fn lcoeff_in_last_variable() {
        let p = zpoly("3*x^2*y^2*z+x^2*y^2*z^3-x^2*y+x*z+4", &["x", "y", "z"]);
        let lc = p.lcoeff_last_varorder(&[0, 1, 2]);
        assert_eq!(lc, zpoly("z^3+3*z", &["x", "y", "z"]));
        assert_eq!(p.lcoeff_last_varorder(&[0]), p);
    }

    #[test]
    fn brown_modular_gcd() {
        let field = Zp::new(10007);
        let vars = variables(&["x", "y", "z"]);
        let parse = |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse("x^2*y+3*z^2*y-x+1");
        let a = &g * &parse("x*y*z+y^3-2");
        let b = &g * &parse("x^3-y*z^2+z+5");

        let r = brown_modular(&a, &b, &[0, 1, 2], &GcdConfig::default()).unwrap();
        assert_eq!(r, g.make_monic());
    }

    #[test]
    fn brown_modular_content() {
        let field = Zp::new(10007);
        let vars = variables(&["x", "y"]);
        let parse = |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        // the gcd contains a factor that only depends on the last variable
        let a = parse("(y^2+1)*(x+y)*(x-3)");
        let b = parse("(y^2+1)*(y-2)*(x+y)*(x+5)");
        let r = brown_modular(&a, &b, &[0, 1], &GcdConfig::default()).unwrap();
        assert_eq!(r, parse("(y^2+1)*(x+y)").make_monic());
    }

    #[test]
    fn brown_integer() {
        let vars = ["x", "y", "z"];
        let g = zpoly("7*x^3*y-123456789123*z^2+x*y*z-1", &vars);
        let a = &g * &zpoly("3*x*y-z^5+2", &vars);
        let b = &g * &zpoly("x^2+19*y*z^2-4", &vars);

        let r = gcd_brown(&a, &b, &[0, 1, 2], &GcdConfig::default()).unwrap();
        assert_eq!(r, g);
    }
}
