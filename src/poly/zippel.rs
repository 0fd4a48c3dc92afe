//! Zippel's sparse modular gcd algorithm.
//!
//! Over a prime field, the last variable is interpolated densely while all
//! images after the first are reconstructed sparsely from the shape of the
//! first one. Over the integers, the shape learnt at one prime is used to
//! build cheap sparse images at the following primes, which are combined
//! with Chinese remaindering.

use tracing::{debug, instrument};

use crate::rings::finite_field::{ToFiniteField, Zp64};
use crate::rings::integer::IntegerRing;
use crate::rings::{EuclideanDomain, EvaluationField, Ring};

use super::brown::{content_last_var, gcd_bit_bound, map_primes, thread_pool, CrtAccumulator, PrimeSource};
use super::evaluate::{construct_new_image, ImageError, NewtonInterpolator, PointSampler};
use super::gcd::{GcdConfig, GcdError};
use super::polynomial::MultivariatePolynomial;
use super::Exponent;

/// Compute the monic gcd of `a` and `b` in the variables `vars` over a finite field.
///
/// The first image at a random value of the last variable is computed
/// recursively and its shape in the main variable `vars[0]` is used to
/// construct all further images with sparse interpolation. The last variable
/// is then interpolated densely, using `tight_bounds` as an estimate of its degree.
#[instrument(level = "debug", skip_all)]
pub(crate) fn zippel_modular<F: EvaluationField, E: Exponent>(
    a: &MultivariatePolynomial<F, E>,
    b: &MultivariatePolynomial<F, E>,
    vars: &[usize],
    bounds: &mut [E],
    tight_bounds: &mut [E],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<F, E>, ImageError> {
    let main = vars[0];
    if vars.len() == 1 {
        let g = a.to_univariate(main).gcd(&b.to_univariate(main));
        let d = E::from_u32(g.degree() as u32);
        if d > bounds[main] {
            return Err(ImageError::BadCurrentImage);
        }
        bounds[main] = d;
        return Ok(a.from_univariate(&g, main));
    }

    let lastvar = vars[vars.len() - 1];
    let sub_vars = &vars[..vars.len() - 1];

    let ca = content_last_var(a, vars);
    let cb = content_last_var(b, vars);
    let content = a.from_univariate(&ca.gcd(&cb), lastvar);
    if !content.is_constant() {
        debug!("Content in {}: {}", a.variables[lastvar], content);
    }
    let a = a / &a.from_univariate(&ca, lastvar);
    let b = b / &b.from_univariate(&cb, lastvar);

    let lca = a.lcoeff_last_varorder(vars).to_univariate(lastvar);
    let lcb = b.lcoeff_last_varorder(vars).to_univariate(lastvar);
    let gamma = lca.gcd(&lcb);

    let mut sampler = PointSampler::new(&a.field);
    let sample = |sampler: &mut PointSampler<F>| {
        sampler.sample(config.max_unlucky_points, |v| {
            !F::is_zero(&lca.evaluate(v)) && !F::is_zero(&lcb.evaluate(v))
        })
    };

    let mut failure_count = 0;

    'newfirstnum: loop {
        // the tight bound may be too tight due to an unfortunate evaluation
        if failure_count == 2 {
            debug!(
                "Changing tight bound for {} from {} to {}",
                a.variables[lastvar], tight_bounds[lastvar], bounds[lastvar]
            );
            tight_bounds[lastvar] = bounds[lastvar];
        }
        failure_count += 1;
        if failure_count > config.max_unlucky_points {
            return Err(ImageError::BadCurrentImage);
        }

        let Some(v) = sample(&mut sampler) else {
            debug!("Ran out of evaluation points for {}", a.variables[lastvar]);
            return Err(ImageError::BadCurrentImage);
        };

        let av = a.replace(lastvar, &v);
        let bv = b.replace(lastvar, &v);
        let gv = zippel_modular(&av, &bv, sub_vars, bounds, tight_bounds, config)?;

        if gv.is_constant() {
            return Ok(content.make_monic());
        }

        debug!(
            "GCD shape suggestion for sample point {:?} and gamma {}: {}",
            v,
            gamma,
            gv
        );

        let shape = gv.to_univariate_polynomial_list(main);
        let points_needed = tight_bounds[lastvar].to_u32() as usize + gamma.degree() + 1;

        let mut interpolator = NewtonInterpolator::new(&a, lastvar);
        interpolator.add_point(&v, &gv.make_monic().mul_coeff(&gamma.evaluate(&v)));

        let mut current_failures = 0;
        while interpolator.npoints() < points_needed {
            let Some(v) = sample(&mut sampler) else {
                return Err(ImageError::BadCurrentImage);
            };

            let av = a.replace(lastvar, &v);
            let bv = b.replace(lastvar, &v);

            let gv = match construct_new_image(
                &av,
                &bv,
                av.degree(main),
                bv.degree(main),
                bounds,
                &sub_vars[1..],
                main,
                &shape,
                config.max_unlucky_points,
            ) {
                Ok(gv) => gv,
                Err(ImageError::BadOriginalImage) => {
                    debug!("Bad original image");
                    continue 'newfirstnum;
                }
                Err(ImageError::BadCurrentImage) => {
                    debug!("Bad current image");
                    current_failures += 1;
                    if current_failures > config.max_unlucky_points {
                        continue 'newfirstnum;
                    }
                    continue;
                }
            };

            interpolator.add_point(&v, &gv.make_monic().mul_coeff(&gamma.evaluate(&v)));
        }

        let gc = interpolator.poly();
        let gc = gc / &gc.from_univariate(&content_last_var(gc, vars), lastvar);
        debug!("Interpolated: {}", gc);

        if a.divides(&gc).is_some() && b.divides(&gc).is_some() {
            return Ok((gc * &content).make_monic());
        }

        debug!("Trial division failed: restarting");
    }
}

/// The states of the integer Zippel algorithm.
enum ZippelState<E: Exponent> {
    /// Compute a complete modular gcd to learn the shape of the gcd.
    ChoosePrimeOuter,
    /// Construct sparse images at new primes from the shape.
    ChoosePrimeInner {
        shape: Vec<(MultivariatePolynomial<Zp64, E>, E)>,
        lm: Vec<E>,
    },
    Success(MultivariatePolynomial<IntegerRing, E>),
}

/// Compute the gcd of primitive integer polynomials with Zippel's algorithm.
///
/// A full modular gcd at one prime fixes the shape of the gcd, after which
/// every new prime only requires a sparse image. An image that contradicts
/// the shape sends the algorithm back to learning a new shape.
#[instrument(level = "debug", skip_all)]
pub(crate) fn gcd_zippel<E: Exponent>(
    a: &MultivariatePolynomial<IntegerRing, E>,
    b: &MultivariatePolynomial<IntegerRing, E>,
    vars: &[usize],
    bounds: &mut [E],
    tight_bounds: &mut [E],
    config: &GcdConfig,
) -> Result<MultivariatePolynomial<IntegerRing, E>, GcdError> {
    debug!("Zippel gcd of {} and {}", a, b);

    let gamma = a.field.gcd(&a.lcoeff(), &b.lcoeff());
    let bits = gcd_bit_bound(a, b, vars, &gamma);
    debug!("gamma {}, bit bound {}", gamma, bits);

    let main = vars[0];
    let mut primes = PrimeSource::new(config, vec![a.lcoeff(), b.lcoeff()]);
    let pool = thread_pool(config.threads);
    let mut acc = CrtAccumulator::new(a);
    let mut restarts = 0;
    let mut failures = 0;

    let mut state = ZippelState::ChoosePrimeOuter;
    loop {
        state = match state {
            ZippelState::ChoosePrimeOuter => {
                let Some(p) = primes.next_prime() else {
                    return Err(GcdError::PrimesExhausted);
                };

                let field = Zp64::new(p);
                let ap = a.to_finite_field(&field);
                let bp = b.to_finite_field(&field);
                debug!("New first image: gcd({},{}) mod {}", ap, bp, p);

                match zippel_modular(&ap, &bp, vars, bounds, tight_bounds, config) {
                    Ok(gp) if gp.is_constant() => ZippelState::Success(a.one()),
                    Ok(gp) => {
                        bounds[main] = gp.degree(main);
                        let gp = gp.make_monic().mul_coeff(&gamma.to_finite_field(&field));
                        debug!("GCD suggestion with gamma: {} mod {}", gp, p);

                        acc.reset();
                        acc.merge(&gp);
                        ZippelState::ChoosePrimeInner {
                            shape: gp.to_univariate_polynomial_list(main),
                            lm: gp.last_exponents().to_vec(),
                        }
                    }
                    Err(e) => {
                        debug!("Modular GCD failed: {:?}", e);
                        failures += 1;
                        if failures > config.max_unlucky_points {
                            return Err(GcdError::PrimesExhausted);
                        }
                        ZippelState::ChoosePrimeOuter
                    }
                }
            }
            ZippelState::ChoosePrimeInner { shape, lm } => {
                let batch = primes.next_batch(config.threads.max(1));
                if batch.is_empty() {
                    return Err(GcdError::PrimesExhausted);
                }

                let snapshot: &[E] = bounds;
                let images = map_primes(pool.as_ref(), &batch, |p| {
                    let field = Zp64::new(p);
                    let ap = a.to_finite_field(&field);
                    let bp = b.to_finite_field(&field);

                    // the shape is independent of the prime, only the coefficients are not
                    let shape: Vec<_> = shape
                        .iter()
                        .map(|(c, e)| (c.map_coeff(|_| field.one(), field), *e))
                        .collect();

                    let mut local_bounds = snapshot.to_vec();
                    let gp = construct_new_image(
                        &ap,
                        &bp,
                        ap.degree(main),
                        bp.degree(main),
                        &mut local_bounds,
                        &vars[1..],
                        main,
                        &shape,
                        config.max_unlucky_points,
                    )?;

                    if gp.last_exponents() != lm.as_slice() {
                        debug!("Leading coefficient vanishes in the image mod {}", p);
                        return Err(ImageError::BadCurrentImage);
                    }

                    Ok(gp.make_monic().mul_coeff(&gamma.to_finite_field(&field)))
                });

                let mut next = None;
                for (p, gp) in batch.into_iter().zip(images) {
                    let gp = match gp {
                        Ok(gp) => gp,
                        Err(ImageError::BadOriginalImage) => {
                            debug!("Bad original image at prime {}", p);
                            restarts += 1;
                            if restarts > config.max_restarts {
                                return Err(GcdError::RestartLimit);
                            }
                            next = Some(ZippelState::ChoosePrimeOuter);
                            break;
                        }
                        Err(ImageError::BadCurrentImage) => {
                            debug!("Bad current image at prime {}", p);
                            failures += 1;
                            if failures > config.max_unlucky_points {
                                restarts += 1;
                                if restarts > config.max_restarts {
                                    return Err(GcdError::RestartLimit);
                                }
                                failures = 0;
                                next = Some(ZippelState::ChoosePrimeOuter);
                                break;
                            }
                            continue;
                        }
                    };
                    failures = 0;

                    if !acc.merge(&gp) {
                        let g = acc.poly.clone().make_primitive();
                        debug!("Final suggested gcd: {}", g);
                        if a.divides(&g).is_some() && b.divides(&g).is_some() {
                            next = Some(ZippelState::Success(g));
                            break;
                        }

                        debug!("Does not divide: more primes needed");
                    }

                    if acc.poly.max_coeff_bits() > bits + 1 {
                        restarts += 1;
                        if restarts > config.max_restarts {
                            return Err(GcdError::RestartLimit);
                        }

                        debug!("Coefficient bound exceeded: restarting");
                        next = Some(ZippelState::ChoosePrimeOuter);
                        break;
                    }
                }

                next.unwrap_or(ZippelState::ChoosePrimeInner { shape, lm })
            }
            ZippelState::Success(g) => return Ok(g),
        };
    }
}

#[cfg(test)]
mod test {
    use crate::poly::gcd::GcdConfig;
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::Zp;
    use crate::rings::integer::IntegerRing;

    use super::{gcd_zippel, zippel_modular};

    #[test]
    fn zippel_modular_gcd() {
        let field = Zp::new(1000003);
        let vars = variables(&["x", "y", "z"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse("x^4*y*z+3*x*y^5-z^3+2");
        let a = &g * &parse("x^2*y-z+1");
        let b = &g * &parse("x*z^2+y^3-5");

        let mut bounds = vec![4, 6, 3];
        let mut tight_bounds = bounds.clone();
        let r = zippel_modular(&a, &b, &[0, 1, 2], &mut bounds, &mut tight_bounds, &GcdConfig::default())
            .unwrap();
        assert_eq!(r, g.make_monic());
    }

    #[test]
    fn zippel_multiple_scales() {
        // no coefficient in x is a single monomial
        let field = Zp::new(1000003);
        let vars = variables(&["x", "y", "z"]);
        let parse =
            |s: &str| MultivariatePolynomial::<_, u16>::parse(s, &field, vars.clone()).unwrap();

        let g = parse("(y+z+1)*x^2+(y^2-z)*x+y*z+3");
        let a = &g * &parse("x+y^2*z-1");
        let b = &g * &parse("x^2-z+y");

        let mut bounds = vec![2, 2, 2];
        let mut tight_bounds = bounds.clone();
        let r = zippel_modular(&a, &b, &[0, 1, 2], &mut bounds, &mut tight_bounds, &GcdConfig::default())
            .unwrap();
        assert_eq!(r, g.make_monic());
    }

    #[test]
    fn zippel_integer() {
        let vars = variables(&["x", "y", "z"]);
        let parse = |s: &str| {
            MultivariatePolynomial::<_, u16>::parse(s, &IntegerRing::new(), vars.clone()).unwrap()
        };

        let g = parse("3*x^3*y^2-55555555555*y*z^4+x*z-7");
        let a = &g * &parse("x*y+z-4");
        let b = &g * &parse("x^2-2*y*z^2+9");

        let mut bounds = vec![3, 2, 4];
        let mut tight_bounds = bounds.clone();
        let r = gcd_zippel(&a, &b, &[0, 1, 2], &mut bounds, &mut tight_bounds, &GcdConfig::default())
            .unwrap();
        assert_eq!(r, g);
    }
}
