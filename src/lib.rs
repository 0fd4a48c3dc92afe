//! Multivariate polynomial gcds over the integers, prime fields and their extensions.
//!
//! The gcd is computed with modular algorithms: Brown's dense interpolation,
//! Zippel's sparse interpolation and Berlekamp-Massey interpolation, lifted
//! to the integers with Chinese remaindering.
//!
//! For example:
//!
//! ```
//! use mpgcd::poly::{polynomial::MultivariatePolynomial, variables};
//! use mpgcd::rings::integer::IntegerRing;
//!
//! let vars = variables(&["x", "y"]);
//! let a = MultivariatePolynomial::<_, u16>::parse("(x+y)*(x-2*y+1)", &IntegerRing::new(), vars.clone())
//!     .unwrap();
//! let b = MultivariatePolynomial::<_, u16>::parse("(x+y)*(x^2+3)", &IntegerRing::new(), vars)
//!     .unwrap();
//! println!("gcd({}, {}) = {}", a, b, a.gcd(&b).unwrap());
//! ```

pub mod poly;
pub mod rings;
pub mod utils;
