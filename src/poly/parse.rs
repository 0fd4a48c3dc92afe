//! A small parser for expanded or factored polynomial expressions such as
//! `3*x^2*y-(x+1)^3`. Variables must be declared in the variable map.

use std::iter::Peekable;
use std::str::CharIndices;
use std::sync::Arc;

use crate::rings::Ring;

use super::polynomial::MultivariatePolynomial;
use super::{Exponent, Variable};

struct Parser<'a, F: Ring, E: Exponent> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    template: MultivariatePolynomial<F, E>,
}

impl<'a, F: Ring, E: Exponent> Parser<'a, F, E> {
    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.peek().map(|(_, c)| *c)
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(i, _)| *i)
            .unwrap_or(self.input.len())
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        if self.peek() == Some(c) {
            self.chars.next();
            Ok(())
        } else {
            Err(format!("Expected '{}' at position {}", c, self.position()))
        }
    }

    /// `expr := term (('+' | '-') term)*`
    fn expression(&mut self) -> Result<MultivariatePolynomial<F, E>, String> {
        let mut res = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.chars.next();
                    res = res + self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    res = res - self.term()?;
                }
                _ => return Ok(res),
            }
        }
    }

    /// `term := factor ('*' factor)*`
    fn term(&mut self) -> Result<MultivariatePolynomial<F, E>, String> {
        let mut res = self.factor()?;
        while self.peek() == Some('*') {
            self.chars.next();
            res = res * &self.factor()?;
        }
        Ok(res)
    }

    /// `factor := '-' factor | primary ('^' integer)?`
    fn factor(&mut self) -> Result<MultivariatePolynomial<F, E>, String> {
        if self.peek() == Some('-') {
            self.chars.next();
            return Ok(-self.factor()?);
        }

        let base = self.primary()?;
        if self.peek() == Some('^') {
            self.chars.next();
            self.skip_whitespace();
            let pos = self.position();
            let digits = self.digits();
            let e: usize = digits
                .parse()
                .map_err(|_| format!("Bad exponent at position {}", pos))?;
            return Ok(base.pow(e));
        }

        Ok(base)
    }

    fn digits(&mut self) -> String {
        let mut s = String::new();
        while let Some((_, c)) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            s.push(*c);
            self.chars.next();
        }
        s
    }

    /// `primary := integer | variable | '(' expr ')'`
    fn primary(&mut self) -> Result<MultivariatePolynomial<F, E>, String> {
        let pos = self.position();
        match self.peek() {
            Some('(') => {
                self.chars.next();
                let e = self.expression()?;
                self.expect(')')?;
                Ok(e)
            }
            Some(c) if c.is_ascii_digit() => {
                let field = self.template.field;
                let ten = field.nth(10);
                let mut n = field.zero();
                for d in self.digits().bytes() {
                    n = field.add(&field.mul(&n, &ten), &field.nth((d - b'0') as i64));
                }
                Ok(self.template.constant(n))
            }
            Some(c) if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                while let Some((_, c)) = self.chars.peek() {
                    if !(c.is_alphanumeric() || *c == '_') {
                        break;
                    }
                    name.push(*c);
                    self.chars.next();
                }

                match self
                    .template
                    .variables
                    .iter()
                    .position(|v| v.name() == name)
                {
                    Some(i) => Ok(self.template.variable(i)),
                    None => Err(format!("Unknown variable '{}' at position {}", name, pos)),
                }
            }
            Some(c) => Err(format!("Unexpected character '{}' at position {}", c, pos)),
            None => Err("Unexpected end of input".to_owned()),
        }
    }
}

impl<F: Ring, E: Exponent> MultivariatePolynomial<F, E> {
    /// Parse a polynomial over `field` in the variables `variables`.
    pub fn parse(input: &str, field: &F, variables: Arc<Vec<Variable>>) -> Result<Self, String> {
        let mut parser = Parser {
            input,
            chars: input.char_indices().peekable(),
            template: MultivariatePolynomial::new(field, None, variables),
        };

        let res = parser.expression()?;
        match parser.peek() {
            None => Ok(res),
            Some(c) => Err(format!(
                "Unexpected character '{}' at position {}",
                c,
                parser.position()
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::poly::polynomial::MultivariatePolynomial;
    use crate::poly::variables;
    use crate::rings::finite_field::{FiniteFieldCore, Zp};
    use crate::rings::integer::{Integer, IntegerRing};

    #[test]
    fn parse_expanded() {
        let p = MultivariatePolynomial::<_, u16>::parse(
            "3*x^2*y - x + 5 - 2*x",
            &IntegerRing::new(),
            variables(&["x", "y"]),
        )
        .unwrap();
        p.check_consistency();
        assert_eq!(p.nterms(), 3);
        assert_eq!(p.to_string(), "3*x^2*y-3*x+5");
    }

    #[test]
    fn parse_factored() {
        let vars = variables(&["x", "y"]);
        let p = MultivariatePolynomial::<_, u16>::parse("-(x+1)^2*(y-1)", &IntegerRing::new(), vars)
            .unwrap();
        assert_eq!(p.to_string(), "-x^2*y+x^2-2*x*y+2*x-y+1");
    }

    #[test]
    fn parse_large_coefficient() {
        let p = MultivariatePolynomial::<_, u8>::parse(
            "100000000000000000000*x",
            &IntegerRing::new(),
            variables(&["x"]),
        )
        .unwrap();
        assert_eq!(p.lcoeff(), &Integer::new(10000000000) * &Integer::new(10000000000));

        let field = Zp::new(7);
        let q = MultivariatePolynomial::<_, u8>::parse("9*x-1", &field, variables(&["x"])).unwrap();
        assert_eq!(field.from_element(&q.lcoeff()), 2);
    }

    #[test]
    fn parse_errors() {
        let vars = variables(&["x"]);
        let z = IntegerRing::new();
        assert!(MultivariatePolynomial::<_, u8>::parse("x+y", &z, vars.clone()).is_err());
        assert!(MultivariatePolynomial::<_, u8>::parse("(x+1", &z, vars.clone()).is_err());
        assert!(MultivariatePolynomial::<_, u8>::parse("x^", &z, vars.clone()).is_err());
        assert!(MultivariatePolynomial::<_, u8>::parse("x)", &z, vars).is_err());
    }
}
