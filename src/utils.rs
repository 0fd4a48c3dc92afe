pub fn gcd_unsigned(mut a: u64, mut b: u64) -> u64 {
    let mut c;
    while a != 0 {
        c = a;
        a = b % a;
        b = c;
    }
    b
}

pub fn gcd_signed(mut a: i64, mut b: i64) -> u64 {
    let mut c;
    while a != 0 {
        c = a;
        // only wraps when i64::MIN % -1 and that still yields 0
        a = b.wrapping_rem(a);
        b = c;
    }
    b.unsigned_abs()
}

/// Ceiling of the base-2 logarithm of `n`, with `clog2(0) = clog2(1) = 0`.
#[inline]
pub fn clog2(n: u64) -> u64 {
    if n <= 1 {
        0
    } else {
        64 - (n - 1).leading_zeros() as u64
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gcd() {
        assert_eq!(gcd_unsigned(12, 18), 6);
        assert_eq!(gcd_signed(-12, 18), 6);
        assert_eq!(gcd_signed(i64::MIN, -1), 1);
        assert_eq!(gcd_signed(0, -7), 7);
    }

    #[test]
    fn ceil_log() {
        assert_eq!(clog2(1), 0);
        assert_eq!(clog2(2), 1);
        assert_eq!(clog2(3), 2);
        assert_eq!(clog2(1024), 10);
        assert_eq!(clog2(1025), 11);
    }
}
