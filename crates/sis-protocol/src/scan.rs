//! Small cursor used by the feedback parsers
//!
//! Feedback lines are short ASCII strings with a handful of fixed shapes, so
//! a forward-only cursor is enough to pick them apart without backtracking.

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    /// Remaining unconsumed input
    pub(crate) fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Consume `lit` if the input continues with it (exact case)
    pub(crate) fn eat(&mut self, lit: &str) -> bool {
        if self.rest().starts_with(lit) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume `lit` if the input continues with it, ignoring ASCII case
    pub(crate) fn eat_ignore_case(&mut self, lit: &str) -> bool {
        let rest = self.rest().as_bytes();
        if rest.len() >= lit.len() && rest[..lit.len()].eq_ignore_ascii_case(lit.as_bytes()) {
            self.pos += lit.len();
            true
        } else {
            false
        }
    }

    /// Consume a run of ASCII digits, returning it (possibly empty)
    pub(crate) fn digits(&mut self) -> &'a str {
        self.take_while(|b| b.is_ascii_digit())
    }

    /// Consume between `min` and `max` digits that are followed by a non-digit
    pub(crate) fn digits_bounded(&mut self, min: usize, max: usize) -> Option<&'a str> {
        let start = self.pos;
        let run = self.digits();
        if run.len() < min || run.len() > max {
            self.pos = start;
            return None;
        }
        Some(run)
    }

    /// Consume a number of the form `<digits>.<digits>`
    pub(crate) fn dotted_version(&mut self) -> Option<&'a str> {
        let start = self.pos;
        let ok = !self.digits().is_empty() && self.eat(".") && !self.digits().is_empty();
        if ok {
            Some(&self.src[start..self.pos])
        } else {
            self.pos = start;
            None
        }
    }

    /// Consume whitespace, returning how much was skipped
    pub(crate) fn skip_ws(&mut self) -> usize {
        self.take_while(|b| b.is_ascii_whitespace()).len()
    }

    /// Consume everything up to (not including) `stop`
    pub(crate) fn until(&mut self, stop: u8) -> Option<&'a str> {
        let idx = self.rest().bytes().position(|b| b == stop)?;
        let out = &self.rest()[..idx];
        self.pos += idx;
        Some(out)
    }

    pub(crate) fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.bytes().take_while(|&b| pred(b)).count();
        self.pos += len;
        &rest[..len]
    }
}

/// Byte offsets of every case-insensitive occurrence of `needle` in `haystack`
pub(crate) fn find_all_ignore_case<'a>(
    haystack: &'a str,
    needle: &'a str,
) -> impl Iterator<Item = usize> + 'a {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    let end = (hay.len() + 1).saturating_sub(pat.len());
    (0..end).filter(move |&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digits_bounded() {
        let mut c = Cursor::new("123abc");
        assert_eq!(c.digits_bounded(1, 2), None);
        assert_eq!(c.rest(), "123abc");
        assert_eq!(c.digits_bounded(1, 3), Some("123"));
        assert_eq!(c.rest(), "abc");
    }

    #[test]
    fn test_dotted_version() {
        let mut c = Cursor::new("1.23-1.00");
        assert_eq!(c.dotted_version(), Some("1.23"));
        assert!(c.eat("-"));
        assert_eq!(c.dotted_version(), Some("1.00"));
        assert!(c.is_empty());

        let mut c = Cursor::new("12.");
        assert_eq!(c.dotted_version(), None);
        assert_eq!(c.rest(), "12.");
    }

    #[test]
    fn test_eat_ignore_case() {
        let mut c = Cursor::new("oUT3");
        assert!(c.eat_ignore_case("out"));
        assert_eq!(c.digits(), "3");
    }

    #[test]
    fn test_find_all_ignore_case() {
        let hits: Vec<_> = find_all_ignore_case("Out1 xOUT2 out", "out").collect();
        assert_eq!(hits, vec![0, 6, 11]);
        assert_eq!(find_all_ignore_case("ou", "out").count(), 0);
    }
}
