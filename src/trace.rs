use std::{fmt, panic::Location};

use serde::Serialize;

/// Where something happened: the source file and line of a call site.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Trace {
    pub file: &'static str,
    pub line: u32,
}

impl Trace {
    /// The file is `&'static str`, which is what `file!()` and
    /// [`Location::file()`] give you. Explicit-location callers building a
    /// path at run time have to leak it (`String::leak`) first.
    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }

    /// The location of whoever called the (`#[track_caller]`) function this
    /// is invoked from.
    #[track_caller]
    pub fn caller() -> Self {
        Location::caller().into()
    }

    /// `true` for the zero trace, i.e. "nothing happened yet"
    pub fn is_zero(&self) -> bool {
        self.file.is_empty() && self.line == 0
    }
}

impl From<&Location<'static>> for Trace {
    fn from(location: &Location<'static>) -> Self {
        Self::new(location.file(), location.line())
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    pub fn renders_as_file_colon_line() {
        assert_eq!(Trace::new("a.x", 12).to_string(), "a.x:12");
        assert_eq!(Trace::default().to_string(), ":0");
    }

    #[test]
    pub fn default_is_zero() {
        assert!(Trace::default().is_zero());
        assert!(!Trace::new("f", 0).is_zero());
    }

    #[test]
    pub fn caller_points_here() {
        let line = line!() + 1;
        let trace = Trace::caller();
        assert_eq!(trace, Trace::new(file!(), line));
    }

    #[test]
    pub fn runtime_paths_can_be_leaked_in() {
        let file: &'static str = format!("gen/{}.rs", 7).leak();
        assert_eq!(Trace::new(file, 3).to_string(), "gen/7.rs:3");
    }

    #[test]
    pub fn equality_is_structural() {
        let mut a = Trace::new("f", 1);
        let b = Trace::new("f", 2);
        assert_ne!(a, b);
        a = b;
        assert_eq!(a, b);
    }
}
