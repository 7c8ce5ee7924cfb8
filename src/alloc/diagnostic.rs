//! The bugs we know how to catch, and what happens when we catch one.
//!
//! Every [`Violation`] is terminal: it is printed as a single block on stdout
//! and the process exits with [`Violation::exit_code()`]. The exit codes are
//! stable, so a test harness can tell the bugs apart without parsing output.

use std::{
    error::Error,
    fmt,
    io::{self, Write},
    process,
};

use crate::{trace::Trace, util::hint::cold};

#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Violation {
    /// The last handle went away and nobody freed the allocation
    Leak { allocated_at: Trace },
    /// Freed twice
    DoubleFree { first: Trace, second: Trace },
    /// Indexed outside of `0..size`
    OutOfBounds {
        index: i128,
        size: usize,
        allocated_at: Trace,
    },
    /// Touched after being freed
    UseAfterFree { freed_at: Trace },
    /// Allocated as a single element, freed as an array
    SingleFreedAsArray { allocated_at: Trace, freed_at: Trace },
    /// Allocated as an array, freed as a single element
    ArrayFreedAsSingle { allocated_at: Trace, freed_at: Trace },
}

impl Violation {
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Leak { .. } => 11,
            Self::DoubleFree { .. } => 12,
            Self::OutOfBounds { .. } => 13,
            Self::UseAfterFree { .. } => 14,
            Self::SingleFreedAsArray { .. } => 21,
            Self::ArrayFreedAsSingle { .. } => 22,
        }
    }

    /// Whether the allocation's buffer should be released before we exit.
    /// Double frees and use-after-free have nothing left to release.
    pub(crate) const fn releases_buffer(&self) -> bool {
        !matches!(self, Self::DoubleFree { .. } | Self::UseAfterFree { .. })
    }

    /// Print this violation and exit with its code. Never returns.
    pub fn terminate(self) -> ! {
        cold(|| {
            log::error!("{} (exit {})", self.headline(), self.exit_code());
            let mut out = io::stdout().lock();
            // We are about to exit anyway, a broken stdout changes nothing
            let _ = writeln!(out, "{self}");
            let _ = out.flush();
        });
        process::exit(self.exit_code())
    }

    fn headline(&self) -> &'static str {
        match self {
            Self::Leak { .. } => "Memory leak detected!",
            Self::DoubleFree { .. } => "Double free detected!",
            Self::OutOfBounds { .. } => "Index out of boundary!",
            Self::UseAfterFree { .. } => "Access after freed!",
            Self::SingleFreedAsArray { .. } => "Allocated as NEW but freed as DELETE_ARRAY!",
            Self::ArrayFreedAsSingle { .. } => "Allocated as NEW_ARRAY but freed as DELETE!",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.headline())?;
        match self {
            Self::Leak { allocated_at } => {
                write!(f, "\n-> Allocated here: ({allocated_at}).")
            }
            Self::DoubleFree { first, second } => {
                write!(f, "\n-> 1st free: ({first}).\n-> 2nd free: ({second}).")
            }
            Self::OutOfBounds {
                index,
                size,
                allocated_at,
            } => write!(
                f,
                "\n-> Index: {index}, size: {size}.\n-> Allocated here: ({allocated_at})."
            ),
            Self::UseAfterFree { freed_at } => write!(f, "\n-> 1st free: ({freed_at})."),
            Self::SingleFreedAsArray {
                allocated_at,
                freed_at,
            }
            | Self::ArrayFreedAsSingle {
                allocated_at,
                freed_at,
            } => write!(
                f,
                "\n-> Allocated here: ({allocated_at}).\n-> Freed here: ({freed_at})."
            ),
        }
    }
}

impl Error for Violation {}
