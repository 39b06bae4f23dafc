//! Exit status families
//!
//! Calling automation needs to tell "bad input" apart from "infrastructure
//! took too long", so every terminal error belongs to one family and each
//! family owns a distinct exit code.

/// Exit code for a successful run
pub const EXIT_SUCCESS: i32 = 0;

/// Broad classification of a terminal error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum ErrorFamily {
    /// Refused before touching capacity: bad flags, ambiguous fleet state,
    /// environment locked
    #[strum(serialize = "validation")]
    Validation,
    /// A bounded phase ran out of time or saw no scaling activity
    #[strum(serialize = "timeout")]
    Timeout,
    /// Control-plane or lock-store API failure
    #[strum(serialize = "runtime")]
    Runtime,
    /// Operator interrupted the run
    #[strum(serialize = "interrupted")]
    Interrupted,
}

impl ErrorFamily {
    /// Process exit code for this family
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Runtime => 1,
            Self::Validation => 2,
            Self::Timeout => 3,
            Self::Interrupted => 130,
        }
    }
}
