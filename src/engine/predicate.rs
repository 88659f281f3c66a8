//! Tri-valued predicate logic.
//!
//! Predicates have existence semantics: pairs of items from the left and
//! right operand sequences are checked, and `True` is returned as soon as
//! any pair satisfies the condition. In strict mode all pairs are still
//! examined to prove the absence of errors; any error collapses to
//! `Unknown`, the SQL NULL analogue.

/// Result of a predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truth {
    False,
    True,
    Unknown,
}

impl Truth {
    pub fn from_bool(b: bool) -> Truth {
        if b {
            Truth::True
        } else {
            Truth::False
        }
    }

    pub fn is_true(self) -> bool {
        self == Truth::True
    }

    pub fn is_unknown(self) -> bool {
        self == Truth::Unknown
    }

    /// Logical negation; `Unknown` stays `Unknown`.
    pub fn negate(self) -> Truth {
        match self {
            Truth::True => Truth::False,
            Truth::False => Truth::True,
            Truth::Unknown => Truth::Unknown,
        }
    }
}

/// Pair-driver state shared by the comparison, `starts with` and
/// `like_regex` predicates. Callers feed it one verdict per (left, right)
/// pair; it applies the strict/lax short-circuit and accounting rules.
#[derive(Debug)]
pub(crate) struct PairAccumulator {
    strict: bool,
    error: bool,
    found: bool,
}

/// Outcome of feeding one pair verdict into the accumulator.
pub(crate) enum PairStep {
    Continue,
    /// Short-circuit with this final result.
    Done(Truth),
}

impl PairAccumulator {
    pub(crate) fn new(strict: bool) -> Self {
        PairAccumulator {
            strict,
            error: false,
            found: false,
        }
    }

    pub(crate) fn push(&mut self, verdict: Truth) -> PairStep {
        match verdict {
            Truth::Unknown => {
                if self.strict {
                    return PairStep::Done(Truth::Unknown);
                }
                self.error = true;
            }
            Truth::True => {
                if !self.strict {
                    return PairStep::Done(Truth::True);
                }
                self.found = true;
            }
            Truth::False => {}
        }
        PairStep::Continue
    }

    /// Final result after all pairs were examined.
    pub(crate) fn finish(self) -> Truth {
        if self.found {
            // Reachable only in strict mode.
            Truth::True
        } else if self.error {
            // Reachable only in lax mode.
            Truth::Unknown
        } else {
            Truth::False
        }
    }
}
