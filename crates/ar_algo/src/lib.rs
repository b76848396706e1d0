// crates/ar_algo/src/lib.rs
#![forbid(unsafe_code)]

//! Pure algorithms used by the pipeline stages. No I/O, no logging.

// ----------------------------- Allocation (public surface) ---------------------------

pub mod allocation {
    //! Integer apportionment of fractional line values to an exact group total.

    pub mod largest_remainder;

    pub use largest_remainder::{allocate_largest_remainder, LargestRemainder};

    use core::fmt;

    /// Per-group integer allocation.
    #[derive(Clone, Debug, Default, PartialEq, Eq)]
    pub struct Apportionment {
        /// One quantity per input value, same order.
        pub quantities: Vec<i64>,
        /// `target - Σ trunc(v_i)` before distribution.
        pub adjustment: i64,
        /// True iff input order decided who received the last unit.
        pub tie_broken_by_order: bool,
    }

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum AllocError {
        /// A nonzero target cannot be spread over zero lines.
        NoLines { target: i64 },
    }

    impl fmt::Display for AllocError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                AllocError::NoLines { target } => write!(f, "no lines to carry target {target}"),
            }
        }
    }

    impl std::error::Error for AllocError {}

    /// Apportionment method applied per group. Implementations must be pure:
    /// identical input yields identical output on any thread.
    pub trait Apportioner: Sync {
        fn name(&self) -> &'static str;
        fn apportion(&self, values: &[f64], target: i64) -> Result<Apportionment, AllocError>;
    }
}

// ----------------------------- Scoring (public surface) ------------------------------

pub mod scoring {
    pub mod normalize;
    pub mod composite;

    pub use composite::{composite_score, suitability, NormalizedKpis, NEUTRAL};
    pub use normalize::{column_stats, normalize, ColumnStats};
}

// ----------------------------- Ranking -----------------------------------------------

pub mod ranking;

// Convenience re-exports (pipeline imports these from crate root)
pub use allocation::{AllocError, Apportioner, Apportionment, LargestRemainder};
pub use ranking::{dense_ranks_by_partition, stable_rank_order, RankKey};
