//! Engine modules: translate a request into an ordered operation plan.
//!
//! The engine sits between what the user asked for and the code that touches
//! disk. Plans are pure data, so they can be printed for `--dry-run`.

pub mod share;
