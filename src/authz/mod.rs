//! Authorization Guard
//!
//! One policy table for every role/state rule. The guard is a pure function
//! of (actor, case snapshot, action): it reads nothing and mutates nothing,
//! so it is tested here without any store or transport.
//!
//! Every denial is logged and returned as `CoreError::Authorization`; there
//! is no path that silently skips a mutation.

mod policy;

pub use policy::{Action, authorize, authorize_global, authorize_offer};
