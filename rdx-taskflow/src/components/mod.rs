//! Contains the jobs users build workflows from.
//!
//! `task` wraps user handlers into named, registered jobs; `wait` computes
//! deadlines and delays from time directives. Both implement `Job` and run
//! through the `Engine`.

pub mod task;
pub mod wait;
