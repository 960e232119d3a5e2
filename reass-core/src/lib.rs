#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod seq;

pub use config::ReassConfig;
pub use error::{ReassError, ReassResult};
pub use seq::{seq_geq, seq_gt, seq_leq, seq_lt, SeqNum};
