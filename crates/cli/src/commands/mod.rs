pub mod operation;
pub mod serve;
