pub mod metrics;
pub mod rdr;
