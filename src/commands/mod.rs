pub mod eval;
pub mod ingest;
pub mod search;
pub mod status;
