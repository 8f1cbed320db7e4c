pub mod sampling;
pub mod stats_query;
