pub mod aggregator;

pub use aggregator::AccuracyAggregator;
