pub mod warm_metrics;
