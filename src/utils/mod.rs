//! Utility functions for the metrics pipeline.
//!
//! - [`conversion`] - Lenient numeric deserializers for subgraph payloads
//! - [`dates`] - UTC calendar day parsing and arithmetic

mod conversion;
mod dates;

// ============================================
// Re-exports
// ============================================

pub use conversion::{f64_from_any, str_to_f64, u64_from_any};

pub use dates::{add_days, format_date, parse_date, sub_days, today_utc, DATE_FORMAT};
