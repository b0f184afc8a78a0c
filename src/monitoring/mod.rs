pub mod latency;
pub mod metrics;
pub mod types;

pub use latency::*;
pub use metrics::{
    prometheus_enabled, record_compose_outcome, record_quote_outcome, try_init_prometheus,
};
pub use types::*;
