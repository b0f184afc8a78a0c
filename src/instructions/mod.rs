pub mod compute_budget;
pub mod ivy;
pub mod token;
