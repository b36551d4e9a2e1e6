pub mod auto_appraise;
pub mod config;
pub mod order_lifecycle;
