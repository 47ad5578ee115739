pub mod unit;
pub mod integration;
