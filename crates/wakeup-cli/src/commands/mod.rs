pub mod alarm;
pub mod config;
pub mod errors;
pub mod holiday;
pub mod run;
