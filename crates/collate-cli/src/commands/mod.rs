pub mod config;
pub mod polish;
pub mod run;
