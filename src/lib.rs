pub mod cli;
pub mod config;
pub mod detect;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod recognize;
pub mod source;
pub mod startup;
pub mod viz;
