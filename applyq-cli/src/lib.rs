// Library interface for applyq-cli to enable testing
pub mod commands;
pub mod config;
pub mod output;
pub mod project;

#[cfg(test)]
mod tests;
