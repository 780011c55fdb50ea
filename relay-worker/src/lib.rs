pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod input;
pub mod transport;

#[cfg(test)]
mod test_utils;
