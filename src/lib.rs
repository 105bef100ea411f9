#![doc = include_str!("RUSTDOC.md")]

pub mod dom;
pub mod logger;
pub mod martech;
pub mod platform;
pub mod util;

#[cfg(test)]
pub mod test_support;
