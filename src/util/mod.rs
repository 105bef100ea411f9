pub mod assert;

pub use assert::{assertion_message, console_assert};
