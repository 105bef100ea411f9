use crate::logger::Logger;

/// Logs an assertion failure through `logger` when `condition` is false, the way
/// `console.assert` reports without interrupting the caller.
pub fn console_assert(logger: &Logger, condition: bool, message: impl AsRef<str>) {
    if !condition {
        logger.error(assertion_message(message));
    }
}

/// Build the string reported for a failed assertion.
pub fn assertion_message(message: impl AsRef<str>) -> String {
    format!("Assertion failed: {}", message.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{capture_logs, global_state_guard};

    #[test]
    fn failed_assertion_is_logged_not_raised() {
        let _guard = global_state_guard();
        let captured = capture_logs();
        let logger = Logger::new("@martech/assert-test");

        console_assert(&logger, true, "never shown");
        console_assert(&logger, false, "boom");

        let records = captured.lock().unwrap().clone();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "Assertion failed: boom");
    }

    #[test]
    fn assertion_message_formats_message() {
        assert_eq!(assertion_message("No tag"), "Assertion failed: No tag");
    }
}
