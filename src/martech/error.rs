use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MartechErrorCode {
    InvalidConfig,
    NotAFunction,
    ScriptLoad,
    ConsentCallback,
}

impl MartechErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MartechErrorCode::InvalidConfig => "martech/invalid-config",
            MartechErrorCode::NotAFunction => "martech/not-a-function",
            MartechErrorCode::ScriptLoad => "martech/script-load",
            MartechErrorCode::ConsentCallback => "martech/consent-callback",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MartechError {
    pub code: MartechErrorCode,
    message: String,
}

impl MartechError {
    pub fn new(code: MartechErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for MartechError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for MartechError {}

pub type MartechResult<T> = Result<T, MartechError>;

pub fn invalid_config(message: impl Into<String>) -> MartechError {
    MartechError::new(MartechErrorCode::InvalidConfig, message)
}

/// The error a page sees when it calls a global function nobody installed.
pub fn not_a_function(name: &str) -> MartechError {
    MartechError::new(
        MartechErrorCode::NotAFunction,
        format!("{name} is not a function"),
    )
}

pub fn script_load_error(message: impl Into<String>) -> MartechError {
    MartechError::new(MartechErrorCode::ScriptLoad, message)
}

pub fn consent_callback_error(message: impl Into<String>) -> MartechError {
    MartechError::new(MartechErrorCode::ConsentCallback, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_cover_every_surfaced_failure() {
        let errors = [
            invalid_config("bad url"),
            not_a_function("gtag"),
            script_load_error("offline"),
            consent_callback_error("rejected"),
        ];
        let codes: Vec<_> = errors.iter().map(MartechError::code_str).collect();
        assert_eq!(
            codes,
            [
                "martech/invalid-config",
                "martech/not-a-function",
                "martech/script-load",
                "martech/consent-callback",
            ]
        );
        assert_eq!(errors[1].to_string(), "gtag is not a function (martech/not-a-function)");
    }
}
