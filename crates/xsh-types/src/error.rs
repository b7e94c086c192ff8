//! Error taxonomy shared by every engine component.
//!
//! Each kind carries a structured payload; `Display` embeds it as formatted
//! JSON so a failure is diagnosable from the message alone. Internal ladder
//! control flow ("rule does not apply") is *not* an error — the converter and
//! math folds use their own outcome enums.

use thiserror::Error;

/// Result type used across the engine.
pub type XshResult<T> = Result<T, Error>;

/// Structured error payload, rendered as formatted JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload(pub serde_json::Value);

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string_pretty(&self.0) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "{}", self.0),
        }
    }
}

impl From<serde_json::Value> for Payload {
    fn from(v: serde_json::Value) -> Self {
        Payload(v)
    }
}

/// Engine failure kinds.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// Unknown command name, unknown `--long` option, unknown short-flag char.
    #[error("property not found: {0}")]
    PropertyNotFound(Payload),

    /// Operand has the wrong type for an operator; write through a deferred.
    #[error("property type mismatch: {0}")]
    PropertyTypeMismatch(Payload),

    /// A required positional, or a required variadic with zero values.
    #[error("property required: {0}")]
    PropertyRequired(Payload),

    /// Internal helper called with a parameter that fails its type check.
    #[error("parameter type invalid: {0}")]
    ParameterTypeInvalid(Payload),

    /// A type-rule entry is not a recognized type tag.
    #[error("variable type invalid: {0}")]
    VariableTypeInvalid(Payload),

    /// Value matched none of the expected types.
    #[error("assert failed: {0}")]
    AssertFailed(Payload),

    /// Command with no declared args received arguments; length check failed.
    #[error("arguments length invalid: {0}")]
    ArgumentsLengthInvalid(Payload),

    /// Positional after optional; flag/option after a variadic started;
    /// variadic argument not declared last.
    #[error("wrong argument position: {0}")]
    WrongArgumentPosition(Payload),

    /// Math fold produced `undefined`.
    #[error("math result invalid: {0}")]
    MathResultInvalid(Payload),
}

impl Error {
    pub fn property_not_found(payload: serde_json::Value) -> Self {
        Error::PropertyNotFound(payload.into())
    }

    pub fn property_type_mismatch(payload: serde_json::Value) -> Self {
        Error::PropertyTypeMismatch(payload.into())
    }

    pub fn property_required(payload: serde_json::Value) -> Self {
        Error::PropertyRequired(payload.into())
    }

    pub fn parameter_type_invalid(payload: serde_json::Value) -> Self {
        Error::ParameterTypeInvalid(payload.into())
    }

    pub fn variable_type_invalid(payload: serde_json::Value) -> Self {
        Error::VariableTypeInvalid(payload.into())
    }

    pub fn assert_failed(payload: serde_json::Value) -> Self {
        Error::AssertFailed(payload.into())
    }

    pub fn arguments_length_invalid(payload: serde_json::Value) -> Self {
        Error::ArgumentsLengthInvalid(payload.into())
    }

    pub fn wrong_argument_position(payload: serde_json::Value) -> Self {
        Error::WrongArgumentPosition(payload.into())
    }

    pub fn math_result_invalid(payload: serde_json::Value) -> Self {
        Error::MathResultInvalid(payload.into())
    }

    /// Stable kind name, used in logs and tests.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PropertyNotFound(_) => "PropertyNotFound",
            Error::PropertyTypeMismatch(_) => "PropertyTypeMismatch",
            Error::PropertyRequired(_) => "PropertyRequired",
            Error::ParameterTypeInvalid(_) => "ParameterTypeInvalid",
            Error::VariableTypeInvalid(_) => "VariableTypeInvalid",
            Error::AssertFailed(_) => "AssertFailed",
            Error::ArgumentsLengthInvalid(_) => "ArgumentsLengthInvalid",
            Error::WrongArgumentPosition(_) => "WrongArgumentPosition",
            Error::MathResultInvalid(_) => "MathResultInvalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_embeds_payload_json() {
        let err = Error::property_not_found(json!({"command": "nope"}));
        let msg = err.to_string();
        assert!(msg.starts_with("property not found:"));
        assert!(msg.contains("\"command\""));
        assert!(msg.contains("\"nope\""));
    }

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(
            Error::math_result_invalid(json!({})).kind(),
            "MathResultInvalid"
        );
    }
}
