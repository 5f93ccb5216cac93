use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ForceFieldError {
    #[error("Invalid value {value} for parameter '{parameter}' of the {potential} potential")]
    InvalidParameter {
        potential: &'static str,
        parameter: &'static str,
        value: f64,
    },
}
