//! Instrumented sample programs traced by the `doctrace` command
//!
//! They cover the interesting tracing cases: recursion, sub-calls in another
//! module, errors propagating up to the traced call, and errors handled or
//! replaced on their way up.

use anyhow::{Context, Result};
use clap::ValueEnum;

use crate::domain::ErrorInfo;
use crate::frame_resolver::function_identity;
use crate::probe::render_value;

pub mod math {
    use super::validator::{self, ValueError};
    use crate::{call_site, probe};

    pub fn factorial_recursive(value: u64) -> u64 {
        probe::call(call_site!(), |frame| {
            if value <= 1 {
                return value;
            }
            value * frame.at(line!()).invoke(|| factorial_recursive(value - 1))
        })
    }

    /// Validates the raw value, letting the validation error escape
    pub fn factorial_recursive_check_unhandled(raw: &str) -> Result<u64, ValueError> {
        probe::scope(call_site!(), |frame| {
            let value = frame.at(line!()).invoke(|| validator::is_positive_int(raw))?;
            Ok(frame.at(line!()).invoke(|| factorial_recursive(value)))
        })
    }

    /// Validates the raw value, computing 0 for invalid ones
    pub fn factorial_recursive_check_handled(raw: &str) -> u64 {
        probe::call(call_site!(), |frame| {
            let checked = frame.at(line!()).check(frame.invoke(|| validator::is_positive_int(raw)));
            let value = match checked {
                Ok(value) => value,
                Err(_) => {
                    frame.at(line!());
                    return 0;
                }
            };

            if value <= 1 {
                frame.at(line!());
                return value;
            }
            value * frame.at(line!()).invoke(|| factorial_recursive(value - 1))
        })
    }

    pub fn factorial_reduce_multiply(value: u64) -> u64 {
        fn multiply(agg: u64, value: u64) -> u64 {
            probe::call(call_site!(), |_| agg * value)
        }

        probe::call(call_site!(), |frame| {
            if value <= 1 {
                return value;
            }
            frame.at(line!());
            (1..=value).fold(1, |agg, index| frame.invoke(|| multiply(agg, index)))
        })
    }

    /// Computes the factorial of a checked value; validation errors are
    /// wrapped, logged, and end up as no result
    pub fn factorial_with_checker(raw: &str) -> Option<u64> {
        probe::call(call_site!(), |frame| {
            let checked = frame
                .at(line!())
                .check(frame.invoke(|| validator::check_or_wrap_error(raw, validator::is_positive_int)));
            match checked {
                Ok(value) => Some(frame.at(line!()).invoke(|| factorial_reduce_multiply(value))),
                Err(factorial_error) => {
                    frame
                        .at(line!())
                        .invoke(|| validator::log_factorial_error(&factorial_error));
                    None
                }
            }
        })
    }
}

pub mod validator {
    use std::fmt::Debug;

    use thiserror::Error;

    use crate::{call_site, probe};

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("{0}")]
    pub struct ValueError(pub String);

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    #[error("{message}")]
    pub struct FactorialError {
        pub message: String,
        #[source]
        pub source: ValueError,
    }

    impl From<ValueError> for FactorialError {
        fn from(source: ValueError) -> Self {
            Self {
                message: format!("Invalid value for factorial: {}", source),
                source,
            }
        }
    }

    pub fn is_positive_int(raw: &str) -> Result<u64, ValueError> {
        probe::scope(call_site!(), |frame| match raw.trim().parse::<u64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                let message = format!("Value must be a positive integer, got {}.", raw);
                frame.at(line!()).invoke(|| raise_value_error(message))
            }
        })
    }

    pub fn raise_value_error<T: Debug>(message: String) -> Result<T, ValueError> {
        probe::scope(call_site!(), |frame| Err(frame.raise(ValueError(message))))
    }

    /// Runs the checker, replacing its validation error by a factorial error
    pub fn check_or_wrap_error(
        raw: &str,
        checker: impl FnOnce(&str) -> Result<u64, ValueError>,
    ) -> Result<u64, FactorialError> {
        probe::scope(call_site!(), |frame| {
            match frame.at(line!()).check(frame.invoke(|| checker(raw))) {
                Ok(value) => Ok(value),
                Err(value_error) => Err(frame.at(line!()).raise(FactorialError::from(value_error))),
            }
        })
    }

    pub fn log_factorial_error(factorial_error: &FactorialError) {
        probe::call(call_site!(), |_| {
            tracing::warn!("factorial failed: {}", factorial_error);
        })
    }
}

pub mod fibonacci {
    use crate::{call_site, probe};

    pub fn fibonacci(value: u64) -> u64 {
        probe::call(call_site!(), |frame| {
            if value <= 1 {
                return value;
            }
            frame.at(line!()).invoke(|| fibonacci(value - 1)) + frame.invoke(|| fibonacci(value - 2))
        })
    }
}

/// Sample programs available from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Demo {
    /// Recursive factorial
    Factorial,
    /// Factorial of a validated value; invalid values end in an unhandled error
    FactorialChecked,
    /// Factorial of a validated value; invalid values give 0
    FactorialOrDefault,
    /// Factorial as a fold over a multiplying function
    FactorialReduce,
    /// Factorial of a validated value; validation errors are wrapped and logged
    FactorialWithChecker,
    /// Recursive Fibonacci suite
    Fibonacci,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DemoInput {
    Number(u64),
    Text(String),
}

/// A demo with its parsed argument, ready to be traced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedDemo {
    demo: Demo,
    input: DemoInput,
}

/// How a demo ended: with a rendered value, or with an error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoOutcome {
    pub value: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl DemoOutcome {
    fn value<T: std::fmt::Debug>(value: T) -> Self {
        Self {
            value: render_value(&value),
            error: None,
        }
    }

    fn error<E: std::error::Error + 'static>(error: &E) -> Self {
        Self {
            value: None,
            error: Some(ErrorInfo::from_error(error)),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl Demo {
    /// Default argument of the demo
    pub fn default_arg(&self) -> &'static str {
        match self {
            Demo::Fibonacci => "5",
            _ => "6",
        }
    }

    /// Parse the demo argument; the validating demos take raw text
    pub fn prepare(self, arg: &str) -> Result<PreparedDemo> {
        let input = match self {
            Demo::Factorial | Demo::FactorialReduce | Demo::Fibonacci => DemoInput::Number(
                arg.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{:?} demo expects a positive integer, got '{}'", self, arg))?,
            ),
            Demo::FactorialChecked | Demo::FactorialOrDefault | Demo::FactorialWithChecker => {
                DemoInput::Text(arg.to_string())
            }
        };
        Ok(PreparedDemo { demo: self, input })
    }
}

impl PreparedDemo {
    /// Dotted module and name of the traced function
    pub fn entry_point(&self) -> (String, String) {
        match self.demo {
            Demo::Factorial => function_identity(&math::factorial_recursive),
            Demo::FactorialChecked => function_identity(&math::factorial_recursive_check_unhandled),
            Demo::FactorialOrDefault => function_identity(&math::factorial_recursive_check_handled),
            Demo::FactorialReduce => function_identity(&math::factorial_reduce_multiply),
            Demo::FactorialWithChecker => function_identity(&math::factorial_with_checker),
            Demo::Fibonacci => function_identity(&fibonacci::fibonacci),
        }
    }

    pub fn run(&self) -> DemoOutcome {
        match (&self.input, self.demo) {
            (DemoInput::Number(value), Demo::Fibonacci) => DemoOutcome::value(fibonacci::fibonacci(*value)),
            (DemoInput::Number(value), Demo::FactorialReduce) => {
                DemoOutcome::value(math::factorial_reduce_multiply(*value))
            }
            (DemoInput::Number(value), _) => DemoOutcome::value(math::factorial_recursive(*value)),
            (DemoInput::Text(raw), Demo::FactorialChecked) => match math::factorial_recursive_check_unhandled(raw) {
                Ok(value) => DemoOutcome::value(value),
                Err(error) => DemoOutcome::error(&error),
            },
            (DemoInput::Text(raw), Demo::FactorialWithChecker) => DemoOutcome::value(math::factorial_with_checker(raw)),
            (DemoInput::Text(raw), _) => DemoOutcome::value(math::factorial_recursive_check_handled(raw)),
        }
    }
}
