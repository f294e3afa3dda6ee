// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! SensorQL error types

use datafusion::arrow::error::ArrowError;
use datafusion::error::DataFusionError;

use std::error;
use std::fmt::{Display, Formatter};
use std::io;
use std::result;

/// Result type for operations that could result in an [SensorError]
pub type Result<T> = result::Result<T, SensorError>;

/// SensorQL error
#[derive(Debug)]
pub enum SensorError {
    /// Error returned when the query parameters can't be turned into a valid
    /// statement: missing tags, reversed date ranges, an offset without a
    /// limit, unknown query types and so on. Raised before any I/O happens.
    InvalidParameters(String),
    /// Error raised by the warehouse driver. The message is kept exactly as
    /// the driver reported it so that callers can surface it verbatim.
    Driver(String),
    /// Error associated to Lambda runtime execution.
    LambdaError(Box<dyn std::error::Error + Send + Sync>),
    /// Error associated to I/O operations and associated traits.
    IoError(io::Error),
    /// Error returned when Arrow is unexpectedly executed.
    Arrow(ArrowError),
    /// Error returned when DataFusion is unexpectedly executed.
    DataFusion(DataFusionError),
    /// Error returned when serde_json failed to serialize or deserialize data.
    SerdeJson(serde_json::Error),
    /// Error returned during execution of a transformation.
    /// Examples include malformed payloads and unexpected column types.
    Execution(String),
    /// Error returned as a consequence of an error in SensorQL.
    /// This error should not happen in normal usage.
    Internal(String),
}

impl From<io::Error> for SensorError {
    fn from(e: io::Error) -> Self {
        SensorError::IoError(e)
    }
}

impl From<DataFusionError> for SensorError {
    fn from(e: DataFusionError) -> Self {
        SensorError::DataFusion(e)
    }
}

impl From<ArrowError> for SensorError {
    fn from(e: ArrowError) -> Self {
        SensorError::Arrow(e)
    }
}

impl From<serde_json::Error> for SensorError {
    fn from(e: serde_json::Error) -> Self {
        SensorError::SerdeJson(e)
    }
}

impl From<chrono::ParseError> for SensorError {
    fn from(e: chrono::ParseError) -> Self {
        SensorError::InvalidParameters(e.to_string())
    }
}

impl From<reqwest::Error> for SensorError {
    fn from(e: reqwest::Error) -> Self {
        SensorError::Driver(e.to_string())
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for SensorError {
    fn from(e: Box<dyn std::error::Error + Send + Sync>) -> Self {
        SensorError::LambdaError(e)
    }
}

impl Display for SensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            SensorError::InvalidParameters(ref desc) => write!(f, "{}", desc),
            SensorError::Driver(ref desc) => write!(f, "{}", desc),
            SensorError::LambdaError(ref desc) => write!(f, "Lambda error: {}", desc),
            SensorError::IoError(ref desc) => write!(f, "IO error: {}", desc),
            SensorError::Arrow(ref desc) => write!(f, "Arrow error: {}", desc),
            SensorError::DataFusion(ref desc) => write!(f, "DataFusion error: {:?}", desc),
            SensorError::SerdeJson(ref desc) => write!(f, "serde_json error: {:?}", desc),
            SensorError::Execution(ref desc) => write!(f, "Execution error: {}", desc),
            SensorError::Internal(ref desc) => write!(
                f,
                "Internal error: {}. This was likely caused by a bug in SensorQL's \
                    code and we would welcome that you file an bug report in our issue tracker",
                desc
            ),
        }
    }
}

impl error::Error for SensorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_messages_are_verbatim() {
        let err = SensorError::Driver("Error Connecting to Database".to_string());
        assert_eq!("Error Connecting to Database", err.to_string());

        let err = SensorError::InvalidParameters("Offset requires a limit".to_string());
        assert_eq!("Offset requires a limit", err.to_string());
    }

    #[test]
    fn wrapped_errors_carry_a_prefix() {
        let err: SensorError = ArrowError::ComputeError("boom".to_string()).into();
        assert!(err.to_string().starts_with("Arrow error:"));

        let err = SensorError::Execution("row 3 is not valid JSON".to_string());
        assert_eq!("Execution error: row 3 is not valid JSON", err.to_string());
    }
}
