use annbench_error::{BenchError, ErrorCodes};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Backend-specific build options as supplied on the command line.
pub type BackendOptions = serde_json::Map<String, serde_json::Value>;

#[derive(Error, Debug)]
pub enum BackendConfigError {
    #[error("Invalid options for backend `{backend}`: {source}")]
    Invalid {
        backend: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid option `{option}` for backend `{backend}`: {reason}")]
    OutOfRange {
        backend: String,
        option: &'static str,
        reason: String,
    },
}

impl BenchError for BackendConfigError {
    fn code(&self) -> ErrorCodes {
        ErrorCodes::InvalidArgument
    }
}

/// Deserialize a backend's option struct from its raw option map.
pub fn parse_options<T: DeserializeOwned>(
    backend: &str,
    options: &BackendOptions,
) -> Result<T, BackendConfigError> {
    serde_json::from_value(serde_json::Value::Object(options.clone())).map_err(|source| {
        BackendConfigError::Invalid {
            backend: backend.to_string(),
            source,
        }
    })
}

/// Serialize resolved parameters back into an option map for reporting.
pub fn to_options<T: Serialize>(
    backend: &str,
    params: &T,
) -> Result<BackendOptions, BackendConfigError> {
    match serde_json::to_value(params) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Ok(BackendOptions::new()),
        Err(source) => Err(BackendConfigError::Invalid {
            backend: backend.to_string(),
            source,
        }),
    }
}
