//! Error types for the stratus convergence engine
//!
//! Variants carry the resource or operation they concern so log lines and
//! status messages can be read without the surrounding span.
//!
//! Cloud API failures keep the provider's stable error code so that the
//! classifier in [`crate::codes`] can decide how each failure is handled.

use thiserror::Error;

/// Context recorded when the caller did not name one
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for stratus operations
#[derive(Debug, Error)]
pub enum Error {
    /// Error returned by the cloud API, carrying the provider's error code
    #[error("cloud API error [{code}]: {message}")]
    Api {
        /// Stable provider error code (e.g. "InvalidGroup.NotFound")
        code: String,
        /// Human-readable message from the provider
        message: String,
    },

    /// A resource the engine looked for does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (instance, image, address, ...)
        kind: String,
        /// Name or identifier that was looked up
        name: String,
    },

    /// The request conflicts with the current state of a resource
    #[error("conflict on {resource}: {message}")]
    Conflict {
        /// Resource the conflict was detected on
        resource: String,
        /// Description of the conflict
        message: String,
    },

    /// A required co-resource does not exist yet
    ///
    /// Never retried within a reconcile pass.
    #[error("failed dependency on {dependency}: {message}")]
    FailedDependency {
        /// The missing co-resource (e.g. "controlplane security group")
        dependency: String,
        /// Missing item
        message: String,
    },

    /// Invalid input or configuration
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Resource or configuration object that failed validation
        resource: String,
        /// What was rejected
        message: String,
        /// The invalid field path, if known
        field: Option<String>,
    },

    /// A cloud record lacked a field the engine requires
    #[error("failed to decode {resource}: required field '{field}' is missing")]
    Decode {
        /// Kind of record being decoded
        resource: String,
        /// Name of the missing field
        field: String,
    },

    /// A bounded wait ran out of attempts without the condition holding
    #[error("timed out waiting for {operation}")]
    Timeout {
        /// Operation that was being waited on
        operation: String,
    },

    /// Delivering bootstrap data to an instance failed
    #[error("bootstrap transfer to {host} failed: {message}")]
    Transfer {
        /// Target host of the transfer
        host: String,
        /// Failure detail
        message: String,
    },

    /// Several independent per-item failures collected by a teardown loop
    #[error("{} errors occurred: {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<Error>),

    /// An error wrapped with a description of the step that failed
    #[error("{message}: {source}")]
    Context {
        /// Description of the failed step
        message: String,
        /// The underlying error
        #[source]
        source: Box<Error>,
    },

    /// Engine bug or unexpected state
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Failure detail
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a cloud API error from a provider code and message
    pub fn api(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Create a not-found error for a resource kind and name
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a failed-dependency error
    pub fn failed_dependency(dependency: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FailedDependency {
            dependency: dependency.into(),
            message: msg.into(),
        }
    }

    /// Validation error not tied to a field
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named resource and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a decode error naming the missing field
    pub fn decode(resource: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Decode {
            resource: resource.into(),
            field: field.into(),
        }
    }

    /// Create a timeout error for the given operation
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a bootstrap transfer error
    pub fn transfer(host: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transfer {
            host: host.into(),
            message: msg.into(),
        }
    }

    /// Internal error under the default context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Internal error tagged with the operation that hit it
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Collapse per-item failures into a single result.
    ///
    /// No failures is success, a single failure is returned as-is.
    pub fn aggregate(mut errors: Vec<Error>) -> Result<(), Error> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Aggregate(errors)),
        }
    }

    /// Wrap this error with a description of the step that failed
    pub fn context(self, msg: impl Into<String>) -> Self {
        Self::Context {
            message: msg.into(),
            source: Box::new(self),
        }
    }

    /// The provider error code, looking through context wrappers
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Api { code, .. } => Some(code),
            Error::Context { source, .. } => source.code(),
            _ => None,
        }
    }

    /// The innermost error beneath any context wrappers
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the next externally scheduled reconcile should retry
    ///
    /// Validation and decode errors need a spec or provider fix first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Validation { .. } | Error::Decode { .. } => false,
            Error::Aggregate(errors) => errors.iter().any(Error::is_retryable),
            Error::Context { source, .. } => source.is_retryable(),
            _ => true,
        }
    }
}

/// Attach step descriptions to fallible results
pub trait ResultExt<T> {
    /// Wrap the error, if any, with a description of the step that failed
    fn context(self, msg: impl Into<String>) -> Result<T, Error>;

    /// Like [`ResultExt::context`] but builds the message lazily
    fn with_context<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn context(self, msg: impl Into<String>) -> Result<T, Error> {
        self.map_err(|e| e.context(msg))
    }

    fn with_context<F, S>(self, f: F) -> Result<T, Error>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation in Convergence
    // ==========================================================================

    /// Story: Cloud API errors keep the provider code for classification
    #[test]
    fn story_api_errors_expose_stable_codes() {
        let err = Error::api("InvalidGroup.NotFound", "group sg-1 does not exist");
        assert_eq!(err.code(), Some("InvalidGroup.NotFound"));
        assert!(err.to_string().contains("InvalidGroup.NotFound"));
        assert!(err.to_string().contains("sg-1"));
    }

    /// Story: Wrapping an API error with step context must not hide its code
    #[test]
    fn story_context_preserves_code_for_classification() {
        let err = Error::api("Server.ResourceIncorrectState.SecurityGroup.Processing", "busy")
            .context("failed to authorize ingress rules for group web");

        assert_eq!(
            err.code(),
            Some("Server.ResourceIncorrectState.SecurityGroup.Processing")
        );
        assert!(err.to_string().starts_with("failed to authorize"));
        assert!(matches!(err.root(), Error::Api { .. }));
    }

    #[test]
    fn story_result_ext_wraps_only_errors() {
        let ok: Result<u32, Error> = Ok(3);
        assert_eq!(ok.context("unused").ok(), Some(3));

        let err: Result<u32, Error> = Err(Error::timeout("instance running"));
        let wrapped = err.with_context(|| format!("create {}", "i-1")).unwrap_err();
        assert!(wrapped.to_string().contains("create i-1"));
        assert!(wrapped.to_string().contains("instance running"));
    }

    /// Story: Teardown loops collect failures instead of stopping early
    #[test]
    fn story_aggregate_collapses_per_item_failures() {
        assert!(Error::aggregate(vec![]).is_ok());

        let single = Error::aggregate(vec![Error::internal("one")]).unwrap_err();
        assert!(matches!(single, Error::Internal { .. }));

        let many = Error::aggregate(vec![
            Error::api("AuthFailure", "denied"),
            Error::internal("boom"),
        ])
        .unwrap_err();
        match &many {
            Error::Aggregate(errors) => assert_eq!(errors.len(), 2),
            _ => panic!("Expected Aggregate variant"),
        }
        assert!(many.to_string().starts_with("2 errors occurred"));
        assert!(many.to_string().contains("denied; internal error"));
    }

    #[test]
    fn story_error_retryability() {
        // Spec problems need a human fix
        assert!(!Error::validation("bad tag").is_retryable());
        assert!(!Error::decode("instance", "instanceId").is_retryable());

        // Missing co-resources may appear before the next pass
        assert!(Error::failed_dependency("controlplane group", "absent").is_retryable());
        assert!(Error::timeout("instance stopped").is_retryable());
        assert!(Error::api("AuthFailure", "expired").is_retryable());

        // Context and aggregates follow their contents
        assert!(!Error::validation("x").context("step").is_retryable());
        assert!(Error::Aggregate(vec![Error::validation("x"), Error::internal("y")]).is_retryable());
    }

    #[test]
    fn test_validation_uses_unknown_context() {
        match Error::validation("test") {
            Error::Validation {
                resource, field, ..
            } => {
                assert_eq!(resource, UNKNOWN_CONTEXT);
                assert!(field.is_none());
            }
            _ => panic!("Expected Validation variant"),
        }

        match Error::validation_for_field("tag", "role", "contains ','") {
            Error::Validation {
                resource, field, ..
            } => {
                assert_eq!(resource, "tag");
                assert_eq!(field.as_deref(), Some("role"));
            }
            _ => panic!("Expected Validation variant"),
        }
    }

    #[test]
    fn test_decode_error_names_field() {
        let err = Error::decode("instance", "placement.availabilityZone");
        assert!(err
            .to_string()
            .contains("required field 'placement.availabilityZone' is missing"));
    }
}
