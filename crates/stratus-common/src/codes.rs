//! Cloud API error codes and the classifier that maps them onto the
//! engine's error taxonomy.

use crate::Error;

/// Credentials were rejected by the provider
pub const AUTH_FAILURE: &str = "AuthFailure";
/// The security group does not exist
pub const GROUP_NOT_FOUND: &str = "InvalidGroup.NotFound";
/// The ingress permission does not exist on the group
pub const PERMISSION_NOT_FOUND: &str = "InvalidPermission.NotFound";
/// Generic resource identifier lookup miss
pub const RESOURCE_NOT_FOUND: &str = "InvalidResourceID.NotFound";
/// The instance id does not exist
pub const INSTANCE_NOT_FOUND: &str = "InvalidInstanceID.NotFound";
/// The instance named in a request parameter does not exist
pub const INSTANCE_PARAMETER_NOT_FOUND: &str = "Client.InvalidParameterNotFound.Instance";
/// The group is still applying a previous mutation
pub const SECURITY_GROUP_PROCESSING: &str =
    "Server.ResourceIncorrectState.SecurityGroup.Processing";

/// How the engine treats a failure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Resource absent; delete paths treat this as success
    NotFound,
    /// Request conflicts with current resource state
    Conflict,
    /// A required co-resource does not exist yet
    FailedDependency,
    /// Teardown misses that count as already satisfied
    Ignorable,
    /// Provider is busy; retried through backoff
    RetryableTransient,
    /// Everything else; aborts the reconcile pass
    Fatal,
}

/// Classify an error, looking through context wrappers
pub fn classify(err: &Error) -> ErrorClass {
    match err.root() {
        Error::NotFound { .. } => ErrorClass::NotFound,
        Error::Conflict { .. } => ErrorClass::Conflict,
        Error::FailedDependency { .. } => ErrorClass::FailedDependency,
        Error::Api { code, .. } => classify_code(code),
        _ => ErrorClass::Fatal,
    }
}

/// Classify a bare provider error code
pub fn classify_code(code: &str) -> ErrorClass {
    match code {
        GROUP_NOT_FOUND | PERMISSION_NOT_FOUND => ErrorClass::Ignorable,
        INSTANCE_NOT_FOUND | INSTANCE_PARAMETER_NOT_FOUND | RESOURCE_NOT_FOUND => {
            ErrorClass::NotFound
        }
        SECURITY_GROUP_PROCESSING => ErrorClass::RetryableTransient,
        _ => ErrorClass::Fatal,
    }
}

/// Check if the error means the resource is absent
pub fn is_not_found(err: &Error) -> bool {
    classify(err) == ErrorClass::NotFound
}

/// Check if the error is a conflict
pub fn is_conflict(err: &Error) -> bool {
    classify(err) == ErrorClass::Conflict
}

/// Check if the error reports a missing co-resource
pub fn is_failed_dependency(err: &Error) -> bool {
    classify(err) == ErrorClass::FailedDependency
}

/// Swallow the "group not found" and "permission not found" codes.
///
/// Used on teardown, where an absent group or rule is the goal state.
/// Errors without a provider code still propagate.
pub fn ignore_security_group_not_found(result: crate::Result<()>) -> crate::Result<()> {
    match result {
        Err(e) if classify(&e) == ErrorClass::Ignorable => Ok(()),
        other => other,
    }
}
