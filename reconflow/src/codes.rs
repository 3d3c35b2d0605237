//! Stable error codes for persisted failure records.
//!
//! Operators and automation react to *kinds* of failures (bad credentials,
//! exhausted quota, ...) rather than raw messages. Codes are derived from the
//! failure description with a fixed pattern table, or attached explicitly by
//! a task through [`CodedError`].

use crate::errors::visit_causes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

/// Machine-readable classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Infrastructure credentials were rejected.
    #[serde(rename = "ERR_INFRA_UNAUTHORIZED")]
    InfraUnauthorized,
    /// Credentials are valid but lack permissions.
    #[serde(rename = "ERR_INFRA_INSUFFICIENT_PRIVILEGES")]
    InfraInsufficientPrivileges,
    /// A provider quota or limit was hit.
    #[serde(rename = "ERR_INFRA_QUOTA_EXCEEDED")]
    InfraQuotaExceeded,
    /// A dependent infrastructure object blocks the operation.
    #[serde(rename = "ERR_INFRA_DEPENDENCIES")]
    InfraDependencies,
    /// The provider has no capacity left for the requested resources.
    #[serde(rename = "ERR_INFRA_RESOURCES_DEPLETED")]
    InfraResourcesDepleted,
    /// Resources in the managed cluster could not be cleaned up.
    #[serde(rename = "ERR_CLEANUP_CLUSTER_RESOURCES")]
    CleanupClusterResources,
    /// The desired state is misconfigured.
    #[serde(rename = "ERR_CONFIGURATION_PROBLEM")]
    ConfigurationProblem,
    /// The desired state is misconfigured, but may heal without user action.
    #[serde(rename = "ERR_RETRYABLE_CONFIGURATION_PROBLEM")]
    RetryableConfigurationProblem,
}

impl ErrorCode {
    /// Returns the persisted string form of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InfraUnauthorized => "ERR_INFRA_UNAUTHORIZED",
            Self::InfraInsufficientPrivileges => "ERR_INFRA_INSUFFICIENT_PRIVILEGES",
            Self::InfraQuotaExceeded => "ERR_INFRA_QUOTA_EXCEEDED",
            Self::InfraDependencies => "ERR_INFRA_DEPENDENCIES",
            Self::InfraResourcesDepleted => "ERR_INFRA_RESOURCES_DEPLETED",
            Self::CleanupClusterResources => "ERR_CLEANUP_CLUSTER_RESOURCES",
            Self::ConfigurationProblem => "ERR_CONFIGURATION_PROBLEM",
            Self::RetryableConfigurationProblem => "ERR_RETRYABLE_CONFIGURATION_PROBLEM",
        }
    }

    /// Returns true for codes that require action from the cluster owner.
    #[must_use]
    pub const fn is_user_error(self) -> bool {
        matches!(
            self,
            Self::InfraUnauthorized
                | Self::InfraInsufficientPrivileges
                | Self::InfraQuotaExceeded
                | Self::InfraDependencies
                | Self::InfraResourcesDepleted
                | Self::ConfigurationProblem
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const PATTERNS: &[(ErrorCode, &str)] = &[
    (
        ErrorCode::InfraUnauthorized,
        r"(?i)(Unauthorized|InvalidClientTokenId|SignatureDoesNotMatch|Authentication failed|AuthFailure|AuthorizationFailed|invalid_grant|invalid_client|cannot fetch token|InvalidAccessKeyId|InvalidSecretAccessKey|not authorized|InvalidSubscriptionId)",
    ),
    (
        ErrorCode::InfraInsufficientPrivileges,
        r"(?i)(AccessDenied|Forbidden|OperationNotAllowed|Error 403|InvalidPermissions|SERVICE_DISABLED)",
    ),
    (
        ErrorCode::InfraQuotaExceeded,
        r"(?i)(\bLimitExceeded|Quotas|Quota.*exceeded|exceeded quota|Quota has been met|QUOTA_EXCEEDED)",
    ),
    (
        ErrorCode::InfraDependencies,
        r"(?i)(PendingVerification|Access Not Configured|DependencyViolation|OptInRequired|DeleteConflict|is already being used|InUseSubnetCannotBeDeleted|VnetInUse|InvalidCidrBlock|InsufficientFreeAddressesInSubnet)",
    ),
    (
        ErrorCode::InfraResourcesDepleted,
        r"(?i)(not available in the current hardware cluster|InsufficientInstanceCapacity|SkuNotAvailable|ZonalAllocationFailed|out of stock)",
    ),
    (
        ErrorCode::ConfigurationProblem,
        r"(?i)(not supported in your requested Availability Zone|InvalidParameterValue|InvalidParameterCombination|Invalid parameter|violates constraint|denied by policy)",
    ),
    (
        ErrorCode::RetryableConfigurationProblem,
        r"(?i)(is misconfigured and requires zero voluntary evictions|CanNotResolveEndpoint|The requested configuration is currently not supported)",
    ),
];

static KNOWN_CODES: LazyLock<Vec<(ErrorCode, Regex)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .filter_map(|(code, pattern)| Regex::new(pattern).ok().map(|regex| (*code, regex)))
        .collect()
});

/// Derives error codes from a failure description.
#[must_use]
pub fn determine_error_codes(message: &str) -> Vec<ErrorCode> {
    KNOWN_CODES
        .iter()
        .filter(|(_, regex)| regex.is_match(message))
        .map(|(code, _)| *code)
        .collect()
}

/// Collects the codes of an error: explicit [`CodedError`]s anywhere in the
/// chain plus codes derived from the full description.
#[must_use]
pub fn error_codes_of(err: &anyhow::Error) -> Vec<ErrorCode> {
    let mut codes = BTreeSet::new();
    visit_causes(err, &mut |cause: &(dyn std::error::Error + 'static)| {
        if let Some(coded) = cause.downcast_ref::<CodedError>() {
            codes.extend(coded.codes.iter().copied());
        }
    });
    codes.extend(determine_error_codes(&format!("{err:#}")));
    codes.into_iter().collect()
}

/// An error that carries explicit codes.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct CodedError {
    /// The error message.
    pub message: String,
    /// The attached codes.
    pub codes: Vec<ErrorCode>,
}

impl CodedError {
    /// Creates a coded error.
    #[must_use]
    pub fn new(message: impl Into<String>, codes: impl IntoIterator<Item = ErrorCode>) -> Self {
        Self {
            message: message.into(),
            codes: codes.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_pattern_compiles() {
        assert_eq!(KNOWN_CODES.len(), PATTERNS.len());
    }

    #[test]
    fn test_determine_unauthorized() {
        let codes = determine_error_codes("AuthFailure: AWS was not able to validate the provided credentials");
        assert_eq!(codes, vec![ErrorCode::InfraUnauthorized]);
    }

    #[test]
    fn test_determine_multiple_codes() {
        let codes = determine_error_codes("AccessDenied while checking Quota: exceeded for instances");
        assert_eq!(
            codes,
            vec![ErrorCode::InfraInsufficientPrivileges, ErrorCode::InfraQuotaExceeded]
        );
    }

    #[test]
    fn test_unknown_message_has_no_codes() {
        assert!(determine_error_codes("connection reset by peer").is_empty());
    }

    #[test]
    fn test_error_codes_of_merges_explicit_codes() {
        let err = anyhow::Error::new(CodedError::new(
            "could not drain nodes",
            [ErrorCode::CleanupClusterResources],
        ))
        .context("InsufficientInstanceCapacity in zone a");

        assert_eq!(
            error_codes_of(&err),
            vec![ErrorCode::InfraResourcesDepleted, ErrorCode::CleanupClusterResources]
        );
    }

    #[test]
    fn test_error_codes_of_sees_through_severe_marker() {
        let err = crate::retry::severe(CodedError::new(
            "secret is missing",
            [ErrorCode::ConfigurationProblem],
        ))
        .context("deploying infrastructure");

        assert_eq!(error_codes_of(&err), vec![ErrorCode::ConfigurationProblem]);
    }

    #[test]
    fn test_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::InfraQuotaExceeded).unwrap();
        assert_eq!(json, "\"ERR_INFRA_QUOTA_EXCEEDED\"");
        assert_eq!(ErrorCode::InfraQuotaExceeded.to_string(), "ERR_INFRA_QUOTA_EXCEEDED");
        assert!(!ErrorCode::RetryableConfigurationProblem.is_user_error());
    }
}
