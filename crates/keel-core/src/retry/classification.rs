use std::time::Duration;

use crate::error::{Fault, RetryInfo, ServiceError};

/// Derives retry facts from a failed attempt.
///
/// `status` and `retry_after` come from the transport response when there was
/// one. A modeled error that declares retry facts wins over status heuristics.
pub fn classify_http_error(
    error: &ServiceError,
    status: Option<u16>,
    retry_after: Option<Duration>,
) -> RetryInfo {
    match error {
        ServiceError::Serialization(_)
        | ServiceError::Retry(_)
        | ServiceError::Auth { .. }
        | ServiceError::Endpoint { .. }
        | ServiceError::EventStream { .. } => RetryInfo::unsafe_to_retry(),
        ServiceError::Wrapped(_) => RetryInfo::default(),
        ServiceError::Transport(transport) => RetryInfo {
            timeout: transport.is_timeout(),
            ..RetryInfo::transient()
        },
        ServiceError::Modeled(api_error) => {
            let declared = api_error.retry_info();
            if declared.retry_safe.is_some() {
                return RetryInfo {
                    retry_after: declared.retry_after.or(retry_after),
                    ..declared
                };
            }
            from_status(status, retry_after).unwrap_or_else(|| from_fault(api_error.fault()))
        }
        ServiceError::UnknownApi(unknown) => from_status(status.or(unknown.status), retry_after)
            .unwrap_or_else(|| from_fault(unknown.fault)),
    }
}

fn from_status(status: Option<u16>, retry_after: Option<Duration>) -> Option<RetryInfo> {
    match status? {
        429 | 503 => Some(RetryInfo::throttling(retry_after)),
        500.. => Some(RetryInfo {
            retry_after,
            ..RetryInfo::transient()
        }),
        _ => None,
    }
}

const fn from_fault(fault: Fault) -> RetryInfo {
    match fault {
        Fault::Server => RetryInfo::transient(),
        Fault::Client => RetryInfo::unsafe_to_retry(),
    }
}
