//! Cleaned up AWS STS API, and the fan-out over every role in an assertion.

use std::{fmt, time::Duration};

use aws_config::{timeout::TimeoutConfig, BehaviorVersion, SdkConfig};
use aws_sdk_sts::error::{DisplayErrorContext, SdkError};
use chrono::{DateTime, TimeZone, Utc};
use futures::{future::BoxFuture, stream, StreamExt};
use tracing::{debug, warn};

use crate::{AssumedCredential, Region, RoleCandidate};

/// A federation endpoint that trades a SAML assertion for credentials of one role.
///
/// This is implemented by the STS client used by default, and can be implemented to route
/// exchanges elsewhere (e.g. in tests).
pub trait RoleExchange: Send + Sync {
    /// Assume `candidate` using the base64 `assertion`.
    fn assume<'a>(
        &'a self,
        candidate: &'a RoleCandidate,
        assertion: &'a str,
    ) -> BoxFuture<'a, Result<IssuedCredentials, ExchangeRejection>>;
}

/// Credentials returned by a successful exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCredentials {
    /// The access key ID.
    pub access_key_id: String,

    /// The secret access key.
    pub secret_access_key: String,

    /// The session token.
    pub session_token: String,

    /// When the credentials expire.
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("IssuedCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// A single role exchange that did not produce credentials.
///
/// Rejections never fail a login on their own; the role is just left out of the eligible accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRejection {
    /// The role that could not be assumed.
    pub role_arn: String,

    /// Why the exchange failed.
    pub kind: RejectionKind,

    /// Error detail from the federation endpoint or transport.
    pub message: String,
}

/// The cause of an [`ExchangeRejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionKind {
    /// The endpoint refused the pairing, e.g. the assertion doesn't authorize the role.
    Denied,

    /// The request never got an answer (connection failure, timeout, unreadable response).
    Transport,
}

impl fmt::Display for ExchangeRejection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            RejectionKind::Denied => "rejected",
            RejectionKind::Transport => "failed in transport",
        };
        write!(f, "assuming {} {kind}: {}", self.role_arn, self.message)
    }
}

impl std::error::Error for ExchangeRejection {}

/// Exchange every candidate concurrently, with at most `limit` exchanges in flight.
///
/// The result has one entry per candidate, in candidate order.
pub(crate) async fn attempt_all<X>(
    exchange: &X,
    candidates: &[RoleCandidate],
    assertion: &str,
    limit: usize,
) -> Vec<Result<AssumedCredential, ExchangeRejection>>
where
    X: RoleExchange + ?Sized,
{
    stream::iter(candidates)
        .map(move |candidate| async move {
            exchange
                .assume(candidate, assertion)
                .await
                .map(|issued| AssumedCredential::issued(candidate, issued))
        })
        .buffered(limit.max(1))
        .collect()
        .await
}

/// Assume every candidate and keep the successes, in candidate order.
///
/// Rejections are logged and dropped, so the result is never longer than `candidates`.
pub async fn assume_all<X>(
    exchange: &X,
    candidates: &[RoleCandidate],
    assertion: &str,
    limit: usize,
) -> Vec<AssumedCredential>
where
    X: RoleExchange + ?Sized,
{
    let attempts = attempt_all(exchange, candidates, assertion, limit).await;
    let assumed: Vec<_> = attempts
        .into_iter()
        .filter_map(|attempt| match attempt {
            Ok(credential) => Some(credential),
            Err(rejection) => {
                warn!(
                    role_arn = %rejection.role_arn,
                    kind = ?rejection.kind,
                    message = %rejection.message,
                    "role is not eligible"
                );
                None
            }
        })
        .collect();

    debug!(
        candidates = candidates.len(),
        assumed = assumed.len(),
        "role exchange complete"
    );
    assumed
}

/// STS `AssumeRoleWithSAML` client.
pub struct Client {
    inner: aws_sdk_sts::Client,
}

impl Client {
    /// Construct a client for the STS endpoint of `region`, giving each call at most `timeout`.
    #[must_use]
    pub fn new(region: &Region, timeout: Duration) -> Self {
        let sdk_config = SdkConfig::builder()
            .region(region.0.clone())
            .behavior_version(BehaviorVersion::latest())
            .timeout_config(TimeoutConfig::builder().operation_timeout(timeout).build())
            .build();

        Self {
            inner: aws_sdk_sts::Client::new(&sdk_config),
        }
    }

    async fn assume_role_with_saml(
        &self,
        candidate: &RoleCandidate,
        assertion: &str,
    ) -> Result<IssuedCredentials, ExchangeRejection> {
        let rejection = |kind, message: String| ExchangeRejection {
            role_arn: candidate.role_arn.clone(),
            kind,
            message,
        };

        let output = self
            .inner
            .assume_role_with_saml()
            .role_arn(&candidate.role_arn)
            .principal_arn(&candidate.principal_arn)
            .saml_assertion(assertion)
            .send()
            .await
            .map_err(|error| {
                rejection(rejection_kind(&error), DisplayErrorContext(&error).to_string())
            })?;

        macro_rules! invalid_res {
            ($msg:literal) => {
                concat!("invalid AssumeRoleWithSAML response: ", $msg).to_string()
            };
        }

        let credentials = output
            .credentials()
            .ok_or_else(|| rejection(RejectionKind::Denied, invalid_res!("missing credentials")))?;
        let expiration = credentials.expiration();
        let expires_at = Utc
            .timestamp_opt(expiration.secs(), expiration.subsec_nanos())
            .single()
            .ok_or_else(|| {
                rejection(RejectionKind::Denied, invalid_res!("expiration out of range"))
            })?;

        Ok(IssuedCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expires_at,
        })
    }
}

/// Only a response from STS itself counts as a denial, anything short of one is transport.
fn rejection_kind<E, R>(error: &SdkError<E, R>) -> RejectionKind {
    match error {
        SdkError::ServiceError(_) => RejectionKind::Denied,
        _ => RejectionKind::Transport,
    }
}

impl RoleExchange for Client {
    fn assume<'a>(
        &'a self,
        candidate: &'a RoleCandidate,
        assertion: &'a str,
    ) -> BoxFuture<'a, Result<IssuedCredentials, ExchangeRejection>> {
        Box::pin(self.assume_role_with_saml(candidate, assertion))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use super::*;

    /// Grants every role whose ARN is in `allowed`, fails to reach STS for those in
    /// `unreachable`, and denies the rest.
    pub(crate) struct ScriptedExchange {
        allowed: HashSet<String>,
        unreachable: HashSet<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedExchange {
        pub(crate) fn allowing(roles: &[&str]) -> Self {
            Self {
                allowed: roles.iter().map(ToString::to_string).collect(),
                unreachable: HashSet::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        pub(crate) fn unreachable(mut self, roles: &[&str]) -> Self {
            self.unreachable = roles.iter().map(ToString::to_string).collect();
            self
        }
    }

    impl RoleExchange for ScriptedExchange {
        fn assume<'a>(
            &'a self,
            candidate: &'a RoleCandidate,
            assertion: &'a str,
        ) -> BoxFuture<'a, Result<IssuedCredentials, ExchangeRejection>> {
            Box::pin(async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                if self.unreachable.contains(&candidate.role_arn) {
                    return Err(ExchangeRejection {
                        role_arn: candidate.role_arn.clone(),
                        kind: RejectionKind::Transport,
                        message: "dispatch failure: connection reset".to_string(),
                    });
                }
                if assertion.is_empty() || !self.allowed.contains(&candidate.role_arn) {
                    return Err(ExchangeRejection {
                        role_arn: candidate.role_arn.clone(),
                        kind: RejectionKind::Denied,
                        message: "Not authorized to perform sts:AssumeRoleWithSAML".to_string(),
                    });
                }
                Ok(IssuedCredentials {
                    access_key_id: format!("ASIA-{}", candidate.role_arn),
                    secret_access_key: "secret".to_string(),
                    session_token: "token".to_string(),
                    expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
                })
            })
        }
    }

    pub(crate) fn candidate(account: &str, role: &str) -> RoleCandidate {
        RoleCandidate {
            principal_arn: format!("arn:aws:iam::{account}:saml-provider/ADFS"),
            role_arn: format!("arn:aws:iam::{account}:role/{role}"),
        }
    }

    #[tokio::test]
    async fn keeps_successes_in_order() {
        let candidates = vec![
            candidate("111111111111", "Admin"),
            candidate("222222222222", "Admin"),
            candidate("333333333333", "Admin"),
            candidate("444444444444", "Admin"),
        ];
        let exchange = ScriptedExchange::allowing(&[
            "arn:aws:iam::444444444444:role/Admin",
            "arn:aws:iam::222222222222:role/Admin",
        ]);

        let assumed = assume_all(&exchange, &candidates, "assertion", 8).await;

        let roles: Vec<_> = assumed.iter().map(|c| c.role_arn.as_str()).collect();
        assert_eq!(
            roles,
            [
                "arn:aws:iam::222222222222:role/Admin",
                "arn:aws:iam::444444444444:role/Admin",
            ]
        );
        assert_eq!(
            assumed[0].access_key_id,
            "ASIA-arn:aws:iam::222222222222:role/Admin"
        );
    }

    #[tokio::test]
    async fn all_rejected_is_empty_not_an_error() {
        let candidates = vec![candidate("111111111111", "Admin")];
        let exchange = ScriptedExchange::allowing(&[]);

        assert!(assume_all(&exchange, &candidates, "assertion", 8)
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn attempts_report_each_rejection() {
        let candidates = vec![
            candidate("111111111111", "Admin"),
            candidate("222222222222", "Admin"),
        ];
        let exchange = ScriptedExchange::allowing(&["arn:aws:iam::111111111111:role/Admin"]);

        let attempts = attempt_all(&exchange, &candidates, "assertion", 8).await;

        assert!(attempts[0].is_ok());
        let rejection = attempts[1].as_ref().unwrap_err();
        assert_eq!(rejection.role_arn, "arn:aws:iam::222222222222:role/Admin");
        assert_eq!(rejection.kind, RejectionKind::Denied);
    }

    #[tokio::test]
    async fn fan_out_respects_limit() {
        let candidates: Vec<_> = (1..=9)
            .map(|n| candidate(&n.to_string().repeat(12), "Admin"))
            .collect();
        let roles: Vec<_> = candidates.iter().map(|c| c.role_arn.as_str()).collect();
        let exchange = ScriptedExchange::allowing(&roles);

        let assumed = assume_all(&exchange, &candidates, "assertion", 3).await;

        assert_eq!(assumed.len(), 9);
        let peak = exchange.peak.load(Ordering::SeqCst);
        assert!(peak > 1 && peak <= 3, "peak in-flight exchanges was {peak}");
    }

    #[tokio::test]
    async fn transport_failures_are_skipped() {
        let candidates = vec![
            candidate("111111111111", "Admin"),
            candidate("222222222222", "Admin"),
            candidate("333333333333", "Admin"),
        ];
        let exchange = ScriptedExchange::allowing(&[
            "arn:aws:iam::111111111111:role/Admin",
            "arn:aws:iam::333333333333:role/Admin",
        ])
        .unreachable(&["arn:aws:iam::222222222222:role/Admin"]);

        let attempts = attempt_all(&exchange, &candidates, "assertion", 8).await;
        let rejection = attempts[1].as_ref().unwrap_err();
        assert_eq!(rejection.kind, RejectionKind::Transport);

        let assumed = assume_all(&exchange, &candidates, "assertion", 8).await;
        let roles: Vec<_> = assumed.iter().map(|c| c.role_arn.as_str()).collect();
        assert_eq!(
            roles,
            [
                "arn:aws:iam::111111111111:role/Admin",
                "arn:aws:iam::333333333333:role/Admin",
            ]
        );
    }

    #[test]
    fn service_errors_are_denials() {
        let error = SdkError::<std::io::Error, ()>::service_error(
            std::io::Error::other("AccessDenied"),
            (),
        );
        assert_eq!(rejection_kind(&error), RejectionKind::Denied);
    }

    #[test]
    fn unanswered_requests_are_transport_failures() {
        let errors = [
            SdkError::<std::io::Error, ()>::timeout_error(std::io::Error::other("timed out")),
            SdkError::construction_failure(std::io::Error::other("bad request")),
            SdkError::response_error(std::io::Error::other("truncated body"), ()),
        ];
        for error in &errors {
            assert_eq!(rejection_kind(error), RejectionKind::Transport, "{error:?}");
        }
    }
}
