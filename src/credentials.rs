use std::fmt;

use chrono::{DateTime, Utc};

use crate::{sts::IssuedCredentials, RoleCandidate};

/// Temporary AWS credentials obtained by assuming one role from a SAML assertion.
///
/// The fields of this struct are obviously pretty sensitive, and should be handled with care.
/// The secret and session token are not printed in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct AssumedCredential {
    /// The ARN of the role these credentials were issued for.
    pub role_arn: String,

    /// The access key ID.
    pub access_key_id: String,

    /// The secret access key.
    pub secret_access_key: String,

    /// The session token.
    pub session_token: String,

    /// When the credentials expire.
    pub expires_at: DateTime<Utc>,
}

impl AssumedCredential {
    pub(crate) fn issued(candidate: &RoleCandidate, issued: IssuedCredentials) -> Self {
        Self {
            role_arn: candidate.role_arn.clone(),
            access_key_id: issued.access_key_id,
            secret_access_key: issued.secret_access_key,
            session_token: issued.session_token,
            expires_at: issued.expires_at,
        }
    }

    /// The 12-digit account ID embedded in the role ARN, immediately before `:role`.
    ///
    /// Returns `None` if the role ARN is not of the form `arn:<partition>:iam::<account>:role/..`.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        account_id_of(&self.role_arn)
    }
}

impl fmt::Debug for AssumedCredential {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AssumedCredential")
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

pub(crate) fn account_id_of(role_arn: &str) -> Option<&str> {
    let (head, _) = role_arn.split_once(":role")?;
    let account_id = head.rsplit(':').next()?;
    (!account_id.is_empty() && account_id.bytes().all(|b| b.is_ascii_digit())).then_some(account_id)
}
