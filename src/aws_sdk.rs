use aws_types_integration::{
    credentials::{
        future::ProvideCredentials as ProvideCredentialsFut, CredentialsError, ProvideCredentials,
    },
    Credentials,
};

use crate::{sts::RoleExchange, AssumedCredential, Interaction, SamlFlow};

/// Provide credentials via a [`SamlFlow`].
///
/// Every call performs a full login, so the flow should be wrapped in a caching provider, and
/// configured with an account (see [`SamlFlowBuilder::account`](crate::SamlFlowBuilder::account))
/// so that resolution doesn't block on a prompt. Login errors are converted to
/// [`CredentialsError::ProviderError`], which will stop resolution if used in a chain.
impl<I, X> ProvideCredentials for SamlFlow<I, X>
where
    I: Interaction,
    X: RoleExchange,
{
    fn provide_credentials<'a>(&'a self) -> ProvideCredentialsFut<'a>
    where
        Self: 'a,
    {
        ProvideCredentialsFut::new(async {
            let creds = self
                .authenticate()
                .await
                .map(Into::into)
                .map_err(CredentialsError::provider_error)?;

            Ok(creds)
        })
    }
}

impl From<AssumedCredential> for Credentials {
    fn from(creds: AssumedCredential) -> Self {
        Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            Some(creds.session_token),
            Some(creds.expires_at.into()),
            "SamlFlow",
        )
    }
}
