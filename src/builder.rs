use std::convert::Infallible;

use futures::future::BoxFuture;

use crate::{ConfigError, ConfigFile, Interaction, SamlConfig, SamlFlow};

/// Builder for [`SamlFlow`].
///
/// This allows aspects of the login flow to be configured.
///
/// # Example
///
/// ```no_run
/// # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use std::io;
///
/// use aws_saml_flow::{AccountChoice, Interaction, SamlConfig, SamlFlowBuilder};
/// use futures::future::BoxFuture;
///
/// struct FixedPassword;
///
/// impl Interaction for FixedPassword {
///     type Error = io::Error;
///
///     fn password<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<String, io::Error>> {
///         Box::pin(async { Ok("hunter2".to_string()) })
///     }
///
///     fn choose_account<'a>(
///         &'a self,
///         _: &'a [AccountChoice],
///     ) -> BoxFuture<'a, Result<String, io::Error>> {
///         Box::pin(async { Ok("1".to_string()) })
///     }
/// }
///
/// let flow = SamlFlowBuilder::new()
///     // use hard-coded configuration instead of loading ~/.aws-saml/config.json
///     .config(SamlConfig {
///         username: "jane.doe".to_string(),
///         directory_domain: "https://sts.corp.example.com".parse()?,
///         ..SamlConfig::default()
///     })
///     // never prompt for an account
///     .account("prod")
///     .interaction(FixedPassword)
///     .build()
///     .await?;
///
/// let credentials = flow.authenticate().await?;
/// # Ok(())
/// # }
/// ```
#[allow(clippy::module_name_repetitions)]
pub struct SamlFlowBuilder<S = ConfigFile, I = Infallible> {
    config_source: S,
    interaction: Option<I>,
    account: Option<String>,
}

impl SamlFlowBuilder<ConfigFile, Infallible> {
    /// Construct a [`SamlFlow`] builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SamlFlowBuilder<ConfigFile, Infallible> {
    fn default() -> Self {
        Self {
            config_source: ConfigFile::default(),
            interaction: None,
            account: None,
        }
    }
}

impl<S, I> SamlFlowBuilder<S, I> {
    /// Set the configuration source.
    ///
    /// By default, configuration is loaded from a [`ConfigFile`] in its default location.
    #[must_use]
    pub fn config<NewS>(self, config_source: NewS) -> SamlFlowBuilder<NewS, I>
    where
        NewS: SamlConfigSource,
    {
        SamlFlowBuilder {
            config_source,
            interaction: self.interaction,
            account: self.account,
        }
    }

    /// Select this account (alias or 12-digit account ID) rather than asking the user.
    ///
    /// This overrides [`SamlConfig::account`] from the configuration source.
    #[must_use]
    pub fn account(self, account: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            ..self
        }
    }

    /// Set the interaction handler used to obtain the password and the account choice.
    #[must_use]
    pub fn interaction<NewI>(self, interaction: NewI) -> SamlFlowBuilder<S, NewI>
    where
        NewI: Interaction,
    {
        SamlFlowBuilder {
            config_source: self.config_source,
            interaction: Some(interaction),
            account: self.account,
        }
    }
}

impl<S, I> SamlFlowBuilder<S, I>
where
    S: SamlConfigSource,
    I: Interaction,
{
    /// Build a [`SamlFlow`] with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns any errors encountered when loading the [`SamlConfigSource`].
    pub async fn build(self) -> Result<SamlFlow<I>, S::Error> {
        let mut config = self.config_source.load().await?;
        if self.account.is_some() {
            config.account = self.account;
        }

        // `new` sets `I = Infallible`, which doesn't impl `Interaction`, so for `I: Interaction`
        // to hold it must have been set explicitly.
        let interaction = self.interaction.expect("interaction must be set");

        Ok(SamlFlow::new(config, interaction))
    }
}

/// A source of SAML configuration.
///
/// This trait is more intended to facilitate precise error handling in [`SamlFlowBuilder::build`],
/// but it could also be used to implement alternative configuration sources.
pub trait SamlConfigSource {
    /// The future returned by the config source.
    type Future: std::future::Future<Output = Result<SamlConfig, Self::Error>>;

    /// The error that might occur when sourcing the configuration.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the SAML configuration.
    fn load(self) -> Self::Future;
}

impl SamlConfigSource for SamlConfig {
    type Future = futures::future::Ready<Result<Self, Self::Error>>;

    type Error = Infallible;

    fn load(self) -> Self::Future {
        futures::future::ready(Ok(self))
    }
}

impl SamlConfigSource for ConfigFile {
    type Future = BoxFuture<'static, Result<SamlConfig, Self::Error>>;

    type Error = ConfigError;

    fn load(self) -> Self::Future {
        Box::pin(async move { ConfigFile::load(&self).await })
    }
}
