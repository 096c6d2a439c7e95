use std::{convert::Infallible, fmt};

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::{
    assertion,
    credentials_file::{CredentialsFileError, SharedCredentialsFile},
    fetcher::IdentitySession,
    login_form,
    select::{self, AccountChoice, SelectionError},
    sts::{self, RoleExchange},
    submit::{self, SubmitError},
    AssumedCredential, ConfigFile, SamlConfig, SamlFlowBuilder,
};

/// A configured SAML login against an ADFS identity provider.
///
/// Each call to [`authenticate`](Self::authenticate) is an independent login with its own HTTP
/// session: the login form is fetched, the directory credentials are posted to it, every role in
/// the returned assertion is exchanged for STS credentials, and one of the eligible accounts is
/// selected.
#[allow(clippy::module_name_repetitions)]
pub struct SamlFlow<I, X = sts::Client> {
    config: SamlConfig,
    exchange: X,
    interaction: I,
}

impl SamlFlow<Infallible> {
    /// Construct a builder for a SAML flow.
    ///
    /// Use this to override the default flow configuration.
    #[must_use]
    pub fn builder() -> SamlFlowBuilder<ConfigFile, Infallible> {
        SamlFlowBuilder::default()
    }
}

impl<I> SamlFlow<I>
where
    I: Interaction,
{
    /// Construct a flow from `config`, exchanging roles with STS.
    #[must_use]
    pub fn new(config: SamlConfig, interaction: I) -> Self {
        let exchange = sts::Client::new(&config.region, config.timeout());
        Self {
            config,
            exchange,
            interaction,
        }
    }
}

impl<I, X> SamlFlow<I, X>
where
    I: Interaction,
    X: RoleExchange,
{
    /// Replace the federation endpoint roles are exchanged with.
    #[must_use]
    pub fn with_exchange<Y: RoleExchange>(self, exchange: Y) -> SamlFlow<I, Y> {
        SamlFlow {
            config: self.config,
            exchange,
            interaction: self.interaction,
        }
    }

    /// The configuration this flow was built with.
    #[must_use]
    pub fn config(&self) -> &SamlConfig {
        &self.config
    }

    /// Log in and return the credentials of the selected account.
    ///
    /// If [`SamlConfig::account`] is set, the account is selected by alias or account ID without
    /// prompting. Otherwise the user is asked to choose from the eligible accounts.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity provider can't be reached or rejects the credentials, if
    /// its responses can't be understood, if no role could be assumed, or if no valid account is
    /// selected. See [`SamlFlowError`].
    pub async fn authenticate(&self) -> Result<AssumedCredential, SamlFlowError<I::Error>> {
        let mut stage = Stage::Idle;
        let result = self.run(&mut stage).await;
        settle(&mut stage, result)
    }

    /// Log in and write the selected credentials to the profile in `sink`.
    ///
    /// # Errors
    ///
    /// As [`authenticate`](Self::authenticate), and additionally if the credentials file can't be
    /// updated.
    pub async fn login(
        &self,
        sink: &SharedCredentialsFile,
    ) -> Result<AssumedCredential, SamlFlowError<I::Error>> {
        let mut stage = Stage::Idle;
        let result = self.deliver(sink, &mut stage).await;
        settle(&mut stage, result)
    }

    async fn deliver(
        &self,
        sink: &SharedCredentialsFile,
        stage: &mut Stage,
    ) -> Result<AssumedCredential, SamlFlowError<I::Error>> {
        let credential = self.run(stage).await?;

        sink.store(&self.config.profile, &credential)
            .await
            .map_err(SamlFlowError::Sink)?;
        stage.advance(Stage::Delivered);
        debug!(
            profile = %self.config.profile,
            path = %sink.path().display(),
            "credentials written"
        );

        Ok(credential)
    }

    async fn run(&self, stage: &mut Stage) -> Result<AssumedCredential, SamlFlowError<I::Error>> {
        let config = &self.config;
        let session = IdentitySession::new(config)?;
        let entry_url = session.entry_url()?;

        // The password prompt doesn't depend on the login page, so fetch it meanwhile.
        let (login_page, password) = futures::try_join!(
            async {
                session
                    .get(entry_url.clone())
                    .await
                    .map_err(SamlFlowError::Transport)
            },
            async {
                self.interaction
                    .password(&config.username)
                    .await
                    .map_err(SamlFlowError::Prompt)
            },
        )?;

        let action = login_form::locate(&login_page)?;
        if action.is_empty() {
            return Err(ParseError::new(format!("no login form found at {entry_url}")).into());
        }
        stage.advance(Stage::FormLocated);

        let saml_assertion = submit::submit(
            &session,
            &action,
            &config.username,
            &password,
            &config.netbios_domain,
        )
        .await?;
        stage.advance(Stage::Authenticated);

        let xml = assertion::decode(&saml_assertion)?;
        stage.advance(Stage::AssertionDecoded);

        let candidates = assertion::extract_roles(&xml)?;
        stage.advance(Stage::RolesEnumerated);

        let assumed = sts::assume_all(
            &self.exchange,
            &candidates,
            &saml_assertion,
            config.max_concurrent_exchanges,
        )
        .await;
        if assumed.is_empty() {
            return Err(SamlFlowError::NoEligibleAccounts {
                username: config.username.clone(),
            });
        }
        stage.advance(Stage::RolesAssumed);

        let selected = match &config.account {
            Some(selector) => select::select_by_account(&assumed, &config.aliases, selector)?
                .ok_or_else(|| SamlFlowError::AccountNotFound(selector.clone()))?,
            None => {
                let choices = select::choices(&assumed, &config.aliases);
                let answer = self
                    .interaction
                    .choose_account(&choices)
                    .await
                    .map_err(SamlFlowError::Prompt)?;
                select::select_by_index(&assumed, &answer)?
            }
        };
        stage.advance(Stage::AccountSelected);

        Ok(selected)
    }
}

impl<I, X> fmt::Debug for SamlFlow<I, X> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SamlFlow")
            .field("config", &self.config)
            .field("exchange", &"_")
            .field("interaction", &"_")
            .finish()
    }
}

/// Log the outcome of a login, marking `stage` failed on error.
fn settle<E: fmt::Display>(
    stage: &mut Stage,
    result: Result<AssumedCredential, E>,
) -> Result<AssumedCredential, E> {
    match &result {
        Ok(credential) => info!(role_arn = %credential.role_arn, %stage, "login finished"),
        Err(error) => {
            let reached = *stage;
            stage.advance(Stage::Failed);
            warn!(%reached, %error, "SAML login failed");
        }
    }
    result
}

/// Progress of one login.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Stage {
    Idle,
    FormLocated,
    Authenticated,
    AssertionDecoded,
    RolesEnumerated,
    RolesAssumed,
    AccountSelected,
    Delivered,
    Failed,
}

impl Stage {
    fn advance(&mut self, next: Stage) {
        debug!(from = %self, to = %next, "login stage");
        *self = next;
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::FormLocated => "form located",
            Self::Authenticated => "authenticated",
            Self::AssertionDecoded => "assertion decoded",
            Self::RolesEnumerated => "roles enumerated",
            Self::RolesAssumed => "roles assumed",
            Self::AccountSelected => "account selected",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The user-facing side of a login.
///
/// A login needs the user's password, and (unless an account was configured up front) the user's
/// choice among the eligible accounts. There are many ways this could be implemented depending on
/// the context, so interaction is modelled with this trait.
///
/// The `Error` associated type can be used if interaction is fallible. Type information is
/// preserved in the event of any subsequent [`SamlFlowError`].
pub trait Interaction: Send + Sync {
    /// An error that could occur when interacting with the user.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Obtain the directory password of `username`.
    fn password<'a>(&'a self, username: &'a str) -> BoxFuture<'a, Result<String, Self::Error>>;

    /// Ask the user to pick one of `choices`, returning what they typed.
    ///
    /// The answer is expected to be the 1-based [`AccountChoice::index`] of the chosen account.
    fn choose_account<'a>(
        &'a self,
        choices: &'a [AccountChoice],
    ) -> BoxFuture<'a, Result<String, Self::Error>>;
}

/// An error that occurred during the SAML login flow.
#[derive(Debug)]
pub enum SamlFlowError<P: std::error::Error + Send + Sync + 'static> {
    /// A network-level failure talking to the identity provider.
    Transport(TransportError),

    /// A document from the identity provider was missing something structurally required.
    Parse(ParseError),

    /// The identity provider rejected the credentials with the given message.
    Auth(AuthError),

    /// The account selection was invalid.
    Selection(SelectionError),

    /// None of the roles in the assertion could be assumed.
    NoEligibleAccounts {
        /// The user who logged in.
        username: String,
    },

    /// The configured account is not among the eligible roles.
    AccountNotFound(String),

    /// Indicates that an error occurred while interacting with the user.
    ///
    /// See [`Interaction`] for more information.
    Prompt(P),

    /// The selected credentials couldn't be written.
    Sink(CredentialsFileError),
}

impl<P> fmt::Display for SamlFlowError<P>
where
    P: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Transport(error) => write!(f, "SAML login failed due to: {error}"),
            Self::Parse(error) => write!(f, "SAML login failed due to: {error}"),
            Self::Auth(error) => error.fmt(f),
            Self::Selection(error) => error.fmt(f),
            Self::NoEligibleAccounts { username } => write!(f, "No accounts found for {username}"),
            Self::AccountNotFound(account) => {
                write!(f, "account '{account}' not found among eligible roles")
            }
            Self::Prompt(error) => write!(f, "SAML login failed during prompt: {error}"),
            Self::Sink(error) => error.fmt(f),
        }
    }
}

impl<P: std::error::Error + Send + Sync + 'static> std::error::Error for SamlFlowError<P> {}

impl<P: std::error::Error + Send + Sync + 'static> From<TransportError> for SamlFlowError<P> {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

impl<P: std::error::Error + Send + Sync + 'static> From<ParseError> for SamlFlowError<P> {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl<P: std::error::Error + Send + Sync + 'static> From<SelectionError> for SamlFlowError<P> {
    fn from(error: SelectionError) -> Self {
        Self::Selection(error)
    }
}

impl<P: std::error::Error + Send + Sync + 'static> From<SubmitError> for SamlFlowError<P> {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Transport(error) => Self::Transport(error),
            SubmitError::Parse(error) => Self::Parse(error),
            SubmitError::Auth(error) => Self::Auth(error),
        }
    }
}

/// A network-level failure (connection, TLS, timeout) talking to the identity provider.
#[derive(Debug)]
pub struct TransportError(String);

impl TransportError {
    pub(crate) fn new(context: impl fmt::Display, error: impl std::error::Error) -> Self {
        let mut message = format!("{context}: {error}");
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(&format!(": {cause}"));
            source = cause.source();
        }
        Self(message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for TransportError {}

/// A required element was missing from, or malformed in, an identity provider document.
#[derive(Debug)]
pub struct ParseError(String);

impl ParseError {
    pub(crate) fn new(error: impl Into<String>) -> Self {
        Self(error.into())
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ParseError {}

/// The identity provider's own error message, e.g. for a wrong password.
#[derive(Debug)]
pub struct AuthError(pub(crate) String);

impl AuthError {
    /// The message shown by the identity provider.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AuthError {}
