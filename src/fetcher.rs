//! Session-scoped HTTP access to the identity provider.

use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::{flow::TransportError, SamlConfig, CLIENT_NAME};

/// Path of the IdP-initiated sign-on page for the AWS relying party, relative to the domain.
const IDP_ENTRY_PATH: &str = "adfs/ls/IdpInitiatedSignOn.aspx?loginToRp=urn:amazon:webservices";

/// One login attempt against the identity provider.
///
/// Each session owns its own cookie jar, which is shared by the login form `GET` and the
/// credentials `POST` so that the identity provider can correlate the two. Sessions must not be
/// shared between logins.
pub(crate) struct IdentitySession {
    domain: Url,
    client: reqwest::Client,
}

impl IdentitySession {
    pub(crate) fn new(config: &SamlConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(CLIENT_NAME)
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|error| TransportError::new("failed to build HTTP client", error))?;

        Ok(Self {
            domain: config.directory_domain.clone(),
            client,
        })
    }

    /// The URL of the IdP-initiated sign-on page.
    pub(crate) fn entry_url(&self) -> Result<Url, TransportError> {
        self.resolve(IDP_ENTRY_PATH)
    }

    /// Resolve a (possibly relative) path against the directory domain.
    pub(crate) fn resolve(&self, path: &str) -> Result<Url, TransportError> {
        self.domain
            .join(path)
            .map_err(|error| TransportError::new(format!("invalid URL {path:?}"), error))
    }

    /// `GET` a document and return its body.
    pub(crate) async fn get(&self, url: Url) -> Result<String, TransportError> {
        debug!(%url, "fetching document");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|error| TransportError::new(format!("GET {url} failed"), error))?;

        response
            .text()
            .await
            .map_err(|error| TransportError::new(format!("reading {url} failed"), error))
    }

    /// `POST` a urlencoded form, following redirects, and return the final body.
    pub(crate) async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<String, TransportError> {
        debug!(%url, "submitting form");
        let response = self
            .client
            .post(url.clone())
            .form(form)
            .send()
            .await
            .map_err(|error| TransportError::new(format!("POST {url} failed"), error))?;

        debug!(final_url = %response.url(), status = %response.status(), "form submitted");

        response
            .text()
            .await
            .map_err(|error| TransportError::new(format!("reading {url} failed"), error))
    }
}
