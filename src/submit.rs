//! Submitting directory credentials and extracting the SAML assertion.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use tracing::debug;

use crate::{
    fetcher::IdentitySession,
    flow::{AuthError, ParseError},
    login_form::selector,
};

const SAML_RESPONSE: &str = r#"input[name="SAMLResponse"]"#;
const ERROR_TEXT: &str = r#"[id="errorText"]"#;

/// Number of characters after the `errorText` element's opening tag that may form the message.
const ERROR_TEXT_WINDOW: usize = 300;

/// Failure to obtain an assertion from the credentials `POST`.
#[derive(Debug)]
pub(crate) enum SubmitError {
    Transport(crate::flow::TransportError),
    Parse(ParseError),
    Auth(AuthError),
}

impl From<ParseError> for SubmitError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

/// What the identity provider said in response to a credentials `POST`.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LoginOutcome {
    Assertion(String),
    Rejected(String),
    Missing,
}

/// Post the user's credentials to the login form and return the base64 SAML assertion.
pub(crate) async fn submit(
    session: &IdentitySession,
    action: &str,
    username: &str,
    password: &str,
    netbios_domain: &str,
) -> Result<String, SubmitError> {
    let url = session.resolve(action).map_err(SubmitError::Transport)?;
    let user_name = qualify_username(username, netbios_domain);
    debug!(%user_name, "submitting directory credentials");

    let form = [
        ("UserName", user_name.as_str()),
        ("Password", password),
        ("Kmsi", "true"),
        ("AuthMethod", ""),
    ];
    let body = session
        .post_form(url, &form)
        .await
        .map_err(SubmitError::Transport)?;

    match read_login_response(&body)? {
        LoginOutcome::Assertion(assertion) => Ok(assertion),
        LoginOutcome::Rejected(message) => Err(SubmitError::Auth(AuthError(message))),
        LoginOutcome::Missing => Err(SubmitError::Parse(ParseError::new(
            "identity provider response contained neither a SAML assertion nor an error",
        ))),
    }
}

/// Usernames that look like email addresses are sent as-is, anything else is qualified with the
/// NetBIOS domain (`DOMAIN\user`).
pub(crate) fn qualify_username(username: &str, netbios_domain: &str) -> String {
    if looks_like_email(username) {
        username.to_string()
    } else {
        format!("{netbios_domain}\\{username}")
    }
}

fn looks_like_email(username: &str) -> bool {
    static EMAIL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r".+@.+\..+").expect("email pattern is valid"));
    EMAIL.is_match(username)
}

/// Inspect a response body for an IdP error message or a `SAMLResponse` field.
///
/// A non-empty `errorText` element takes precedence over any `SAMLResponse` in the same page.
pub(crate) fn read_login_response(html: &str) -> Result<LoginOutcome, ParseError> {
    let saml_response = selector(SAML_RESPONSE)?;
    let error_text = selector(ERROR_TEXT)?;
    let document = Html::parse_document(html);

    let message = document
        .select(&error_text)
        .map(|element| error_message(&element.inner_html()))
        .find(|message| !message.is_empty());
    if let Some(message) = message {
        return Ok(LoginOutcome::Rejected(message));
    }

    Ok(document
        .select(&saml_response)
        .find_map(|input| input.value().attr("value"))
        .map_or(LoginOutcome::Missing, |value| {
            LoginOutcome::Assertion(value.to_string())
        }))
}

fn error_message(inner_html: &str) -> String {
    let window: String = inner_html.chars().take(ERROR_TEXT_WINDOW).collect();
    let message = window.split("</").next().unwrap_or_default();
    message.trim().to_string()
}
