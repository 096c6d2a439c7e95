//! Locating the identity provider's login form.

use scraper::{Html, Selector};

use crate::flow::ParseError;

const LOGIN_FORM: &str = r#"form[id="loginForm"]"#;

/// Find the `action` of the first `<form id="loginForm">` in `html`.
///
/// An empty string is returned when there is no such form (or it has no `action`). Callers should
/// treat that as the form not being found.
pub(crate) fn locate(html: &str) -> Result<String, ParseError> {
    let selector = selector(LOGIN_FORM)?;
    let document = Html::parse_document(html);

    let action = document
        .select(&selector)
        .next()
        .and_then(|form| form.value().attr("action"))
        .unwrap_or_default();

    Ok(action.to_string())
}

pub(crate) fn selector(selector: &str) -> Result<Selector, ParseError> {
    Selector::parse(selector)
        .map_err(|error| ParseError::new(format!("invalid selector {selector}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_login_form_action() {
        let html = r#"<!DOCTYPE html>
            <html><head><title>Sign In</title>
            <script>if (a < b && c > d) { document.write("<form id='fake'>"); }</script>
            </head><body>
            <form method="post" id="options" action="/adfs/ls/options"></form>
            <form method="post" id="loginForm" autocomplete="off" novalidate
                  action="/adfs/ls/?SAMLRequest=fZBBa&amp;client-request-id=42">
              <input id="userNameInput" name="UserName" type="email">
            </form>
            </body></html>"#;

        assert_eq!(
            locate(html).unwrap(),
            "/adfs/ls/?SAMLRequest=fZBBa&client-request-id=42"
        );
    }

    #[test]
    fn first_login_form_wins() {
        let html = r#"<form id="loginForm" action="/first"></form>
            <form id="loginForm" action="/second"></form>"#;

        assert_eq!(locate(html).unwrap(), "/first");
    }

    #[test]
    fn missing_form_yields_empty_action() {
        let html = r#"<html><body><form id="other" action="/nope"></form></body></html>"#;

        assert_eq!(locate(html).unwrap(), "");
    }

    #[test]
    fn form_without_action_yields_empty_action() {
        assert_eq!(locate(r#"<form id="loginForm"></form>"#).unwrap(), "");
    }
}
