//! Decoding SAML assertions and enumerating the roles they grant.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use quick_xml::{events::Event, Reader};
use tracing::{debug, warn};

use crate::flow::ParseError;

const ROLE_ATTRIBUTE_PREFIX: &str = "arn:aws:iam::";

/// A `(principal, role)` pair granted by a SAML assertion.
///
/// The principal is the SAML provider the role trusts, and both are required to assume the role.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RoleCandidate {
    /// ARN of the SAML provider, e.g. `arn:aws:iam::111111111111:saml-provider/ADFS`.
    pub principal_arn: String,

    /// ARN of the role, e.g. `arn:aws:iam::111111111111:role/Admin`.
    pub role_arn: String,
}

/// Decode a base64 assertion into its XML document.
///
/// # Errors
///
/// Returns an error if `assertion` is not valid base64 or does not decode to UTF-8.
pub fn decode(assertion: &str) -> Result<String, ParseError> {
    let compact: String = assertion
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|error| ParseError::new(format!("SAML assertion is not valid base64: {error}")))?;

    String::from_utf8(bytes)
        .map_err(|error| ParseError::new(format!("SAML assertion is not valid UTF-8: {error}")))
}

/// Extract every role granted by an assertion, in document order.
///
/// Every text node of the form `<principal arn>,<role arn>` is a candidate. Duplicates are kept.
///
/// # Errors
///
/// Returns an error if the document is not well-formed XML.
pub fn extract_roles(xml: &str) -> Result<Vec<RoleCandidate>, ParseError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut roles = Vec::new();
    loop {
        let text = match reader.read_event() {
            Ok(Event::Text(text)) => text
                .unescape()
                .map_err(|error| invalid_xml(&reader, error))?
                .into_owned(),
            Ok(Event::CData(data)) => String::from_utf8_lossy(&data.into_inner()).into_owned(),
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(error) => return Err(invalid_xml(&reader, error)),
        };

        if let Some(role) = role_candidate(text.trim()) {
            roles.push(role);
        }
    }

    debug!(count = roles.len(), "roles found in assertion");
    Ok(roles)
}

fn role_candidate(text: &str) -> Option<RoleCandidate> {
    if !text.starts_with(ROLE_ATTRIBUTE_PREFIX) {
        return None;
    }

    let Some((principal_arn, role_arn)) = text.split_once(',') else {
        warn!(value = text, "ignoring role attribute without a principal");
        return None;
    };

    Some(RoleCandidate {
        principal_arn: principal_arn.trim().to_string(),
        role_arn: role_arn.trim().to_string(),
    })
}

fn invalid_xml(reader: &Reader<&[u8]>, error: quick_xml::Error) -> ParseError {
    ParseError::new(format!(
        "invalid SAML assertion at byte {}: {error}",
        reader.error_position()
    ))
}
