//! Parsing of FHIR reference strings.

/// Identifier portion of a reference string.
///
/// Handles relative (`Patient/123`), versioned (`Patient/123/_history/2`),
/// absolute (`https://host/fhir/Patient/123`) and URN (`urn:uuid:123`) forms.
/// Contained (`#x`) and conditional (`Practitioner?identifier=...`) references
/// carry no resolvable identifier and yield `None`; see
/// [`conditional_identifier`] for the latter.
pub fn reference_id(reference: &str) -> Option<&str> {
    let trimmed = reference.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.contains('?') {
        return None;
    }

    for prefix in ["urn:uuid:", "urn:oid:"] {
        if let Some(rest) = trimmed.strip_prefix(prefix) {
            return (!rest.is_empty()).then_some(rest);
        }
    }

    let segments: Vec<&str> = trimmed.split('/').filter(|s| !s.is_empty()).collect();
    let id = match segments.iter().position(|s| *s == "_history") {
        Some(0) => return None,
        Some(pos) => segments[pos - 1],
        None => *segments.last()?,
    };

    Some(id)
}

/// `system|value` token of a conditional reference such as
/// `Practitioner?identifier=http://hl7.org/fhir/sid/us-npi|9999941`.
///
/// Only the `identifier` search parameter is understood. Other criteria, and
/// plain references, yield `None`.
pub fn conditional_identifier(reference: &str) -> Option<&str> {
    let (_, query) = reference.trim().split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| *name == "identifier")
        .map(|(_, token)| token)
        .filter(|token| !token.is_empty())
}

/// The `system|value` token of an `Identifier`, matching what
/// [`conditional_identifier`] extracts. A missing system leaves the bare value.
pub fn identifier_token(system: Option<&str>, value: &str) -> String {
    match system {
        Some(system) if !system.is_empty() => format!("{system}|{value}"),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_reference() {
        assert_eq!(reference_id("Patient/123"), Some("123"));
    }

    #[test]
    fn urn_reference() {
        assert_eq!(
            reference_id("urn:uuid:4877dc14-609c-a22b-0a94-e15707167428"),
            Some("4877dc14-609c-a22b-0a94-e15707167428")
        );
    }

    #[test]
    fn absolute_and_versioned_references() {
        assert_eq!(
            reference_id("https://example.org/fhir/Encounter/e-9"),
            Some("e-9")
        );
        assert_eq!(reference_id("Condition/c1/_history/3"), Some("c1"));
    }

    #[test]
    fn unresolvable_references() {
        assert_eq!(reference_id(""), None);
        assert_eq!(reference_id("#contained"), None);
        assert_eq!(
            reference_id("Practitioner?identifier=http://hl7.org/fhir/sid/us-npi|9999"),
            None
        );
        assert_eq!(reference_id("urn:uuid:"), None);
    }

    #[test]
    fn bare_identifier_is_its_own_id() {
        assert_eq!(reference_id("abc"), Some("abc"));
    }

    #[test]
    fn conditional_reference_token() {
        assert_eq!(
            conditional_identifier("Practitioner?identifier=http://hl7.org/fhir/sid/us-npi|9999941"),
            Some("http://hl7.org/fhir/sid/us-npi|9999941")
        );
        assert_eq!(
            conditional_identifier("Organization?name=x&identifier=https://github.com/synthetichealth/synthea|ab12"),
            Some("https://github.com/synthetichealth/synthea|ab12")
        );
        assert_eq!(conditional_identifier("Practitioner?name=House"), None);
        assert_eq!(conditional_identifier("Practitioner/pr1"), None);
        assert_eq!(conditional_identifier("Practitioner?identifier="), None);
    }

    #[test]
    fn identifier_tokens() {
        assert_eq!(
            identifier_token(Some("http://hl7.org/fhir/sid/us-npi"), "9999941"),
            "http://hl7.org/fhir/sid/us-npi|9999941"
        );
        assert_eq!(identifier_token(None, "9999941"), "9999941");
    }
}
