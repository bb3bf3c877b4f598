//! Navigation of declared field paths inside a FHIR resource.

use serde_json::Value;

/// One step of a declared source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Object member lookup.
    Key(&'static str),
    /// First element of a list.
    First,
    /// First element of the `extension` list whose `url` contains the fragment.
    Extension(&'static str),
}

/// A value of the wrong JSON shape was found along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub path: String,
    pub expected: &'static str,
}

/// Render a path the way it appears in error messages, e.g. `name[0].given[0]`.
pub fn render(steps: &[Step]) -> String {
    let mut out = String::new();
    for step in steps {
        match step {
            Step::Key(key) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(key);
            }
            Step::First => out.push_str("[0]"),
            Step::Extension(fragment) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str("extension(");
                out.push_str(fragment);
                out.push(')');
            }
        }
    }
    out
}

/// Follow `steps` from `root`.
///
/// Absent members, empty lists and JSON `null` end the walk with `Ok(None)`.
/// A value of the wrong shape (a string where a list is declared, say) is a
/// [`ShapeMismatch`].
pub fn resolve<'a>(root: &'a Value, steps: &[Step]) -> Result<Option<&'a Value>, ShapeMismatch> {
    let mut current = root;

    for (depth, step) in steps.iter().enumerate() {
        let mismatch = |expected| ShapeMismatch {
            path: render(&steps[..=depth]),
            expected,
        };

        let next = match step {
            Step::Key(key) => match current {
                Value::Object(map) => map.get(*key),
                _ => return Err(mismatch("an object")),
            },
            Step::First => match current {
                Value::Array(items) => items.first(),
                _ => return Err(mismatch("a list")),
            },
            Step::Extension(fragment) => {
                let extensions = match current {
                    Value::Object(map) => map.get("extension"),
                    _ => return Err(mismatch("an object")),
                };
                match extensions {
                    None | Some(Value::Null) => None,
                    Some(Value::Array(items)) => items.iter().find(|ext| {
                        ext.get("url")
                            .and_then(Value::as_str)
                            .is_some_and(|url| url.contains(fragment))
                    }),
                    Some(_) => return Err(mismatch("a list of extensions")),
                }
            }
        };

        match next {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => current = value,
        }
    }

    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use Step::*;

    #[test]
    fn resolves_nested_first_elements() {
        let patient = json!({ "name": [{ "given": ["Abe", "Lincoln"] }] });
        let found = resolve(&patient, &[Key("name"), First, Key("given"), First]);
        assert_eq!(found, Ok(Some(&json!("Abe"))));
    }

    #[test]
    fn absent_and_empty_are_none() {
        let patient = json!({ "name": [], "address": null });
        assert_eq!(resolve(&patient, &[Key("name"), First]), Ok(None));
        assert_eq!(resolve(&patient, &[Key("address"), First]), Ok(None));
        assert_eq!(resolve(&patient, &[Key("telecom")]), Ok(None));
    }

    #[test]
    fn wrong_shape_reports_the_path() {
        let patient = json!({ "name": "Abe" });
        let err = resolve(&patient, &[Key("name"), First, Key("family")]).unwrap_err();
        assert_eq!(err.path, "name[0]");
        assert_eq!(err.expected, "a list");
    }

    #[test]
    fn extension_matches_on_url_fragment() {
        let patient = json!({
            "extension": [
                { "url": "http://example.org/other", "valueString": "no" },
                { "url": "http://hl7.org/fhir/us/core/StructureDefinition/us-core-race",
                  "extension": [{ "valueCoding": { "display": "White" } }] }
            ]
        });
        let steps = [
            Extension("us-core-race"),
            Key("extension"),
            First,
            Key("valueCoding"),
            Key("display"),
        ];
        assert_eq!(resolve(&patient, &steps), Ok(Some(&json!("White"))));
        assert_eq!(render(&steps), "extension(us-core-race).extension[0].valueCoding.display");
    }
}
