use crate::error::SchemaError;
use crate::schema::{TargetField, validate_target_fields};

const PROMPT_TEMPLATE: &str = include_str!("prompt.md");

pub const SYSTEM_INSTRUCTION: &str = "You are a data integration assistant \
that maps supplier data fields onto a target schema. Answer with valid JSON only.";

/// What gets sent to the oracle for one supplier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    pub system_instruction: String,
    pub user_prompt: String,
}

fn render_targets(fields: &[TargetField]) -> String {
    fields
        .iter()
        .map(|field| match &field.description {
            Some(description) => {
                format!("- **{}**: {description}\n", field.name)
            }
            None => format!("- **{}**\n", field.name),
        })
        .collect()
}

fn render_suppliers(fields: &[String]) -> String {
    if fields.is_empty() {
        return "(none: this supplier exposes no fields, so leave every \
                target field unmapped)\n"
            .to_owned();
    }
    fields.iter().map(|field| format!("- `{field}`\n")).collect()
}

fn render_hints(hints: &[String]) -> String {
    let hints: Vec<&str> = hints
        .iter()
        .map(|hint| hint.trim())
        .filter(|hint| !hint.is_empty())
        .collect();
    if hints.is_empty() {
        return String::new();
    }

    let mut section = String::from("## Business rules\n\n");
    for hint in hints {
        section.push_str("- ");
        section.push_str(hint);
        section.push('\n');
    }
    section.push('\n');
    section
}

/// Substitutes `{{NAME}}` placeholders in a single left-to-right pass over
/// the template. Inserted values are never scanned again, so field names
/// that look like placeholders come through verbatim. Unknown placeholders
/// are left as they are.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut filled = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let (before, tail) = rest.split_at(start);
        filled.push_str(before);

        let resolved = tail.find("}}").and_then(|end| {
            let name = tail.get(2..end)?;
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end.saturating_add(2)))
        });

        match resolved {
            Some((value, consumed)) => {
                filled.push_str(value);
                rest = tail.get(consumed..).unwrap_or_default();
            }
            None => {
                filled.push_str("{{");
                rest = tail.get(2..).unwrap_or_default();
            }
        }
    }

    filled.push_str(rest);
    filled
}

pub fn build_request(
    target_fields: &[TargetField],
    supplier_fields: &[String],
    hints: &[String],
) -> Result<RequestPayload, SchemaError> {
    validate_target_fields(target_fields)?;

    let targets = render_targets(target_fields);
    let suppliers = render_suppliers(supplier_fields);
    let rules = render_hints(hints);

    let user_prompt = fill_template(
        PROMPT_TEMPLATE,
        &[
            ("TARGET_FIELDS", targets.as_str()),
            ("SUPPLIER_FIELDS", suppliers.as_str()),
            ("HINTS", rules.as_str()),
        ],
    );

    Ok(RequestPayload {
        system_instruction: SYSTEM_INSTRUCTION.to_owned(),
        user_prompt,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<TargetField> {
        vec![
            TargetField::new("product_id"),
            TargetField::new("is_available")
                .with_description("Whether the product can be ordered"),
        ]
    }

    fn suppliers() -> Vec<String> {
        vec!["PRODUCTCODE".to_owned(), "isStocked".to_owned()]
    }

    #[test]
    fn test_prompt_lists_both_schemas() {
        let payload = build_request(&targets(), &suppliers(), &[]).unwrap();

        assert_eq!(payload.system_instruction, SYSTEM_INSTRUCTION);
        assert!(payload.user_prompt.contains("- **product_id**\n"));
        assert!(payload.user_prompt.contains(
            "- **is_available**: Whether the product can be ordered\n"
        ));
        assert!(payload.user_prompt.contains("- `PRODUCTCODE`\n"));
        assert!(payload.user_prompt.contains("- `isStocked`\n"));
    }

    #[test]
    fn test_prompt_describes_response_shape() {
        let payload = build_request(&targets(), &suppliers(), &[]).unwrap();

        assert!(payload.user_prompt.contains("\"mappings\""));
        assert!(payload.user_prompt.contains("\"targetField\""));
        assert!(payload.user_prompt.contains("\"direct\""));
        assert!(payload.user_prompt.contains("\"formula\""));
    }

    #[test]
    fn test_no_placeholders_left() {
        let payload = build_request(
            &targets(),
            &suppliers(),
            &["is_available is true when isStocked equals YES".to_owned()],
        )
        .unwrap();

        assert!(!payload.user_prompt.contains("{{"));
        assert!(!payload.user_prompt.contains("}}"));
    }

    #[test]
    fn test_hints_are_rendered() {
        let hints = vec![
            "is_available is true when isStocked equals YES".to_owned(),
            "   ".to_owned(),
            "name is FIRST and LAST joined by a space".to_owned(),
        ];
        let payload = build_request(&targets(), &suppliers(), &hints).unwrap();

        assert!(payload.user_prompt.contains("## Business rules"));
        assert!(payload.user_prompt.contains(
            "- is_available is true when isStocked equals YES\n"
        ));
        assert!(
            payload
                .user_prompt
                .contains("- name is FIRST and LAST joined by a space\n")
        );
        assert!(!payload.user_prompt.contains("- \n"));
    }

    #[test]
    fn test_without_hints_has_no_rules_section() {
        let payload = build_request(&targets(), &suppliers(), &[]).unwrap();
        assert!(!payload.user_prompt.contains("## Business rules"));
    }

    #[test]
    fn test_empty_supplier_list_is_allowed() {
        let payload = build_request(&targets(), &[], &[]).unwrap();
        assert!(payload.user_prompt.contains("this supplier exposes no fields"));
    }

    #[test]
    fn test_placeholder_like_field_names_are_kept_verbatim() {
        let targets = vec![
            TargetField::new("a").with_description("copied from {{SUPPLIER_FIELDS}}"),
        ];
        let payload = build_request(
            &targets,
            &["{{HINTS}}".to_owned(), "{{TARGET_FIELDS}}".to_owned()],
            &["RULE".to_owned()],
        )
        .unwrap();

        assert!(payload.user_prompt.contains("- `{{HINTS}}`\n"));
        assert!(payload.user_prompt.contains("- `{{TARGET_FIELDS}}`\n"));
        assert!(
            payload
                .user_prompt
                .contains("- **a**: copied from {{SUPPLIER_FIELDS}}\n")
        );
        assert_eq!(payload.user_prompt.matches("## Business rules").count(), 1);
        assert_eq!(payload.user_prompt.matches("- RULE\n").count(), 1);
    }

    #[test]
    fn test_fill_template_leaves_unknown_placeholders() {
        let filled = fill_template(
            "{{A}} and {{B}} and {{ unclosed",
            &[("A", "{{B}}")],
        );
        assert_eq!(filled, "{{B}} and {{B}} and {{ unclosed");
    }

    #[test]
    fn test_empty_target_list_is_rejected() {
        let result = build_request(&[], &suppliers(), &[]);
        assert_eq!(result, Err(SchemaError::EmptyTargetFields));
    }
}
