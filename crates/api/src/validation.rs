use crate::error::ApiError;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

pub fn validate<T: Validate>(value: &T) -> Result<(), ApiError> {
    value
        .validate()
        .map_err(|errors| ApiError::Validation(describe(&errors)))
}

/// Flattens nested validator output into dotted field paths, so a rejected
/// request names the exact entry (`answers[1].answer_ids`) instead of
/// echoing the whole error tree.
fn describe(errors: &ValidationErrors) -> String {
    let mut fields = Vec::new();
    collect_fields("", errors, &mut fields);
    fields.sort();
    fields.dedup();
    format!("invalid fields: {}", fields.join(", "))
}

fn collect_fields(prefix: &str, errors: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(_) => out.push(path),
            ValidationErrorsKind::Struct(nested) => collect_fields(&path, nested, out),
            ValidationErrorsKind::List(entries) => {
                for (index, nested) in entries {
                    collect_fields(&format!("{path}[{index}]"), nested, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Validate)]
    struct Inner {
        #[validate(length(min = 1))]
        name: String,
    }

    #[derive(Serialize, Validate)]
    struct Outer {
        #[validate(length(min = 1), nested)]
        items: Vec<Inner>,
    }

    #[test]
    fn empty_list_names_the_field() {
        let err = validate(&Outer { items: vec![] }).unwrap_err();
        assert!(err.to_string().contains("items"));
    }

    #[test]
    fn nested_failure_names_the_entry() {
        let outer = Outer {
            items: vec![
                Inner {
                    name: "ok".to_string(),
                },
                Inner {
                    name: String::new(),
                },
            ],
        };
        let err = validate(&outer).unwrap_err();
        assert!(err.to_string().contains("items[1].name"));
    }
}
