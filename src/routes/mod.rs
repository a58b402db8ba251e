use std::collections::BTreeMap;
use validator::ValidationErrors;

pub mod ai;
pub mod donations;
pub mod live;

/// Flattens validator output into the `{field: [messages]}` shape the
/// dashboard expects. Field names go out in camelCase to match the JSON
/// request bodies they refer to.
pub(crate) fn flatten_field_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (camel_case(field), messages)
        })
        .collect()
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper_next = false;
    for c in field.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(c.to_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::camel_case;

    #[test]
    fn camel_cases_field_names() {
        assert_eq!(camel_case("pickup_deadline"), "pickupDeadline");
        assert_eq!(camel_case("title"), "title");
        assert_eq!(camel_case("food_type"), "foodType");
    }
}
