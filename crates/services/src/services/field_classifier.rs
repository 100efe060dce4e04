//! Field-name heuristic that infers the storage/validation category of an entity field.
//!
//! Rules are checked in a fixed order and the first match wins. A name like `statusDate`
//! matches both the date and the status rule; it is a date because the date rule comes
//! first. Reordering the rules changes generated output.

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Values a status/type-like field may take. The first is the default.
pub const STATUS_VALUES: [&str; 4] = ["pending", "active", "completed", "cancelled"];

/// Values a `role` field may take. The first is the default.
pub const ROLE_VALUES: [&str; 2] = ["user", "admin"];

const DATE_MARKERS: &[&str] = &["Date", "date"];
const MEDIA_MARKERS: &[&str] = &[
    "image", "Image", "photo", "Photo", "avatar", "Avatar", "logo", "Logo", "url", "Url", "URL",
];
const CURRENCY_MARKERS: &[&str] = &[
    "price", "Price", "amount", "Amount", "salary", "Salary", "cost", "Cost", "total", "Total",
    "fee", "Fee",
];
const STATUS_MARKERS: &[&str] = &["status", "Status", "type", "Type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SemanticType {
    /// Reference to another entity (`customerId`, `customer_id`).
    IdentifierReference,
    Date,
    MediaUrl,
    Currency,
    /// One of [`STATUS_VALUES`].
    Status,
    Password,
    Email,
    /// One of [`ROLE_VALUES`].
    Role,
    Text,
}

/// A field name paired with its inferred type. Recomputed on every render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedField {
    pub name: String,
    pub semantic_type: SemanticType,
}

/// Maps a field name to its semantic type. Total: anything unmatched is [`SemanticType::Text`].
pub fn classify(field_name: &str) -> SemanticType {
    let contains_any = |markers: &[&str]| markers.iter().any(|m| field_name.contains(m));

    if field_name.ends_with("Id") || field_name.ends_with("_id") {
        SemanticType::IdentifierReference
    } else if contains_any(DATE_MARKERS) || field_name.ends_with("At") {
        SemanticType::Date
    } else if contains_any(MEDIA_MARKERS) {
        SemanticType::MediaUrl
    } else if contains_any(CURRENCY_MARKERS) {
        SemanticType::Currency
    } else if contains_any(STATUS_MARKERS) {
        SemanticType::Status
    } else {
        match field_name {
            "password" => SemanticType::Password,
            "email" => SemanticType::Email,
            "role" => SemanticType::Role,
            _ => SemanticType::Text,
        }
    }
}

/// Field names that denote the record's own identifier; never declared explicitly.
pub fn is_implicit_identifier(field_name: &str) -> bool {
    matches!(field_name, "id" | "_id")
}

/// Classifies every declared field, skipping the implicit identifier.
/// Duplicates are kept in place.
pub fn classify_fields(fields: &[String]) -> Vec<ClassifiedField> {
    fields
        .iter()
        .filter(|name| !is_implicit_identifier(name))
        .map(|name| ClassifiedField {
            name: name.clone(),
            semantic_type: classify(name),
        })
        .collect()
}

/// Relation target of an identifier-reference field: `customerId` -> `Customer`.
pub fn relation_name(field_name: &str) -> String {
    let stem = field_name
        .strip_suffix("_id")
        .or_else(|| field_name.strip_suffix("Id"))
        .unwrap_or(field_name);
    if stem.is_empty() {
        utils::text::capitalize_first(field_name)
    } else {
        utils::text::capitalize_first(stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_suffixes() {
        for name in ["customerId", "customer_id", "parentCategoryId", "x_id", "Id"] {
            assert_eq!(classify(name), SemanticType::IdentifierReference, "{name}");
        }
        // Case-sensitive: a trailing lowercase `id` is not a reference.
        assert_eq!(classify("paid"), SemanticType::Text);
        assert_eq!(classify("customerID"), SemanticType::Text);
    }

    #[test]
    fn test_rule_order() {
        assert_eq!(classify("statusDate"), SemanticType::Date);
        assert_eq!(classify("dateOfPayment"), SemanticType::Date);
        assert_eq!(classify("createdAt"), SemanticType::Date);
        assert_eq!(classify("lastSeenAt"), SemanticType::Date);
        assert_eq!(classify("chat"), SemanticType::Text);
        assert_eq!(classify("format"), SemanticType::Text);
        assert_eq!(classify("priceImageUrl"), SemanticType::MediaUrl);
        assert_eq!(classify("totalStatus"), SemanticType::Currency);
        assert_eq!(classify("orderType"), SemanticType::Status);
        assert_eq!(classify("status"), SemanticType::Status);
        // A reference beats every substring rule.
        assert_eq!(classify("imageTypeId"), SemanticType::IdentifierReference);
    }

    #[test]
    fn test_exact_literals() {
        assert_eq!(classify("password"), SemanticType::Password);
        assert_eq!(classify("email"), SemanticType::Email);
        assert_eq!(classify("role"), SemanticType::Role);
        assert_eq!(classify("Password"), SemanticType::Text);
        assert_eq!(classify("workEmail"), SemanticType::Text);
        assert_eq!(classify("roles"), SemanticType::Text);
    }

    #[test]
    fn test_total_on_odd_input() {
        assert_eq!(classify(""), SemanticType::Text);
        assert_eq!(classify("名前"), SemanticType::Text);
        assert_eq!(classify("  "), SemanticType::Text);
        assert_eq!(classify("name"), SemanticType::Text);
    }

    #[test]
    fn test_employee_example() {
        let fields: Vec<String> = ["id", "name", "email", "salary", "joinDate"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let classified = classify_fields(&fields);
        let pairs: Vec<_> = classified
            .iter()
            .map(|f| (f.name.as_str(), f.semantic_type))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("name", SemanticType::Text),
                ("email", SemanticType::Email),
                ("salary", SemanticType::Currency),
                ("joinDate", SemanticType::Date),
            ]
        );
    }

    #[test]
    fn test_duplicates_are_kept() {
        let fields = vec!["title".to_string(), "title".to_string(), "_id".to_string()];
        assert_eq!(classify_fields(&fields).len(), 2);
    }

    #[test]
    fn test_relation_name() {
        assert_eq!(relation_name("customerId"), "Customer");
        assert_eq!(relation_name("order_item_id"), "Order_item");
        assert_eq!(relation_name("Id"), "Id");
    }
}
