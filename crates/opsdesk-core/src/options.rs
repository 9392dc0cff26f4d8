//! Option lists for selection inputs.
//!
//! Dictionaries (`{"1": "Red"}`) and entity lists (`[{"id": 1, "name": "Red"}]`)
//! both project to an ordered `Vec<OptionPair>`. Input order is kept and
//! duplicates are not removed.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One `{value, label}` entry of a selection list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionPair {
    pub value: String,
    pub label: String,
}

impl OptionPair {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Which entity fields carry the option value and label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionFields {
    pub value: String,
    pub label: String,
}

impl Default for OptionFields {
    fn default() -> Self {
        Self {
            value: "id".to_string(),
            label: "name".to_string(),
        }
    }
}

impl OptionFields {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// String form of a JSON scalar; null and missing fields become empty.
fn text_of(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Project an `id -> label` dictionary.
pub fn project_dictionary(dictionary: &Map<String, Value>) -> Vec<OptionPair> {
    dictionary
        .iter()
        .map(|(value, label)| OptionPair::new(value.clone(), text_of(Some(label))))
        .collect()
}

/// Project any sequence of `(value, label)` pairs.
pub fn project_pairs<I, V, L>(pairs: I) -> Vec<OptionPair>
where
    I: IntoIterator<Item = (V, L)>,
    V: ToString,
    L: Into<String>,
{
    pairs
        .into_iter()
        .map(|(value, label)| OptionPair::new(value.to_string(), label))
        .collect()
}

/// Project a list of entities, one pair per entity.
pub fn project_entities(entities: &[Value], fields: &OptionFields) -> Vec<OptionPair> {
    entities
        .iter()
        .map(|entity| {
            OptionPair::new(
                text_of(entity.get(&fields.value)),
                text_of(entity.get(&fields.label)),
            )
        })
        .collect()
}

/// Project only the entities whose `group_field` equals `group`.
pub fn project_grouped(
    entities: &[Value],
    fields: &OptionFields,
    group_field: &str,
    group: &str,
) -> Vec<OptionPair> {
    let members: Vec<Value> = entities
        .iter()
        .filter(|entity| entity.get(group_field).is_some_and(|g| text_of(Some(g)) == group))
        .cloned()
        .collect();
    project_entities(&members, fields)
}

/// Label for `candidate`, or `Unknown {field_name}` when no option matches.
pub fn resolve_label(options: &[OptionPair], candidate: &str, field_name: &str) -> String {
    options
        .iter()
        .find(|option| option.value == candidate)
        .map(|option| option.label.clone())
        .unwrap_or_else(|| format!("Unknown {field_name}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn colors() -> Vec<OptionPair> {
        let dictionary = json!({"1": "Red", "2": "Blue"});
        project_dictionary(dictionary.as_object().unwrap())
    }

    #[test]
    fn test_dictionary_projection_keeps_order() {
        assert_eq!(
            colors(),
            vec![OptionPair::new("1", "Red"), OptionPair::new("2", "Blue")]
        );

        let reversed = json!({"9": "Zinc", "1": "Alloy"});
        let options = project_dictionary(reversed.as_object().unwrap());
        assert_eq!(options[0].value, "9");
        assert_eq!(options[1].value, "1");
    }

    #[test]
    fn test_non_string_labels_are_stringified() {
        let dictionary = json!({"a": 5, "b": true, "c": null});
        let options = project_dictionary(dictionary.as_object().unwrap());
        let labels: Vec<&str> = options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["5", "true", ""]);
    }

    #[test]
    fn test_resolve_label() {
        let options = colors();
        assert_eq!(resolve_label(&options, "1", "Color"), "Red");
        assert_eq!(resolve_label(&options, "3", "Color"), "Unknown Color");
        assert_eq!(resolve_label(&[], "1", "Vendor"), "Unknown Vendor");
    }

    #[test]
    fn test_entity_projection_without_dedup() {
        let entities = vec![
            json!({"id": 10, "name": "Gasket"}),
            json!({"id": 11, "name": "Seal"}),
            json!({"id": 10, "name": "Gasket"}),
            json!({"name": "Orphan"}),
        ];
        let options = project_entities(&entities, &OptionFields::default());
        assert_eq!(options.len(), 4);
        assert_eq!(options[0], OptionPair::new("10", "Gasket"));
        assert_eq!(options[2], OptionPair::new("10", "Gasket"));
        assert_eq!(options[3], OptionPair::new("", "Orphan"));
    }

    #[test]
    fn test_custom_fields() {
        let entities = vec![json!({"code": "KG", "title": "Kilogram"})];
        let options = project_entities(&entities, &OptionFields::new("code", "title"));
        assert_eq!(options, vec![OptionPair::new("KG", "Kilogram")]);
    }

    #[test]
    fn test_grouped_projection_filters_first() {
        let entities = vec![
            json!({"id": 1, "name": "Filter", "category": "engine"}),
            json!({"id": 2, "name": "Tyre", "category": "chassis"}),
            json!({"id": 3, "name": "Piston", "category": "engine"}),
            json!({"id": 4, "name": "Misc"}),
            json!({"id": 5, "name": "Grouped by number", "category": 7}),
        ];
        let fields = OptionFields::default();

        let engine = project_grouped(&entities, &fields, "category", "engine");
        assert_eq!(
            engine,
            vec![OptionPair::new("1", "Filter"), OptionPair::new("3", "Piston")]
        );

        let numeric = project_grouped(&entities, &fields, "category", "7");
        assert_eq!(numeric.len(), 1);
        assert!(project_grouped(&entities, &fields, "category", "body").is_empty());
    }

    #[test]
    fn test_project_pairs() {
        let options = project_pairs([(1, "Open"), (2, "Closed")]);
        assert_eq!(
            options,
            vec![OptionPair::new("1", "Open"), OptionPair::new("2", "Closed")]
        );
    }
}
