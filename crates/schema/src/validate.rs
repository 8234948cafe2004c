use std::collections::HashSet;

use nexus_models::{Rule, Schema};

/// Checks the structural invariants a schema must hold before it can
/// become a tenant's current version: no duplicate type names, no empty
/// relation names, and every rule reference (`computed_userset`,
/// `tuple_to_userset`) must name a relation that actually exists on its
/// type. Does not check for rewrite-tree cycles — those are caught by
/// the evaluator at check time, where the object graph (not just the
/// schema) determines whether a cycle is live.
pub fn validate_schema(schema: &Schema) -> Vec<String> {
    let mut errors = Vec::new();
    let mut type_names = HashSet::new();

    for type_def in &schema.type_definitions {
        if !type_names.insert(&type_def.object_type) {
            errors.push(format!("duplicate type name: {}", type_def.object_type));
        }

        for (rel_name, rule) in &type_def.relations {
            if rel_name.is_empty() {
                errors.push(format!("empty relation name in type {}", type_def.object_type));
            }
            check_rule_references(&type_def.object_type, rule, &type_def.relations, &mut errors);
        }
    }

    errors
}

fn check_rule_references(
    object_type: &str,
    rule: &Rule,
    relations: &std::collections::HashMap<String, Rule>,
    errors: &mut Vec<String>,
) {
    match rule {
        Rule::This => {}
        Rule::Computed { relation } => {
            if !relations.contains_key(relation) {
                errors.push(format!(
                    "{object_type}: computed_userset references unknown relation {relation}"
                ));
            }
        }
        Rule::TupleToUserset { tupleset_relation, computed } => {
            if !relations.contains_key(tupleset_relation) {
                errors.push(format!(
                    "{object_type}: tuple_to_userset references unknown tupleset relation {tupleset_relation}"
                ));
            }
            check_rule_references(object_type, computed, relations, errors);
        }
        Rule::Union(rules) | Rule::Intersection(rules) => {
            for r in rules {
                check_rule_references(object_type, r, relations, errors);
            }
        }
        Rule::Exclusion { base, subtract } => {
            check_rule_references(object_type, base, relations, errors);
            check_rule_references(object_type, subtract, relations, errors);
        }
    }
}

/// Human-readable rendering of a schema, in the spirit of OpenFGA's DSL.
/// Purely a debugging/inspection aid — never parsed back.
pub fn schema_to_dsl(schema: &Schema) -> String {
    let mut dsl = String::new();
    dsl.push_str(&format!("model\n  schema {}\n\n", schema.schema_version));

    for type_def in &schema.type_definitions {
        dsl.push_str(&format!("type {}\n", type_def.object_type));
        dsl.push_str("  relations\n");

        let mut names: Vec<_> = type_def.relations.keys().collect();
        names.sort();
        for name in names {
            let rule = &type_def.relations[name];
            dsl.push_str(&format!("    define {name}: {}\n", rule_to_dsl(rule)));
        }
        dsl.push('\n');
    }

    dsl
}

fn rule_to_dsl(rule: &Rule) -> String {
    match rule {
        Rule::This => "self".to_string(),
        Rule::Computed { relation } => relation.clone(),
        Rule::TupleToUserset { tupleset_relation, computed } => {
            format!("{} from {}", rule_to_dsl(computed), tupleset_relation)
        }
        Rule::Union(rules) => rules.iter().map(rule_to_dsl).collect::<Vec<_>>().join(" or "),
        Rule::Intersection(rules) => rules.iter().map(rule_to_dsl).collect::<Vec<_>>().join(" and "),
        Rule::Exclusion { base, subtract } => format!("{} but not {}", rule_to_dsl(base), rule_to_dsl(subtract)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_models::TypeDefinition;
    use std::collections::HashMap;

    fn type_def(object_type: &str, relations: Vec<(&str, Rule)>) -> TypeDefinition {
        TypeDefinition {
            object_type: object_type.to_string(),
            relations: relations.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        }
    }

    #[test]
    fn valid_schema_has_no_errors() {
        let schema = Schema {
            schema_version: "1".to_string(),
            type_definitions: vec![type_def(
                "folder",
                vec![("owner", Rule::this()), ("viewer", Rule::union([Rule::this(), Rule::computed("owner")]))],
            )],
        };
        assert!(validate_schema(&schema).is_empty());
    }

    #[test]
    fn duplicate_type_name_is_rejected() {
        let schema = Schema {
            schema_version: "1".to_string(),
            type_definitions: vec![type_def("folder", vec![]), type_def("folder", vec![])],
        };
        let errors = validate_schema(&schema);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn dangling_computed_userset_is_rejected() {
        let schema = Schema {
            schema_version: "1".to_string(),
            type_definitions: vec![type_def("folder", vec![("viewer", Rule::computed("nonexistent"))])],
        };
        let errors = validate_schema(&schema);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn empty_relation_name_is_rejected() {
        let mut relations = HashMap::new();
        relations.insert(String::new(), Rule::this());
        let schema = Schema {
            schema_version: "1".to_string(),
            type_definitions: vec![TypeDefinition { object_type: "folder".to_string(), relations }],
        };
        let errors = validate_schema(&schema);
        assert!(errors.iter().any(|e| e.contains("empty relation name")));
    }
}
