use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tenant definitions of object types, their relations, and the
/// userset-rewrite rules that define how permissions expand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    pub schema_version: String,
    pub type_definitions: Vec<TypeDefinition>,
}

impl Schema {
    pub fn type_def(&self, object_type: &str) -> Option<&TypeDefinition> {
        self.type_definitions.iter().find(|t| t.object_type == object_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub object_type: String,
    /// Every relation/permission defined for this type, keyed by name.
    /// Zanzibar doesn't distinguish "relation" from "permission" at the
    /// schema level — both are named rewrite rules; `this(r)` leaves are
    /// what make a name a "relation" in the conventional sense.
    #[serde(default)]
    pub relations: HashMap<String, Rule>,
}

/// A userset-rewrite rule. Every permission expands to a tree of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Rule {
    /// Direct tuples with this relation (including userset tuples stored
    /// under the same relation name).
    This,
    /// "Whoever has `relation` on this object."
    Computed { relation: String },
    /// Follow `tupleset_relation` to a referenced object (e.g. `parent`),
    /// then evaluate `computed` there. Encodes inheritance.
    TupleToUserset {
        tupleset_relation: String,
        computed: Box<Rule>,
    },
    Union(Vec<Rule>),
    Intersection(Vec<Rule>),
    Exclusion { base: Box<Rule>, subtract: Box<Rule> },
}

impl Rule {
    pub fn this() -> Self {
        Rule::This
    }

    pub fn computed(relation: impl Into<String>) -> Self {
        Rule::Computed { relation: relation.into() }
    }

    pub fn tuple_to_userset(tupleset_relation: impl Into<String>, computed: Rule) -> Self {
        Rule::TupleToUserset {
            tupleset_relation: tupleset_relation.into(),
            computed: Box::new(computed),
        }
    }

    pub fn union(rules: impl IntoIterator<Item = Rule>) -> Self {
        Rule::Union(rules.into_iter().collect())
    }

    pub fn exclusion(base: Rule, subtract: Rule) -> Self {
        Rule::Exclusion { base: Box::new(base), subtract: Box::new(subtract) }
    }
}
