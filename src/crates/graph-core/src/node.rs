use chrono::{DateTime, Utc};
use format_e::NodeType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A node in the graph, identified by a human-readable semantic ID of the
/// shape `Name.TypeAbbr.NNN` (e.g. `ProcessPayment.FUNC.001`), with a
/// parallel internal UUID that stays stable across renames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub semantic_id: String,
    pub uuid: Uuid,
    pub node_type: NodeType,
    /// Derived from the semantic ID's leading segment at construction time.
    pub name: String,
    pub description: String,
    /// Well-known keys include `phase` (1..4), `volatility`
    /// (`low`/`medium`/`high`), and layout hints `x`, `y`, `zoom`.
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Build a new node, deriving `name` from `semantic_id`'s leading
    /// segment (everything before the type tag and sequence number).
    pub fn new(
        semantic_id: impl Into<String>,
        node_type: NodeType,
        description: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Self {
        let semantic_id = semantic_id.into();
        let name = derive_name(&semantic_id);
        let now = Utc::now();
        Self {
            semantic_id,
            uuid: Uuid::new_v4(),
            node_type,
            name,
            description: description.into(),
            attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge an update's description/attributes onto this node. Missing
    /// fields (an absent description, attribute keys not present in
    /// `overlay`) are preserved.
    pub fn merge(&mut self, description: Option<&str>, overlay: &Map<String, Value>) {
        if let Some(description) = description {
            self.description = description.to_string();
        }
        for (k, v) in overlay {
            self.attributes.insert(k.clone(), v.clone());
        }
        self.updated_at = Utc::now();
    }
}

fn derive_name(semantic_id: &str) -> String {
    let parts: Vec<&str> = semantic_id.rsplitn(3, '.').collect();
    match parts.len() {
        3 => parts[2].to_string(),
        _ => semantic_id.to_string(),
    }
}
