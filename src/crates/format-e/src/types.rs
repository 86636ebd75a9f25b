//! Closed enums shared by the parser, the serializer, and downstream crates
//! that hold graph data (`graph-core`'s `Node`/`Edge` reuse these directly so
//! the set of valid type tags has exactly one definition in the workspace).

use serde::{Deserialize, Serialize};
use std::fmt;

/// The ten domain tags a node's semantic ID (`Name.TypeAbbr.NNN`) may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Sys,
    Uc,
    Actor,
    Fchain,
    Func,
    Flow,
    Req,
    Test,
    Mod,
    Schema,
}

impl NodeType {
    /// Parse the `TypeAbbr` segment of a semantic ID. Case-insensitive.
    pub fn from_abbr(abbr: &str) -> Option<Self> {
        Some(match abbr.to_ascii_uppercase().as_str() {
            "SYS" => Self::Sys,
            "UC" => Self::Uc,
            "ACTOR" => Self::Actor,
            "FCHAIN" => Self::Fchain,
            "FUNC" => Self::Func,
            "FLOW" => Self::Flow,
            "REQ" => Self::Req,
            "TEST" => Self::Test,
            "MOD" => Self::Mod,
            "SCHEMA" => Self::Schema,
            _ => return None,
        })
    }

    pub fn abbr(&self) -> &'static str {
        match self {
            Self::Sys => "SYS",
            Self::Uc => "UC",
            Self::Actor => "ACTOR",
            Self::Fchain => "FCHAIN",
            Self::Func => "FUNC",
            Self::Flow => "FLOW",
            Self::Req => "REQ",
            Self::Test => "TEST",
            Self::Mod => "MOD",
            Self::Schema => "SCHEMA",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbr())
    }
}

/// The six directed relationship kinds an edge may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    Compose,
    Io,
    Satisfy,
    Verify,
    Allocate,
    Relation,
}

impl EdgeType {
    /// Parse the arrow abbreviation used between `-` and `->` in Format E
    /// (`cp`, `io`, `sat`, `ver`, `alc`, `rel`).
    pub fn from_arrow(arrow: &str) -> Option<Self> {
        Some(match arrow {
            "cp" => Self::Compose,
            "io" => Self::Io,
            "sat" => Self::Satisfy,
            "ver" => Self::Verify,
            "alc" => Self::Allocate,
            "rel" => Self::Relation,
            _ => return None,
        })
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            Self::Compose => "cp",
            Self::Io => "io",
            Self::Satisfy => "sat",
            Self::Verify => "ver",
            Self::Allocate => "alc",
            Self::Relation => "rel",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_abbr() {
        for t in [
            NodeType::Sys,
            NodeType::Uc,
            NodeType::Actor,
            NodeType::Fchain,
            NodeType::Func,
            NodeType::Flow,
            NodeType::Req,
            NodeType::Test,
            NodeType::Mod,
            NodeType::Schema,
        ] {
            assert_eq!(NodeType::from_abbr(t.abbr()), Some(t));
        }
    }

    #[test]
    fn node_type_abbr_is_case_insensitive() {
        assert_eq!(NodeType::from_abbr("func"), Some(NodeType::Func));
        assert_eq!(NodeType::from_abbr("Func"), Some(NodeType::Func));
    }

    #[test]
    fn unknown_node_abbr_is_none() {
        assert_eq!(NodeType::from_abbr("NOPE"), None);
    }

    #[test]
    fn edge_type_round_trips_through_arrow() {
        for t in [
            EdgeType::Compose,
            EdgeType::Io,
            EdgeType::Satisfy,
            EdgeType::Verify,
            EdgeType::Allocate,
            EdgeType::Relation,
        ] {
            assert_eq!(EdgeType::from_arrow(t.arrow()), Some(t));
        }
    }

    #[test]
    fn unknown_edge_arrow_is_none() {
        assert_eq!(EdgeType::from_arrow("zzz"), None);
    }
}
