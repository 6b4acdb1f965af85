//! Core type definitions for the graph database
//!
//! String identifiers live at the API boundary; storage works on dense
//! `u64` surrogate keys, one family per concern.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! surrogate_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(key: u64) -> Self {
                $name(key)
            }

            pub fn as_u64(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(key: u64) -> Self {
                $name(key)
            }
        }
    };
}

surrogate_key!(
    /// Surrogate key of a named graph; every stored row is scoped under it
    GraphKey
);
surrogate_key!(
    /// Surrogate key of a vertex id within one graph
    VertexKey
);
surrogate_key!(
    /// Surrogate key of an edge id within one graph
    EdgeKey
);
surrogate_key!(
    /// Surrogate key of a label string within one graph
    LabelKey
);

/// Traversal direction relative to an anchor vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow edges whose source is the anchor
    Out,
    /// Follow edges whose destination is the anchor
    In,
    /// Out, then in
    Both,
}

impl Direction {
    pub fn includes_out(self) -> bool {
        matches!(self, Direction::Out | Direction::Both)
    }

    pub fn includes_in(self) -> bool {
        matches!(self, Direction::In | Direction::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Out => write!(f, "out"),
            Direction::In => write!(f, "in"),
            Direction::Both => write!(f, "both"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surrogate_keys() {
        let key = VertexKey::new(42);
        assert_eq!(key.as_u64(), 42);
        assert_eq!(VertexKey::from(42), key);
        assert_eq!(format!("{}", key), "VertexKey(42)");
        assert!(LabelKey(1) < LabelKey(2));
    }

    #[test]
    fn test_direction_flags() {
        assert!(Direction::Out.includes_out());
        assert!(!Direction::Out.includes_in());
        assert!(Direction::In.includes_in());
        assert!(Direction::Both.includes_out() && Direction::Both.includes_in());
    }
}
