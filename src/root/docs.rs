//! Repository documents stored alongside tables.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the system table that exposes docs to SQL. It is never a user
/// table and is ignored when passed to staging commands.
pub const DOCS_TABLE_NAME: &str = "verdb_docs";

/// A repository document tracked in root values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocName {
    #[serde(rename = "README.md")]
    Readme,
    #[serde(rename = "LICENSE.md")]
    License,
}

impl DocName {
    pub const ALL: [DocName; 2] = [DocName::Readme, DocName::License];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocName::Readme => "README.md",
            DocName::License => "LICENSE.md",
        }
    }

    /// recognize a doc name among table arguments
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|doc| doc.as_str() == name)
    }
}

impl fmt::Display for DocName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_doc_names() {
        assert_eq!(DocName::parse("README.md"), Some(DocName::Readme));
        assert_eq!(DocName::parse("LICENSE.md"), Some(DocName::License));
        assert_eq!(DocName::parse("readme.md"), None);
        assert_eq!(DocName::parse("users"), None);
    }

    #[test]
    fn test_serialized_as_file_name() {
        let json = serde_json::to_string(&DocName::Readme).unwrap();
        assert_eq!(json, "\"README.md\"");
    }
}
