use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PersonId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrgId(pub String);

impl std::fmt::Display for PersonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for OrgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person as reported by the platform directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: PersonId,
    pub display_name: String,
    pub email: String,
    pub org_id: OrgId,
}

impl Identity {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
        org_id: impl Into<String>,
    ) -> Self {
        Self {
            id: PersonId(id.into()),
            display_name: display_name.into(),
            email: email.into(),
            org_id: OrgId(org_id.into()),
        }
    }

    /// True when `key` names this person, either by id or by primary email.
    pub fn matches_key(&self, key: &str) -> bool {
        let key = key.trim();
        key == self.id.0 || (!self.email.is_empty() && key.eq_ignore_ascii_case(&self.email))
    }
}
