//! Broadcast policies and the predicates that evaluate them.
//!
//! Three independent blocks, read once at startup and passed by reference
//! into every evaluation:
//! - **source** (`source`) - who may trigger a broadcast
//! - **destination** (`destination`) - which memberships receive it
//! - **membership** (`membership`) - which conversations the agent may stay in

pub mod destination;
pub mod source;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use destination::select_destinations;
pub use source::{accept_membership, authorize};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastPolicy {
    pub source: SourcePolicy,
    pub destination: DestinationPolicy,
    pub membership: MembershipPolicy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePolicy {
    pub restrict_to_own_org: bool,
    pub restrict_to_sender_list: bool,
    /// Person ids or primary emails.
    pub sender_list: BTreeSet<String>,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            restrict_to_own_org: true,
            restrict_to_sender_list: false,
            sender_list: BTreeSet::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationPolicy {
    pub restrict_to_own_org: bool,
    pub restrict_to_sender_org: bool,
}

impl DestinationPolicy {
    /// Whether selection looks at conversation owners at all.
    pub fn filters_by_owner(&self) -> bool {
        self.restrict_to_own_org || self.restrict_to_sender_org
    }
}

impl Default for DestinationPolicy {
    fn default() -> Self {
        Self { restrict_to_own_org: false, restrict_to_sender_org: true }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MembershipPolicy {
    pub restrict_to_own_org: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    NotInSenderList,
    ForeignOrganization,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInSenderList => "not_in_sender_list",
            Self::ForeignOrganization => "foreign_organization",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}
