use rackline_core::{EntityId, Version};

/// One entity row. `deleted_at_version` is `None` while the entity is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub kind: String,
    pub driver: String,
    pub version: Version,
    pub deleted_at_version: Option<Version>,
}

impl EntityRecord {
    pub fn is_live(&self) -> bool {
        self.deleted_at_version.is_none()
    }
}

/// Read context. `Latest` sees current live rows; `At(v)` is a consistent
/// snapshot of everything visible at version `v`. Passed explicitly to
/// every read instead of living in session-global state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Latest,
    At(Version),
}

impl View {
    pub fn pin(&self) -> Option<i64> {
        match self {
            View::Latest => None,
            View::At(v) => Some(v.as_u64() as i64),
        }
    }
}

/// How an attribute row participates in resource-claim uniqueness.
///
/// `Exclusive` rows are covered by the partial unique claim index, so a
/// second live claim of the same (key, value) fails at the database rather
/// than racing a check-then-act. `Forced` rows record a claim but sit
/// outside the index, allowing deliberate multi-ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClaimKind {
    #[default]
    None,
    Exclusive,
    Forced,
}

impl ClaimKind {
    pub fn as_i64(&self) -> i64 {
        match self {
            ClaimKind::None => 0,
            ClaimKind::Exclusive => 1,
            ClaimKind::Forced => 2,
        }
    }

    pub fn from_i64(n: i64) -> Self {
        match n {
            1 => ClaimKind::Exclusive,
            2 => ClaimKind::Forced,
            _ => ClaimKind::None,
        }
    }

    pub fn is_claim(&self) -> bool {
        !matches!(self, ClaimKind::None)
    }
}
