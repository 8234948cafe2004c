use crate::ids::{ObjectRef, Principal};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Read-consistency mode for a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Consistency {
    /// May read from any cache layer. Default; staleness bounded by the
    /// quantum plus invalidation latency.
    Eventual,
    /// Requires the change-log position observed during the check is >=
    /// `token`.
    Bounded { token: i64 },
    /// Bypasses Tiger/Final/Leopard caches; uses the subproblem cache
    /// only if its observed position is fresh.
    Strong,
}

impl Default for Consistency {
    fn default() -> Self {
        Consistency::Eventual
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub principal: Principal,
    pub permission: String,
    pub object: ObjectRef,
    /// Tenant whose store holds `object`, when it differs from
    /// `principal.tenant_id`. `None` means the common case: principal and
    /// object live in the same tenant. Set this to express a genuine
    /// cross-tenant check — the evaluator then only consults the
    /// Cross-Tenant Grant Index for `shared_*` relations, never the
    /// object tenant's ordinary relation graph for a foreign principal.
    #[serde(default)]
    pub query_tenant_id: Option<String>,
    #[serde(default)]
    pub consistency: Consistency,
    /// Wall-clock deadline for the check, relative to request receipt.
    #[serde(default = "default_deadline", with = "duration_millis")]
    pub deadline: Duration,
}

impl CheckRequest {
    /// The tenant actually queried: `query_tenant_id` if set, else the
    /// principal's own tenant.
    pub fn tenant(&self) -> &str {
        self.query_tenant_id.as_deref().unwrap_or(&self.principal.tenant_id)
    }
}

fn default_deadline() -> Duration {
    Duration::from_millis(500)
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// One step of a witness trace: a tuple consulted, or a rewrite-rule
/// transition, that contributed to a decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TraceStep {
    DirectTuple {
        object: ObjectRef,
        relation: String,
        subject_type: String,
        subject_id: String,
    },
    Userset {
        object: ObjectRef,
        relation: String,
        via_type: String,
        via_id: String,
        via_relation: String,
    },
    ComputedUserset { from_relation: String, to_relation: String },
    TupleToUserset { tupleset_relation: String, linked_object: ObjectRef, computed: String },
    Union { matched_index: usize },
    Intersection,
    Exclusion,
    CacheHit { layer: &'static str },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allow: bool,
    /// Max change-log seq consulted; pass back for read-your-writes.
    pub token: i64,
    pub trace: Option<Vec<TraceStep>>,
}

impl Decision {
    pub fn allow(token: i64) -> Self {
        Self { allow: true, token, trace: None }
    }

    pub fn deny(token: i64) -> Self {
        Self { allow: false, token, trace: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCheckItem {
    pub permission: String,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkCheckRequest {
    pub principal: Principal,
    pub items: Vec<BulkCheckItem>,
    /// Same meaning as `CheckRequest::query_tenant_id`; shared by every
    /// item since a batch always targets one store.
    #[serde(default)]
    pub query_tenant_id: Option<String>,
    #[serde(default)]
    pub consistency: Consistency,
    #[serde(default = "default_deadline", with = "duration_millis")]
    pub deadline: Duration,
}

impl BulkCheckRequest {
    /// The tenant actually queried: `query_tenant_id` if set, else the
    /// principal's own tenant.
    pub fn tenant(&self) -> &str {
        self.query_tenant_id.as_deref().unwrap_or(&self.principal.tenant_id)
    }
}
