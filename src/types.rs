//! Core domain types — pure value types, no backend or index dependencies.
//!
//! Mirrors the shape of `sem_os_core::types`: enums carry their own
//! `as_str`/`from_str` pair (never `FromStr`, since unknown input maps to a
//! fallback rather than an error) and every wire type derives `Serialize` +
//! `Deserialize` directly, since the on-disk format *is* the serde output.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Vector component type. Fixed per process per spec §3 invariant 2.
pub type VectorF32 = Vec<f32>;

/// `{seconds, nanoseconds}` wall-clock timestamp, bit-exact with spec §6's
/// on-disk example. Deliberately not `chrono::DateTime` on the wire — the
/// blob format is part of the public contract — but convertible to/from one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn from_chrono(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }

    pub fn to_chrono(self) -> chrono::DateTime<chrono::Utc> {
        chrono::DateTime::from_timestamp(self.seconds, self.nanoseconds)
            .unwrap_or_else(chrono::Utc::now)
    }
}

/// A scalar attribute value — the non-composite half of the tagged union
/// design note in spec §9 (`Scalar | Bytes | Json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// Tagged union for `data` and `attributes` payloads (spec §9): validation is
/// expressed as predicates over these variants rather than type coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Scalar(Scalar),
    Bytes(Vec<u8>),
    Json(serde_json::Map<String, serde_json::Value>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        match self {
            Value::Json(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(Scalar::Text(s))
    }
}

/// Free-form attribute side-table: string keys to tagged values.
pub type Attributes = HashMap<String, Value>;

/// Who/what produced an entity — recorded on every noun/verb for provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatorTag {
    pub augmentation: String,
    pub version: String,
}

impl Default for CreatorTag {
    fn default() -> Self {
        Self {
            augmentation: "core".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

macro_rules! closed_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident => $tag:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $tag, )+
                }
            }

            pub fn from_str(s: &str) -> Self {
                match s {
                    $( $tag => Self::$variant, )+
                    _ => Self::Custom,
                }
            }

            pub fn all() -> &'static [$name] {
                &[ $( Self::$variant, )+ ]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
    };
}

closed_enum!(
    /// Closed noun-type catalog (spec §3: "~40 tags"). Unknown tags on
    /// deserialization fall back to `Custom`; the original string is kept in
    /// the noun's attributes under `"_original_type"` by the caller (storage
    /// engine does not do this rewrite itself — see `Noun::with_custom_type`).
    #[serde(rename_all = "snake_case")]
    NounType {
        Person => "person",
        Organization => "organization",
        Location => "location",
        Document => "document",
        Event => "event",
        Concept => "concept",
        Process => "process",
        Product => "product",
        Project => "project",
        Task => "task",
        Asset => "asset",
        Account => "account",
        Contract => "contract",
        Policy => "policy",
        Transaction => "transaction",
        Dataset => "dataset",
        Model => "model",
        Service => "service",
        System => "system",
        Application => "application",
        Device => "device",
        Sensor => "sensor",
        Observation => "observation",
        Claim => "claim",
        Evidence => "evidence",
        Topic => "topic",
        Category => "category",
        Tag => "tag",
        Message => "message",
        Conversation => "conversation",
        Email => "email",
        Meeting => "meeting",
        Decision => "decision",
        Risk => "risk",
        Control => "control",
        Regulation => "regulation",
        Jurisdiction => "jurisdiction",
        Currency => "currency",
        Instrument => "instrument",
        Custom => "custom",
    }
);

closed_enum!(
    /// Closed verb-type catalog (spec §3: "~125 tags grouped by family").
    /// Families follow §3's list (ownership, part-of, temporal, causal,
    /// modal, epistemic, ...) and the classifier's 13 pattern families
    /// (§4.10) where they overlap.
    #[serde(rename_all = "snake_case")]
    VerbType {
        // -- creation --
        Creates => "creates", CreatedBy => "created_by", Authors => "authors",
        AuthoredBy => "authored_by", Produces => "produces", ProducedBy => "produced_by",
        Generates => "generates", GeneratedBy => "generated_by", Originates => "originates",
        // -- ownership --
        Owns => "owns", OwnedBy => "owned_by", Controls => "controls",
        ControlledBy => "controlled_by", Holds => "holds", HeldBy => "held_by",
        Manages => "manages", ManagedBy => "managed_by", InvestsIn => "invests_in",
        // -- part-whole --
        PartOf => "part_of", HasPart => "has_part", BelongsTo => "belongs_to",
        Contains => "contains", MemberOf => "member_of", HasMember => "has_member",
        SubsidiaryOf => "subsidiary_of", ParentOf => "parent_of", ComponentOf => "component_of",
        // -- location --
        LocatedAt => "located_at", LocatedIn => "located_in", Hosts => "hosts",
        HostedBy => "hosted_by", Borders => "borders", NearTo => "near_to",
        WithinRegion => "within_region", Surrounds => "surrounds", SurroundedBy => "surrounded_by",
        // -- organizational --
        EmployedBy => "employed_by", Employs => "employs", ReportsTo => "reports_to",
        Supervises => "supervises", AffiliatedWith => "affiliated_with",
        PartnersWith => "partners_with", CollaboratesWith => "collaborates_with",
        CompetesWith => "competes_with", Acquires => "acquires",
        // -- social --
        FriendOf => "friend_of", FamilyOf => "family_of", MarriedTo => "married_to",
        MentorOf => "mentor_of", MenteeOf => "mentee_of", AssociatedWith => "associated_with",
        Introduces => "introduces", TrustedBy => "trusted_by", Trusts => "trusts",
        // -- reference --
        References => "references", ReferencedBy => "referenced_by", Cites => "cites",
        CitedBy => "cited_by", Mentions => "mentions", MentionedIn => "mentioned_in",
        LinksTo => "links_to", LinkedFrom => "linked_from", Annotates => "annotates",
        // -- temporal --
        Precedes => "precedes", Follows => "follows", OccursDuring => "occurs_during",
        StartsAt => "starts_at", EndsAt => "ends_at", OverlapsWith => "overlaps_with",
        Before => "before", After => "after", ScheduledFor => "scheduled_for",
        // -- causal --
        Causes => "causes", CausedBy => "caused_by", Enables => "enables",
        EnabledBy => "enabled_by", Prevents => "prevents", Triggers => "triggers",
        TriggeredBy => "triggered_by", ResultsIn => "results_in", ResultedFrom => "resulted_from",
        // -- transformation --
        TransformsInto => "transforms_into", TransformedFrom => "transformed_from",
        Converts => "converts", ConvertedBy => "converted_by", Upgrades => "upgrades",
        Replaces => "replaces", ReplacedBy => "replaced_by", Merges => "merges",
        MergedWith => "merged_with",
        // -- classification --
        ClassifiedAs => "classified_as", Categorizes => "categorizes", TypeOf => "type_of",
        SubtypeOf => "subtype_of", InstanceOf => "instance_of", TaggedWith => "tagged_with",
        LabeledAs => "labeled_as", GroupedWith => "grouped_with", SimilarTo => "similar_to",
        // -- implementation --
        Implements => "implements", ImplementedBy => "implemented_by", Extends => "extends",
        ExtendedBy => "extended_by", Inherits => "inherits", Overrides => "overrides",
        OverriddenBy => "overridden_by", Depends => "depends", DependedOnBy => "depended_on_by",
        // -- interaction --
        InteractsWith => "interacts_with", CommunicatesWith => "communicates_with",
        Negotiates => "negotiates", RespondsTo => "responds_to", Requests => "requests",
        RequestedBy => "requested_by", Invokes => "invokes", InvokedBy => "invoked_by",
        Notifies => "notifies",
        // -- modal --
        MustComplyWith => "must_comply_with", RequiresApproval => "requires_approval",
        Authorizes => "authorizes", Delegates => "delegates",
        // -- epistemic --
        Believes => "believes", Asserts => "asserts", Implies => "implies", Infers => "infers",
        // -- fallback --
        Custom => "custom",
    }
);

/// `{id, type, vector, created_at, updated_at, creator_tag, label?, attributes?}`
/// — spec §3. The vector is immutable once written; `update` replaces the whole
/// noun rather than mutating in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Noun {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub noun_type: NounType,
    pub vector: VectorF32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(rename = "created_by")]
    pub creator_tag: CreatorTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
}

impl Noun {
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}

/// A directed typed edge between two nouns (spec §3). Dangling edges (an
/// endpoint later deleted) are retrievable but filterable via
/// `exclude_dangling` (spec §8.5, SPEC_FULL §F.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verb {
    pub id: Uuid,
    pub source_id: Uuid,
    pub target_id: Uuid,
    #[serde(rename = "type")]
    pub verb_type: VerbType,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(rename = "created_by")]
    pub creator_tag: CreatorTag,
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<VectorF32>,
}

fn default_weight() -> f32 {
    0.5
}

impl Verb {
    /// Clamp weight/confidence into `[0,1]` per spec §3 invariant 6. Called at
    /// construction time by `relate`/`update` so stored verbs are always valid.
    pub fn normalize(&mut self) {
        self.weight = self.weight.clamp(0.0, 1.0);
        if let Some(c) = self.confidence {
            self.confidence = Some(c.clamp(0.0, 1.0));
        }
    }
}

/// Process-wide statistics record (spec §3): eventually consistent, batched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Statistics {
    pub total_noun_count: u64,
    pub total_verb_count: u64,
    pub noun_counts_by_type: HashMap<String, u64>,
    pub verb_counts_by_type: HashMap<String, u64>,
    pub field_catalog: Vec<String>,
    pub hnsw_index_size: u64,
}
