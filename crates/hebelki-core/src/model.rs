use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{HebelkiError, HebelkiResult};

// --- Visibility ---

/// Visibility class of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Customer-facing content.
    Public,
    /// Staff-only content.
    Internal,
}

/// Breadth of applicability of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    /// Applies to every customer of the tenant.
    Global,
    /// Applies to one specific customer (`scope_id`).
    Customer,
    /// Applies to one specific staff member (`scope_id`).
    Staff,
}

/// Trust ranking of a content source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityLevel {
    /// Verified official fact.
    Canonical,
    /// Reviewed, high trust.
    High,
    /// Regular content.
    #[default]
    Normal,
    /// Low trust.
    Low,
    /// Auto-extracted, unreviewed.
    Unverified,
}

/// Lifecycle state of an ingested document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Ingested and searchable.
    Active,
    /// Still being parsed or chunked.
    Processing,
    /// Ingestion failed.
    Failed,
    /// Marked for deletion; no longer searchable.
    DeletedPending,
}

/// The two corpora the engine searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Corpus {
    /// Curated knowledge entries.
    Knowledge,
    /// Chunks of ingested documents.
    Document,
}

impl std::fmt::Display for Corpus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Corpus::Knowledge => write!(f, "knowledge"),
            Corpus::Document => write!(f, "document"),
        }
    }
}

// --- Embedding metadata ---

/// The embedding metadata recorded next to a stored vector.
///
/// All three fields absent means the row predates version tracking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStamp {
    /// Model that produced the vector.
    #[serde(default)]
    pub model: Option<String>,
    /// Dimensionality of the vector.
    #[serde(default)]
    pub dim: Option<usize>,
    /// Text preprocessing version applied before embedding.
    #[serde(default)]
    pub preprocess_version: Option<String>,
}

impl EmbeddingStamp {
    /// True when no embedding metadata was recorded at all.
    pub fn is_untracked(&self) -> bool {
        self.model.is_none() && self.dim.is_none() && self.preprocess_version.is_none()
    }
}

// --- Knowledge corpus ---

/// A curated knowledge base entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// Unique entry id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Short headline, searched together with the content.
    pub title: String,
    /// Entry body.
    pub content: String,
    /// Free-form category such as `pricing` or `policies`.
    #[serde(default)]
    pub category: Option<String>,
    /// Who may see the entry.
    pub audience: Audience,
    /// Breadth of applicability.
    pub scope_type: ScopeType,
    /// Customer or staff id for scoped entries.
    #[serde(default)]
    pub scope_id: Option<Uuid>,
    /// Stored vector, if the entry has been embedded.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Dimensionality of `embedding`.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    /// Preprocessing version applied before embedding.
    #[serde(default)]
    pub preprocess_version: Option<String>,
    /// Trust ranking of the entry.
    #[serde(default)]
    pub authority_level: AuthorityLevel,
    /// Inactive entries are never retrieved.
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Last modification time.
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    /// Creates an active, public, global entry with normal authority.
    pub fn new(tenant_id: Uuid, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            title: title.into(),
            content: content.into(),
            category: None,
            audience: Audience::Public,
            scope_type: ScopeType::Global,
            scope_id: None,
            embedding: None,
            embedding_model: None,
            embedding_dim: None,
            preprocess_version: None,
            authority_level: AuthorityLevel::Normal,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// The embedding metadata of this entry.
    pub fn stamp(&self) -> EmbeddingStamp {
        EmbeddingStamp {
            model: self.embedding_model.clone(),
            dim: self.embedding_dim,
            preprocess_version: self.preprocess_version.clone(),
        }
    }
}

// --- Document corpus ---

/// An ingested document. Chunks hang off its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Document title, shown as the title of its chunks.
    pub title: String,
    /// Free-form category shared by every chunk.
    #[serde(default)]
    pub category: Option<String>,
    /// Who may see the document.
    pub audience: Audience,
    /// Breadth of applicability.
    pub scope_type: ScopeType,
    /// Customer or staff id for scoped documents.
    #[serde(default)]
    pub scope_id: Option<Uuid>,
    /// Only [`DocumentStatus::Active`] documents are searchable.
    pub status: DocumentStatus,
    /// Trust ranking of the document.
    #[serde(default)]
    pub authority_level: AuthorityLevel,
}

impl Document {
    /// Creates an active, public, global document.
    pub fn new(tenant_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            title: title.into(),
            category: None,
            audience: Audience::Public,
            scope_type: ScopeType::Global,
            scope_id: None,
            status: DocumentStatus::Active,
            authority_level: AuthorityLevel::Normal,
        }
    }
}

/// One ingested revision of a [`Document`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    /// Unique version id.
    pub id: Uuid,
    /// Parent document.
    pub document_id: Uuid,
    /// Revision number, starting at 1.
    #[serde(default = "default_version")]
    pub version: u32,
}

/// A page-bounded fragment of a document version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Unique chunk id.
    pub id: Uuid,
    /// Version the chunk was cut from.
    pub version_id: Uuid,
    /// Chunk text.
    pub content: String,
    /// First page covered.
    pub page_start: u32,
    /// Last page covered, inclusive.
    pub page_end: u32,
}

/// The embedding row attached to a [`DocumentChunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkEmbedding {
    /// Chunk the vector belongs to.
    pub chunk_id: Uuid,
    /// Stored vector.
    pub embedding: Vec<f32>,
    /// Model that produced `embedding`.
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Dimensionality of `embedding`.
    #[serde(default)]
    pub embedding_dim: Option<usize>,
    /// Preprocessing version applied before embedding.
    #[serde(default)]
    pub preprocess_version: Option<String>,
}

impl ChunkEmbedding {
    /// The embedding metadata of this row.
    pub fn stamp(&self) -> EmbeddingStamp {
        EmbeddingStamp {
            model: self.embedding_model.clone(),
            dim: self.embedding_dim,
            preprocess_version: self.preprocess_version.clone(),
        }
    }
}

// --- Access context ---

/// Who is asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// An end customer of the tenant.
    Customer,
    /// A staff member of the tenant.
    Staff,
    /// The tenant owner.
    Owner,
}

/// Per-request description of the caller, used to build visibility
/// predicates. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessContext {
    /// Tenant being searched.
    pub tenant_id: Uuid,
    /// Role of the caller.
    pub actor_type: ActorType,
    /// Identity of the caller, when known.
    #[serde(default)]
    pub actor_id: Option<Uuid>,
    /// Customer a staff member is asking about.
    #[serde(default)]
    pub customer_scope_id: Option<Uuid>,
}

impl AccessContext {
    /// The least-privileged context: an anonymous customer.
    pub fn restrictive(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_type: ActorType::Customer,
            actor_id: None,
            customer_scope_id: None,
        }
    }

    /// A known customer.
    pub fn customer(tenant_id: Uuid, actor_id: Uuid) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::restrictive(tenant_id)
        }
    }

    /// A staff member.
    pub fn staff(tenant_id: Uuid, actor_id: Option<Uuid>) -> Self {
        Self {
            tenant_id,
            actor_type: ActorType::Staff,
            actor_id,
            customer_scope_id: None,
        }
    }

    /// The tenant owner.
    pub fn owner(tenant_id: Uuid, actor_id: Option<Uuid>) -> Self {
        Self {
            actor_type: ActorType::Owner,
            ..Self::staff(tenant_id, actor_id)
        }
    }

    /// Narrow a staff/owner context to one customer's scoped content.
    pub fn with_customer_scope(mut self, customer_id: Uuid) -> Self {
        self.customer_scope_id = Some(customer_id);
        self
    }

    /// Whether the caller may see internal content.
    pub fn is_privileged(&self) -> bool {
        matches!(self.actor_type, ActorType::Staff | ActorType::Owner)
    }

    /// Reject structurally invalid contexts.
    pub fn validate(&self) -> HebelkiResult<()> {
        if self.tenant_id.is_nil() {
            return Err(HebelkiError::InvalidAccessContext(
                "tenant id is missing".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_restrictive_context_is_anonymous_customer() {
        let tenant = Uuid::new_v4();
        let ctx = AccessContext::restrictive(tenant);
        assert_eq!(ctx.actor_type, ActorType::Customer);
        assert!(ctx.actor_id.is_none());
        assert!(!ctx.is_privileged());
    }

    #[test]
    fn test_nil_tenant_is_invalid() {
        let ctx = AccessContext::restrictive(Uuid::nil());
        assert!(matches!(
            ctx.validate(),
            Err(HebelkiError::InvalidAccessContext(_))
        ));
    }

    #[test]
    fn test_owner_with_customer_scope() {
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let ctx = AccessContext::owner(tenant, None).with_customer_scope(customer);
        assert!(ctx.is_privileged());
        assert_eq!(ctx.customer_scope_id, Some(customer));
    }

    #[test]
    fn test_knowledge_entry_defaults_from_json() {
        let json = serde_json::json!({
            "id": Uuid::new_v4(),
            "tenant_id": Uuid::new_v4(),
            "title": "Stornierung",
            "content": "Bis 24 Stunden vorher kostenlos.",
            "audience": "public",
            "scope_type": "global"
        });
        let entry: KnowledgeEntry = serde_json::from_value(json).unwrap();
        assert!(entry.is_active);
        assert_eq!(entry.authority_level, AuthorityLevel::Normal);
        assert!(entry.stamp().is_untracked());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(
            serde_json::to_string(&DocumentStatus::DeletedPending).unwrap(),
            "\"deleted_pending\""
        );
        assert_eq!(serde_json::to_string(&Corpus::Document).unwrap(), "\"document\"");
        assert_eq!(Corpus::Knowledge.to_string(), "knowledge");
    }
}
