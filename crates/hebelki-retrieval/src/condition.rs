//! Composable boolean conditions over corpus rows.
//!
//! Stores never receive hand-built query fragments. They receive a
//! [`Condition`] tree that they either evaluate in memory through the
//! [`Record`] trait or translate into their native filter language.
//! Equality follows SQL semantics: [`Value::Null`] never equals anything.

use std::fmt;

use hebelki_core::{Audience, Document, DocumentStatus, KnowledgeEntry, ScopeType};
use uuid::Uuid;

use crate::weights::normalize_category;

/// A filterable column shared by both corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Owning tenant.
    TenantId,
    /// `public` / `internal`.
    Audience,
    /// `global` / `customer` / `staff`.
    ScopeType,
    /// Customer or staff id the row is scoped to.
    ScopeId,
    /// Document lifecycle status (documents only).
    Status,
    /// Soft-delete flag (knowledge entries only).
    IsActive,
    /// Free-form content category.
    Category,
}

impl Field {
    fn column(self) -> &'static str {
        match self {
            Field::TenantId => "tenant_id",
            Field::Audience => "audience",
            Field::ScopeType => "scope_type",
            Field::ScopeId => "scope_id",
            Field::Status => "status",
            Field::IsActive => "is_active",
            Field::Category => "category",
        }
    }
}

/// A scalar a [`Field`] can be compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A UUID column value.
    Id(Uuid),
    /// A text or enum column value.
    Text(String),
    /// A boolean column value.
    Bool(bool),
    /// Column is absent or not applicable to this row.
    Null,
}

impl Value {
    fn sql_eq(&self, other: &Value) -> bool {
        !matches!(self, Value::Null) && !matches!(other, Value::Null) && self == other
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Id(id) => write!(f, "'{id}'"),
            Value::Text(s) => write!(f, "'{s}'"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "NULL"),
        }
    }
}

impl From<Uuid> for Value {
    fn from(id: Uuid) -> Self {
        Value::Id(id)
    }
}

impl From<Option<Uuid>> for Value {
    fn from(id: Option<Uuid>) -> Self {
        id.map_or(Value::Null, Value::Id)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Audience> for Value {
    fn from(a: Audience) -> Self {
        Value::Text(
            match a {
                Audience::Public => "public",
                Audience::Internal => "internal",
            }
            .to_string(),
        )
    }
}

impl From<ScopeType> for Value {
    fn from(s: ScopeType) -> Self {
        Value::Text(
            match s {
                ScopeType::Global => "global",
                ScopeType::Customer => "customer",
                ScopeType::Staff => "staff",
            }
            .to_string(),
        )
    }
}

impl From<DocumentStatus> for Value {
    fn from(s: DocumentStatus) -> Self {
        Value::Text(
            match s {
                DocumentStatus::Active => "active",
                DocumentStatus::Processing => "processing",
                DocumentStatus::Failed => "failed",
                DocumentStatus::DeletedPending => "deleted_pending",
            }
            .to_string(),
        )
    }
}

/// A boolean expression over [`Field`]s.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Matches every row.
    True,
    /// Matches no row.
    False,
    /// `field = value`.
    Eq(Field, Value),
    /// `field IN (values)`.
    In(Field, Vec<Value>),
    /// Every child matches.
    And(Vec<Condition>),
    /// At least one child matches.
    Or(Vec<Condition>),
}

impl Condition {
    /// `field = value`.
    pub fn eq(field: Field, value: impl Into<Value>) -> Self {
        Condition::Eq(field, value.into())
    }

    /// `field IN (values)`.
    pub fn is_in<V: Into<Value>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(field, values.into_iter().map(Into::into).collect())
    }

    /// Conjunction, folding constants and flattening nested `And`s.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::False, _) | (_, Condition::False) => Condition::False,
            (Condition::True, c) | (c, Condition::True) => c,
            (Condition::And(mut a), Condition::And(b)) => {
                a.extend(b);
                Condition::And(a)
            }
            (Condition::And(mut a), c) => {
                a.push(c);
                Condition::And(a)
            }
            (c, Condition::And(mut b)) => {
                b.insert(0, c);
                Condition::And(b)
            }
            (a, b) => Condition::And(vec![a, b]),
        }
    }

    /// Disjunction, folding constants and flattening nested `Or`s.
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Condition::True, _) | (_, Condition::True) => Condition::True,
            (Condition::False, c) | (c, Condition::False) => c,
            (Condition::Or(mut a), Condition::Or(b)) => {
                a.extend(b);
                Condition::Or(a)
            }
            (Condition::Or(mut a), c) => {
                a.push(c);
                Condition::Or(a)
            }
            (c, Condition::Or(mut b)) => {
                b.insert(0, c);
                Condition::Or(b)
            }
            (a, b) => Condition::Or(vec![a, b]),
        }
    }

    /// Evaluate against a row.
    pub fn matches<R: Record + ?Sized>(&self, row: &R) -> bool {
        match self {
            Condition::True => true,
            Condition::False => false,
            Condition::Eq(field, value) => row.value(*field).sql_eq(value),
            Condition::In(field, values) => {
                let actual = row.value(*field);
                values.iter().any(|v| actual.sql_eq(v))
            }
            Condition::And(children) => children.iter().all(|c| c.matches(row)),
            Condition::Or(children) => children.iter().any(|c| c.matches(row)),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::True => write!(f, "TRUE"),
            Condition::False => write!(f, "FALSE"),
            Condition::Eq(field, value) => write!(f, "{} = {value}", field.column()),
            Condition::In(field, values) => {
                let rendered: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "{} IN ({})", field.column(), rendered.join(", "))
            }
            Condition::And(children) => write_joined(f, children, " AND "),
            Condition::Or(children) => write_joined(f, children, " OR "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, children: &[Condition], sep: &str) -> fmt::Result {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match child {
            Condition::And(_) | Condition::Or(_) => write!(f, "({child})")?,
            _ => write!(f, "{child}")?,
        }
    }
    Ok(())
}

/// A row that can be filtered by a [`Condition`].
pub trait Record {
    /// The value of `field` on this row, or [`Value::Null`] when the field
    /// does not apply.
    fn value(&self, field: Field) -> Value;
}

fn category_value(category: Option<&str>) -> Value {
    category.map_or(Value::Null, |c| Value::Text(normalize_category(c)))
}

impl Record for KnowledgeEntry {
    fn value(&self, field: Field) -> Value {
        match field {
            Field::TenantId => self.tenant_id.into(),
            Field::Audience => self.audience.into(),
            Field::ScopeType => self.scope_type.into(),
            Field::ScopeId => self.scope_id.into(),
            Field::IsActive => self.is_active.into(),
            Field::Category => category_value(self.category.as_deref()),
            Field::Status => Value::Null,
        }
    }
}

impl Record for Document {
    fn value(&self, field: Field) -> Value {
        match field {
            Field::TenantId => self.tenant_id.into(),
            Field::Audience => self.audience.into(),
            Field::ScopeType => self.scope_type.into(),
            Field::ScopeId => self.scope_id.into(),
            Field::Status => self.status.into(),
            Field::Category => category_value(self.category.as_deref()),
            Field::IsActive => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> KnowledgeEntry {
        KnowledgeEntry::new(Uuid::new_v4(), "Preise", "Massage 60 Minuten 80 €")
    }

    #[test]
    fn test_and_folds_constants() {
        let c = Condition::eq(Field::IsActive, true);
        assert_eq!(Condition::True.and(c.clone()), c);
        assert_eq!(c.clone().and(Condition::False), Condition::False);
    }

    #[test]
    fn test_or_folds_constants() {
        let c = Condition::eq(Field::IsActive, true);
        assert_eq!(Condition::False.or(c.clone()), c);
        assert_eq!(c.or(Condition::True), Condition::True);
    }

    #[test]
    fn test_and_flattens() {
        let c = Condition::eq(Field::IsActive, true)
            .and(Condition::eq(Field::Audience, Audience::Public))
            .and(Condition::eq(Field::ScopeType, ScopeType::Global));
        match c {
            Condition::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn test_matches_knowledge_entry() {
        let e = entry();
        let c = Condition::eq(Field::TenantId, e.tenant_id)
            .and(Condition::is_in(Field::Audience, [Audience::Public, Audience::Internal]));
        assert!(c.matches(&e));

        let other_tenant = Condition::eq(Field::TenantId, Uuid::new_v4());
        assert!(!other_tenant.matches(&e));
    }

    #[test]
    fn test_null_never_equals() {
        let e = entry();
        // scope_id is None on a global entry
        assert!(!Condition::eq(Field::ScopeId, None::<Uuid>).matches(&e));
        // status does not apply to knowledge entries
        assert!(!Condition::eq(Field::Status, DocumentStatus::Active).matches(&e));
    }

    #[test]
    fn test_category_match() {
        let mut e = entry();
        assert!(!Condition::eq(Field::Category, "pricing").matches(&e));
        e.category = Some("pricing".into());
        assert!(Condition::eq(Field::Category, "pricing").matches(&e));
        e.category = Some(" Pricing ".into());
        assert!(Condition::eq(Field::Category, "pricing").matches(&e));
    }

    #[test]
    fn test_display_renders_sql_like() {
        let c = Condition::eq(Field::IsActive, true).and(
            Condition::eq(Field::ScopeType, ScopeType::Global)
                .or(Condition::eq(Field::ScopeType, ScopeType::Customer)),
        );
        assert_eq!(
            c.to_string(),
            "is_active = true AND (scope_type = 'global' OR scope_type = 'customer')"
        );
    }
}
