//! Visibility predicates derived from an [`AccessContext`].
//!
//! Every store query is filtered by the condition built here. It combines
//! tenant isolation, audience/scope visibility and corpus liveness
//! (`is_active` for knowledge entries, `status = active` for documents).

use hebelki_core::{AccessContext, ActorType, Audience, Corpus, DocumentStatus, ScopeType};

use crate::condition::{Condition, Field};

/// Build the mandatory filter for `corpus` as seen by `ctx`.
///
/// - customers see public global rows, plus rows scoped to themselves when
///   their id is known;
/// - staff and owners see public and internal rows that are global, plus
///   rows scoped to the customer they are asking about.
pub fn access_condition(ctx: &AccessContext, corpus: Corpus) -> Condition {
    Condition::eq(Field::TenantId, ctx.tenant_id)
        .and(visibility(ctx))
        .and(liveness(corpus))
}

/// Every live row of a tenant, regardless of audience or scope. Used for
/// maintenance reporting, never for search.
pub fn tenant_condition(tenant_id: uuid::Uuid, corpus: Corpus) -> Condition {
    Condition::eq(Field::TenantId, tenant_id).and(liveness(corpus))
}

fn visibility(ctx: &AccessContext) -> Condition {
    match ctx.actor_type {
        ActorType::Customer => {
            let public_global = Condition::eq(Field::Audience, Audience::Public)
                .and(Condition::eq(Field::ScopeType, ScopeType::Global));
            public_global.or(scoped_to_customer(ctx.actor_id))
        }
        ActorType::Staff | ActorType::Owner => {
            Condition::is_in(Field::Audience, [Audience::Public, Audience::Internal]).and(
                Condition::eq(Field::ScopeType, ScopeType::Global)
                    .or(scoped_to_customer(ctx.customer_scope_id)),
            )
        }
    }
}

/// `scope_type = customer AND scope_id = id`, or nothing when the id is
/// unknown. A missing id yields no customer-scoped rows, never an error.
fn scoped_to_customer(id: Option<uuid::Uuid>) -> Condition {
    match id {
        Some(id) => Condition::eq(Field::ScopeType, ScopeType::Customer)
            .and(Condition::eq(Field::ScopeId, id)),
        None => Condition::False,
    }
}

fn liveness(corpus: Corpus) -> Condition {
    match corpus {
        Corpus::Knowledge => Condition::eq(Field::IsActive, true),
        Corpus::Document => Condition::eq(Field::Status, DocumentStatus::Active),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hebelki_core::{Document, KnowledgeEntry};
    use uuid::Uuid;

    fn entry(tenant: Uuid, audience: Audience, scope: ScopeType, scope_id: Option<Uuid>) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(tenant, "t", "c");
        e.audience = audience;
        e.scope_type = scope;
        e.scope_id = scope_id;
        e
    }

    #[test]
    fn test_anonymous_customer_sees_public_global_only() {
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let cond = access_condition(&AccessContext::restrictive(tenant), Corpus::Knowledge);

        assert!(cond.matches(&entry(tenant, Audience::Public, ScopeType::Global, None)));
        assert!(!cond.matches(&entry(tenant, Audience::Internal, ScopeType::Global, None)));
        assert!(!cond.matches(&entry(
            tenant,
            Audience::Public,
            ScopeType::Customer,
            Some(customer)
        )));
    }

    #[test]
    fn test_known_customer_sees_own_scope() {
        let tenant = Uuid::new_v4();
        let me = Uuid::new_v4();
        let someone_else = Uuid::new_v4();
        let cond = access_condition(&AccessContext::customer(tenant, me), Corpus::Knowledge);

        assert!(cond.matches(&entry(tenant, Audience::Public, ScopeType::Customer, Some(me))));
        assert!(!cond.matches(&entry(
            tenant,
            Audience::Public,
            ScopeType::Customer,
            Some(someone_else)
        )));
    }

    #[test]
    fn test_staff_sees_internal_but_not_unscoped_customers() {
        let tenant = Uuid::new_v4();
        let customer = Uuid::new_v4();
        let cond = access_condition(&AccessContext::staff(tenant, None), Corpus::Knowledge);

        assert!(cond.matches(&entry(tenant, Audience::Internal, ScopeType::Global, None)));
        assert!(!cond.matches(&entry(
            tenant,
            Audience::Internal,
            ScopeType::Customer,
            Some(customer)
        )));
        assert!(!cond.matches(&entry(tenant, Audience::Internal, ScopeType::Staff, None)));

        let scoped = access_condition(
            &AccessContext::staff(tenant, None).with_customer_scope(customer),
            Corpus::Knowledge,
        );
        assert!(scoped.matches(&entry(
            tenant,
            Audience::Internal,
            ScopeType::Customer,
            Some(customer)
        )));
    }

    #[test]
    fn test_other_tenant_never_matches() {
        let tenant = Uuid::new_v4();
        let cond = access_condition(&AccessContext::owner(tenant, None), Corpus::Knowledge);
        assert!(!cond.matches(&entry(Uuid::new_v4(), Audience::Public, ScopeType::Global, None)));
    }

    #[test]
    fn test_inactive_entries_and_inactive_documents_hidden() {
        let tenant = Uuid::new_v4();
        let ctx = AccessContext::owner(tenant, None);

        let mut e = entry(tenant, Audience::Public, ScopeType::Global, None);
        e.is_active = false;
        assert!(!access_condition(&ctx, Corpus::Knowledge).matches(&e));

        let mut doc = Document::new(tenant, "Preisliste");
        assert!(access_condition(&ctx, Corpus::Document).matches(&doc));
        doc.status = DocumentStatus::DeletedPending;
        assert!(!access_condition(&ctx, Corpus::Document).matches(&doc));
    }
}
