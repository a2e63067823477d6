use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use storekit_model::{
    AuditHandler, Document, Entity, HandlerChain, HandlerProxy, MutationContext, MutationKind,
    NoopHandler,
};

fn ctx(kind: MutationKind, actor: Option<&str>) -> MutationContext {
    MutationContext::new(kind, Document::ENTITY_TYPE, actor.map(str::to_string))
}

fn owned_by(owner: &str) -> Document {
    let mut doc = Document::new(json!({"title": "owned"}));
    doc.audit.created_by = Some(owner.to_string());
    doc
}

// ── Default implementations ──────────────────────────────────────

#[tokio::test]
async fn noop_handler_accepts_everything() {
    let handler = NoopHandler;
    let mut doc = Document::new(json!({"anything": "goes"}));
    let previous = doc.clone();
    assert!(handler.before_create(&ctx(MutationKind::Create, None), &mut doc).await.is_ok());
    assert!(handler
        .before_update(&ctx(MutationKind::Update, None), &mut doc, &previous)
        .await
        .is_ok());
    assert!(handler.before_delete(&ctx(MutationKind::Delete, None), &mut doc).await.is_ok());
    assert_eq!(doc, previous);
}

// ── AuditHandler ─────────────────────────────────────────────────

#[tokio::test]
async fn audit_handler_stamps_creation() {
    let handler = AuditHandler::new();
    let context = ctx(MutationKind::Create, Some("alice"));
    let mut doc = Document::new(json!({}));
    handler.before_create(&context, &mut doc).await.unwrap();

    assert_eq!(doc.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(doc.audit.created_at, Some(context.at));
    assert_eq!(doc.audit.modified_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn audit_handler_preserves_creation_metadata_on_update() {
    let handler = AuditHandler::new();
    let previous = owned_by("alice");
    let mut incoming = previous.clone();
    incoming.audit.created_by = Some("mallory".into());

    let context = ctx(MutationKind::Update, Some("bob"));
    handler
        .before_update(&context, &mut incoming, &previous)
        .await
        .unwrap();

    assert_eq!(incoming.audit.created_by.as_deref(), Some("alice"));
    assert_eq!(incoming.audit.modified_by.as_deref(), Some("bob"));
    assert_eq!(incoming.audit.modified_at, Some(context.at));
}

#[tokio::test]
async fn ownership_allows_the_owner() {
    let handler = AuditHandler::enforcing_ownership();
    let previous = owned_by("alice");
    let mut incoming = previous.clone();
    assert!(handler
        .before_update(&ctx(MutationKind::Update, Some("alice")), &mut incoming, &previous)
        .await
        .is_ok());
}

#[tokio::test]
async fn ownership_rejects_other_actors() {
    let handler = AuditHandler::enforcing_ownership();
    let previous = owned_by("alice");
    let mut incoming = previous.clone();

    let reason = handler
        .before_update(&ctx(MutationKind::Update, Some("bob")), &mut incoming, &previous)
        .await
        .unwrap_err();
    assert!(reason.contains("bob is not the owner"));

    let mut stored = owned_by("alice");
    let reason = handler
        .before_delete(&ctx(MutationKind::Delete, None), &mut stored)
        .await
        .unwrap_err();
    assert!(reason.contains("anonymous"));
}

#[tokio::test]
async fn ownership_ignores_unowned_records() {
    let handler = AuditHandler::enforcing_ownership();
    let mut doc = Document::new(json!({}));
    assert!(handler
        .before_delete(&ctx(MutationKind::Delete, Some("bob")), &mut doc)
        .await
        .is_ok());
}

// ── HandlerChain ─────────────────────────────────────────────────

struct RequireTitle;

#[async_trait]
impl HandlerProxy<Document> for RequireTitle {
    async fn before_create(&self, _ctx: &MutationContext, entity: &mut Document) -> Result<(), String> {
        match entity.get_str("/title") {
            Some(t) if !t.is_empty() => Ok(()),
            _ => Err("title is required".into()),
        }
    }
}

#[tokio::test]
async fn chain_runs_handlers_in_order() {
    let chain = HandlerChain::new()
        .with(Arc::new(AuditHandler::new()))
        .with(Arc::new(RequireTitle));
    assert_eq!(chain.len(), 2);

    let mut doc = Document::new(json!({"title": "Test"}));
    chain
        .before_create(&ctx(MutationKind::Create, Some("carol")), &mut doc)
        .await
        .unwrap();
    assert_eq!(doc.audit.created_by.as_deref(), Some("carol"));
}

#[tokio::test]
async fn chain_stops_at_first_rejection() {
    let chain = HandlerChain::new()
        .with(Arc::new(RequireTitle))
        .with(Arc::new(AuditHandler::new()));

    let mut doc = Document::new(json!({"body": "no title"}));
    let reason = chain
        .before_create(&ctx(MutationKind::Create, Some("carol")), &mut doc)
        .await
        .unwrap_err();
    assert_eq!(reason, "title is required");
    assert!(doc.audit.created_by.is_none());
}

#[tokio::test]
async fn empty_chain_proceeds() {
    let chain: HandlerChain<Document> = HandlerChain::new();
    assert!(chain.is_empty());
    let mut doc = Document::new(json!({}));
    assert!(chain.before_create(&ctx(MutationKind::Create, None), &mut doc).await.is_ok());
}

// ── Trait object safety ──────────────────────────────────────────

#[tokio::test]
async fn handler_works_as_trait_object() {
    let handlers: Vec<Arc<dyn HandlerProxy<Document>>> =
        vec![Arc::new(NoopHandler), Arc::new(RequireTitle)];
    let mut doc = Document::new(json!({"title": "Works"}));
    for h in &handlers {
        assert!(h.before_create(&ctx(MutationKind::Create, None), &mut doc).await.is_ok());
    }
}
