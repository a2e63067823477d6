use storekit_model::Entity;
use storekit_storage::{BackingContext, PageRequest, Query, Store, StoreResult};

/// Follows continuation tokens until the result set is exhausted.
pub(crate) async fn collect_all<E, C>(
    store: &Store<E, C>,
    query: impl Fn() -> Query<E>,
) -> StoreResult<Vec<E>>
where
    E: Entity,
    C: BackingContext,
{
    let mut items = Vec::new();
    let mut request = PageRequest::first();
    loop {
        let page = store.query(query().page(request)).await?;
        let next = page.continuation().cloned();
        items.extend(page);
        match next {
            Some(token) => request = PageRequest::after(token),
            None => return Ok(items),
        }
    }
}
