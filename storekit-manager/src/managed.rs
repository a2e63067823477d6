use crate::options::ManagerOptions;
use async_trait::async_trait;
use storekit_model::Entity;
use storekit_storage::{BackingContext, Store};

/// A store whose lifetime a manager owns.
#[async_trait]
pub trait ManagedStore: Send + Sync {
    fn entity_type(&self) -> &'static str;

    /// Called once when the manager is built.
    fn apply_options(&mut self, options: &ManagerOptions);

    /// Releases the store. Called exactly once by the owning manager.
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
impl<E: Entity, C: BackingContext> ManagedStore for Store<E, C> {
    fn entity_type(&self) -> &'static str {
        E::ENTITY_TYPE
    }

    fn apply_options(&mut self, options: &ManagerOptions) {
        let store = self.options_mut();
        store.default_page_size = options.default_page_size;
        store.max_page_size = options.max_page_size;
        store.soft_delete = options.soft_delete;
    }

    async fn close(&self) -> anyhow::Result<()> {
        Store::close(self).await?;
        Ok(())
    }
}

/// The fixed set of stores behind one manager.
///
/// Both methods list the stores in release order, which must be the same
/// on every call.
pub trait StoreSet: Send + Sync {
    fn stores(&self) -> Vec<&dyn ManagedStore>;

    fn stores_mut(&mut self) -> Vec<&mut dyn ManagedStore>;
}
