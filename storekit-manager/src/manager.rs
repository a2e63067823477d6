use crate::error::{ConfigurationError, DisposeError, ReleaseFailure};
use crate::managed::StoreSet;
use crate::options::ManagerOptions;
use tracing::{info, warn, Instrument, Span};

/// Owns a [`StoreSet`] for one request scope.
///
/// Domain services wrap a manager and reach their stores through
/// [`stores`](Self::stores). Writes across several stores are not atomic:
/// if a later write fails, earlier ones stay committed. Callers that need
/// undo can record it in a [`Compensation`](crate::Compensation) log.
///
/// Call [`dispose`](Self::dispose) when the scope ends. A manager dropped
/// without disposal logs a warning; its stores still drop, but pending
/// cache invalidations are not flushed.
pub struct Manager<S: StoreSet> {
    stores: S,
    options: ManagerOptions,
    span: Span,
    disposed: bool,
}

impl<S: StoreSet> Manager<S> {
    pub fn new(mut stores: S, options: ManagerOptions) -> Result<Self, ConfigurationError> {
        options.validate()?;
        for store in stores.stores_mut() {
            store.apply_options(&options);
        }
        Ok(Self {
            stores,
            options,
            span: Span::none(),
            disposed: false,
        })
    }

    /// Runs disposal inside the given span.
    pub fn with_logger(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn stores(&self) -> &S {
        &self.stores
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn logger(&self) -> &Span {
        &self.span
    }

    /// Names of the owned stores, in release order.
    pub fn entity_types(&self) -> Vec<&'static str> {
        self.stores.stores().iter().map(|s| s.entity_type()).collect()
    }

    /// Releases every store once, in order.
    ///
    /// A failing release does not stop the rest; all failures come back
    /// together.
    pub async fn dispose(mut self) -> Result<(), DisposeError> {
        self.disposed = true;
        let span = self.span.clone();
        let stores = self.stores.stores();
        let attempted = stores.len();

        let failures = async {
            let mut failures = Vec::new();
            for (position, store) in stores.into_iter().enumerate() {
                let entity_type = store.entity_type();
                match store.close().await {
                    Ok(()) => info!(entity_type, position, "Released store"),
                    Err(error) => {
                        warn!(entity_type, position, error = %error, "Store release failed");
                        failures.push(ReleaseFailure {
                            position,
                            entity_type,
                            error,
                        });
                    }
                }
            }
            failures
        }
        .instrument(span)
        .await;

        if failures.is_empty() {
            info!(stores = attempted, "Manager disposed");
            Ok(())
        } else {
            Err(DisposeError {
                attempted,
                failures,
            })
        }
    }
}

impl<S: StoreSet> Drop for Manager<S> {
    fn drop(&mut self) {
        if !self.disposed {
            let _entered = self.span.enter();
            warn!(stores = ?self.entity_types(), "Manager dropped without dispose()");
        }
    }
}
