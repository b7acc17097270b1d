//! Construction-time engine selection.

use std::sync::Arc;

use graphsub_core::{EmitterEngine, SubscriptionEngine};

use crate::driver::ChangeLogSource;
use crate::poller::{CdcConfig, CdcEngine};

/// Which event-sourcing strategy backs the subscription engine.
///
/// Picked once, at construction. Consumers hold the result as
/// `Arc<dyn SubscriptionEngine>` and cannot tell the strategies apart other
/// than by latency and redelivery behavior.
pub enum EngineStrategy {
    /// In-process emitter; the mutation layer publishes events directly.
    /// The right choice for single-instance deployments.
    Emitter,
    /// Change-log poller; events are read back from the database, so writes
    /// made by any application instance are observed.
    Cdc {
        /// Change-log access.
        source: Arc<dyn ChangeLogSource>,
        /// Poll-loop tuning.
        config: CdcConfig,
    },
}

impl EngineStrategy {
    /// Build the engine for this strategy.
    pub fn build(self) -> Arc<dyn SubscriptionEngine> {
        match self {
            EngineStrategy::Emitter => Arc::new(EmitterEngine::new()),
            EngineStrategy::Cdc { source, config } => {
                Arc::new(CdcEngine::new(source, config))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use graphsub_core::scalar::FieldKind;
    use graphsub_core::schema::StaticSchemaModel;
    use graphsub_core::{EventKind, SubscriptionRequest};

    use crate::cursor::ChangeCursor;
    use crate::driver::DriverError;
    use crate::log::ChangeLogPage;

    use super::*;

    struct QuietSource;

    #[async_trait]
    impl ChangeLogSource for QuietSource {
        async fn current_cursor(&self) -> Result<ChangeCursor, DriverError> {
            Ok(ChangeCursor::new("A0"))
        }

        async fn query_change_log(
            &self,
            since: &ChangeCursor,
        ) -> Result<ChangeLogPage, DriverError> {
            Ok(ChangeLogPage {
                entries: Vec::new(),
                cursor: since.clone(),
            })
        }
    }

    fn schema() -> Arc<dyn graphsub_core::SchemaModel> {
        Arc::new(
            StaticSchemaModel::new().with_simple_type("Movie", [("title", FieldKind::String)]),
        )
    }

    #[tokio::test]
    async fn both_strategies_expose_the_same_contract() {
        let strategies = [
            EngineStrategy::Emitter,
            EngineStrategy::Cdc {
                source: Arc::new(QuietSource),
                config: CdcConfig::default(),
            },
        ];
        for strategy in strategies {
            let engine = strategy.build();
            engine.init(schema()).await.unwrap();
            let handle = engine
                .subscribe(SubscriptionRequest::new([EventKind::Create]))
                .unwrap();
            assert!(engine.unsubscribe(handle.id));
            engine.close().await;
        }
    }
}
