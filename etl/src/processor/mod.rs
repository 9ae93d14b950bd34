pub mod activity;
pub mod catalog;
pub mod udf;

pub use activity::ActivityProcessor;
pub use catalog::CatalogProcessor;
pub use udf::TimeUdfs;

use crate::storage::StorageManager;
use common::Result;
use common::config::Settings;
use datafusion::dataframe::DataFrame;
use datafusion::execution::context::SessionContext;
use std::sync::Arc;

/// Main processor interface that coordinates the two pipelines.
pub struct EtlProcessor {
    ctx: Arc<SessionContext>,
    catalog: CatalogProcessor,
    activity: ActivityProcessor,
}

impl EtlProcessor {
    pub fn new(settings: &Settings) -> Result<Self> {
        let ctx = Arc::new(SessionContext::new());

        let storage = Arc::new(StorageManager::new(&settings.storage)?);
        storage.register_object_stores(&ctx)?;

        let udfs = Arc::new(TimeUdfs::new());
        udfs.register(&ctx);

        let catalog = CatalogProcessor::new(ctx.clone(), storage.clone());
        let activity = ActivityProcessor::new(ctx.clone(), storage, udfs);

        Ok(Self {
            ctx,
            catalog,
            activity,
        })
    }

    /// Processes the song catalog into the `songs` and `artists` tables.
    pub async fn process_song_data(&self) -> Result<()> {
        self.catalog.run().await
    }

    /// Processes the activity logs into the `users`, `time` and `songplays`
    /// tables. The songs table written by `process_song_data` must already
    /// be durable and readable; there is no retry or wait logic if it is
    /// not.
    pub async fn process_log_data(&self) -> Result<()> {
        self.activity.run().await
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.ctx
    }

    // Execute SQL query against the registered table views
    pub async fn execute_sql(&self, sql: &str) -> Result<DataFrame> {
        self.ctx.sql(sql).await.map_err(|e| e.into())
    }
}

/// Registers a derived table under its plain name so it can be queried with
/// SQL. Re-registration replaces any previous view.
pub(crate) fn register_view(ctx: &SessionContext, name: &str, df: &DataFrame) -> Result<()> {
    // Clean up existing registration if present
    let _ = ctx.deregister_table(name);
    ctx.register_table(name, df.clone().into_view())?;
    Ok(())
}
