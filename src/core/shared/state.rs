use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::shared::utils::DbPool;
use crate::crm::entities::EntityService;
use crate::crm::store::JourneyStore;
use crate::crm::workflow::{WorkflowService, WorkflowSettings};
use crate::security::jwt::{JwtConfig, JwtManager};

pub struct AppState {
    pub config: AppConfig,
    /// Present only when running against Postgres.
    pub conn: Option<DbPool>,
    pub store: Arc<dyn JourneyStore>,
    pub entities: EntityService,
    pub workflow: WorkflowService,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn JourneyStore>,
        conn: Option<DbPool>,
    ) -> Result<Self, anyhow::Error> {
        let jwt = JwtManager::new(
            JwtConfig {
                issuer: config.auth.jwt_issuer.clone(),
                ..JwtConfig::default()
            },
            &config.auth.jwt_secret,
        )?;
        let settings = WorkflowSettings {
            quote_valid_days: config.crm.quote_valid_days,
            invoice_due_days: config.crm.invoice_due_days,
        };
        Ok(Self {
            entities: EntityService::new(store.clone()),
            workflow: WorkflowService::new(store.clone(), settings),
            store,
            conn,
            config,
            jwt: Arc::new(jwt),
        })
    }
}
