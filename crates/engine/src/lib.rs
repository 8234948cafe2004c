pub mod bulk;
pub mod config;
pub mod error;
pub mod evaluator;

pub use config::EvaluatorConfig;
pub use error::{EngineError, Result};
pub use evaluator::Evaluator;

use nexus_models::{BulkCheckRequest, Decision, ObjectRef};

impl Evaluator {
    pub async fn bulk_check(&self, req: BulkCheckRequest) -> Result<Vec<(nexus_models::BulkCheckItem, Decision)>> {
        bulk::bulk_check(self, req).await
    }

    pub async fn filter(&self, req: BulkCheckRequest) -> Result<Vec<ObjectRef>> {
        bulk::filter(self, req).await
    }
}
