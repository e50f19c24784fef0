use std::sync::Arc;

use mentor_service::MentorService;
use mentor_storage::{Store, db::Db};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<MentorService>,
}
impl AppState {
	pub async fn new(config: mentor_config::Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let store: Arc<dyn Store> = Arc::new(db);

		Ok(Self::from_service(Arc::new(MentorService::new(config, store))))
	}

	pub fn from_service(service: Arc<MentorService>) -> Self {
		Self { service }
	}
}
