pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("MENTOR_PG_DSN is not a valid Postgres DSN: {source}.")]
	InvalidDsn { source: sqlx::Error },

	#[error("No admin database accepted a connection; tried {tried}.")]
	NoAdminDatabase { tried: String },

	#[error(transparent)]
	Runtime(#[from] std::io::Error),

	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
}
