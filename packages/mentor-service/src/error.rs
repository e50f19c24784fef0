pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Collaborator error: {message}")]
	Collaborator { message: String },
}
impl Error {
	pub(crate) fn invalid(message: impl Into<String>) -> Self {
		Self::InvalidRequest { message: message.into() }
	}
}
impl From<mentor_storage::Error> for Error {
	fn from(err: mentor_storage::Error) -> Self {
		match err {
			mentor_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			mentor_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			mentor_storage::Error::NotFound(message) => Self::NotFound { message },
			mentor_storage::Error::Conflict(message) => Self::Conflict { message },
		}
	}
}
impl From<mentor_providers::Error> for Error {
	fn from(err: mentor_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
