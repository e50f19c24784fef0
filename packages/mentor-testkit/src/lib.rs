//! Disposable Postgres databases for integration tests. Tests that need one read the base DSN
//! from `MENTOR_PG_DSN` and skip when it is unset.

mod error;

pub use error::{Error, Result};

use std::{env, str::FromStr, thread};

use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use uuid::Uuid;

pub const DSN_ENV: &str = "MENTOR_PG_DSN";

const ADMIN_DATABASES: [&str; 2] = ["postgres", "template1"];

/// A uniquely named database, dropped by `cleanup` or, failing that, when the value is dropped.
pub struct TestDatabase {
	name: String,
	dsn: String,
	admin: PgConnectOptions,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|source| Error::InvalidDsn { source })?;
		let (admin, mut conn) = connect_admin(&base).await?;
		let name = format!("mentor_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str()).await?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, admin, dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub async fn cleanup(mut self) -> Result<()> {
		drop_database(&self.name, &self.admin).await?;

		self.dropped = true;

		Ok(())
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let admin = self.admin.clone();
		// The caller may be inside a runtime, so the drop runs on its own thread and runtime.
		let worker = thread::spawn(move || {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build();
			let outcome = match runtime {
				Ok(runtime) => runtime.block_on(drop_database(&name, &admin)),
				Err(err) => Err(Error::Runtime(err)),
			};

			if let Err(err) = outcome {
				eprintln!("Failed to drop test database {name}: {err}");
			}
		});
		let _ = worker.join();
	}
}

/// The base DSN from `MENTOR_PG_DSN`, or `None` when it is unset or blank.
pub fn env_dsn() -> Option<String> {
	env::var(DSN_ENV).ok().filter(|dsn| !dsn.trim().is_empty())
}

async fn connect_admin(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	for database in ADMIN_DATABASES {
		let options = base.clone().database(database);

		if let Ok(conn) = PgConnection::connect_with(&options).await {
			return Ok((options, conn));
		}
	}

	Err(Error::NoAdminDatabase { tried: ADMIN_DATABASES.join(", ") })
}

async fn drop_database(name: &str, admin: &PgConnectOptions) -> Result<()> {
	let mut conn = PgConnection::connect_with(admin).await?;

	// Open pool connections would otherwise block DROP DATABASE.
	sqlx::query(
		"SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
		 WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await?;
	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).await?;

	Ok(())
}
