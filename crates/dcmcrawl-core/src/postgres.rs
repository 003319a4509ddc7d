//! XNAT database identity backend
//!
//! Queries the XNAT PostgreSQL schema directly. The async client runs on a
//! private current-thread runtime so the crawl loop stays synchronous.

use crate::credentials::DatabaseCredentials;
use crate::error::IdentityError;
use crate::identity::IdentityResolver;
use log::{debug, error};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio_postgres::{Client, Config, NoTls};

/// Subject label of the experiment with the given project and label
pub const SUBJECT_LABEL_QUERY: &str = "\
SELECT subj.label AS subject_label
FROM xnat_experimentdata e
JOIN xnat_subjectassessordata sa ON sa.id = e.id
JOIN xnat_subjectdata subj ON subj.id = sa.subject_id
WHERE e.project = $1 AND e.label = $2";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the client configuration for `credentials`
#[must_use]
pub fn connection_config(credentials: &DatabaseCredentials) -> Config {
    let mut config = Config::new();
    config
        .host(credentials.host.as_str())
        .port(credentials.port)
        .dbname(credentials.dbname.as_str())
        .user(credentials.user.as_str())
        .password(credentials.password.as_str())
        .application_name("dcmcrawl")
        .connect_timeout(CONNECT_TIMEOUT);
    config
}

/// Subject lookup against the XNAT database
pub struct PostgresResolver {
    runtime: Runtime,
    client: Client,
}

impl PostgresResolver {
    /// Connect to the XNAT database
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot start or the connection fails.
    pub fn connect(credentials: &DatabaseCredentials) -> Result<Self, IdentityError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(IdentityError::Runtime)?;

        let config = connection_config(credentials);
        let client = runtime.block_on(async {
            let (client, connection) = config.connect(NoTls).await?;

            // Driven whenever the runtime blocks on a query
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!("PostgreSQL connection error: {e}");
                }
            });

            Ok::<_, tokio_postgres::Error>(client)
        })?;

        debug!(
            "Connected to PostgreSQL at {}:{}/{}",
            credentials.host, credentials.port, credentials.dbname
        );
        Ok(Self { runtime, client })
    }
}

impl IdentityResolver for PostgresResolver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn lookup(&mut self, project: &str, session: &str) -> Result<Option<String>, IdentityError> {
        let rows = self
            .runtime
            .block_on(self.client.query(SUBJECT_LABEL_QUERY, &[&project, &session]))?;

        let label = rows
            .first()
            .map(|row| row.try_get::<_, Option<String>>("subject_label"))
            .transpose()?
            .flatten();
        Ok(label)
    }
}
