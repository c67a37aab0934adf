//! PostgreSQL principal inspector.

use async_trait::async_trait;
use sqlx::postgres::PgConnection;
use sqlx::Executor;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use privsync_core::{
    ActualGrant, GrantScope, Integration, Password, PermissionComparison, PrincipalPermissions,
};

use crate::config::{ConnectionSettings, ConnectionTarget};
use crate::error::{ConnectorError, ConnectorResult};
use crate::operation::{OperationKind, OperationLog, OperationRecord};
use crate::postgres::catalog::{self, assemble_grants};
use crate::postgres::session;
use crate::statements::{create_login, grant_database_access, plan_changes};
use crate::traits::PrincipalInspector;

/// Inspects login roles and their grants on a PostgreSQL server.
#[derive(Debug, Clone, Default)]
pub struct PostgresInspector {
    settings: ConnectionSettings,
}

impl PostgresInspector {
    pub fn new(settings: ConnectionSettings) -> ConnectorResult<Self> {
        settings.validate()?;
        Ok(Self { settings })
    }

    fn target(&self, integration: &Integration) -> ConnectorResult<ConnectionTarget> {
        ConnectionTarget::parse(&integration.connection_string, &self.settings)
    }

    /// Connectable databases, read through the integration's own database.
    async fn list_databases(
        &self,
        target: &ConnectionTarget,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<String>> {
        let mut conn = session::connect(&target.options(), &self.settings, cancel).await?;
        let result = sqlx::query_scalar::<_, String>(catalog::LIST_DATABASES)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| ConnectorError::from_sqlx("list databases", e));
        session::close(conn).await;
        result
    }

    /// Grants of `principals` in every database, keyed by principal name.
    async fn collect_grants(
        &self,
        target: &ConnectionTarget,
        principals: &[String],
        cancel: &CancellationToken,
    ) -> ConnectorResult<BTreeMap<String, Vec<ActualGrant>>> {
        let mut collected: BTreeMap<String, Vec<ActualGrant>> = BTreeMap::new();
        if principals.is_empty() {
            return Ok(collected);
        }

        for database in self.list_databases(target, cancel).await? {
            let options = target.options_for(&database);
            let mut conn = match session::connect(&options, &self.settings, cancel).await {
                Ok(conn) => conn,
                // CONNECT may be revoked between listing and connecting.
                Err(e) if e.is_permission_denied() => {
                    warn!(database = %database, error = %e, "Skipping database");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let result = load_grants(&mut conn, principals).await;
            session::close(conn).await;

            let mut by_principal: BTreeMap<String, Vec<(Option<String>, String)>> =
                BTreeMap::new();
            for (principal, schema, permission) in result? {
                by_principal
                    .entry(principal)
                    .or_default()
                    .push((schema, permission));
            }
            for (principal, rows) in by_principal {
                collected
                    .entry(principal)
                    .or_default()
                    .extend(assemble_grants(&database, rows));
            }
            debug!(database = %database, "Collected grants");
        }

        Ok(collected)
    }
}

async fn load_grants(
    conn: &mut PgConnection,
    principals: &[String],
) -> ConnectorResult<Vec<(String, Option<String>, String)>> {
    sqlx::query_as::<_, (String, Option<String>, String)>(catalog::LOAD_GRANTS)
        .bind(principals)
        .fetch_all(conn)
        .await
        .map_err(|e| ConnectorError::from_sqlx("load grants", e))
}

fn require_name(principal_name: &str) -> ConnectorResult<()> {
    if principal_name.trim().is_empty() {
        return Err(ConnectorError::validation("principal name is required"));
    }
    Ok(())
}

#[async_trait]
impl PrincipalInspector for PostgresInspector {
    fn default_database(&self, integration: &Integration) -> Option<String> {
        self.target(integration)
            .ok()
            .map(|target| target.default_database().to_string())
    }

    #[instrument(skip(self, integration, cancel), fields(integration_id = %integration.id))]
    async fn get_principal_permissions(
        &self,
        integration: &Integration,
        principal_name: &str,
        cancel: &CancellationToken,
    ) -> ConnectorResult<PrincipalPermissions> {
        require_name(principal_name)?;
        let target = self.target(integration)?;

        let mut conn = session::connect(&target.options(), &self.settings, cancel).await?;
        let exists = sqlx::query_scalar::<_, bool>(catalog::PRINCIPAL_EXISTS)
            .bind(principal_name)
            .fetch_one(&mut conn)
            .await
            .map_err(|e| ConnectorError::from_sqlx("check principal", e));
        session::close(conn).await;

        if !exists? {
            debug!("Principal does not exist");
            return Ok(PrincipalPermissions::missing(principal_name));
        }

        let names = vec![principal_name.to_string()];
        let mut grants = self.collect_grants(&target, &names, cancel).await?;
        let grants = grants.remove(principal_name).unwrap_or_default();

        debug!(grant_count = grants.len(), "Principal inspected");
        Ok(PrincipalPermissions::existing(principal_name, grants))
    }

    #[instrument(skip(self, integration, cancel), fields(integration_id = %integration.id))]
    async fn get_all_principals(
        &self,
        integration: &Integration,
        cancel: &CancellationToken,
    ) -> ConnectorResult<Vec<PrincipalPermissions>> {
        let target = self.target(integration)?;

        let mut conn = session::connect(&target.options(), &self.settings, cancel).await?;
        let names = sqlx::query_scalar::<_, String>(catalog::LIST_PRINCIPALS)
            .fetch_all(&mut conn)
            .await
            .map_err(|e| ConnectorError::from_sqlx("list principals", e));
        session::close(conn).await;
        let names = names?;

        let mut grants = self.collect_grants(&target, &names, cancel).await?;
        let principals = names
            .into_iter()
            .map(|name| {
                let principal_grants = grants.remove(&name).unwrap_or_default();
                PrincipalPermissions::existing(name, principal_grants)
            })
            .collect::<Vec<_>>();

        debug!(principal_count = principals.len(), "Principals enumerated");
        Ok(principals)
    }

    #[instrument(
        skip(self, integration, password, cancel),
        fields(integration_id = %integration.id)
    )]
    async fn create_principal(
        &self,
        integration: &Integration,
        principal_name: &str,
        password: &Password,
        databases: &[String],
        cancel: &CancellationToken,
    ) -> ConnectorResult<OperationLog> {
        require_name(principal_name)?;
        if password.is_blank() {
            return Err(ConnectorError::validation("password must not be blank"));
        }
        let target = self.target(integration)?;

        let mut conn = session::connect(&target.options(), &self.settings, cancel).await?;
        let mut log = OperationLog::new();

        let statement = create_login(principal_name, password);
        match conn.execute(sqlx::raw_sql(&statement.sql)).await {
            Ok(_) => log.push(OperationRecord::success(
                OperationKind::CreateLogin,
                GrantScope::default(),
                statement.display,
            )),
            Err(e) => {
                let err = ConnectorError::from_sqlx("create login", e);
                warn!(error = %err, "Login creation failed");
                log.push(OperationRecord::failure(
                    OperationKind::CreateLogin,
                    GrantScope::default(),
                    statement.display,
                    err.to_string(),
                ));
                session::close(conn).await;
                return Ok(log);
            }
        }

        for database in databases.iter().filter(|db| !db.trim().is_empty()) {
            if cancel.is_cancelled() {
                log.cancelled = true;
                break;
            }
            let sql = grant_database_access(database, principal_name);
            let scope = GrantScope::database(database);
            match conn.execute(sqlx::raw_sql(&sql)).await {
                Ok(_) => log.push(OperationRecord::success(
                    OperationKind::GrantDatabaseAccess,
                    scope,
                    sql,
                )),
                Err(e) => {
                    let err = ConnectorError::from_sqlx("grant database access", e);
                    warn!(database = %database, error = %err, "Database access grant failed");
                    log.push(OperationRecord::failure(
                        OperationKind::GrantDatabaseAccess,
                        scope,
                        sql,
                        err.to_string(),
                    ));
                }
            }
        }
        session::close(conn).await;

        info!(
            steps = log.operations.len(),
            failed = log.failed_count(),
            cancelled = log.cancelled,
            "Principal creation finished"
        );
        Ok(log)
    }

    #[instrument(
        skip(self, integration, comparisons, cancel),
        fields(integration_id = %integration.id)
    )]
    async fn apply_permission_changes(
        &self,
        integration: &Integration,
        principal_name: &str,
        comparisons: &[PermissionComparison],
        cancel: &CancellationToken,
    ) -> ConnectorResult<OperationLog> {
        require_name(principal_name)?;
        let target = self.target(integration)?;

        let plan = plan_changes(principal_name, comparisons, target.default_database());
        let mut log = OperationLog::new();
        if plan.is_empty() {
            return Ok(log);
        }

        let mut current: Option<(String, PgConnection)> = None;
        // Connection failure for a database, reused for its remaining steps.
        let mut unreachable: Option<(String, String)> = None;

        for change in plan {
            if cancel.is_cancelled() {
                log.cancelled = true;
                break;
            }

            let sql = match &change.statement {
                Ok(sql) => sql.clone(),
                Err(reason) => {
                    log.push(
                        OperationRecord::failure(change.kind, change.scope, "", reason.clone())
                            .with_privilege(change.privilege),
                    );
                    continue;
                }
            };

            if let Some((db, error)) = &unreachable {
                if *db == change.database {
                    log.push(
                        OperationRecord::failure(change.kind, change.scope, sql, error.clone())
                            .with_privilege(change.privilege),
                    );
                    continue;
                }
            }

            let needs_connection = !matches!(&current, Some((db, _)) if *db == change.database);
            if needs_connection {
                if let Some((_, conn)) = current.take() {
                    session::close(conn).await;
                }
                let options = target.options_for(&change.database);
                match session::connect(&options, &self.settings, cancel).await {
                    Ok(conn) => current = Some((change.database.clone(), conn)),
                    Err(ConnectorError::Cancelled) => {
                        log.cancelled = true;
                        break;
                    }
                    Err(e) => {
                        warn!(
                            database = %change.database,
                            error = %e,
                            "Cannot connect to apply changes"
                        );
                        unreachable = Some((change.database.clone(), e.to_string()));
                        log.push(
                            OperationRecord::failure(change.kind, change.scope, sql, e.to_string())
                                .with_privilege(change.privilege),
                        );
                        continue;
                    }
                }
            }

            let Some((_, conn)) = current.as_mut() else {
                continue;
            };
            let record = match conn.execute(sqlx::raw_sql(&sql)).await {
                Ok(_) => OperationRecord::success(change.kind, change.scope, sql),
                Err(e) => {
                    let err = ConnectorError::from_sqlx("apply change", e);
                    warn!(database = %change.database, error = %err, "Permission change failed");
                    OperationRecord::failure(change.kind, change.scope, sql, err.to_string())
                }
            };
            log.push(record.with_privilege(change.privilege));
        }

        if let Some((_, conn)) = current.take() {
            session::close(conn).await;
        }

        info!(
            steps = log.operations.len(),
            failed = log.failed_count(),
            cancelled = log.cancelled,
            "Permission changes applied"
        );
        Ok(log)
    }
}
