//! SQLite RegistryStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Query, SqliteQueryBuilder};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};

use super::{format_timestamp, is_unique_violation, parse_timestamp};
use crate::registry::{Deployment, DeploymentStatus, Project, RegistryError, RegistryStore, Result};
use crate::storage::schema::{
    Deployments, Projects, CREATE_ACTIVE_DEPLOYMENT_INDEX, CREATE_DEPLOYMENTS_TABLE,
    CREATE_PROJECTS_TABLE,
};

/// SQLite implementation of RegistryStore.
///
/// The one-active-deployment rule is a partial unique index, so concurrent
/// inserts race inside SQLite rather than in application code.
pub struct SqliteRegistryStore {
    pool: SqlitePool,
}

impl SqliteRegistryStore {
    /// Create a new SQLite registry store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the registry tables and indexes if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::query(CREATE_PROJECTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_DEPLOYMENTS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(CREATE_ACTIVE_DEPLOYMENT_INDEX)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn project_exists(conn: &mut SqliteConnection, project_id: &str) -> Result<bool> {
        let query = Query::select()
            .column(Projects::Id)
            .from(Projects::Table)
            .and_where(Expr::col(Projects::Id).eq(project_id))
            .to_string(SqliteQueryBuilder);

        Ok(sqlx::query(&query).fetch_optional(&mut *conn).await?.is_some())
    }

    async fn insert_deployment_row(conn: &mut SqliteConnection, deployment: &Deployment) -> Result<()> {
        if !Self::project_exists(conn, &deployment.project_id).await? {
            return Err(RegistryError::ProjectNotFound(deployment.project_id.clone()));
        }

        let query = Query::insert()
            .into_table(Deployments::Table)
            .columns([
                Deployments::Id,
                Deployments::ProjectId,
                Deployments::Status,
                Deployments::CreatedAt,
            ])
            .values_panic([
                deployment.id.as_str().into(),
                deployment.project_id.as_str().into(),
                deployment.status.as_str().into(),
                format_timestamp(&deployment.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&mut *conn).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(RegistryError::ActiveDeployment {
                project_id: deployment.project_id.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Pooled connection inside a `BEGIN IMMEDIATE` transaction.
///
/// BEGIN IMMEDIATE takes the write lock upfront so the existence check and
/// the insert see the same snapshot. A guard dropped while the transaction
/// may still be open (cancelled future, failed COMMIT or ROLLBACK) closes
/// the connection instead of returning it to the pool.
struct ImmediateTx {
    conn: PoolConnection<Sqlite>,
    open: bool,
}

impl ImmediateTx {
    async fn begin(pool: &SqlitePool) -> Result<Self> {
        let mut tx = Self {
            conn: pool.acquire().await?,
            open: true,
        };
        if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut *tx.conn).await {
            tx.open = false;
            return Err(e.into());
        }
        Ok(tx)
    }

    fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.conn
    }

    async fn commit(mut self) -> Result<()> {
        sqlx::query("COMMIT").execute(&mut *self.conn).await?;
        self.open = false;
        Ok(())
    }

    async fn rollback(mut self) {
        if sqlx::query("ROLLBACK").execute(&mut *self.conn).await.is_ok() {
            self.open = false;
        }
    }
}

impl Drop for ImmediateTx {
    fn drop(&mut self) {
        if self.open {
            self.conn.close_on_drop();
        }
    }
}

fn created_at(row: &SqliteRow) -> Result<chrono::DateTime<chrono::Utc>> {
    let value: String = row.get("created_at");
    parse_timestamp(&value)
        .map_err(|e| RegistryError::Corrupt(format!("created_at '{}': {}", value, e)))
}

fn project_from_row(row: &SqliteRow) -> Result<Project> {
    Ok(Project {
        id: row.get("id"),
        name: row.get("name"),
        git_url: row.get("git_url"),
        sub_domain: row.get("sub_domain"),
        created_at: created_at(row)?,
    })
}

fn deployment_from_row(row: &SqliteRow) -> Result<Deployment> {
    let status: String = row.get("status");
    Ok(Deployment {
        id: row.get("id"),
        project_id: row.get("project_id"),
        status: status.parse()?,
        created_at: created_at(row)?,
    })
}

#[async_trait]
impl RegistryStore for SqliteRegistryStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        let query = Query::insert()
            .into_table(Projects::Table)
            .columns([
                Projects::Id,
                Projects::Name,
                Projects::GitUrl,
                Projects::SubDomain,
                Projects::CreatedAt,
            ])
            .values_panic([
                project.id.as_str().into(),
                project.name.as_str().into(),
                project.git_url.as_str().into(),
                project.sub_domain.as_str().into(),
                format_timestamp(&project.created_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        match sqlx::query(&query).execute(&self.pool).await {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                Err(RegistryError::SubDomainTaken(project.sub_domain.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_project_by_sub_domain(&self, sub_domain: &str) -> Result<Option<Project>> {
        let query = Query::select()
            .columns([
                Projects::Id,
                Projects::Name,
                Projects::GitUrl,
                Projects::SubDomain,
                Projects::CreatedAt,
            ])
            .from(Projects::Table)
            .and_where(Expr::col(Projects::SubDomain).eq(sub_domain))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>> {
        let query = Query::select()
            .columns([
                Projects::Id,
                Projects::Name,
                Projects::GitUrl,
                Projects::SubDomain,
                Projects::CreatedAt,
            ])
            .from(Projects::Table)
            .and_where(Expr::col(Projects::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(project_from_row).transpose()
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut tx = ImmediateTx::begin(&self.pool).await?;

        match Self::insert_deployment_row(tx.conn(), deployment).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                tx.rollback().await;
                Err(e)
            }
        }
    }

    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        let query = Query::select()
            .columns([
                Deployments::Id,
                Deployments::ProjectId,
                Deployments::Status,
                Deployments::CreatedAt,
            ])
            .from(Deployments::Table)
            .and_where(Expr::col(Deployments::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(deployment_from_row).transpose()
    }

    async fn update_status(&self, id: &str, status: DeploymentStatus) -> Result<Deployment> {
        let query = Query::update()
            .table(Deployments::Table)
            .value(Deployments::Status, status.as_str())
            .and_where(Expr::col(Deployments::Id).eq(id))
            .to_string(SqliteQueryBuilder);

        let result = match sqlx::query(&query).execute(&self.pool).await {
            Ok(result) => result,
            Err(e) if is_unique_violation(&e) => {
                let project_id = self
                    .find_deployment(id)
                    .await?
                    .map(|d| d.project_id)
                    .unwrap_or_default();
                return Err(RegistryError::ActiveDeployment { project_id });
            }
            Err(e) => return Err(e.into()),
        };

        if result.rows_affected() == 0 {
            return Err(RegistryError::DeploymentNotFound(id.to_string()));
        }

        self.find_deployment(id)
            .await?
            .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))
    }
}
