use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::registry::{Deployment, DeploymentStatus, Project, RegistryError, RegistryStore, Result};

#[derive(Default)]
struct Tables {
    projects: HashMap<String, Project>,
    /// sub_domain -> project id
    sub_domains: HashMap<String, String>,
    deployments: HashMap<String, Deployment>,
}

impl Tables {
    fn active_deployment(&self, project_id: &str, except: Option<&str>) -> Option<&Deployment> {
        self.deployments.values().find(|d| {
            d.project_id == project_id && d.status.is_active() && Some(d.id.as_str()) != except
        })
    }
}

/// Mock registry store that keeps projects and deployments in memory.
///
/// A single write lock covers the active check and the insert.
#[derive(Default)]
pub struct MockRegistryStore {
    tables: RwLock<Tables>,
    lookups: RwLock<usize>,
}

impl MockRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subdomain lookups served.
    pub async fn lookup_count(&self) -> usize {
        *self.lookups.read().await
    }
}

#[async_trait]
impl RegistryStore for MockRegistryStore {
    async fn insert_project(&self, project: &Project) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.sub_domains.contains_key(&project.sub_domain) {
            return Err(RegistryError::SubDomainTaken(project.sub_domain.clone()));
        }
        tables
            .sub_domains
            .insert(project.sub_domain.clone(), project.id.clone());
        tables.projects.insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn find_project_by_sub_domain(&self, sub_domain: &str) -> Result<Option<Project>> {
        *self.lookups.write().await += 1;
        let tables = self.tables.read().await;
        Ok(tables
            .sub_domains
            .get(sub_domain)
            .and_then(|id| tables.projects.get(id))
            .cloned())
    }

    async fn find_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.tables.read().await.projects.get(id).cloned())
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&deployment.project_id) {
            return Err(RegistryError::ProjectNotFound(deployment.project_id.clone()));
        }
        if deployment.status.is_active()
            && tables.active_deployment(&deployment.project_id, None).is_some()
        {
            return Err(RegistryError::ActiveDeployment {
                project_id: deployment.project_id.clone(),
            });
        }
        tables
            .deployments
            .insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        Ok(self.tables.read().await.deployments.get(id).cloned())
    }

    async fn update_status(&self, id: &str, status: DeploymentStatus) -> Result<Deployment> {
        let mut tables = self.tables.write().await;
        let project_id = tables
            .deployments
            .get(id)
            .map(|d| d.project_id.clone())
            .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))?;

        if status.is_active() && tables.active_deployment(&project_id, Some(id)).is_some() {
            return Err(RegistryError::ActiveDeployment { project_id });
        }

        let deployment = tables
            .deployments
            .get_mut(id)
            .ok_or_else(|| RegistryError::DeploymentNotFound(id.to_string()))?;
        deployment.status = status;
        Ok(deployment.clone())
    }
}
