//! Public API
//!
//! Provides the inbound operations of the hierarchy as an async facade.
//! Callers pass raw request values; this module validates them, runs the
//! domain services, and translates results to DTOs suitable for
//! serialization. Error kinds map to transport statuses through
//! [`crate::Error::status_code`].

pub mod dto;

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::domain::hierarchy::{
    HierarchyLinker, HierarchyQueryService, HierarchyRepository, closure_violations,
};
use crate::error::{Error, Result};
use crate::infrastructure::hierarchy::{InMemoryHierarchyRepository, SqliteHierarchyRepository};
use crate::storage::{Database, DatabaseConfig};

pub use dto::{
    AssociateUserRequest, AssociationSummary, CreateGroupRequest, CreateUserRequest,
    GroupSummary, HierarchyEntry, NodeSummary, StatsSummary, UserSummary, VerifyReport,
    parse_node_id,
};

/// Hierarchy operations over a repository backend
pub struct OrgApi<R: HierarchyRepository> {
    repository: Arc<R>,
    linker: HierarchyLinker<R>,
    queries: HierarchyQueryService<R>,
}

impl<R: HierarchyRepository> OrgApi<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            linker: HierarchyLinker::new(Arc::clone(&repository)),
            queries: HierarchyQueryService::new(Arc::clone(&repository)),
            repository,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    // ========== Commands ==========

    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserSummary> {
        let (name, email) = request.normalize()?;
        let user = self.linker.create_user(&name, &email).await?;
        Ok(UserSummary::from(user))
    }

    pub async fn create_group(&self, request: CreateGroupRequest) -> Result<GroupSummary> {
        let (name, parent_id) = request.normalize()?;
        let group = self.linker.create_group(&name, parent_id.as_ref()).await?;
        Ok(GroupSummary::from(group))
    }

    pub async fn associate_user_to_group(
        &self,
        request: AssociateUserRequest,
    ) -> Result<AssociationSummary> {
        let (user_id, group_id) = request.normalize()?;
        let outcome = self
            .linker
            .associate_user_to_group(&user_id, &group_id)
            .await?;
        Ok(AssociationSummary::new(user_id, group_id, outcome))
    }

    // ========== Queries ==========

    pub async fn get_node(&self, node_id: &str) -> Result<NodeSummary> {
        let id = parse_node_id("nodeId", node_id)?;
        Ok(NodeSummary::from(self.queries.get_node(&id).await?))
    }

    pub async fn get_node_ancestors(&self, node_id: &str) -> Result<Vec<HierarchyEntry>> {
        let id = parse_node_id("nodeId", node_id)?;
        let ancestors = self.queries.node_ancestors(&id).await?;
        Ok(ancestors.into_iter().map(HierarchyEntry::from).collect())
    }

    pub async fn get_node_descendants(&self, node_id: &str) -> Result<Vec<HierarchyEntry>> {
        let id = parse_node_id("nodeId", node_id)?;
        let descendants = self.queries.node_descendants(&id).await?;
        Ok(descendants.into_iter().map(HierarchyEntry::from).collect())
    }

    pub async fn get_user_organizations(&self, user_id: &str) -> Result<Vec<HierarchyEntry>> {
        let id = parse_node_id("userId", user_id)?;
        let organizations = self.queries.user_organizations(&id).await?;
        Ok(organizations.into_iter().map(HierarchyEntry::from).collect())
    }

    // ========== Maintenance ==========

    pub async fn stats(&self) -> Result<StatsSummary> {
        Ok(StatsSummary::from(self.repository.stats().await?))
    }

    /// Check the stored closure against the direct links it was built from
    pub async fn verify(&self) -> Result<VerifyReport> {
        let node_ids = self.repository.list_node_ids().await?;
        let edges = self.repository.closure_edges().await?;
        let violations = closure_violations(&node_ids, &edges);

        info!(
            nodes = node_ids.len(),
            edges = edges.len(),
            count = violations.len(),
            "Verified closure relation"
        );
        Ok(VerifyReport {
            consistent: violations.is_empty(),
            nodes_checked: node_ids.len(),
            edges_checked: edges.len(),
            violations,
        })
    }
}

impl OrgApi<SqliteHierarchyRepository> {
    /// Open the configured database and run pending migrations
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Database::new(config.database.to_database_config())
            .await
            .map_err(|e| Error::ConfigError(format!("{:#}", e)))?;
        Ok(Self::from_database(&db, config))
    }

    /// SQLite-backed API over an in-memory database
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::new(DatabaseConfig::in_memory())
            .await
            .map_err(|e| Error::ConfigError(format!("{:#}", e)))?;
        Ok(Self::from_database(&db, &Config::default()))
    }

    pub fn from_database(db: &Database, config: &Config) -> Self {
        let repository = SqliteHierarchyRepository::new(db.pool().clone())
            .with_write_timeout(config.hierarchy.write_timeout());
        Self::new(Arc::new(repository))
    }
}

impl OrgApi<InMemoryHierarchyRepository> {
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryHierarchyRepository::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_invalid_ids_fail_before_reaching_the_store() {
        let api = OrgApi::in_memory();
        let err = api.get_node_ancestors("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = api
            .associate_user_to_group(AssociateUserRequest::new("x", "y"))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_full_flow_on_sqlite() {
        let api = OrgApi::open_in_memory().await.unwrap();
        let company = api
            .create_group(CreateGroupRequest::new("Company", None))
            .await
            .unwrap();
        let team = api
            .create_group(CreateGroupRequest::new("Team", Some(company.id.to_string())))
            .await
            .unwrap();
        let alice = api
            .create_user(CreateUserRequest::new("Alice", "alice@x.com"))
            .await
            .unwrap();
        let summary = api
            .associate_user_to_group(AssociateUserRequest::new(
                alice.id.to_string(),
                team.id.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(summary.edges_written, 2);

        let orgs = api.get_user_organizations(&alice.id.to_string()).await.unwrap();
        assert_eq!(
            orgs,
            vec![
                HierarchyEntry { id: team.id, name: "Team".into(), depth: 1 },
                HierarchyEntry { id: company.id, name: "Company".into(), depth: 2 },
            ]
        );

        let node = api.get_node(&alice.id.to_string()).await.unwrap();
        assert_eq!(node.email.as_deref(), Some("alice@x.com"));

        let report = api.verify().await.unwrap();
        assert!(report.consistent);
        assert_eq!(report.nodes_checked, 3);
        assert_eq!(report.edges_checked, 6);

        let stats = api.stats().await.unwrap();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.max_depth, 2);
    }
}
