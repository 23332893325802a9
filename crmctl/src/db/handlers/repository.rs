//! Base repository trait for database operations.

use crate::db::errors::Result;

/// A data access layer for one tenant-scoped table.
///
/// Every lookup takes the owning organization so a repository can never hand one tenant
/// another tenant's rows.
#[async_trait::async_trait]
pub trait Repository {
    /// The request type for creating entities
    type CreateRequest;

    /// The request type for updating entities
    type UpdateRequest;

    /// The response/DTO type returned by operations
    type Response;

    /// The identifier type for lookups
    type Id: Send + Sync;

    /// The filter type for list operations
    type Filter: Send + Sync;

    /// Create a new entity
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response>;

    /// Get an entity by ID within an organization
    async fn get_by_id(&mut self, organization_id: crate::types::OrganizationId, id: Self::Id) -> Result<Option<Self::Response>>;

    /// List entities with filtering and pagination
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>>;

    /// Delete an entity by ID within an organization
    async fn delete(&mut self, organization_id: crate::types::OrganizationId, id: Self::Id) -> Result<bool>;

    /// Update an entity by ID within an organization
    async fn update(
        &mut self,
        organization_id: crate::types::OrganizationId,
        id: Self::Id,
        request: &Self::UpdateRequest,
    ) -> Result<Self::Response>;
}
