use crate::db::{
    errors::Result,
    models::{
        documents::{DocumentCreateDBRequest, DocumentDBResponse},
        organizations::ApprovalStatus,
    },
};
use crate::types::{DocumentId, OrganizationId, UserId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

const DOCUMENT_COLUMNS: &str = "id, organization_id, document_type, filename, content_type, size_bytes, storage_key, status, \
     review_note, uploaded_by, reviewed_by, reviewed_at, created_at";

pub struct Documents<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Documents<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(document_id = %abbrev_uuid(&request.id)), err)]
    pub async fn create(&mut self, request: &DocumentCreateDBRequest) -> Result<DocumentDBResponse> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "INSERT INTO documents (id, organization_id, document_type, filename, content_type, size_bytes, storage_key, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(request.id)
        .bind(request.organization_id)
        .bind(&request.document_type)
        .bind(&request.filename)
        .bind(&request.content_type)
        .bind(request.size_bytes)
        .bind(&request.storage_key)
        .bind(request.uploaded_by)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(document)
    }

    /// Look up a document; `organization_id = None` searches across tenants (super-admin review)
    pub async fn get_by_id(&mut self, organization_id: Option<OrganizationId>, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1 AND ($2::uuid IS NULL OR organization_id = $2)"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(document)
    }

    pub async fn list_for_organization(&mut self, organization_id: OrganizationId) -> Result<Vec<DocumentDBResponse>> {
        let documents = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE organization_id = $1 ORDER BY created_at DESC"
        ))
        .bind(organization_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(documents)
    }

    /// Review queue across all tenants, oldest first
    pub async fn list_by_status(&mut self, status: Option<ApprovalStatus>, skip: i64, limit: i64) -> Result<Vec<DocumentDBResponse>> {
        let documents = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at ASC, id
             OFFSET $2 LIMIT $3"
        ))
        .bind(status)
        .bind(skip)
        .bind(limit)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(documents)
    }

    #[instrument(skip(self, note), fields(document_id = %abbrev_uuid(&id)), err)]
    pub async fn review(
        &mut self,
        id: DocumentId,
        status: ApprovalStatus,
        note: Option<&str>,
        reviewer: UserId,
    ) -> Result<DocumentDBResponse> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "UPDATE documents SET status = $2, review_note = $3, reviewed_by = $4, reviewed_at = NOW()
             WHERE id = $1
             RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .bind(note)
        .bind(reviewer)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(document)
    }

    pub async fn delete(&mut self, organization_id: OrganizationId, id: DocumentId) -> Result<Option<DocumentDBResponse>> {
        let document = sqlx::query_as::<_, DocumentDBResponse>(&format!(
            "DELETE FROM documents WHERE id = $1 AND organization_id = $2 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(organization_id)
        .fetch_optional(&mut *self.db)
        .await?;
        Ok(document)
    }
}
