use sqlx::{sqlite::SqliteRow, Row};

use signoff_core::domain::member::{MemberId, TenantId};
use signoff_core::domain::notification::{Notification, NotificationId};
use signoff_core::domain::request::{RequestId, RequestRef};

use super::policy::{parse_datetime, parse_kind};
use super::{NotificationRepository, RepositoryError};
use crate::DbPool;

pub struct SqlNotificationRepository {
    pool: DbPool,
}

impl SqlNotificationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &SqliteRow) -> Result<Notification, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let tenant_id: String =
        row.try_get("tenant_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let recipient_id: String =
        row.try_get("recipient_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_kind: String =
        row.try_get("request_kind").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let request_id: String =
        row.try_get("request_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let title: String = row.try_get("title").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let body: String = row.try_get("body").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let read: i64 = row.try_get("read").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Notification {
        id: NotificationId(id),
        tenant_id: TenantId(tenant_id),
        recipient_id: MemberId(recipient_id),
        request: RequestRef { kind: parse_kind(&request_kind)?, id: RequestId(request_id) },
        title,
        body,
        read: read != 0,
        created_at: parse_datetime(&created_at)?,
    })
}

#[async_trait::async_trait]
impl NotificationRepository for SqlNotificationRepository {
    async fn insert_bulk(&self, notifications: Vec<Notification>) -> Result<(), RepositoryError> {
        if notifications.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for notification in &notifications {
            sqlx::query(
                "INSERT INTO notification (id, tenant_id, recipient_id, request_kind, request_id,
                                           title, body, read, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&notification.id.0)
            .bind(&notification.tenant_id.0)
            .bind(&notification.recipient_id.0)
            .bind(notification.request.kind.as_str())
            .bind(&notification.request.id.0)
            .bind(&notification.title)
            .bind(&notification.body)
            .bind(i64::from(notification.read))
            .bind(notification.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_for_recipient(
        &self,
        recipient: &MemberId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let rows = if unread_only {
            sqlx::query(
                "SELECT id, tenant_id, recipient_id, request_kind, request_id, title, body,
                        read, created_at
                 FROM notification
                 WHERE recipient_id = ? AND read = 0
                 ORDER BY created_at DESC",
            )
            .bind(&recipient.0)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT id, tenant_id, recipient_id, request_kind, request_id, title, body,
                        read, created_at
                 FROM notification
                 WHERE recipient_id = ?
                 ORDER BY created_at DESC",
            )
            .bind(&recipient.0)
            .fetch_all(&self.pool)
            .await?
        };

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE notification SET read = 1 WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use signoff_core::domain::member::{MemberId, TenantId};
    use signoff_core::domain::notification::{Notification, NotificationId};
    use signoff_core::domain::request::{RequestKind, RequestRef};

    use super::SqlNotificationRepository;
    use crate::repositories::NotificationRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> SqlNotificationRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlNotificationRepository::new(pool)
    }

    fn notification(id: &str, recipient: &str) -> Notification {
        Notification {
            id: NotificationId(id.to_string()),
            tenant_id: TenantId("acme".to_string()),
            recipient_id: MemberId(recipient.to_string()),
            request: RequestRef::new(RequestKind::LeaveRequest, "lr-1"),
            title: "Approval waiting".to_string(),
            body: "A leave request needs your approval.".to_string(),
            read: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_bulk_and_list_for_recipient() {
        let repo = setup().await;

        repo.insert_bulk(vec![
            notification("ntf-1", "mem-hr"),
            notification("ntf-2", "mem-hr"),
            notification("ntf-3", "mem-fin"),
        ])
        .await
        .expect("insert");

        let listed = repo
            .list_for_recipient(&MemberId("mem-hr".to_string()), false)
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn mark_read_removes_from_unread_listing() {
        let repo = setup().await;
        repo.insert_bulk(vec![notification("ntf-1", "mem-hr")]).await.expect("insert");

        repo.mark_read(&NotificationId("ntf-1".to_string())).await.expect("mark read");

        let unread = repo
            .list_for_recipient(&MemberId("mem-hr".to_string()), true)
            .await
            .expect("list unread");
        assert!(unread.is_empty());

        let all = repo
            .list_for_recipient(&MemberId("mem-hr".to_string()), false)
            .await
            .expect("list all");
        assert_eq!(all.len(), 1);
        assert!(all[0].read);
    }

    #[tokio::test]
    async fn insert_bulk_with_no_rows_is_a_no_op() {
        let repo = setup().await;
        repo.insert_bulk(Vec::new()).await.expect("empty insert");
    }
}
