use std::sync::Arc;

use serde_json::{json, Value};
use tracing::error;
use uuid::Uuid;

use crate::{
    notifications::repo::{
        NewNotification, Notification, NotificationKind, NotificationStore, PgNotificationStore,
    },
    realtime::EventPublisher,
    state::AppState,
};

/// Fan-out engine: one stored notification per recipient, exactly one
/// realtime broadcast per triggering event. Both collaborators are injected
/// so tests can substitute counting fakes.
pub struct Notifier {
    store: Arc<dyn NotificationStore>,
    events: Arc<dyn EventPublisher>,
}

impl Notifier {
    pub fn new(store: Arc<dyn NotificationStore>, events: Arc<dyn EventPublisher>) -> Self {
        Self { store, events }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            Arc::new(PgNotificationStore::new(state.db.clone())),
            state.events.clone(),
        )
    }

    /// Inserts a row per recipient in order, then emits a single
    /// `notification` event carrying the first recipient's record. The
    /// transport reaches every connected client, so per-recipient replays
    /// would only duplicate traffic; consumers filter on `user_id`.
    pub async fn notify(
        &self,
        recipients: &[Uuid],
        kind: NotificationKind,
        message: &str,
        link: Option<&str>,
        data: Value,
        actor_name: Option<&str>,
    ) -> anyhow::Result<Vec<Notification>> {
        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let mut created = Vec::with_capacity(recipients.len());
        for &user_id in recipients {
            let row = self
                .store
                .create(&NewNotification {
                    user_id,
                    kind,
                    message: message.to_string(),
                    link: link.map(str::to_string),
                    data: data.clone(),
                })
                .await?;
            created.push(row);
        }

        let mut payload = serde_json::to_value(&created[0])?;
        if let Some(name) = actor_name {
            payload["user_name"] = json!(name);
        }
        self.events.publish("notification", payload);

        Ok(created)
    }

    /// Fire-and-forget variant for call sites where the primary action must
    /// not fail because of the side channel; failures are logged only.
    pub async fn notify_best_effort(
        &self,
        recipients: &[Uuid],
        kind: NotificationKind,
        message: &str,
        link: Option<&str>,
        data: Value,
        actor_name: Option<&str>,
    ) {
        if let Err(e) = self
            .notify(recipients, kind, message, link, data, actor_name)
            .await
        {
            error!(error = %e, kind = kind.as_str(), "notification fan-out failed");
        }
    }

    /// Broadcast event for a freshly published post: everyone except the
    /// author gets a row, all connected clients get the one event.
    pub async fn post_published(
        &self,
        author_id: Uuid,
        author_name: &str,
        post_id: Uuid,
        title: &str,
        slug: &str,
    ) {
        let recipients = match self.store.recipients_except(author_id).await {
            Ok(recipients) => recipients,
            Err(e) => {
                error!(error = %e, "failed to resolve broadcast recipients");
                return;
            }
        };
        self.notify_best_effort(
            &recipients,
            NotificationKind::Post,
            &format!("{author_name} created a new post: {title}"),
            Some(&format!("/article/{slug}")),
            json!({
                "user_id": author_id,
                "post_id": post_id,
                "post_title": title,
                "post_slug": slug,
            }),
            Some(author_name),
        )
        .await;
    }

    /// Targeted event for a like: one row, one broadcast, to the post author.
    pub async fn post_liked(
        &self,
        author_id: Uuid,
        liker_id: Uuid,
        liker_name: &str,
        post_id: Uuid,
        title: &str,
    ) {
        self.notify_best_effort(
            &[author_id],
            NotificationKind::PostLike,
            &format!("{liker_name} liked your post: {title}"),
            Some(&format!("/posts/{post_id}")),
            json!({
                "post_id": post_id,
                "user_id": liker_id,
            }),
            Some(liker_name),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    struct MemoryStore {
        rows: Mutex<Vec<Notification>>,
        users: Vec<Uuid>,
        fail: bool,
    }

    impl MemoryStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                users: Vec::new(),
                fail: false,
            }
        }

        fn with_users(users: Vec<Uuid>) -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                users,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
                users: Vec::new(),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl NotificationStore for MemoryStore {
        async fn create(&self, notification: &NewNotification) -> anyhow::Result<Notification> {
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            let row = Notification {
                id: Uuid::new_v4(),
                user_id: notification.user_id,
                kind: notification.kind.as_str().to_string(),
                message: notification.message.clone(),
                link: notification.link.clone(),
                data: notification.data.clone(),
                is_read: false,
                created_at: OffsetDateTime::now_utc(),
            };
            self.rows.lock().expect("rows lock").push(row.clone());
            Ok(row)
        }

        async fn recipients_except(&self, actor: Uuid) -> anyhow::Result<Vec<Uuid>> {
            if self.fail {
                anyhow::bail!("store unavailable");
            }
            Ok(self.users.iter().copied().filter(|&id| id != actor).collect())
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        events: Mutex<Vec<(String, Value)>>,
    }

    impl EventPublisher for CountingPublisher {
        fn publish(&self, event: &str, payload: Value) {
            self.events
                .lock()
                .expect("events lock")
                .push((event.to_string(), payload));
        }
    }

    fn notifier_with(
        store: Arc<MemoryStore>,
        publisher: Arc<CountingPublisher>,
    ) -> Notifier {
        Notifier::new(store, publisher)
    }

    #[tokio::test]
    async fn three_recipients_three_rows_one_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store.clone(), publisher.clone());

        let recipients = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let created = notifier
            .notify(
                &recipients,
                NotificationKind::Post,
                "Alice created a new post: Hello",
                Some("/article/hello"),
                json!({ "user_id": Uuid::new_v4() }),
                Some("Alice"),
            )
            .await
            .expect("fan-out");

        assert_eq!(created.len(), 3);
        assert_eq!(store.rows.lock().expect("rows").len(), 3);

        let events = publisher.events.lock().expect("events");
        assert_eq!(events.len(), 1);
        let (name, payload) = &events[0];
        assert_eq!(name, "notification");
        // The single broadcast carries the first recipient's record.
        assert_eq!(payload["user_id"], json!(recipients[0]));
        assert_eq!(payload["user_name"], json!("Alice"));
    }

    #[tokio::test]
    async fn recipient_order_is_preserved() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store.clone(), publisher);

        let recipients = [Uuid::new_v4(), Uuid::new_v4()];
        notifier
            .notify(
                &recipients,
                NotificationKind::Post,
                "m",
                None,
                json!({}),
                None,
            )
            .await
            .expect("fan-out");

        let rows = store.rows.lock().expect("rows");
        assert_eq!(rows[0].user_id, recipients[0]);
        assert_eq!(rows[1].user_id, recipients[1]);
    }

    #[tokio::test]
    async fn empty_recipients_produce_nothing() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store.clone(), publisher.clone());

        let created = notifier
            .notify(&[], NotificationKind::Post, "m", None, json!({}), None)
            .await
            .expect("fan-out");

        assert!(created.is_empty());
        assert!(publisher.events.lock().expect("events").is_empty());
    }

    #[tokio::test]
    async fn best_effort_swallows_store_failure() {
        let store = Arc::new(MemoryStore::failing());
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store, publisher.clone());

        notifier
            .notify_best_effort(
                &[Uuid::new_v4()],
                NotificationKind::PostLike,
                "m",
                None,
                json!({}),
                None,
            )
            .await;

        // Failure was logged, not raised, and no event escaped.
        assert!(publisher.events.lock().expect("events").is_empty());
    }

    #[tokio::test]
    async fn post_published_reaches_everyone_but_the_author() {
        let author = Uuid::new_v4();
        let readers = [Uuid::new_v4(), Uuid::new_v4()];
        let store = Arc::new(MemoryStore::with_users(vec![
            author, readers[0], readers[1],
        ]));
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store.clone(), publisher.clone());

        let post = Uuid::new_v4();
        notifier
            .post_published(author, "Alice", post, "Hello", "hello")
            .await;

        let rows = store.rows.lock().expect("rows");
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.user_id != author));
        assert_eq!(rows[0].kind, "post");
        assert_eq!(rows[0].message, "Alice created a new post: Hello");
        assert_eq!(rows[0].link.as_deref(), Some("/article/hello"));
        assert_eq!(rows[0].data["post_slug"], json!("hello"));

        let events = publisher.events.lock().expect("events");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1["user_name"], json!("Alice"));
    }

    #[tokio::test]
    async fn post_liked_targets_the_author_only() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(CountingPublisher::default());
        let notifier = notifier_with(store.clone(), publisher.clone());

        let author = Uuid::new_v4();
        let liker = Uuid::new_v4();
        let post = Uuid::new_v4();
        notifier
            .post_liked(author, liker, "bob", post, "Hello")
            .await;

        let rows = store.rows.lock().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, author);
        assert_eq!(rows[0].kind, "post_like");
        assert_eq!(rows[0].message, "bob liked your post: Hello");
        assert_eq!(publisher.events.lock().expect("events").len(), 1);
    }
}
