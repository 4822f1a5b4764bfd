use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tokio::sync::watch;

use super::share::{SharedState, Subscription};
use crate::storage::{Article, Database};
use crate::sync::NewsSyncScheduler;
use crate::work::{WorkId, WorkInfo, WorkState};

/// What a presentation layer binds to: the cached articles, the state of the
/// periodic sync, and a way to ask for a refresh.
///
/// Both views start empty (no articles, no state) and are only backed by
/// live queries while subscribed.
pub struct NewsView {
    articles: SharedState<Vec<Article>>,
    sync_state: SharedState<Option<WorkState>>,
    scheduler: NewsSyncScheduler,
}

impl NewsView {
    pub fn new(db: Database, scheduler: NewsSyncScheduler, grace: Duration) -> Self {
        let articles = SharedState::new(Vec::new(), grace, move || {
            db.observe_articles()
                .filter_map(|result| async move {
                    match result {
                        Ok(articles) => Some(articles),
                        Err(e) => {
                            // Keep showing the last good list.
                            tracing::warn!(error = %e, "Failed to read article cache");
                            None
                        }
                    }
                })
                .boxed()
        });

        let status = scheduler.clone();
        let sync_state = SharedState::new(None, grace, move || {
            watch_stream(status.periodic_status())
                .map(|info| info.map(|i| i.state))
                .boxed()
        });

        Self {
            articles,
            sync_state,
            scheduler,
        }
    }

    /// Newest-first cached articles, re-emitted after every cache change.
    pub fn articles(&self) -> Subscription<Vec<Article>> {
        self.articles.subscribe()
    }

    /// Latest state of the periodic sync, `None` until it is first scheduled.
    pub fn sync_state(&self) -> Subscription<Option<WorkState>> {
        self.sync_state.subscribe()
    }

    /// Ask for a sync now.
    pub fn refresh(&self) -> WorkId {
        tracing::info!("Refresh requested");
        self.scheduler.sync_immediately()
    }
}

/// Current value of `rx`, then every subsequent change.
fn watch_stream(rx: watch::Receiver<Option<WorkInfo>>) -> BoxStream<'static, Option<WorkInfo>> {
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let info = *rx.borrow_and_update();
        Some((info, (rx, false)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::NewsClient;
    use crate::sync::{NewsRepository, NewsSyncWorker, SearchParams, SyncSchedule};
    use crate::work::{EngineSettings, HostConditions, WorkEngine};
    use secrecy::SecretString;
    use std::sync::Arc;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn view(server: &MockServer) -> (NewsView, Database) {
        let db = Database::open(":memory:").await.unwrap();
        let client = NewsClient::new(reqwest::Client::new(), &server.uri()).unwrap();
        let repository = NewsRepository::new(
            client,
            db.clone(),
            SearchParams::default(),
            SecretString::from("k"),
        );
        let engine = WorkEngine::new(
            NewsSyncWorker::new(repository),
            Arc::new(HostConditions::with_sysfs_root(std::path::Path::new(
                "/nonexistent/headlines",
            ))),
            EngineSettings::default(),
        );
        let scheduler = NewsSyncScheduler::new(Arc::new(engine), SyncSchedule::default());
        (
            NewsView::new(db.clone(), scheduler, Duration::from_millis(5000)),
            db,
        )
    }

    async fn next_matching<T, F>(sub: &mut Subscription<T>, pred: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&T) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let value = sub.current();
                if pred(&value) {
                    return value;
                }
                sub.changed().await;
            }
        })
        .await
        .expect("timed out waiting for view")
    }

    #[tokio::test]
    async fn test_views_start_empty() {
        let server = MockServer::start().await;
        let (view, _db) = view(&server).await;

        assert!(view.articles().current().is_empty());
        assert_eq!(view.sync_state().current(), None);
    }

    #[tokio::test]
    async fn test_refresh_flows_into_article_view() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"status":"ok","articles":[
                    {"url":"jan","title":"January","publishedAt":"2024-01-01T00:00:00Z","source":{"name":"S"}},
                    {"url":"feb","title":"February","publishedAt":"2024-02-01T00:00:00Z","source":{"name":"S"}}
                ]}"#,
            ))
            .mount(&server)
            .await;
        let (view, _db) = view(&server).await;

        let mut articles = view.articles();
        view.refresh();

        let list = next_matching(&mut articles, |list| !list.is_empty()).await;
        let ids: Vec<_> = list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["feb", "jan"]);
    }

    #[tokio::test]
    async fn test_article_view_reflects_direct_cache_writes() {
        let server = MockServer::start().await;
        let (view, db) = view(&server).await;
        let mut articles = view.articles();

        db.replace_all(&[Article {
            id: "x".to_string(),
            title: "X".to_string(),
            description: None,
            author: None,
            image_url: None,
            source_name: "S".to_string(),
            published_at: "2024-03-01T00:00:00Z".to_string(),
            content: None,
        }])
        .await
        .unwrap();

        let list = next_matching(&mut articles, |list| list.len() == 1).await;
        assert_eq!(list[0].title, "X");
    }
}
