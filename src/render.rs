// Release body rendering.
// Renders markdown notes to HTML through the GitHub markdown endpoint, with
// in-flight de-duplication per release id and an escaped fallback when
// rendering is unavailable.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::error::RelwatchError;
use crate::github::GitHubClient;
use crate::github::types::MarkdownRequest;

/// Result of one render attempt. Cloneable so concurrent waiters can share
/// the leader's outcome.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Html(String),
    /// The markdown endpoint is rate limited independently of the releases
    /// endpoint; carries its reset time.
    RateLimited { reset_at: DateTime<Utc> },
    Failed(String),
}

enum Role {
    Leader(watch::Sender<Option<RenderOutcome>>),
    Waiter(watch::Receiver<Option<RenderOutcome>>),
}

/// Markdown renderer with per-release-id in-flight de-duplication: while a
/// render for an id is running, further callers join its result instead of
/// issuing a duplicate request.
#[derive(Default)]
pub struct BodyRenderer {
    pending: Mutex<HashMap<u64, watch::Receiver<Option<RenderOutcome>>>>,
}

/// Removes a pending entry when the leading render finishes or its future
/// is dropped mid-flight, so later callers retry instead of joining a dead
/// channel.
struct PendingGuard<'a> {
    pending: &'a Mutex<HashMap<u64, watch::Receiver<Option<RenderOutcome>>>>,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

impl BodyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a release body to HTML. Empty input short-circuits to an
    /// empty string without any network call.
    pub async fn render(
        &self,
        client: &GitHubClient,
        slug: &str,
        release_id: u64,
        body: &str,
    ) -> RenderOutcome {
        if body.trim().is_empty() {
            return RenderOutcome::Html(String::new());
        }

        let role = {
            let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            match pending.get(&release_id) {
                Some(rx) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    pending.insert(release_id, rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Waiter(mut rx) => {
                while rx.borrow().is_none() {
                    if rx.changed().await.is_err() {
                        return RenderOutcome::Failed("render task dropped".to_string());
                    }
                }
                let outcome = rx.borrow().clone();
                outcome.unwrap_or_else(|| RenderOutcome::Failed("render task dropped".to_string()))
            }
            Role::Leader(tx) => {
                let _cleanup = PendingGuard {
                    pending: &self.pending,
                    id: release_id,
                };
                let outcome = render_remote(client, slug, body).await;
                let _ = tx.send(Some(outcome.clone()));
                outcome
            }
        }
    }
}

async fn render_remote(client: &GitHubClient, slug: &str, body: &str) -> RenderOutcome {
    let request = MarkdownRequest {
        text: body,
        mode: "gfm",
        context: slug,
    };
    let response = match client.post_json("/markdown", &request).await {
        Ok(response) => response,
        Err(RelwatchError::RateLimited { reset_at }) => {
            return RenderOutcome::RateLimited { reset_at };
        }
        Err(e) => return RenderOutcome::Failed(e.to_string()),
    };
    match response.text().await {
        Ok(html) => RenderOutcome::Html(html),
        Err(e) => RenderOutcome::Failed(e.to_string()),
    }
}

/// Escaped plain-text fallback, used whenever no rendered HTML is available.
pub fn fallback_html(raw: &str) -> String {
    format!("<pre>{}</pre>", html_escape::encode_text(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dropped_leader_clears_pending_entry() {
        // Server that accepts the connection and never answers, keeping the
        // leading render suspended mid-request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let _conn = listener.accept().await;
            std::future::pending::<()>().await;
        });

        let renderer = Arc::new(BodyRenderer::new());
        let client = Arc::new(GitHubClient::with_base_url(None, &base).unwrap());

        let leader = {
            let renderer = Arc::clone(&renderer);
            let client = Arc::clone(&client);
            tokio::spawn(async move { renderer.render(&client, "acme/widget", 7, "notes").await })
        };

        // Let the leader register itself and start its request.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(renderer.pending.lock().unwrap().contains_key(&7));

        leader.abort();
        let _ = leader.await;

        // The in-flight entry must not outlive its render; a later caller
        // becomes a fresh leader instead of joining a dead channel.
        assert!(renderer.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_renders_without_network() {
        let client = GitHubClient::new(None).unwrap();
        let renderer = BodyRenderer::new();

        let outcome = renderer.render(&client, "acme/widget", 1, "   \n").await;
        match outcome {
            RenderOutcome::Html(html) => assert!(html.is_empty()),
            other => panic!("expected empty html, got {:?}", other),
        }
    }

    #[test]
    fn test_fallback_escapes_markup() {
        let html = fallback_html("1 < 2 & <script>alert(1)</script>");
        assert!(html.starts_with("<pre>"));
        assert!(html.ends_with("</pre>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn test_fallback_preserves_text() {
        let html = fallback_html("BREAKING CHANGE: renamed flags");
        assert!(html.contains("BREAKING CHANGE: renamed flags"));
    }
}
