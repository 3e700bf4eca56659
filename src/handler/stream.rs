use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::Query,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Extension, Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};

use crate::{middleware::AuthenticatedUser, AppState};

pub fn stream_handler() -> Router {
    Router::new().route("/", get(stream_deltas))
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    // Feed cursor from a previous connection; omitted on first connect.
    pub last_seen: Option<u64>,
}

/// Push channel for a viewer's projection deltas. Deltas arrive in the order
/// the dispatcher emitted them; dropping the connection drops the receiver
/// and the dispatcher detaches the subscriber on its next delivery.
pub async fn stream_deltas(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<AuthenticatedUser>,
    Query(params): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = app_state
        .dispatch_service
        .subscribe(auth.user.id, params.last_seen)
        .await;

    tracing::debug!(
        "viewer {} stream {} connected ({} active)",
        subscription.viewer_id,
        subscription.conn_id,
        app_state
            .dispatch_service
            .active_connections(subscription.viewer_id)
    );

    let stream = ReceiverStream::new(subscription.receiver).map(|delta| {
        let event = Event::default()
            .json_data(&delta)
            .unwrap_or_else(|e| Event::default().data(format!("serialization error: {}", e)));
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
