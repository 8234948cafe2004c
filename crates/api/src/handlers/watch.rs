use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use nexus_models::ChangeLogEntry;
use nexus_store::TupleStore;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WatchQuery {
    pub tenant: String,
    #[serde(default)]
    pub since_seq: i64,
}

/// Streams change-log entries for a tenant as Server-Sent Events, for
/// downstream invalidators outside this process. Polls the same store
/// the in-process invalidator polls, at the same cadence. There is no
/// separate notification channel.
pub async fn watch(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WatchQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let poll_interval = state.invalidator.config().poll_interval;
    let store = state.store.clone();

    let stream = stream::unfold((store, query.tenant, query.since_seq), move |(store, tenant, cursor)| async move {
        loop {
            let entries = store.changelog_scan(&tenant, cursor, 500).await.unwrap_or_default();
            if let Some(last) = entries.last() {
                let next_cursor = last.seq;
                return Some((entries, (store, tenant, next_cursor)));
            }
            tokio::time::sleep(poll_interval).await;
        }
    })
    .flat_map(|batch: Vec<ChangeLogEntry>| {
        stream::iter(batch.into_iter().map(|entry| Ok(Event::default().json_data(&entry).unwrap_or_else(|_| Event::default()))))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
