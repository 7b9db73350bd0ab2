// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! The HTTP endpoint that receives IPAM webhooks.

use std::future::Future;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ipamdns::sync::IpAddressEvent;

use crate::ipam::WebhookPayload;

/// Builds the webhook router. Accepted events are queued on `events`.
pub fn router(events: mpsc::Sender<IpAddressEvent>) -> Router {
    Router::new()
        .route("/webhook", post(receive))
        .with_state(events)
}

/// Serves webhooks on `listener` until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    events: mpsc::Sender<IpAddressEvent>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) {
    if let Ok(addr) = listener.local_addr() {
        info!("Receiving IPAM webhooks on {}.", addr);
    }
    if let Err(e) = axum::serve(listener, router(events))
        .with_graceful_shutdown(shutdown)
        .await
    {
        warn!("The webhook listener failed: {}", e);
    }
}

/// Handles `POST /webhook`.
///
/// The body is decoded by hand rather than through axum's `Json`
/// extractor, so that every malformed body gets 400.
async fn receive(
    State(events): State<mpsc::Sender<IpAddressEvent>>,
    body: Bytes,
) -> StatusCode {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Rejecting malformed webhook body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };
    let event = match payload.into_event() {
        Ok(event) => event,
        Err(e) => {
            warn!("Rejecting webhook: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    debug!("Queueing webhook event: {}", event);
    match events.send(event).await {
        Ok(()) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipamdns::sync::EventKind;

    const DELETED: &str = r#"{
        "event": "deleted",
        "data": {
            "family": {"value": 4},
            "address": "192.168.1.10/24",
            "status": {"value": "active"},
            "dns_name": "host.if.lastmile.sk"
        }
    }"#;

    #[tokio::test]
    async fn accepted_events_are_queued() {
        let (sender, mut receiver) = mpsc::channel(1);
        let status = receive(State(sender), Bytes::from_static(DELETED.as_bytes())).await;
        assert_eq!(status, StatusCode::OK);
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Deleted);
        assert_eq!(event.binding.dns_name, "host.if.lastmile.sk");
    }

    #[tokio::test]
    async fn malformed_bodies_are_bad_requests() {
        let (sender, mut receiver) = mpsc::channel(1);
        for body in [
            &b"not json"[..],
            br#"{"event": "created"}"#,
            br#"{"event": "created", "data": {"family": {"value": 5}, "address": "x"}}"#,
        ] {
            let status = receive(State(sender.clone()), Bytes::copy_from_slice(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_synchronizer_is_unavailable() {
        let (sender, receiver) = mpsc::channel(1);
        drop(receiver);
        let status = receive(State(sender), Bytes::from_static(DELETED.as_bytes())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
