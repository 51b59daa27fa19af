use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::StreamExt;
use serde::Serialize;
use uuid::Uuid;

use crate::admin::AdminState;
use crate::drain::protocol::{encode_frame, DrainFrame, DrainRequest, NDJSON_CONTENT_TYPE};
use crate::lifecycle::state::Phase;
use crate::node::membership::MembershipStatus;

#[derive(Serialize)]
pub struct NodeStatus {
    pub version: &'static str,
    pub node_id: Uuid,
    pub phase: Phase,
    pub shutting_down: bool,
    pub drain_issued: bool,
    pub running_tasks: usize,
    pub membership: MembershipStatus,
}

#[derive(Serialize)]
pub struct DecommissionResult {
    pub node_id: Uuid,
    pub membership: MembershipStatus,
}

/// Stream drain progress as NDJSON, one line per drained mode.
pub async fn drain(State(state): State<AdminState>, Json(request): Json<DrainRequest>) -> Response {
    let frames = state.drain.handle_drain(request).map(|item| {
        let frame = match item {
            Ok(response) => DrainFrame::Progress { on: response.on },
            Err(e) => DrainFrame::Error { message: e.to_string() },
        };
        encode_frame(&frame)
    });

    ([(CONTENT_TYPE, NDJSON_CONTENT_TYPE)], Body::from_stream(frames)).into_response()
}

pub async fn decommission(
    State(state): State<AdminState>,
) -> Result<Json<DecommissionResult>, (StatusCode, String)> {
    let membership = state
        .membership
        .decommission(state.lifecycle.phase())
        .await
        .map_err(|e| (StatusCode::CONFLICT, e.to_string()))?;

    Ok(Json(DecommissionResult {
        node_id: state.membership.node_id(),
        membership,
    }))
}

pub async fn get_status(State(state): State<AdminState>) -> Json<NodeStatus> {
    let snapshot = state.lifecycle.snapshot();
    Json(NodeStatus {
        version: env!("CARGO_PKG_VERSION"),
        node_id: state.membership.node_id(),
        phase: snapshot.phase,
        shutting_down: snapshot.shutting_down,
        drain_issued: snapshot.drain_issued,
        running_tasks: state.stopper.num_tasks(),
        membership: state.membership.status(),
    })
}
