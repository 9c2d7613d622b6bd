//! `TerminalService` gRPC implementation.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status};
use tracing::{info, instrument, warn};

use shellmux_core::TerminalEvent;
use shellmux_proto::v1::terminal_service_server::TerminalService;
use shellmux_proto::v1::{
    EndInputRequest, EndInputResponse, KillSessionRequest, KillSessionResponse, SessionExit,
    SpawnSessionRequest, SpawnSessionResponse, StderrData, StdoutData, SubscribeRequest,
    WriteRequest, WriteResponse,
};

use crate::registry::SessionRegistry;
use crate::router::BroadcastSink;

/// `TerminalService` implementation backed by the session registry.
///
/// The four session commands always succeed at the RPC layer: stale ids are
/// absorbed by the registry and spawn failures arrive as exit events, so the
/// only errors a caller can see are transport-level.
pub struct TerminalServiceImpl {
    registry: Arc<SessionRegistry>,
    events: Arc<BroadcastSink>,
}

impl TerminalServiceImpl {
    /// Create a new `TerminalService`.
    pub const fn new(registry: Arc<SessionRegistry>, events: Arc<BroadcastSink>) -> Self {
        Self { registry, events }
    }
}

type TerminalEventStream =
    Pin<Box<dyn Stream<Item = Result<shellmux_proto::v1::TerminalEvent, Status>> + Send>>;

#[tonic::async_trait]
impl TerminalService for TerminalServiceImpl {
    type SubscribeStream = TerminalEventStream;

    #[instrument(skip(self, request), fields(rpc = "SpawnSession"))]
    async fn spawn_session(
        &self,
        request: Request<SpawnSessionRequest>,
    ) -> Result<Response<SpawnSessionResponse>, Status> {
        let req = request.into_inner();
        let session_id = self.registry.spawn(req.initial_directory).await;
        info!(session_id, "Session spawned");
        Ok(Response::new(SpawnSessionResponse { session_id }))
    }

    #[instrument(skip(self, request), fields(rpc = "Write"))]
    async fn write(
        &self,
        request: Request<WriteRequest>,
    ) -> Result<Response<WriteResponse>, Status> {
        let req = request.into_inner();
        self.registry
            .write(req.session_id, req.message.into_bytes())
            .await;
        Ok(Response::new(WriteResponse {}))
    }

    #[instrument(skip(self, request), fields(rpc = "EndInput"))]
    async fn end_input(
        &self,
        request: Request<EndInputRequest>,
    ) -> Result<Response<EndInputResponse>, Status> {
        let req = request.into_inner();
        self.registry.end(req.session_id).await;
        Ok(Response::new(EndInputResponse {}))
    }

    #[instrument(skip(self, request), fields(rpc = "KillSession"))]
    async fn kill_session(
        &self,
        request: Request<KillSessionRequest>,
    ) -> Result<Response<KillSessionResponse>, Status> {
        let req = request.into_inner();
        self.registry.kill(req.session_id).await;
        Ok(Response::new(KillSessionResponse {}))
    }

    #[instrument(skip(self, _request), fields(rpc = "Subscribe"))]
    async fn subscribe(
        &self,
        _request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let mut events = self.events.subscribe();
        let (tx, rx) = mpsc::channel::<Result<shellmux_proto::v1::TerminalEvent, Status>>(128);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(Ok(event_to_proto(event))).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Subscriber lagging, oldest events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let out_stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(out_stream)))
    }
}

/// Convert an internal event to its wire representation.
fn event_to_proto(event: TerminalEvent) -> shellmux_proto::v1::TerminalEvent {
    use shellmux_proto::v1::terminal_event::Event;

    let (session_id, event) = match event {
        TerminalEvent::Stdout { session_id, data } => {
            (session_id, Event::Stdout(StdoutData { message: data }))
        }
        TerminalEvent::Stderr { session_id, data } => {
            (session_id, Event::Stderr(StderrData { message: data }))
        }
        TerminalEvent::Exit { session_id, code } => {
            (session_id, Event::Exit(SessionExit { code }))
        }
    };

    shellmux_proto::v1::TerminalEvent {
        session_id,
        event: Some(event),
    }
}
