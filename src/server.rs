use axum::{
    extract::{Request, State},
    response::Response,
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::dispatcher::Dispatcher;

/// Every request goes to the dispatcher; routing is done by the path grammar, not the router.
pub fn app(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(dispatcher)
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(dispatcher): State<Arc<Dispatcher>>, request: Request) -> Response {
    dispatcher.handle(request).await
}

/// Serve until `shutdown` resolves. Peer addresses are recorded for the origin check.
pub async fn serve<F>(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Collection gateway listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app(dispatcher).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
