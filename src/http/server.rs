//! HTTP server setup and listener mounting.
//!
//! # Responsibilities
//! - Compile every configured listener and bind its routes by method
//! - Build the Axum router (GET+POST default when no methods are declared)
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Per request: auth gate → argument extraction → dispatch → JSON response
//! - Expose the listener registry for lifecycle and out-of-band invocation

use axum::{
    body::Body,
    extract::{RawPathParams, State},
    http::{header::CONTENT_TYPE, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{MethodFilter, MethodRouter},
    Json, Router,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::exec::Executor;
use crate::listener::args::extract_args;
use crate::listener::auth::verify_auth;
use crate::listener::cache::StorageCache;
use crate::listener::compile::{compile_listener, CompileError, CompiledListener};
use crate::listener::registry::{ListenerRegistry, RegistryBuilder};
use crate::observability::metrics;
use crate::plugins::PluginSet;

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    registry: Arc<ListenerRegistry>,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Compile and mount every configured listener.
    pub fn new(config: GatewayConfig, executor: Arc<dyn Executor>) -> Result<Self, CompileError> {
        let (router, registry) = mount_listeners(&config, executor)?;

        let router = router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.server.request_timeout_secs),
            ))
            .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

        Ok(Self {
            router,
            registry,
            config,
        })
    }

    /// The registry built by this mount operation.
    pub fn registry(&self) -> Arc<ListenerRegistry> {
        self.registry.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener, until
    /// the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, listeners = self.registry.len(), "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Compile all listeners from one config and bind them into a fresh router.
///
/// One storage cache and one plugin instantiation scope span the whole mount
/// operation, so non-unique plugin configs resolve to shared instances.
pub fn mount_listeners(
    config: &GatewayConfig,
    executor: Arc<dyn Executor>,
) -> Result<(Router, Arc<ListenerRegistry>), CompileError> {
    let storage = StorageCache::new();
    let mut plugin_set = PluginSet::new();
    let mut builder = RegistryBuilder::new(&config.listener_id_prefix);
    let mut router = Router::new();

    for (route, listener_config) in &config.listeners {
        let listener = compile_listener(
            &config.defaults,
            listener_config,
            route,
            false,
            storage.clone(),
            executor.clone(),
            &mut plugin_set,
        )?;

        let mut method_router: MethodRouter<Arc<CompiledListener>> = MethodRouter::new();
        for method in listener.methods() {
            let Some(filter) = method_filter(method) else {
                // Validation rejects these before mount.
                tracing::warn!(listener = %route, method = %method, "skipping unsupported method");
                continue;
            };
            method_router = method_router.on(filter, listener_handler);
            builder.register(route, method, listener.clone())?;
        }
        router = router.route(route, method_router.with_state(listener.clone()));

        for plugin in listener.plugins() {
            if let Some(hook) = plugin.mount_routes() {
                router = hook.hook_mount_routes(router, &listener);
            }
        }

        tracing::info!(
            listener = %route,
            methods = ?listener.methods(),
            plugins = listener.plugins().len(),
            "added listener"
        );
    }

    Ok((router, Arc::new(builder.build())))
}

fn method_filter(method: &str) -> Option<MethodFilter> {
    match method {
        "GET" => Some(MethodFilter::GET),
        "POST" => Some(MethodFilter::POST),
        "PUT" => Some(MethodFilter::PUT),
        "DELETE" => Some(MethodFilter::DELETE),
        "PATCH" => Some(MethodFilter::PATCH),
        "HEAD" => Some(MethodFilter::HEAD),
        "OPTIONS" => Some(MethodFilter::OPTIONS),
        "TRACE" => Some(MethodFilter::TRACE),
        _ => None,
    }
}

/// Per-request handler: auth gate, argument extraction, dispatch.
async fn listener_handler(
    State(listener): State<Arc<CompiledListener>>,
    params: RawPathParams,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let (parts, body) = request.into_parts();
    let listener_id = listener.id().unwrap_or("unmounted").to_string();

    // Auth gate first; unauthenticated requests do no extraction work.
    if let Err(err) = verify_auth(&parts.headers, parts.uri.query(), listener.auth()) {
        tracing::debug!(listener = %listener.route(), "request rejected by auth gate");
        metrics::record_request(method.as_str(), 401, &listener_id, start);
        return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
    }

    // Body size is enforced by the RequestBodyLimitLayer.
    let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            metrics::record_request(method.as_str(), 400, &listener_id, start);
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to read request body: {err}"),
            )
                .into_response();
        }
    };

    let path_params: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let args = match extract_args(
        &path_params,
        &parts.headers,
        &method,
        content_type,
        &body_bytes,
        parts.uri.query(),
    )
    .await
    {
        Ok(args) => args,
        Err(err) => {
            metrics::record_request(method.as_str(), 400, &listener_id, start);
            return (
                StatusCode::BAD_REQUEST,
                format!("failed to extract args from request: {err}"),
            )
                .into_response();
        }
    };

    let response = listener.handle_request(args).await;
    let status = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    metrics::record_request(method.as_str(), status.as_u16(), &listener_id, start);

    (status, Json(response)).into_response()
}
