use crate::api::Api;
use crate::config::Config;
use crate::context::{RequestContext, RequestHead};
use crate::error::{ConfigError, DispatchError};
use crate::handler::{Endpoint, Handler};
use crate::middleware::{record_dispatch, RequestId};
use crate::params::PathParams;
use crate::response::{HttpResponse, ResponseWriter};
use crate::tree::{EndpointGroup, Resolution};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, Method};
use bytes::{Bytes, BytesMut};
use futures::{FutureExt, StreamExt};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Template of the route that served a request, attached to the response
/// extensions for the transport layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute(pub String);

/// A resolved endpoint, ready to run.
#[derive(Debug, Clone)]
pub struct Route {
    pub endpoint: Endpoint,
    pub params: PathParams,
    /// `None` when served by a method fallback.
    pub template: Option<String>,
}

/// Collects routes before the router starts serving.
pub struct RouterBuilder {
    config: Config,
    tree: EndpointGroup<Endpoint>,
    method_fallbacks: HashMap<Method, Endpoint>,
}

impl RouterBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            tree: EndpointGroup::root(),
            method_fallbacks: HashMap::new(),
        }
    }

    /// Registers routes through an [`Api`] rooted at `/`. May be called
    /// more than once.
    pub fn routes<F>(mut self, build: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(&mut Api<'_>) -> Result<(), ConfigError>,
    {
        build(&mut Api::root(&mut self.tree))?;
        Ok(self)
    }

    /// Handler used for `method` when dispatch finds no route or no handler
    /// for the method.
    pub fn method_fallback<H: Handler>(mut self, method: Method, handler: H) -> Self {
        self.method_fallbacks
            .insert(method, Endpoint::new(Vec::new(), handler));
        self
    }

    pub fn build(self) -> Result<Router, ConfigError> {
        let server = &self.config.server;
        let writer = ResponseWriter::new(server.default_status()?, server.base_headers()?);

        Ok(Router {
            tree: self.tree,
            method_fallbacks: self.method_fallbacks,
            writer,
            max_content_length: server.max_content_length,
            storage_dir: self.config.storage.location,
        })
    }
}

/// An immutable routing tree plus the pipeline that serves requests from it.
pub struct Router {
    tree: EndpointGroup<Endpoint>,
    method_fallbacks: HashMap<Method, Endpoint>,
    writer: ResponseWriter,
    max_content_length: usize,
    storage_dir: PathBuf,
}

impl Router {
    pub fn builder(config: &Config) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// All registered `(method, template)` pairs, sorted.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.tree.routes()
    }

    /// Finds the endpoint for `method` and `path`, consulting the method
    /// fallback when the tree has none.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Route, DispatchError> {
        match self.tree.resolve(method, path) {
            Ok(resolved) => {
                let outcome = match resolved.resolution {
                    Resolution::Matched => "matched",
                    Resolution::Fallback => "fallback",
                };
                debug!(
                    method = %method,
                    path = %path,
                    route = %resolved.entry.path,
                    outcome,
                    "Resolved route"
                );
                record_dispatch(outcome);

                Ok(Route {
                    endpoint: resolved.entry.handler.clone(),
                    params: resolved.params,
                    template: Some(resolved.entry.path.clone()),
                })
            }
            Err(err) => {
                if let Some(fallback) = self.method_fallbacks.get(method) {
                    debug!(method = %method, path = %path, "Using method fallback");
                    record_dispatch("method_fallback");
                    return Ok(Route {
                        endpoint: fallback.clone(),
                        params: PathParams::new(),
                        template: None,
                    });
                }

                debug!(method = %method, path = %path, error = %err, "No route");
                record_dispatch(err.outcome());
                Err(err)
            }
        }
    }

    /// Serves one request. Never fails: every error becomes a response.
    pub async fn handle(&self, request: Request) -> HttpResponse {
        let (parts, body) = request.into_parts();
        let head = RequestHead::from_parts(&parts);
        let request_id = parts.extensions.get::<RequestId>().map(|id| id.0.clone());

        if let Err(err) = self.vet(&head.headers) {
            return self.reject(&head, err).await;
        }

        let route = match self.resolve(&head.method, head.path()) {
            Ok(route) => route,
            Err(err) => return self.reject(&head, err).await,
        };

        let body = match self.read_body(body).await {
            Ok(body) => body,
            Err(err) => return self.reject(&head, err).await,
        };

        let ctx = Arc::new(
            RequestContext::new(head.clone(), body, route.params)
                .with_request_id(request_id)
                .with_storage_dir(self.storage_dir.clone()),
        );

        let response = match AssertUnwindSafe(route.endpoint.call(ctx))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(method = %head.method, path = %head.path(), panic = %message, "Handler panicked");
                DispatchError::Internal(message).to_response()
            }
        };

        let mut response = self.writer.write(&head, response).await;
        if let Some(template) = route.template {
            response.extensions_mut().insert(MatchedRoute(template));
        }
        response
    }

    fn vet(&self, headers: &HeaderMap) -> Result<(), DispatchError> {
        if self.max_content_length == 0 {
            return Ok(());
        }

        match content_length(headers) {
            Some(length) if length > self.max_content_length => Err(DispatchError::PayloadTooLarge),
            Some(_) => Ok(()),
            None if headers.contains_key(header::TRANSFER_ENCODING) => {
                Err(DispatchError::LengthRequired)
            }
            None => Ok(()),
        }
    }

    async fn read_body(&self, body: Body) -> Result<Bytes, DispatchError> {
        let mut stream = body.into_data_stream();
        let mut buffer = BytesMut::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DispatchError::InvalidRequestBody(e.to_string()))?;
            if self.max_content_length > 0 && buffer.len() + chunk.len() > self.max_content_length
            {
                return Err(DispatchError::PayloadTooLarge);
            }
            buffer.extend_from_slice(&chunk);
        }

        Ok(buffer.freeze())
    }

    async fn reject(&self, head: &RequestHead, err: DispatchError) -> HttpResponse {
        match &err {
            DispatchError::Internal(_) | DispatchError::InvalidRequestBody(_) => {
                warn!(method = %head.method, path = %head.path(), error = %err, "Request failed")
            }
            _ => debug!(method = %head.method, path = %head.path(), error = %err, "Request rejected"),
        }
        self.writer.write(head, err.to_response()).await
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
