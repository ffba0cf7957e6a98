//! Route registration: groups share a path prefix and a middleware list.

use crate::error::ConfigError;
use crate::handler::{Endpoint, Handler};
use crate::middleware::Middleware;
use crate::pattern::WILDCARD;
use crate::tree::{EndpointGroup, MethodKey};
use axum::http::Method;
use tracing::debug;

/// Options applied to every route registered through an [`Api`].
#[derive(Clone, Default)]
pub struct ApiOptions {
    middleware: Vec<Middleware>,
}

impl ApiOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_middleware(middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self {
            middleware: middleware.into_iter().collect(),
        }
    }

    pub fn middleware(&self) -> &[Middleware] {
        &self.middleware
    }

    /// Parent middleware runs before the child's.
    pub fn merge(&self, child: &ApiOptions) -> ApiOptions {
        let mut middleware = self.middleware.clone();
        middleware.extend(child.middleware.iter().cloned());
        ApiOptions { middleware }
    }
}

impl std::fmt::Debug for ApiOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiOptions")
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// Registers routes under a path prefix into the routing tree.
pub struct Api<'a> {
    tree: &'a mut EndpointGroup<Endpoint>,
    route: String,
    options: ApiOptions,
}

impl<'a> Api<'a> {
    pub(crate) fn root(tree: &'a mut EndpointGroup<Endpoint>) -> Self {
        Self {
            tree,
            route: String::new(),
            options: ApiOptions::none(),
        }
    }

    /// The path prefix of this api.
    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn api_options(&self) -> &ApiOptions {
        &self.options
    }

    pub fn handle<H: Handler>(
        &mut self,
        method: impl Into<MethodKey>,
        route: &str,
        handler: H,
    ) -> Result<(), ConfigError> {
        let method = method.into();
        let path = format!("{}/{}", self.route, route);

        debug!(
            method = %method,
            path = %path,
            middleware = self.options.middleware.len(),
            "Registering route"
        );

        let endpoint = Endpoint::new(self.options.middleware.clone(), handler);
        self.tree.insert(&path, method, endpoint)
    }

    pub fn get<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::GET, route, handler)
    }

    pub fn post<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::POST, route, handler)
    }

    pub fn put<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::PUT, route, handler)
    }

    pub fn patch<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::PATCH, route, handler)
    }

    pub fn delete<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::DELETE, route, handler)
    }

    pub fn head<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::HEAD, route, handler)
    }

    pub fn options<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(Method::OPTIONS, route, handler)
    }

    /// Registers `handler` for every method.
    pub fn any<H: Handler>(&mut self, route: &str, handler: H) -> Result<(), ConfigError> {
        self.handle(MethodKey::Any, route, handler)
    }

    /// Registers the routes built by `build` under `route`, with `options`
    /// appended to this api's options. An empty route keeps the prefix.
    pub fn group<F>(&mut self, route: &str, options: ApiOptions, build: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut Api<'_>) -> Result<(), ConfigError>,
    {
        if route == WILDCARD {
            return Err(ConfigError::InvalidGroup {
                route: route.to_string(),
            });
        }

        let prefix = if route.is_empty() {
            self.route.clone()
        } else {
            format!("{}/{}", self.route, route)
        };

        let mut group = Api {
            tree: &mut *self.tree,
            route: prefix,
            options: self.options.merge(&options),
        };
        build(&mut group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{RequestContext, RequestHead};
    use crate::middleware::middleware;
    use crate::params::PathParams;
    use crate::response::{Response, ResponseBody};
    use axum::http::HeaderMap;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Arc;

    async fn ok(_ctx: Arc<RequestContext>) -> Response {
        Response::text("ok")
    }

    async fn trace(ctx: Arc<RequestContext>) -> Response {
        Response::json(ctx.get_stored("trace").unwrap_or_default())
    }

    fn tracer(name: &'static str) -> Middleware {
        middleware(move |ctx, _| {
            let mut trace = ctx.get_stored("trace").unwrap_or_else(|| json!([]));
            if let Some(items) = trace.as_array_mut() {
                items.push(json!(name));
            }
            ctx.set("trace", trace);
            true
        })
    }

    fn ctx(path: &str) -> Arc<RequestContext> {
        let head = RequestHead::new(Method::GET, path.parse().unwrap(), HeaderMap::new());
        Arc::new(RequestContext::new(head, Bytes::new(), PathParams::new()))
    }

    #[test]
    fn test_shorthands_register_methods() {
        let mut tree = EndpointGroup::root();
        let mut api = Api::root(&mut tree);
        api.get("a", ok).unwrap();
        api.post("a", ok).unwrap();
        api.put("a", ok).unwrap();
        api.patch("a", ok).unwrap();
        api.delete("a", ok).unwrap();
        api.head("a", ok).unwrap();
        api.options("a", ok).unwrap();
        api.any("b", ok).unwrap();

        let routes = tree.routes();
        assert_eq!(routes.len(), 8);
        assert!(routes.contains(&("*".to_string(), "/b".to_string())));
        assert!(routes.contains(&("PATCH".to_string(), "/a".to_string())));
    }

    #[test]
    fn test_group_prefixes_routes() {
        let mut tree = EndpointGroup::root();
        Api::root(&mut tree)
            .group("v1", ApiOptions::none(), |api| {
                assert_eq!(api.route(), "/v1");
                api.get("users/${id}", ok)?;
                api.group("", ApiOptions::none(), |api| api.get("same", ok))
            })
            .unwrap();

        assert_eq!(
            tree.routes(),
            vec![
                ("GET".to_string(), "/v1/same".to_string()),
                ("GET".to_string(), "/v1/users/${id}".to_string()),
            ]
        );
    }

    #[test]
    fn test_wildcard_group_is_rejected() {
        let mut tree = EndpointGroup::root();
        let err = Api::root(&mut tree)
            .group("*", ApiOptions::none(), |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGroup { .. }));
    }

    #[test]
    fn test_duplicate_registration_surfaces() {
        let mut tree = EndpointGroup::root();
        let mut api = Api::root(&mut tree);
        api.get("x", ok).unwrap();
        assert!(matches!(
            api.get("/x", ok),
            Err(ConfigError::DuplicateHandler { .. })
        ));
    }

    #[tokio::test]
    async fn test_group_middleware_runs_parent_first() {
        let mut tree = EndpointGroup::root();
        Api::root(&mut tree)
            .group(
                "outer",
                ApiOptions::with_middleware([tracer("outer")]),
                |api| {
                    api.group(
                        "inner",
                        ApiOptions::with_middleware([tracer("inner-1"), tracer("inner-2")]),
                        |api| api.get("leaf", trace),
                    )?;
                    api.get("shallow", trace)
                },
            )
            .unwrap();

        let resolved = tree.resolve(&Method::GET, "/outer/inner/leaf").unwrap();
        let response = resolved.entry.handler.call(ctx("/outer/inner/leaf")).await;
        assert!(matches!(
            response.body,
            ResponseBody::Structured(ref v) if *v == json!(["outer", "inner-1", "inner-2"])
        ));

        let resolved = tree.resolve(&Method::GET, "/outer/shallow").unwrap();
        assert_eq!(resolved.entry.handler.guard_count(), 1);
    }

    #[test]
    fn test_options_merge_order() {
        let parent = ApiOptions::with_middleware([tracer("a")]);
        let child = ApiOptions::with_middleware([tracer("b"), tracer("c")]);
        assert_eq!(parent.merge(&child).middleware().len(), 3);
        assert_eq!(ApiOptions::none().merge(&ApiOptions::none()).middleware().len(), 0);
    }
}
