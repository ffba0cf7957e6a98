// Library exports for the segment router

pub mod api;
pub mod body;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod health;
pub mod middleware;
pub mod params;
pub mod pattern;
pub mod response;
pub mod router;
pub mod server;
pub mod staging;
pub mod tree;

pub use api::{Api, ApiOptions};
pub use config::Config;
pub use context::{RequestContext, RequestHead};
pub use error::{BodyError, ConfigError, DispatchError, SerializationError};
pub use handler::{Endpoint, Handler};
pub use middleware::{middleware, Middleware, Responder};
pub use params::PathParams;
pub use response::{Response, ResponseBody, ResponseKind};
pub use router::{Router, RouterBuilder};
