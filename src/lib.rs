//! JSON-RPC 2.0 request dispatch and a symmetric client.
//!
//! The server side is a [`Dispatcher`]: it parses a payload, resolves
//! `service#method` references against a [`ServiceLocator`], picks the first
//! overload whose signature binds the params, runs it and maps failures
//! through an [`ErrorRegistry`].
//!
//! ```
//! use jsonrpc_dispatch::{Dispatcher, ParamSpec, ParamType, Service, ServiceRegistry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let calc = Service::builder("calc")
//!     .method(
//!         "add",
//!         [
//!             ParamSpec::new("a", ParamType::Int),
//!             ParamSpec::new("b", ParamType::Int),
//!         ],
//!         |_, args| Ok(args.get::<i64>(0)? + args.get::<i64>(1)?),
//!     )
//!     .build();
//! let dispatcher = Dispatcher::new(ServiceRegistry::new().with(calc));
//! let reply = dispatcher
//!     .handle_text(r#"{"jsonrpc":"2.0","id":1,"method":"calc#add","params":{"a":1,"b":2}}"#)
//!     .await;
//! assert_eq!(reply.http_status, 200);
//! assert_eq!(
//!     reply.to_json_string().unwrap(),
//!     r#"{"jsonrpc":"2.0","id":1,"result":3}"#
//! );
//! # }
//! ```
//!
//! The client side is a [`RequestBuilder`] for ad-hoc calls and a
//! [`ServiceProxy`] for calls described by a [`ServiceContract`], both
//! sending text through a [`Transport`].

mod binder;
mod client;
mod context;
mod dispatcher;
mod error;
mod error_map;
mod id;
mod message;
mod options;
mod proxy;
mod resolver;
mod service;
mod transport;
mod utils;

pub use binder::*;
pub use client::*;
pub use context::*;
pub use dispatcher::*;
pub use error::*;
pub use error_map::*;
pub use id::*;
pub use message::*;
pub use options::*;
pub use proxy::*;
pub use resolver::*;
pub use service::*;
pub use transport::*;
