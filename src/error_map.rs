//! Mapping of handler failures to JSON-RPC error objects.
//!
//! The mapper looks through [`Error::wrap`] layers to the root cause, and
//! through the `source()` chain of a converted `std::error::Error` to the
//! innermost error, then applies, in increasing precedence:
//!
//! 1. the defaults: code `-32603`, HTTP 500, the root cause's message;
//! 2. the [`ErrorDescriptor`] registered for the root cause's kind;
//! 3. the HTTP status carried by the root cause;
//! 4. the [`ApplicationCode`](crate::ApplicationCode) carried by the root
//!    cause, which also fills the `extended` attributes.

use std::{any::type_name, borrow::Cow, collections::HashMap, error::Error as StdError};

use serde::{Deserialize, Serialize};

use crate::{Error, ErrorCode, ErrorMessage, ExtendedAttributes};

pub const DEFAULT_ERROR_STATUS: u16 = 500;

/// Placeholder replaced by the root cause's message in a descriptor message.
pub const MESSAGE_PLACEHOLDER: &str = "{message}";

/// Declarative mapping for one kind of failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorDescriptor {
    /// `0` keeps the default code.
    pub code: i64,
    pub http_status: Option<u16>,
    pub message: Option<String>,
}

impl ErrorDescriptor {
    pub fn new(code: i64) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }
    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

type TypeCheck = fn(&(dyn StdError + 'static)) -> bool;

fn is<E: StdError + 'static>(e: &(dyn StdError + 'static)) -> bool {
    e.is::<E>()
}

#[derive(Debug, Clone, Default)]
pub struct ErrorRegistry {
    descriptors: HashMap<Cow<'static, str>, ErrorDescriptor>,
    types: Vec<(TypeCheck, &'static str)>,
}

impl ErrorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `descriptor` for failures converted from `E`, or whose
    /// `source()` chain ends in an `E`.
    pub fn register<E: StdError + 'static>(mut self, descriptor: ErrorDescriptor) -> Self {
        self.types.push((is::<E> as TypeCheck, type_name::<E>()));
        self.register_kind(type_name::<E>(), descriptor)
    }

    /// Registers `descriptor` for failures tagged with `kind`.
    pub fn register_kind(
        mut self,
        kind: impl Into<Cow<'static, str>>,
        descriptor: ErrorDescriptor,
    ) -> Self {
        self.descriptors.insert(kind.into(), descriptor);
        self
    }

    pub fn descriptor(&self, kind: &str) -> Option<&ErrorDescriptor> {
        self.descriptors.get(kind)
    }

    fn kind_of(&self, e: &(dyn StdError + 'static)) -> Option<&'static str> {
        self.types
            .iter()
            .find(|(check, _)| check(e))
            .map(|&(_, kind)| kind)
    }

    /// Returns the error object and HTTP status for `error`.
    pub fn map(&self, error: &Error) -> (ErrorMessage, u16) {
        let root = error.root_cause();
        let (kind, root_message) = match innermost_source(root) {
            Some(inner) => (self.kind_of(inner), inner.to_string()),
            None => (root.kind(), root.message().to_string()),
        };
        let mut code = ErrorCode::INTERNAL_ERROR;
        let mut status = DEFAULT_ERROR_STATUS;
        let mut message = root_message.clone();
        let mut extended = None;

        if let Some(d) = kind.and_then(|kind| self.descriptor(kind)) {
            if d.code != 0 {
                code = ErrorCode(d.code);
                if !code.is_application() {
                    tracing::warn!(
                        kind,
                        code = d.code,
                        "error code is outside of the application range [{}, {}]",
                        ErrorCode::APPLICATION_MIN,
                        ErrorCode::APPLICATION_MAX
                    );
                }
            }
            if let Some(template) = d.message.as_deref().filter(|m| !m.is_empty()) {
                message = template.replace(MESSAGE_PLACEHOLDER, &root_message);
            }
            if let Some(s) = d.http_status {
                status = s;
            }
        }
        if let Some(s) = root.status() {
            status = s;
        }
        if let Some(app) = root.application() {
            code = ErrorCode(app.code);
            extended = Some(ExtendedAttributes {
                code: app.name.clone(),
                args: app.args.clone(),
            });
        }
        if message.is_empty() {
            tracing::warn!(kind, code = code.0, "error message is empty");
        }

        let mut e = ErrorMessage::new(code, message);
        e.extended = extended;
        (e, status)
    }
}

/// The last error of the `source()` chain below a converted error, if the
/// chain goes deeper than the converted error itself.
fn innermost_source(root: &Error) -> Option<&(dyn StdError + 'static)> {
    let mut e: &(dyn StdError + 'static) = root.source()?.source()?;
    while let Some(next) = e.source() {
        e = next;
    }
    Some(e)
}
