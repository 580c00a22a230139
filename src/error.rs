use std::{any::type_name, borrow::Cow, fmt};

use serde_json::Value;

/// Application-level error code carried by a coded failure.
///
/// `code` replaces the JSON-RPC error code, `name` and `args` become the
/// `extended` attributes of the error object.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationCode {
    pub code: i64,
    pub name: String,
    pub args: Vec<Value>,
}
impl ApplicationCode {
    pub fn new(code: i64, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            args: Vec::new(),
        }
    }
    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }
}

/// Failure raised by a service method.
///
/// Any `std::error::Error` converts into it with `?`; the converted error's
/// type name becomes its kind, which is what descriptors are registered
/// against.
pub struct Error(Box<RawError>);

struct RawError {
    kind: Option<Cow<'static, str>>,
    message: String,
    http_status: Option<u16>,
    application: Option<ApplicationCode>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    cause: Option<Error>,
}

impl Error {
    pub fn msg(message: impl fmt::Display) -> Self {
        Self(Box::new(RawError {
            kind: None,
            message: message.to_string(),
            http_status: None,
            application: None,
            source: None,
            cause: None,
        }))
    }

    /// Creates an error tagged with `kind`.
    pub fn with_kind(kind: impl Into<Cow<'static, str>>, message: impl fmt::Display) -> Self {
        let mut e = Self::msg(message);
        e.0.kind = Some(kind.into());
        e
    }

    /// Wraps `self` the way an invocation layer wraps the failure of the
    /// method it called. Mapping always looks through wrappers.
    pub fn wrap(self, message: impl fmt::Display) -> Self {
        let mut e = Self::msg(message);
        e.0.cause = Some(self);
        e
    }

    pub fn http_status(mut self, status: u16) -> Self {
        self.0.http_status = Some(status);
        self
    }
    pub fn application_code(mut self, code: ApplicationCode) -> Self {
        self.0.application = Some(code);
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.kind.as_deref()
    }
    pub fn message(&self) -> &str {
        &self.0.message
    }
    pub fn status(&self) -> Option<u16> {
        self.0.http_status
    }
    pub fn application(&self) -> Option<&ApplicationCode> {
        self.0.application.as_ref()
    }
    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        self.0.source.as_deref()
    }
    pub fn cause(&self) -> Option<&Error> {
        self.0.cause.as_ref()
    }

    /// Innermost [`Error::wrap`] layer. The `source()` chain of a converted
    /// error is followed separately by [`ErrorRegistry::map`](crate::ErrorRegistry::map).
    pub fn root_cause(&self) -> &Error {
        let mut e = self;
        while let Some(cause) = e.cause() {
            e = cause;
        }
        e
    }
}

impl<E> From<E> for Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        let mut error = Self::with_kind(type_name::<E>(), &e);
        error.0.source = Some(Box::new(e));
        error
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.message)?;
        if let Some(cause) = &self.0.cause {
            write!(f, ": {cause}")?;
        }
        Ok(())
    }
}
impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.0.kind)
            .field("message", &self.0.message)
            .field("http_status", &self.0.http_status)
            .field("application", &self.0.application)
            .field("cause", &self.0.cause)
            .finish()
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[macro_export]
macro_rules! bail {
    ($fmt:literal $(,)?) => {
        return ::std::result::Result::Err($crate::Error::msg(::std::format!($fmt)))
    };
    ($fmt:literal, $($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::msg(::std::format!($fmt, $($arg)*)))
    };
    ($kind:expr => $($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::with_kind($kind, ::std::format!($($arg)*)))
    };
}
