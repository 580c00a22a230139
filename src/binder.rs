//! Binding of request params to one candidate method signature.
//!
//! Binding either produces a complete argument list or [`NoMatch`]; a
//! mismatch is an ordinary value so the resolver can move on to the next
//! overload.

use std::{any::type_name, fmt};

use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::{Error, Params, Result};

/// Declared type of a method parameter.
#[derive(Clone, Copy)]
pub enum ParamType {
    Bool,
    Int,
    UInt,
    Float,
    String,
    Array,
    Object,
    Any,
    /// Accepts whatever deserializes into a specific Rust type.
    Typed {
        name: &'static str,
        accepts: fn(&Value) -> bool,
    },
}

impl ParamType {
    pub fn of<T: DeserializeOwned>() -> Self {
        fn accepts<T: DeserializeOwned>(value: &Value) -> bool {
            T::deserialize(value).is_ok()
        }
        ParamType::Typed {
            name: type_name::<T>(),
            accepts: accepts::<T>,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ParamType::Bool | ParamType::Int | ParamType::UInt | ParamType::Float
        )
    }

    /// Value bound to an optional parameter that was not supplied.
    pub fn zero_value(&self) -> Value {
        match self {
            ParamType::Bool => Value::Bool(false),
            ParamType::Int | ParamType::UInt => Value::from(0),
            ParamType::Float => Value::from(0.0),
            _ => Value::Null,
        }
    }

    fn convert(&self, value: &Value) -> Option<Value> {
        match self {
            ParamType::Bool => value.is_boolean().then(|| value.clone()),
            ParamType::Int => as_integral(value, Number::as_i64).map(Value::from),
            ParamType::UInt => as_integral(value, Number::as_u64).map(Value::from),
            ParamType::Float => value.is_number().then(|| value.clone()),
            ParamType::String => match value {
                Value::String(_) => Some(value.clone()),
                Value::Object(_) => Some(Value::String(value.to_string())),
                _ => None,
            },
            ParamType::Array => value.is_array().then(|| value.clone()),
            ParamType::Object => value.is_object().then(|| value.clone()),
            ParamType::Any => Some(value.clone()),
            ParamType::Typed { accepts, .. } => accepts(value).then(|| value.clone()),
        }
    }
}

fn as_integral<T>(value: &Value, exact: impl Fn(&Number) -> Option<T>) -> Option<T>
where
    T: TryFrom<i64> + TryFrom<u64>,
{
    let Value::Number(n) = value else {
        return None;
    };
    if let Some(v) = exact(n) {
        return Some(v);
    }
    let f = n.as_f64()?;
    if f.fract() != 0.0 || !f.is_finite() {
        return None;
    }
    if f < 0.0 {
        if f < i64::MIN as f64 {
            return None;
        }
        T::try_from(f as i64).ok()
    } else {
        if f > u64::MAX as f64 {
            return None;
        }
        T::try_from(f as u64).ok()
    }
}

impl fmt::Debug for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Bool => write!(f, "bool"),
            ParamType::Int => write!(f, "int"),
            ParamType::UInt => write!(f, "uint"),
            ParamType::Float => write!(f, "float"),
            ParamType::String => write!(f, "string"),
            ParamType::Array => write!(f, "array"),
            ParamType::Object => write!(f, "object"),
            ParamType::Any => write!(f, "any"),
            ParamType::Typed { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Metadata of one declared method parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    name: String,
    ty: ParamType,
    required: bool,
}

impl ParamSpec {
    /// Required-ness is inferred from the type: primitives are required.
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            required: ty.is_primitive(),
            ty,
        }
    }
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ty).with_required(true)
    }
    pub fn optional(name: impl Into<String>, ty: ParamType) -> Self {
        Self::new(name, ty).with_required(false)
    }
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn ty(&self) -> ParamType {
        self.ty
    }
    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// The candidate signature does not accept the supplied params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoMatch;

/// Arguments bound to a method signature, in declaration order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Deserializes the argument at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let Some(value) = self.0.get(index) else {
            return Err(Error::msg(format_args!(
                "argument {index} is out of range ({} bound)",
                self.0.len()
            )));
        };
        Ok(T::deserialize(value)?)
    }
}
impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Binds `params` to the signature `specs`.
pub fn bind(params: &Params, specs: &[ParamSpec]) -> Result<Args, NoMatch> {
    let supplied = params.non_null_len();
    if supplied > specs.len() {
        return Err(NoMatch);
    }
    let mut args = Vec::with_capacity(specs.len());
    let mut consumed = 0;
    for (index, spec) in specs.iter().enumerate() {
        match params.lookup(index, spec.name()) {
            None | Some(Value::Null) => {
                if spec.is_required() {
                    return Err(NoMatch);
                }
                args.push(spec.ty.zero_value());
            }
            Some(value) => {
                args.push(spec.ty.convert(value).ok_or(NoMatch)?);
                consumed += 1;
            }
        }
    }
    if consumed < supplied {
        return Err(NoMatch);
    }
    Ok(Args(args))
}
