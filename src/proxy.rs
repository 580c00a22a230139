//! Typed-call invoker built on [`RequestBuilder`].
//!
//! A [`ServiceContract`] describes the remote operations of one service:
//! the JSON-RPC method each call-site key maps to, the argument names and
//! which arguments may be `null`. A [`ServiceProxy`] executes calls against
//! a contract; typed wrappers are thin functions over [`ServiceProxy::call`].

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    BoxTransport, CallError, CounterIdGenerator, IdGenerator, RequestBuilder, Transport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamsStyle {
    /// Named params.
    #[default]
    Object,
    /// Positional params.
    Array,
}

#[derive(Debug, Clone)]
struct ArgSpec {
    name: String,
    optional: bool,
}

/// One remote operation of a contract.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    key: String,
    method: String,
    remote: bool,
    params_style: Option<ParamsStyle>,
    args: Vec<ArgSpec>,
}

impl OperationSpec {
    /// A remote operation whose method name defaults to `key`.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            method: key.clone(),
            key,
            remote: true,
            params_style: None,
            args: Vec::new(),
        }
    }
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }
    pub fn remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }
    pub fn params_style(mut self, style: ParamsStyle) -> Self {
        self.params_style = Some(style);
        self
    }
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            optional: false,
        });
        self
    }
    pub fn optional_arg(mut self, name: impl Into<String>) -> Self {
        self.args.push(ArgSpec {
            name: name.into(),
            optional: true,
        });
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }
    pub fn method_name(&self) -> &str {
        &self.method
    }
}

#[derive(Default)]
pub struct ContractBuilder {
    service: Option<String>,
    params_style: Option<ParamsStyle>,
    id_generator: Option<Arc<dyn IdGenerator>>,
    operations: Vec<OperationSpec>,
}

impl ContractBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefixes `service#` to every method name that has no `#`.
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = Some(name.into());
        self
    }
    pub fn params_style(mut self, style: ParamsStyle) -> Self {
        self.params_style = Some(style);
        self
    }
    pub fn id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Some(Arc::new(generator));
        self
    }
    pub fn operation(mut self, operation: OperationSpec) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn build(self) -> Result<ServiceContract, CallError> {
        let mut operations = HashMap::new();
        for mut op in self.operations {
            if !op.remote {
                return Err(CallError::Config(format!(
                    "operation `{}` is not marked remote",
                    op.key
                )));
            }
            for (index, arg) in op.args.iter().enumerate() {
                if arg.name.is_empty() {
                    return Err(CallError::Config(format!(
                        "argument {index} of operation `{}` has no name",
                        op.key
                    )));
                }
                if op.args[..index].iter().any(|a| a.name == arg.name) {
                    return Err(CallError::Config(format!(
                        "two arguments of operation `{}` have the same name `{}`",
                        op.key, arg.name
                    )));
                }
            }
            if let Some(service) = &self.service {
                if !op.method.contains('#') {
                    op.method = format!("{service}#{}", op.method);
                }
            }
            let key = op.key.clone();
            if operations.insert(key.clone(), op).is_some() {
                return Err(CallError::Config(format!("operation `{key}` is declared twice")));
            }
        }
        Ok(ServiceContract {
            params_style: self.params_style,
            id_generator: self
                .id_generator
                .unwrap_or_else(|| Arc::new(CounterIdGenerator::new())),
            operations,
        })
    }
}

pub struct ServiceContract {
    params_style: Option<ParamsStyle>,
    id_generator: Arc<dyn IdGenerator>,
    operations: HashMap<String, OperationSpec>,
}

impl ServiceContract {
    pub fn builder() -> ContractBuilder {
        ContractBuilder::new()
    }
    pub fn operation(&self, key: &str) -> Option<&OperationSpec> {
        self.operations.get(key)
    }
}
impl fmt::Debug for ServiceContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContract")
            .field("params_style", &self.params_style)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

/// Per-call overrides of the contract settings.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub params_style: Option<ParamsStyle>,
    pub id_generator: Option<Arc<dyn IdGenerator>>,
}

impl CallOptions {
    pub fn params_style(mut self, style: ParamsStyle) -> Self {
        self.params_style = Some(style);
        self
    }
    pub fn id_generator(mut self, generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Some(Arc::new(generator));
        self
    }
}

#[derive(Clone)]
pub struct ServiceProxy {
    base: RequestBuilder<Value>,
    contract: Arc<ServiceContract>,
}

impl ServiceProxy {
    pub fn new(transport: impl Transport + 'static, contract: ServiceContract) -> Self {
        Self {
            base: RequestBuilder::new(transport.boxed()),
            contract: Arc::new(contract),
        }
    }
    pub fn from_boxed(transport: BoxTransport, contract: Arc<ServiceContract>) -> Self {
        Self {
            base: RequestBuilder::new(transport),
            contract,
        }
    }

    /// Calls the operation `key`.
    ///
    /// `args` must serialize to an array with one element per declared
    /// argument, e.g. a tuple; `()` stands for no arguments.
    pub async fn call<R: DeserializeOwned>(
        &self,
        key: &str,
        args: impl Serialize,
    ) -> Result<R, CallError> {
        self.call_with(key, args, &CallOptions::default()).await
    }

    pub async fn call_with<R: DeserializeOwned>(
        &self,
        key: &str,
        args: impl Serialize,
        options: &CallOptions,
    ) -> Result<R, CallError> {
        let result = self.request(key, args, options)?.execute_raw().await?;
        R::deserialize(result).map_err(CallError::Parse)
    }

    /// Calls the operation `key` and discards any result.
    pub async fn call_void(&self, key: &str, args: impl Serialize) -> Result<(), CallError> {
        self.call_void_with(key, args, &CallOptions::default()).await
    }

    pub async fn call_void_with(
        &self,
        key: &str,
        args: impl Serialize,
        options: &CallOptions,
    ) -> Result<(), CallError> {
        self.request(key, args, options)?.execute_raw().await?;
        Ok(())
    }

    fn request(
        &self,
        key: &str,
        args: impl Serialize,
        options: &CallOptions,
    ) -> Result<RequestBuilder<Value>, CallError> {
        let Some(op) = self.contract.operation(key) else {
            return Err(CallError::InvalidArgument(format!(
                "operation `{key}` is not part of the contract"
            )));
        };
        let args = match serde_json::to_value(args).map_err(CallError::Serialize)? {
            Value::Null => Vec::new(),
            Value::Array(args) => args,
            other => vec![other],
        };
        if args.len() != op.args.len() {
            return Err(CallError::InvalidArgument(format!(
                "operation `{key}` takes {} arguments but {} were supplied",
                op.args.len(),
                args.len()
            )));
        }
        let style = options
            .params_style
            .or(op.params_style)
            .or(self.contract.params_style)
            .unwrap_or_default();
        let generator = options
            .id_generator
            .as_ref()
            .unwrap_or(&self.contract.id_generator);

        let mut named = Map::new();
        let mut positional = Vec::new();
        for (spec, value) in op.args.iter().zip(args) {
            if value.is_null() {
                if !spec.optional {
                    return Err(CallError::InvalidArgument(format!(
                        "argument `{}` of operation `{key}` is mandatory and can't be null",
                        spec.name
                    )));
                }
                if style == ParamsStyle::Array {
                    positional.push(Value::Null);
                }
                continue;
            }
            match style {
                ParamsStyle::Object => {
                    named.insert(spec.name.clone(), value);
                }
                ParamsStyle::Array => positional.push(value),
            }
        }

        let b = self.base.id(generator.generate()).method(op.method.clone());
        Ok(match style {
            ParamsStyle::Object => named.into_iter().fold(b, |b, (k, v)| b.param(k, v)),
            ParamsStyle::Array => b.params(positional),
        })
    }
}
