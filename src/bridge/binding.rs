//! Explicit method tables for bound objects.
//!
//! A [`Binding`] lists the methods it exposes once, at bind time, through a
//! [`MethodTableBuilder`]. Each entry is a type-erased invoker that decodes the
//! positional argument strings and produces a boxed future; nothing is looked
//! up by reflection at call time.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::boundary::BoxError;

use super::error::BridgeError;

/// Pending outcome of one bound-method call.
pub type CallFuture = BoxFuture<'static, Result<Value, BoxError>>;

type Invoker = Arc<dyn Fn(&[String]) -> Result<CallFuture, ArgumentError> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("expected {expected} arguments, got {actual}")]
    Arity { expected: usize, actual: usize },
    #[error("argument {index} is not a valid {expected}: {source}")]
    Decode {
        index: usize,
        expected: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("arguments must be a JSON array of JSON-encoded strings: {0}")]
    Envelope(#[source] serde_json::Error),
}

/// Positional arguments decodable from the UI's per-parameter JSON strings.
///
/// Implemented for tuples of up to six `DeserializeOwned` types.
pub trait FromArgs: Sized {
    const ARITY: usize;

    fn from_args(args: &[String]) -> Result<Self, ArgumentError>;
}

fn decode<T: DeserializeOwned>(args: &[String], index: usize) -> Result<T, ArgumentError> {
    serde_json::from_str(&args[index]).map_err(|source| ArgumentError::Decode {
        index,
        expected: std::any::type_name::<T>(),
        source,
    })
}

fn encode<R: Serialize>(result: Result<R, BoxError>) -> Result<Value, BoxError> {
    Ok(serde_json::to_value(result?)?)
}

macro_rules! impl_from_args {
    ($arity:expr; $($ty:ident => $idx:tt),*) => {
        impl<$($ty: DeserializeOwned),*> FromArgs for ($($ty,)*) {
            const ARITY: usize = $arity;

            #[allow(unused_variables)]
            fn from_args(args: &[String]) -> Result<Self, ArgumentError> {
                if args.len() != Self::ARITY {
                    return Err(ArgumentError::Arity {
                        expected: Self::ARITY,
                        actual: args.len(),
                    });
                }
                Ok(($(decode::<$ty>(args, $idx)?,)*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A => 0);
impl_from_args!(2; A => 0, B => 1);
impl_from_args!(3; A => 0, B => 1, C => 2);
impl_from_args!(4; A => 0, B => 1, C => 2, D => 3);
impl_from_args!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_from_args!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);

/// Native object whose methods one bridge exposes to the UI.
pub trait Binding: Send + Sync + 'static {
    /// Bound name of the bridge this object is written for.
    fn bridge_name(&self) -> &str;

    fn methods(self: Arc<Self>) -> MethodTable;
}

/// Name → invoker dispatch table, frozen at bind time.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: BTreeMap<String, Invoker>,
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.methods.keys()).finish()
    }
}

impl MethodTable {
    /// Method names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Resolve `name` and decode `args`, returning the not-yet-polled call.
    ///
    /// The method body only runs when the returned future is polled.
    pub(crate) fn prepare(&self, name: &str, args: &[String]) -> Result<CallFuture, BridgeError> {
        let invoker = self
            .methods
            .get(name)
            .ok_or_else(|| BridgeError::MethodNotFound(name.to_string()))?;

        invoker(args).map_err(|source| BridgeError::InvalidArguments {
            method: name.to_string(),
            source,
        })
    }
}

/// Builds a [`MethodTable`] over a shared target.
pub struct MethodTableBuilder<T> {
    target: Arc<T>,
    methods: BTreeMap<String, Invoker>,
}

impl<T: Send + Sync + 'static> MethodTableBuilder<T> {
    pub fn new(target: Arc<T>) -> Self {
        Self {
            target,
            methods: BTreeMap::new(),
        }
    }

    /// Expose a synchronous method. The returned value is encoded as JSON.
    pub fn method<A, R, F>(self, name: &str, method: F) -> Self
    where
        A: FromArgs + Send + 'static,
        R: Serialize,
        F: Fn(&T, A) -> Result<R, BoxError> + Send + Sync + 'static,
    {
        let target = Arc::clone(&self.target);
        let method = Arc::new(method);
        self.insert(
            name,
            Arc::new(move |args: &[String]| -> Result<CallFuture, ArgumentError> {
                let args = A::from_args(args)?;
                let target = Arc::clone(&target);
                let method = Arc::clone(&method);
                Ok(async move { encode((*method)(&*target, args)) }.boxed())
            }),
        )
    }

    /// Expose an asynchronous method. Its eventual value is awaited and
    /// encoded, never the pending future itself.
    pub fn async_method<A, R, F, Fut>(self, name: &str, method: F) -> Self
    where
        A: FromArgs + Send + 'static,
        R: Serialize,
        F: Fn(Arc<T>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        let target = Arc::clone(&self.target);
        let method = Arc::new(method);
        self.insert(
            name,
            Arc::new(move |args: &[String]| -> Result<CallFuture, ArgumentError> {
                let args = A::from_args(args)?;
                let target = Arc::clone(&target);
                let method = Arc::clone(&method);
                Ok(async move { encode((*method)(target, args).await) }.boxed())
            }),
        )
    }

    pub fn build(self) -> MethodTable {
        MethodTable {
            methods: self.methods,
        }
    }

    fn insert(mut self, name: &str, invoker: Invoker) -> Self {
        if self.methods.insert(name.to_string(), invoker).is_some() {
            tracing::warn!(method = name, "method registered twice, keeping the last one");
        }
        self
    }
}
