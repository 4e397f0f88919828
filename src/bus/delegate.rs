//! Subscriber callbacks and how long the bus keeps them alive.
//!
//! A [`Delegate`] is either a bare closure or a method bound to an owner held
//! in an `Arc`. A [`DelegateReference`] decides the lifetime: strong keeps the
//! callback (and owner) alive until unsubscribed; weak holds only a `Weak` to
//! the owner and rebuilds the callback on each invocation, yielding `None`
//! once the owner is gone.
//!
//! A closure has no independent owner to key a weak reference off, so asking
//! for a weak closure reference is an error instead of a silent leak.

use std::fmt;
use std::sync::{Arc, Weak};

use super::BusError;

/// An invocable subscriber callback.
pub type Callback<P, R> = Arc<dyn Fn(&P) -> R + Send + Sync + 'static>;

type Resolver<P, R> = Arc<dyn Fn() -> Option<Callback<P, R>> + Send + Sync + 'static>;

/// An owner paired with a method to call on it.
trait BoundMethod<P, R>: Send + Sync {
    fn into_strong(self: Box<Self>) -> Callback<P, R>;
    fn into_weak(self: Box<Self>) -> Resolver<P, R>;
}

struct OwnedMethod<T, F> {
    owner: Arc<T>,
    method: Arc<F>,
}

impl<T, F, P, R> BoundMethod<P, R> for OwnedMethod<T, F>
where
    T: Send + Sync + 'static,
    F: Fn(&T, &P) -> R + Send + Sync + 'static,
    P: 'static,
    R: 'static,
{
    fn into_strong(self: Box<Self>) -> Callback<P, R> {
        let OwnedMethod { owner, method } = *self;
        Arc::new(move |payload: &P| (*method)(&*owner, payload))
    }

    fn into_weak(self: Box<Self>) -> Resolver<P, R> {
        let owner: Weak<T> = Arc::downgrade(&self.owner);
        let method = self.method;
        Arc::new(move || {
            let owner = owner.upgrade()?;
            let method = Arc::clone(&method);
            let callback: Callback<P, R> =
                Arc::new(move |payload: &P| (*method)(&*owner, payload));
            Some(callback)
        })
    }
}

enum DelegateKind<P, R> {
    Closure(Callback<P, R>),
    Method(Box<dyn BoundMethod<P, R>>),
}

/// A subscriber callback before a lifetime policy is applied.
pub struct Delegate<P, R = ()> {
    kind: DelegateKind<P, R>,
}

impl<P: 'static, R: 'static> Delegate<P, R> {
    /// A free-standing closure. Only usable with `keep_alive`.
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&P) -> R + Send + Sync + 'static,
    {
        Self {
            kind: DelegateKind::Closure(Arc::new(f)),
        }
    }

    /// `method` invoked on `owner`. Held weakly unless `keep_alive` is set.
    pub fn method<T, F>(owner: &Arc<T>, method: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T, &P) -> R + Send + Sync + 'static,
    {
        Self {
            kind: DelegateKind::Method(Box::new(OwnedMethod {
                owner: Arc::clone(owner),
                method: Arc::new(method),
            })),
        }
    }
}

impl<P, R> fmt::Debug for Delegate<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DelegateKind::Closure(_) => "closure",
            DelegateKind::Method(_) => "method",
        };
        f.debug_struct("Delegate").field("kind", &kind).finish()
    }
}

enum Target<P, R> {
    Strong(Callback<P, R>),
    Weak(Resolver<P, R>),
}

/// A delegate with its lifetime policy applied.
pub struct DelegateReference<P, R = ()> {
    target: Target<P, R>,
}

impl<P: 'static, R: 'static> DelegateReference<P, R> {
    pub fn new(delegate: Delegate<P, R>, keep_alive: bool) -> Result<Self, BusError> {
        let target = match (delegate.kind, keep_alive) {
            (DelegateKind::Closure(callback), true) => Target::Strong(callback),
            (DelegateKind::Closure(_), false) => return Err(BusError::ClosureRequiresKeepAlive),
            (DelegateKind::Method(bound), true) => Target::Strong(bound.into_strong()),
            (DelegateKind::Method(bound), false) => Target::Weak(bound.into_weak()),
        };
        Ok(Self { target })
    }

    /// Always succeeds: every delegate kind can be held strongly.
    pub fn strong(delegate: Delegate<P, R>) -> Self {
        let target = match delegate.kind {
            DelegateKind::Closure(callback) => Target::Strong(callback),
            DelegateKind::Method(bound) => Target::Strong(bound.into_strong()),
        };
        Self { target }
    }

    /// The callback, or `None` if the owner has been dropped.
    ///
    /// A resolved weak callback keeps the owner alive until it is dropped.
    pub fn target(&self) -> Option<Callback<P, R>> {
        match &self.target {
            Target::Strong(callback) => Some(Arc::clone(callback)),
            Target::Weak(resolve) => resolve(),
        }
    }

    pub fn is_weak(&self) -> bool {
        matches!(self.target, Target::Weak(_))
    }

    pub fn is_alive(&self) -> bool {
        match &self.target {
            Target::Strong(_) => true,
            Target::Weak(resolve) => resolve().is_some(),
        }
    }
}

impl<P, R> fmt::Debug for DelegateReference<P, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strength = match self.target {
            Target::Strong(_) => "strong",
            Target::Weak(_) => "weak",
        };
        f.debug_struct("DelegateReference")
            .field("strength", &strength)
            .finish()
    }
}
