//! Multi-subscriber callback fan-out.
//!
//! A [`CallbackRegistry`] holds a set of distinct subscribers and invokes
//! each of them with the same arguments on [`dispatch`](CallbackRegistry::dispatch).
//! A subscriber that returns an error or panics is logged and skipped; the
//! remaining subscribers still run and the caller never sees the failure.
//!
//! Subscribers are identified by reference: registering the same
//! [`Subscriber`] handle twice keeps a single subscription.
//!
//! ```rust
//! use chatline_core::callback::{CallbackRegistry, Subscriber};
//!
//! let mut errors: CallbackRegistry<String> = CallbackRegistry::new();
//! let log = Subscriber::new(|msg: &String| {
//!     eprintln!("chat error: {msg}");
//!     Ok(())
//! });
//! errors.register(log.clone());
//! errors.register(log);
//! assert_eq!(errors.len(), 1);
//! errors.dispatch(&"Failed to send message.".to_string());
//! ```

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Error a subscriber may report; it is logged and otherwise ignored.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type SubscriberFn<A> = dyn Fn(&A) -> Result<(), SubscriberError> + Send + Sync;

/// Shared handle to a subscriber function.
///
/// Clones share identity; two handles built from separate `new` calls are
/// distinct subscribers even if they wrap the same closure body.
pub struct Subscriber<A> {
    func: Arc<SubscriberFn<A>>,
}

impl<A> Subscriber<A> {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(&A) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
        }
    }

    /// Wrap an infallible function.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        Self::new(move |args: &A| {
            func(args);
            Ok(())
        })
    }

    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }

    fn call(&self, args: &A) -> Result<(), SubscriberError> {
        (self.func)(args)
    }
}

impl<A> Clone for Subscriber<A> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<A> fmt::Debug for Subscriber<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("ptr", &Arc::as_ptr(&self.func).cast::<()>())
            .finish()
    }
}

/// Set of subscribers notified together.
pub struct CallbackRegistry<A> {
    subscribers: Vec<Subscriber<A>>,
}

impl<A> Default for CallbackRegistry<A> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<A> fmt::Debug for CallbackRegistry<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<A> CallbackRegistry<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already registered.
    pub fn register(&mut self, subscriber: Subscriber<A>) -> bool {
        if self.contains(&subscriber) {
            return false;
        }
        self.subscribers.push(subscriber);
        true
    }

    /// Remove a subscriber. No-op if it is not registered.
    pub fn unregister(&mut self, subscriber: &Subscriber<A>) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| !s.same(subscriber));
        self.subscribers.len() != before
    }

    pub fn contains(&self, subscriber: &Subscriber<A>) -> bool {
        self.subscribers.iter().any(|s| s.same(subscriber))
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Invoke every subscriber with `args`.
    ///
    /// Returns the number of subscribers that completed without error.
    pub fn dispatch(&self, args: &A) -> usize {
        let mut delivered = 0;
        for (index, subscriber) in self.subscribers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| subscriber.call(args))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    tracing::error!(subscriber = index, error = %e, "Callback error");
                }
                Err(panic) => {
                    tracing::error!(
                        subscriber = index,
                        panic = %panic_message(panic.as_ref()),
                        "Callback panicked"
                    );
                }
            }
        }
        delivered
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
