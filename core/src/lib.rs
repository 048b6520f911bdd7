//! # Seated Core
//!
//! Core traits and types shared by the Seated booking crates.
//!
//! - **Reducer**: `(State, Action, Environment) → (State', Effects)`. All
//!   booking and waitlist rules are reducers; they never touch storage or
//!   the network themselves.
//! - **Effect**: a description of a side effect (notification, payment call)
//!   returned by a reducer and executed by the caller once the state change
//!   is committed.
//! - **Clock**: abstracts "now" so refund windows and waitlist expiry can be
//!   tested deterministically.
//! - **`KeyedMutex`**: a single-writer section per key. The booking ledger keys
//!   it by event so capacity checks and writes for one event never interleave.

pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

pub mod lock;

pub use lock::{KeyGuard, KeyedMutex};

/// Reducer module - Core business logic abstraction
///
/// Reducers are pure functions that take current state and an action,
/// and return new state plus effects to execute.
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The domain state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    ///
    /// # Example
    ///
    /// ```
    /// use seated_core::effect::Effect;
    /// use seated_core::reducer::Reducer;
    /// use seated_core::{SmallVec, smallvec};
    ///
    /// struct Counter;
    ///
    /// impl Reducer for Counter {
    ///     type State = u32;
    ///     type Action = ();
    ///     type Environment = ();
    ///
    ///     fn reduce(&self, state: &mut u32, _action: (), _env: &()) -> SmallVec<[Effect<()>; 4]> {
    ///         *state += 1;
    ///         smallvec![Effect::None]
    ///     }
    /// }
    ///
    /// let mut count = 0;
    /// Counter.reduce(&mut count, (), &());
    /// assert_eq!(count, 1);
    /// ```
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// This is a pure function that:
        /// 1. Validates the action
        /// 2. Updates state in place
        /// 3. Returns effect descriptions to be executed
        ///
        /// Most actions produce at most four effects, so they stay on the
        /// stack.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values, not actions. Reducers return them; whoever drove the
/// reducer decides when to run them.
pub mod effect {
    use futures::future::{BoxFuture, join_all};
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// # Type Parameters
    ///
    /// - `Action`: The action type that effects can produce (feedback loop)
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Run effects sequentially
        Sequential(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is handed back to
        /// the caller of [`Effect::execute`]
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action>
    where
        Action: std::fmt::Debug,
    {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                }
                Effect::Sequential(effects) => {
                    f.debug_tuple("Effect::Sequential").field(effects).finish()
                }
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Chain effects to run sequentially
        #[must_use]
        pub const fn chain(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Sequential(effects)
        }
    }

    impl<Action> Effect<Action>
    where
        Action: Send + 'static,
    {
        /// Runs the effect to completion and returns any actions it produced.
        pub fn execute(self) -> BoxFuture<'static, Vec<Action>> {
            Box::pin(async move {
                match self {
                    Effect::None => Vec::new(),
                    Effect::Future(fut) => fut.await.into_iter().collect(),
                    Effect::Sequential(effects) => {
                        let mut produced = Vec::new();
                        for effect in effects {
                            produced.extend(effect.execute().await);
                        }
                        produced
                    }
                    Effect::Parallel(effects) => join_all(effects.into_iter().map(Effect::execute))
                        .await
                        .into_iter()
                        .flatten()
                        .collect(),
                }
            })
        }
    }
}

/// Environment module - Dependency injection traits
///
/// All time-dependent logic takes a `Clock` from its environment instead of
/// calling `Utc::now()` directly.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use seated_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
