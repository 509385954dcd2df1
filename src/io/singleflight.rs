//! Single-flight execution of keyed work.
//!
//! Concurrent callers asking for the same key share one run of the work.
//! The leader's slot is released by a drop guard, so a leader cancelled
//! mid-flight wakes its waiters and one of them takes over.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

enum FlightState<V> {
    Running,
    Done(V),
    Abandoned,
}

struct Flight<V> {
    notify: Notify,
    state: Mutex<FlightState<V>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<V: Clone> Flight<V> {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            state: Mutex::new(FlightState::Running),
        }
    }

    /// `Some(Some(v))` once done, `Some(None)` if the leader went away.
    fn outcome(&self) -> Option<Option<V>> {
        match &*lock(&self.state) {
            FlightState::Running => None,
            FlightState::Done(value) => Some(Some(value.clone())),
            FlightState::Abandoned => Some(None),
        }
    }

    /// Wait for the leader. `None` means the caller should try again.
    async fn wait(&self) -> Option<V> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(outcome) = self.outcome() {
            return outcome;
        }
        notified.await;
        self.outcome().flatten()
    }
}

type Flights<K, V> = Mutex<HashMap<K, Arc<Flight<V>>>>;

/// Releases the leader's slot when the work finishes or is dropped.
struct LeaderGuard<'a, K: Eq + Hash, V> {
    flights: &'a Flights<K, V>,
    key: K,
    flight: Arc<Flight<V>>,
}

impl<K: Eq + Hash, V> Drop for LeaderGuard<'_, K, V> {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.flight.state);
            if matches!(*state, FlightState::Running) {
                *state = FlightState::Abandoned;
            }
        }
        {
            let mut flights = lock(self.flights);
            if flights
                .get(&self.key)
                .is_some_and(|flight| Arc::ptr_eq(flight, &self.flight))
            {
                flights.remove(&self.key);
            }
        }
        self.flight.notify.notify_waiters();
    }
}

/// Deduplicates concurrent work per key.
pub(crate) struct SingleFlight<K, V> {
    flights: Flights<K, V>,
}

impl<K: Eq + Hash + Clone, V: Clone> SingleFlight<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `work` for `key`, or wait for the run already in flight.
    ///
    /// Results are not kept once the flight lands; callers cache them.
    pub(crate) async fn run<F, Fut>(&self, key: &K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let flight = loop {
            let waiting = {
                let mut flights = lock(&self.flights);
                match flights.get(key) {
                    Some(flight) => flight.clone(),
                    None => {
                        let flight = Arc::new(Flight::new());
                        flights.insert(key.clone(), flight.clone());
                        break flight;
                    }
                }
            };
            if let Some(value) = waiting.wait().await {
                return value;
            }
        };

        let guard = LeaderGuard {
            flights: &self.flights,
            key: key.clone(),
            flight,
        };
        let value = work().await;
        *lock(&guard.flight.state) = FlightState::Done(value.clone());
        drop(guard);
        value
    }

    #[cfg(test)]
    fn in_flight(&self) -> usize {
        lock(&self.flights).len()
    }
}
