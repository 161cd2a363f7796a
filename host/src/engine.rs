//! # Event Dispatch Engine
//!
//! One worker thread owns the table of `(event id, queue, handler)` bindings
//! and runs handlers outside the producers' context.
//!
//! ## Flow
//!
//! ```text
//! producer thread                         worker thread
//! ───────────────                         ─────────────
//! register_event ─► registration queue ─► adopt (head insertion)
//!      ▲                                        │
//!      └──────────── oneshot reply ◄────────────┘
//!
//! queue.push(item)
//! signal.notify() ──► EVENT bit ────────► walk bindings, one item each,
//!                                         repeat until every queue is empty
//! ```
//!
//! Only the worker ever touches the binding table. A slow or panicking
//! handler stalls every other binding: handlers run one at a time on the
//! worker, with no isolation between them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use log::{debug, info, warn};
use nwp_shared::Queue;
use tokio::sync::oneshot;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::flags::{EventFlags, EVENT, REGISTER, TERMINATE, TERMINATE_ACK};
use crate::queue::EventQueue;

/// Compiled capacity of the binding table
pub const MAX_BINDINGS: usize = 32;

/// Registration requests that may wait for the worker at once
pub const REGISTRATION_CAPACITY: usize = 16;

/// Event identifier passed to handlers
pub type EventId = u32;

/// Engine lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Running,
    Terminating,
}

/// A binding with its item type erased
trait Dispatch: Send {
    fn event_id(&self) -> EventId;

    /// Deliver at most one item to the handler; true if one was delivered
    fn dispatch_one(&mut self) -> bool;

    fn has_pending(&self) -> bool;

    /// Pass every undelivered item to the release function
    fn release_all(&mut self) -> usize;
}

struct Binding<T, H, R, const N: usize> {
    event_id: EventId,
    queue: EventQueue<T, N>,
    handler: H,
    release: R,
}

impl<T, H, R, const N: usize> Dispatch for Binding<T, H, R, N>
where
    T: Send,
    H: FnMut(EventId, T) + Send,
    R: FnMut(T) + Send,
{
    fn event_id(&self) -> EventId {
        self.event_id
    }

    fn dispatch_one(&mut self) -> bool {
        // The queue lock is released before the handler runs.
        match self.queue.pop() {
            Ok(item) => {
                (self.handler)(self.event_id, item);
                true
            }
            Err(_) => false,
        }
    }

    fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    fn release_all(&mut self) -> usize {
        self.queue.flush(&mut self.release)
    }
}

type Bindings = Queue<Box<dyn Dispatch>, MAX_BINDINGS>;

/// Worker's answer to a registration request
enum Adoption {
    Adopted,
    /// The binding is handed back so the requester frees it
    Rejected(Box<dyn Dispatch>),
}

struct Registration {
    binding: Box<dyn Dispatch>,
    reply: oneshot::Sender<Adoption>,
}

/// State shared by the engine handle, the worker and every [`EventSignal`]
struct Shared {
    flags: EventFlags,
    registrations: Mutex<Queue<Registration, REGISTRATION_CAPACITY>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            flags: EventFlags::new(),
            registrations: Mutex::new(Queue::new()),
        }
    }

    fn registrations(&self) -> MutexGuard<'_, Queue<Registration, REGISTRATION_CAPACITY>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle used by producers to wake the worker after queueing items
#[derive(Clone)]
pub struct EventSignal {
    shared: Arc<Shared>,
}

impl EventSignal {
    /// Raise the async-event bit
    pub fn notify(&self) {
        self.shared.flags.set(EVENT);
    }
}

impl std::fmt::Debug for EventSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSignal")
            .field("flags", &self.shared.flags.get())
            .finish()
    }
}

struct Worker {
    handle: JoinHandle<Bindings>,
    thread_id: ThreadId,
}

/// Asynchronous event dispatch engine
///
/// # Example
///
/// ```no_run
/// use nwp_host::{EngineConfig, EventEngine, EventQueue};
///
/// let mut engine = EventEngine::new(EngineConfig::default());
/// let signal = engine.init()?;
///
/// let events: EventQueue<String> = EventQueue::new();
/// engine.register_event(&events, 7, |id, msg: String| println!("event {id}: {msg}"))?;
///
/// events.push("link up".to_string()).ok();
/// signal.notify();
///
/// engine.deinit()?;
/// # Ok::<(), nwp_host::EngineError>(())
/// ```
pub struct EventEngine {
    config: EngineConfig,
    state: EngineState,
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl EventEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            state: EngineState::Uninitialized,
            shared: Arc::new(Shared::new()),
            worker: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Signal handle of the running engine
    pub fn signal(&self) -> Option<EventSignal> {
        match self.state {
            EngineState::Running => Some(EventSignal {
                shared: Arc::clone(&self.shared),
            }),
            _ => None,
        }
    }

    fn worker_finished(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.handle.is_finished())
    }

    /// Start the worker thread
    ///
    /// Creates a fresh flag word and registration queue, so handles from a
    /// previous run do not reach the new worker.
    pub fn init(&mut self) -> Result<EventSignal, EngineError> {
        if self.state != EngineState::Uninitialized {
            return Err(EngineError::AlreadyRunning);
        }
        self.config.validate()?;

        let shared = Arc::new(Shared::new());
        let handle = {
            let shared = Arc::clone(&shared);
            let max_bindings = self.config.max_bindings;
            let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
            if let Some(size) = self.config.stack_size {
                builder = builder.stack_size(size);
            }
            builder.spawn(move || run(&shared, max_bindings))?
        };

        self.worker = Some(Worker {
            thread_id: handle.thread().id(),
            handle,
        });
        self.shared = shared;
        self.state = EngineState::Running;
        info!("dispatch engine started on thread '{}'", self.config.thread_name);

        Ok(EventSignal {
            shared: Arc::clone(&self.shared),
        })
    }

    /// Stop the worker and release every binding
    ///
    /// Waits up to `shutdown_timeout_ms` for the worker to acknowledge. On
    /// timeout the engine stays `Terminating` and `deinit` may be called
    /// again. On success every undelivered item is passed to its binding's
    /// release function and the number released is returned. Registration
    /// requests still waiting are answered with [`EngineError::Shutdown`].
    ///
    /// A worker that died in a panicking handler never acknowledges; it is
    /// joined, the engine returns to `Uninitialized` and
    /// [`EngineError::WorkerPanicked`] is reported. Its bindings are lost.
    pub fn deinit(&mut self) -> Result<usize, EngineError> {
        if self.state == EngineState::Uninitialized || self.worker.is_none() {
            return Err(EngineError::NotRunning);
        }

        self.state = EngineState::Terminating;
        self.shared.flags.set(TERMINATE);
        let acked = if self.worker_finished() {
            0
        } else {
            self.shared
                .flags
                .wait_any(TERMINATE_ACK, Some(self.config.shutdown_timeout()))
        };
        if acked == 0 && !self.worker_finished() {
            warn!(
                "dispatch worker did not stop within {} ms",
                self.config.shutdown_timeout_ms
            );
            return Err(EngineError::ShutdownTimeout(self.config.shutdown_timeout_ms));
        }

        let worker = self.worker.take().ok_or(EngineError::NotRunning)?;
        self.state = EngineState::Uninitialized;
        // Dropping the queued requests drops their reply senders.
        let abandoned = self.shared.registrations().flush_all(drop);
        if abandoned > 0 {
            warn!("{} registration(s) abandoned at shutdown", abandoned);
        }

        let mut bindings = worker.handle.join().map_err(|_| {
            warn!("dispatch worker panicked, bindings lost");
            EngineError::WorkerPanicked
        })?;
        let mut released = 0;
        let count = bindings.deinit(|mut binding| {
            let n = binding.release_all();
            debug!("released {} item(s) from binding for event {}", n, binding.event_id());
            released += n;
        });
        info!(
            "dispatch engine stopped: {} binding(s), {} undelivered item(s)",
            count, released
        );
        Ok(released)
    }

    /// Bind `handler` to `event_id`, draining `queue`
    ///
    /// Blocks until the worker adopts or rejects the binding. Undelivered
    /// items are dropped at shutdown.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotRunning`] if the engine has not been started
    /// - [`EngineError::OnWorkerThread`] when called from a handler
    /// - [`EngineError::RegistrationQueueFull`] if too many requests are waiting
    /// - [`EngineError::Rejected`] once `max_bindings` bindings exist
    /// - [`EngineError::WorkerPanicked`] if a handler took the worker down
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async runtime, since it blocks the
    /// current thread.
    pub fn register_event<T, H, const N: usize>(
        &self,
        queue: &EventQueue<T, N>,
        event_id: EventId,
        handler: H,
    ) -> Result<(), EngineError>
    where
        T: Send + 'static,
        H: FnMut(EventId, T) + Send + 'static,
    {
        self.register_event_with_release(queue, event_id, handler, drop)
    }

    /// Like [`register_event`](Self::register_event), but undelivered items
    /// are handed to `release` at shutdown
    pub fn register_event_with_release<T, H, R, const N: usize>(
        &self,
        queue: &EventQueue<T, N>,
        event_id: EventId,
        handler: H,
        release: R,
    ) -> Result<(), EngineError>
    where
        T: Send + 'static,
        H: FnMut(EventId, T) + Send + 'static,
        R: FnMut(T) + Send + 'static,
    {
        let worker = match (&self.worker, self.state) {
            (Some(worker), EngineState::Running) => worker,
            _ => return Err(EngineError::NotRunning),
        };
        if thread::current().id() == worker.thread_id {
            return Err(EngineError::OnWorkerThread);
        }
        if worker.handle.is_finished() {
            return Err(EngineError::WorkerPanicked);
        }

        let (reply, answer) = oneshot::channel();
        let request = Registration {
            binding: Box::new(Binding {
                event_id,
                queue: queue.clone(),
                handler,
                release,
            }),
            reply,
        };
        if self.shared.registrations().enqueue(request).is_err() {
            warn!("registration queue full, event {} not bound", event_id);
            return Err(EngineError::RegistrationQueueFull);
        }
        self.shared.flags.set(REGISTER);

        match answer.blocking_recv() {
            Ok(Adoption::Adopted) => {
                debug!("bound handler for event {}", event_id);
                Ok(())
            }
            Ok(Adoption::Rejected(binding)) => {
                drop(binding);
                Err(EngineError::Rejected { event_id })
            }
            Err(_) => Err(EngineError::Shutdown),
        }
    }
}

impl Drop for EventEngine {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.deinit() {
                warn!("dispatch engine shutdown on drop failed: {}", e);
            }
        }
    }
}

/// Worker thread body; returns the binding table on exit
fn run(shared: &Shared, max_bindings: usize) -> Bindings {
    let mut bindings = Bindings::new();
    debug!("dispatch worker running");
    loop {
        let bits = shared.flags.wait_any(TERMINATE | REGISTER | EVENT, None);

        if bits & TERMINATE != 0 {
            debug!("dispatch worker terminating");
            shared.flags.set(TERMINATE_ACK);
            return bindings;
        }
        if bits & REGISTER != 0 {
            adopt(shared, &mut bindings, max_bindings);
        }
        if bits & EVENT != 0 {
            dispatch(&mut bindings);
        }
    }
}

/// Drain the registration queue into the binding table
fn adopt(shared: &Shared, bindings: &mut Bindings, max_bindings: usize) {
    loop {
        let next = shared.registrations().dequeue();
        let Ok(Registration { binding, reply }) = next else {
            break;
        };
        let event_id = binding.event_id();
        let answer = if bindings.len() >= max_bindings {
            warn!("binding table full, rejecting event {}", event_id);
            Adoption::Rejected(binding)
        } else {
            match bindings.enqueue_head(binding) {
                Ok(()) => Adoption::Adopted,
                Err(binding) => Adoption::Rejected(binding),
            }
        };
        // The requester may have gone away; a rejected binding is then
        // dropped here instead.
        let _ = reply.send(answer);
    }
}

/// Deliver one item per binding per pass until every queue is empty
fn dispatch(bindings: &mut Bindings) {
    loop {
        let mut pending = false;
        bindings.for_each_mut(|binding| {
            binding.dispatch_one();
            pending |= binding.has_pending();
        });
        if !pending {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn started() -> (EventEngine, EventSignal) {
        let mut engine = EventEngine::new(EngineConfig::default());
        let signal = engine.init().unwrap();
        (engine, signal)
    }

    #[test]
    fn test_handler_receives_items_in_order() {
        let (mut engine, signal) = started();
        let queue: EventQueue<u32> = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        engine
            .register_event(&queue, 7, move |id, item| {
                counter.fetch_add(1, Ordering::SeqCst);
                tx.send((id, item)).unwrap();
            })
            .unwrap();

        for item in [10, 20, 30] {
            queue.push(item).unwrap();
        }
        signal.notify();

        let got: Vec<(EventId, u32)> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, [(7, 10), (7, 20), (7, 30)]);
        assert_eq!(engine.deinit().unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_register_requires_running_engine() {
        let engine = EventEngine::new(EngineConfig::default());
        let queue: EventQueue<u8> = EventQueue::new();
        let err = engine.register_event(&queue, 1, |_, _| {}).unwrap_err();
        assert!(matches!(err, EngineError::NotRunning));
    }

    #[test]
    fn test_rejected_registration_frees_handler() {
        let config = EngineConfig {
            max_bindings: 1,
            ..EngineConfig::default()
        };
        let mut engine = EventEngine::new(config);
        engine.init().unwrap();
        let queue: EventQueue<u8> = EventQueue::new();

        engine.register_event(&queue, 1, |_, _| {}).unwrap();

        let token = Arc::new(());
        let held = token.clone();
        let err = engine
            .register_event(&queue, 2, move |_, _| {
                let _ = &held;
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::Rejected { event_id: 2 }));
        assert_eq!(Arc::strong_count(&token), 1);
        engine.deinit().unwrap();
    }

    #[test]
    fn test_deinit_requires_running_engine() {
        let mut engine = EventEngine::new(EngineConfig::default());
        assert!(matches!(engine.deinit(), Err(EngineError::NotRunning)));

        engine.init().unwrap();
        assert!(matches!(engine.init(), Err(EngineError::AlreadyRunning)));
        engine.deinit().unwrap();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(engine.deinit(), Err(EngineError::NotRunning)));
    }

    #[test]
    fn test_deinit_releases_undelivered_items() {
        let (mut engine, _signal) = started();
        let queue: EventQueue<u32> = EventQueue::new();
        let released = Arc::new(Mutex::new(Vec::new()));
        let sink = released.clone();

        engine
            .register_event_with_release(&queue, 3, |_, _| {}, move |item| {
                sink.lock().unwrap().push(item);
            })
            .unwrap();
        queue.push(1).unwrap();
        queue.push(2).unwrap();

        // No notify: items are still queued at shutdown.
        assert_eq!(engine.deinit().unwrap(), 2);
        assert_eq!(*released.lock().unwrap(), [1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_bindings_walked_most_recent_first() {
        let (mut engine, signal) = started();
        let (tx, rx) = mpsc::channel();
        let first: EventQueue<&'static str> = EventQueue::new();
        let second: EventQueue<&'static str> = EventQueue::new();

        let tx1 = tx.clone();
        engine
            .register_event(&first, 1, move |id, item| tx1.send((id, item)).unwrap())
            .unwrap();
        engine
            .register_event(&second, 2, move |id, item| tx.send((id, item)).unwrap())
            .unwrap();

        first.push("a1").unwrap();
        first.push("a2").unwrap();
        second.push("b1").unwrap();
        signal.notify();

        let got: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, [(2, "b1"), (1, "a1"), (1, "a2")]);
        engine.deinit().unwrap();
    }

    #[test]
    fn test_burst_drained_with_single_notify() {
        let (mut engine, signal) = started();
        let queue: EventQueue<usize, 128> = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        engine
            .register_event(&queue, 9, move |_, item| tx.send(item).unwrap())
            .unwrap();

        for i in 0..100 {
            queue.push(i).unwrap();
        }
        signal.notify();

        let got: Vec<usize> = (0..100).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert_eq!(got, (0..100).collect::<Vec<_>>());
        engine.deinit().unwrap();
    }

    #[test]
    fn test_register_from_other_thread() {
        let (mut engine, signal) = started();
        let queue: EventQueue<u8> = EventQueue::new();
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            let engine = &engine;
            let queue = &queue;
            scope
                .spawn(move || engine.register_event(queue, 5, move |_, item| tx.send(item).unwrap()))
                .join()
                .unwrap()
                .unwrap();
        });

        queue.push(8).unwrap();
        signal.notify();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 8);
        engine.deinit().unwrap();
    }

    #[test]
    fn test_register_from_handler_is_refused() {
        let engine = Arc::new(Mutex::new(EventEngine::new(EngineConfig::default())));
        let signal = engine.lock().unwrap().init().unwrap();
        let queue: EventQueue<u8> = EventQueue::new();
        let (tx, rx) = mpsc::channel();

        let inner = engine.clone();
        engine
            .lock()
            .unwrap()
            .register_event(&queue, 4, move |_, _| {
                let nested: EventQueue<u8> = EventQueue::new();
                let result = inner.lock().unwrap().register_event(&nested, 5, |_, _| {});
                tx.send(matches!(result, Err(EngineError::OnWorkerThread))).unwrap();
            })
            .unwrap();

        queue.push(0).unwrap();
        signal.notify();
        assert!(rx.recv_timeout(WAIT).unwrap());
        engine.lock().unwrap().deinit().unwrap();
    }

    #[test]
    fn test_reinit_after_deinit() {
        let (mut engine, old_signal) = started();
        engine.deinit().unwrap();

        let signal = engine.init().unwrap();
        let queue: EventQueue<u8> = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        engine
            .register_event(&queue, 1, move |_, item| tx.send(item).unwrap())
            .unwrap();
        queue.push(42).unwrap();

        // The old handle no longer reaches the worker.
        old_signal.notify();
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        signal.notify();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 42);
        engine.deinit().unwrap();
    }

    /// Binding whose handler parks on `gate` until the sender is dropped
    fn gated_binding(
        engine: &EventEngine,
        queue: &EventQueue<u8>,
        token: Arc<()>,
    ) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered) = mpsc::channel();
        let (gate_tx, gate) = mpsc::channel::<()>();
        engine
            .register_event(queue, 1, move |_, _| {
                let _ = &token;
                entered_tx.send(()).ok();
                let _ = gate.recv();
            })
            .unwrap();
        (entered, gate_tx)
    }

    #[test]
    fn test_panicking_handler_reported_at_deinit() {
        let config = EngineConfig {
            shutdown_timeout_ms: 200,
            ..EngineConfig::default()
        };
        let mut engine = EventEngine::new(config);
        let signal = engine.init().unwrap();
        let queue: EventQueue<u8> = EventQueue::new();
        let (tx, rx) = mpsc::channel();
        engine
            .register_event(&queue, 1, move |_, _| {
                tx.send(()).unwrap();
                panic!("handler failure");
            })
            .unwrap();

        queue.push(0).unwrap();
        signal.notify();
        rx.recv_timeout(WAIT).unwrap();

        assert!(matches!(engine.deinit(), Err(EngineError::WorkerPanicked)));
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(matches!(engine.deinit(), Err(EngineError::NotRunning)));

        // The engine can be started again.
        let signal = engine.init().unwrap();
        let (tx, rx) = mpsc::channel();
        engine
            .register_event(&queue, 2, move |_, item| tx.send(item).unwrap())
            .unwrap();
        queue.push(5).unwrap();
        signal.notify();
        assert_eq!(rx.recv_timeout(WAIT).unwrap(), 5);
        engine.deinit().unwrap();
    }

    #[test]
    fn test_deinit_times_out_while_handler_blocks() {
        let config = EngineConfig {
            shutdown_timeout_ms: 100,
            ..EngineConfig::default()
        };
        let mut engine = EventEngine::new(config);
        let signal = engine.init().unwrap();
        let queue: EventQueue<u8> = EventQueue::new();
        let token = Arc::new(());
        let (entered, gate) = gated_binding(&engine, &queue, token.clone());

        queue.push(0).unwrap();
        signal.notify();
        entered.recv_timeout(WAIT).unwrap();

        assert!(matches!(engine.deinit(), Err(EngineError::ShutdownTimeout(100))));
        assert_eq!(engine.state(), EngineState::Terminating);
        assert!(engine.signal().is_none());

        drop(gate);
        assert_eq!(engine.deinit().unwrap(), 0);
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn test_full_registration_queue_is_no_more_resource() {
        let (mut engine, signal) = started();
        let queue: EventQueue<u8> = EventQueue::new();
        let (entered, gate) = gated_binding(&engine, &queue, Arc::new(()));
        queue.push(0).unwrap();
        signal.notify();
        entered.recv_timeout(WAIT).unwrap();

        let engine_ref = &engine;
        thread::scope(|scope| {
            let waiting: Vec<_> = (0..REGISTRATION_CAPACITY as EventId)
                .map(|id| {
                    let queue = &queue;
                    scope.spawn(move || engine_ref.register_event(queue, 100 + id, |_, _| {}))
                })
                .collect();
            while engine_ref.shared.registrations().len() < REGISTRATION_CAPACITY {
                thread::sleep(Duration::from_millis(1));
            }

            let token = Arc::new(());
            let held = token.clone();
            let err = engine_ref
                .register_event(&queue, 99, move |_, _| {
                    let _ = &held;
                })
                .unwrap_err();
            assert!(matches!(err, EngineError::RegistrationQueueFull));
            assert_eq!(err.status(), nwp_shared::LinkError::NoMoreResource);
            assert_eq!(Arc::strong_count(&token), 1);

            drop(gate);
            for handle in waiting {
                handle.join().unwrap().unwrap();
            }
        });
        engine.deinit().unwrap();
    }

    #[test]
    fn test_drop_stops_worker() {
        let queue: EventQueue<u8> = EventQueue::new();
        let released = Arc::new(AtomicUsize::new(0));
        {
            let (engine, _signal) = started();
            let count = released.clone();
            engine
                .register_event_with_release(&queue, 1, |_, _| {}, move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            queue.push(1).unwrap();
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
