use futures::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long an upstream keeps running after its last subscriber leaves.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(5000);

type Upstream<T> = Box<dyn Fn() -> BoxStream<'static, T> + Send + Sync>;

/// A hot, replaying view over a cold stream.
///
/// The upstream stream is built and collected only while someone is
/// subscribed: the first subscriber starts it, and once the last one leaves
/// it keeps running for `grace` before being stopped. A subscriber arriving
/// inside that window cancels the stop. The last emitted value survives
/// restarts, so a new subscriber never sees the initial value again once
/// anything has been collected.
pub struct SharedState<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SharedState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<T> {
    value: Arc<watch::Sender<T>>,
    upstream: Upstream<T>,
    grace: Duration,
    control: Mutex<Control>,
}

#[derive(Default)]
struct Control {
    subscribers: usize,
    /// Bumped on every subscribe and on every last-unsubscribe; a pending
    /// stop only fires if the epoch it captured is still current.
    epoch: u64,
    collector: Option<JoinHandle<()>>,
}

fn lock(control: &Mutex<Control>) -> MutexGuard<'_, Control> {
    control.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> SharedState<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(initial: T, grace: Duration, upstream: F) -> Self
    where
        F: Fn() -> BoxStream<'static, T> + Send + Sync + 'static,
    {
        let (value, _) = watch::channel(initial);
        Self {
            inner: Arc::new(Inner {
                value: Arc::new(value),
                upstream: Box::new(upstream),
                grace,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Subscribe, starting the upstream if it is not already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self) -> Subscription<T> {
        let mut control = lock(&self.inner.control);
        control.subscribers += 1;
        control.epoch = control.epoch.wrapping_add(1);

        let running = control
            .collector
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if !running {
            control.collector = Some(self.start_collector());
        }
        drop(control);

        Subscription {
            rx: self.inner.value.subscribe(),
            owner: Arc::clone(&self.inner),
        }
    }

    /// Latest value, without subscribing.
    pub fn current(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Whether the upstream is currently being collected.
    pub fn is_active(&self) -> bool {
        lock(&self.inner.control)
            .collector
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    fn start_collector(&self) -> JoinHandle<()> {
        let mut stream = (self.inner.upstream)();
        let value = Arc::clone(&self.inner.value);
        tracing::trace!("Starting shared state upstream");
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                value.send_replace(next);
            }
        })
    }
}

impl<T: Send + Sync + 'static> Inner<T> {
    fn release(self: &Arc<Self>) {
        let mut control = lock(&self.control);
        control.subscribers = control.subscribers.saturating_sub(1);
        if control.subscribers > 0 {
            return;
        }
        control.epoch = control.epoch.wrapping_add(1);
        let epoch = control.epoch;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // No runtime left to wait out the grace period on.
            if let Some(task) = control.collector.take() {
                task.abort();
            }
            return;
        };
        drop(control);

        let owner = Arc::clone(self);
        runtime.spawn(async move {
            tokio::time::sleep(owner.grace).await;
            let mut control = lock(&owner.control);
            if control.subscribers == 0 && control.epoch == epoch {
                if let Some(task) = control.collector.take() {
                    task.abort();
                    tracing::trace!("Stopped idle shared state upstream");
                }
            }
        });
    }
}

/// A live handle on a [`SharedState`]. Dropping it unsubscribes.
pub struct Subscription<T: Send + Sync + 'static> {
    rx: watch::Receiver<T>,
    owner: Arc<Inner<T>>,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Wait for the next value and return it.
    pub async fn changed(&mut self) -> T {
        // The sender lives in `owner`, so the channel cannot close under us.
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }
}

impl<T: Send + Sync + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.owner.release();
    }
}
