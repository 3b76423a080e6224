use lazy_static::lazy_static;
use std::sync::{Arc, Mutex};

/// `EventListener` observes the pipeline's named events. Every hook carries
/// the identifier of the service it happened on.
///
/// `on_fuse_blown` and `on_fuse_ok` fire on state transitions only;
/// `on_fuse_melt` fires for every recorded failure and `on_rate_limited`
/// for every deferred admission. All hooks default to no-ops, so a sink
/// implements only what it cares about.
pub trait EventListener: Send + Sync {
    /// A fuse transitioned back to Ok, by refresh or by explicit reset.
    fn on_fuse_ok(&self, _service: &str) {}

    /// A failure was recorded against the service's fuse.
    fn on_fuse_melt(&self, _service: &str) {}

    /// The failure threshold was crossed and the fuse blew.
    fn on_fuse_blown(&self, _service: &str) {}

    /// An admission was deferred by the service's rate limiter.
    fn on_rate_limited(&self, _service: &str) {}
}

lazy_static! {
    static ref EVENT_LISTENERS: Mutex<Vec<Arc<dyn EventListener>>> = Mutex::new(Vec::new());
}

/// Register sinks for the pipeline's events. Listeners are process-wide and
/// are invoked in registration order.
pub fn register_event_listeners(listeners: Vec<Arc<dyn EventListener>>) {
    EVENT_LISTENERS.lock().unwrap().extend(listeners);
}

pub fn clear_event_listeners() {
    EVENT_LISTENERS.lock().unwrap().clear();
}

pub(crate) fn emit_fuse_ok(service: &str) {
    for listener in &*EVENT_LISTENERS.lock().unwrap() {
        listener.on_fuse_ok(service);
    }
}

pub(crate) fn emit_fuse_melt(service: &str) {
    for listener in &*EVENT_LISTENERS.lock().unwrap() {
        listener.on_fuse_melt(service);
    }
}

pub(crate) fn emit_fuse_blown(service: &str) {
    for listener in &*EVENT_LISTENERS.lock().unwrap() {
        listener.on_fuse_blown(service);
    }
}

pub(crate) fn emit_rate_limited(service: &str) {
    for listener in &*EVENT_LISTENERS.lock().unwrap() {
        listener.on_rate_limited(service);
    }
}

#[cfg(test)]
pub(crate) use test::CountingListener;

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use mockall::mock;
    use std::sync::atomic::{AtomicU32, Ordering};

    mock! {
        pub(crate) Listener {}
        impl EventListener for Listener {
            fn on_fuse_ok(&self, service: &str);
            fn on_fuse_melt(&self, service: &str);
            fn on_fuse_blown(&self, service: &str);
            fn on_rate_limited(&self, service: &str);
        }
    }

    /// Listener that counts events for a single service, ignoring traffic
    /// from tests running in parallel.
    pub(crate) struct CountingListener {
        service: &'static str,
        pub ok: AtomicU32,
        pub melts: AtomicU32,
        pub blown: AtomicU32,
        pub rate_limited: AtomicU32,
    }

    impl CountingListener {
        pub(crate) fn new(service: &'static str) -> Self {
            CountingListener {
                service,
                ok: AtomicU32::new(0),
                melts: AtomicU32::new(0),
                blown: AtomicU32::new(0),
                rate_limited: AtomicU32::new(0),
            }
        }
    }

    impl EventListener for CountingListener {
        fn on_fuse_ok(&self, service: &str) {
            if service == self.service {
                self.ok.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_fuse_melt(&self, service: &str) {
            if service == self.service {
                self.melts.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_fuse_blown(&self, service: &str) {
            if service == self.service {
                self.blown.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn on_rate_limited(&self, service: &str) {
            if service == self.service {
                self.rate_limited.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn listeners_receive_emitted_events() {
        let melts = Arc::new(AtomicU32::new(0));
        let blown = Arc::new(AtomicU32::new(0));

        let mut listener = MockListener::new();
        let counter = Arc::clone(&melts);
        listener.expect_on_fuse_melt().returning(move |service| {
            if service == "event_emit_svc" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        let counter = Arc::clone(&blown);
        listener.expect_on_fuse_blown().returning(move |service| {
            if service == "event_emit_svc" {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        listener.expect_on_fuse_ok().returning(|_| {});
        listener.expect_on_rate_limited().returning(|_| {});
        register_event_listeners(vec![Arc::new(listener)]);

        emit_fuse_melt("event_emit_svc");
        emit_fuse_melt("event_emit_svc");
        emit_fuse_blown("event_emit_svc");
        emit_fuse_ok("other_svc");

        assert_eq!(melts.load(Ordering::SeqCst), 2);
        assert_eq!(blown.load(Ordering::SeqCst), 1);
    }
}
