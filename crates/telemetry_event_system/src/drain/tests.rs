//! Tests for the drain coordinator

#[cfg(test)]
mod tests {
    use crate::drain::{DrainCoordinator, FeaturePriority};
    use crate::emitter::{listener, EventEmitter, GroupState};
    use crate::error::DrainError;
    use crate::events::EventArgs;
    use crate::handle::handle;
    use crate::registry::HandlerRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    struct Fixture {
        root: Arc<EventEmitter>,
        handlers: Arc<HandlerRegistry>,
        drains: DrainCoordinator,
    }

    fn fixture(priority: FeaturePriority) -> Fixture {
        let root = EventEmitter::root();
        let handlers = Arc::new(HandlerRegistry::new());
        let drains = DrainCoordinator::new(root.clone(), handlers.clone(), priority);
        Fixture { root, handlers, drains }
    }

    fn value(n: i64) -> Arc<EventArgs> {
        EventArgs::Values { values: vec![serde_json::json!(n)] }.shared()
    }

    fn record_into(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> crate::emitter::Listener {
        let log = log.clone();
        listener(move |_, args| {
            if let EventArgs::Values { values } = args.as_ref() {
                log.lock().unwrap().push(format!("{tag}:{}", values[0]));
            }
        })
    }

    #[test]
    fn test_no_loss_while_buffering() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        scope.buffer(&["err"], Some("jserrors"));

        let emitted: Vec<_> = (0..5).map(value).collect();
        for args in &emitted {
            scope.emit("err", args.clone(), None);
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.handlers.register_handler(
            "err",
            listener(move |_, args| sink.lock().unwrap().push(args.clone())),
            Some("jserrors"),
            &scope,
        );
        f.drains.register_drain("agent", "jserrors").unwrap();
        f.drains.drain("agent", "jserrors", false).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), emitted.len());
        for (got, sent) in seen.iter().zip(&emitted) {
            assert!(Arc::ptr_eq(got, sent));
        }
        assert_eq!(scope.backlog().state("jserrors"), GroupState::Drained);
    }

    #[test]
    fn test_gate_waits_for_all_groups_and_flushes_by_priority() {
        let f = fixture(FeaturePriority::from_ranks([("g1", 1), ("g2", 0)]));
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["e1"], Some("g1"));
        scope.buffer(&["e2"], Some("g2"));
        scope.emit("e1", value(1), None);
        scope.emit("e2", value(2), None);

        f.handlers.register_handler("e1", record_into(&log, "g1"), Some("g1"), &scope);
        f.handlers.register_handler("e2", record_into(&log, "g2"), Some("g2"), &scope);
        f.drains.register_drain("agent", "g1").unwrap();
        f.drains.register_drain("agent", "g2").unwrap();

        f.drains.drain("agent", "g1", false).unwrap();
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(scope.backlog().state("g1"), GroupState::Buffering(1));

        f.drains.drain("agent", "g2", false).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["g2:2", "g1:1"]);
        assert!(f.drains.pending_groups("agent").is_empty());
    }

    #[test]
    fn test_drain_is_idempotent() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["err"], None);
        scope.emit("err", value(1), None);
        f.handlers.register_handler("err", record_into(&log, "h"), None, &scope);

        f.drains.drain("agent", "feature", false).unwrap();
        f.drains.drain("agent", "feature", false).unwrap();
        assert_eq!(log.lock().unwrap().len(), 1);

        // Drained handlers are now live listeners, attached exactly once.
        scope.emit("err", value(2), None);
        assert_eq!(*log.lock().unwrap(), vec!["h:1", "h:2"]);
    }

    #[test]
    fn test_unregistered_group_drains_immediately() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        f.drains.register_drain("agent", "ajax").unwrap();
        scope.buffer(&["api-call"], Some("api"));
        scope.emit("api-call", value(7), None);
        f.handlers.register_handler("api-call", record_into(&log, "api"), Some("api"), &scope);

        f.drains.drain("agent", "api", false).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["api:7"]);
        assert_eq!(f.drains.pending_groups("agent").len(), 1);
    }

    #[test]
    fn test_force_drains_single_group() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        f.drains.register_drain("agent", "ajax").unwrap();
        f.drains.register_drain("agent", "jserrors").unwrap();
        scope.buffer(&["xhr"], Some("ajax"));
        scope.emit("xhr", value(3), None);
        f.handlers.register_handler("xhr", record_into(&log, "ajax"), Some("ajax"), &scope);

        f.drains.drain("agent", "ajax", true).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["ajax:3"]);
        assert_eq!(f.drains.pending_groups("agent"), vec!["jserrors"]);
    }

    #[test]
    fn test_deregister_unblocks_gate_and_discards_handlers() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["err"], Some("jserrors"));
        scope.buffer(&["xhr"], Some("ajax"));
        scope.emit("err", value(1), None);
        scope.emit("xhr", value(2), None);
        f.handlers.register_handler("err", record_into(&log, "err"), Some("jserrors"), &scope);
        f.handlers.register_handler("xhr", record_into(&log, "xhr"), Some("ajax"), &scope);

        f.drains.register_drain("agent", "jserrors").unwrap();
        f.drains.register_drain("agent", "ajax").unwrap();
        f.drains.drain("agent", "jserrors", false).unwrap();
        assert!(log.lock().unwrap().is_empty());

        f.drains.deregister_drain("agent", "ajax").unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["err:1"]);
        assert_eq!(scope.backlog().state("ajax"), GroupState::Drained);
        assert_eq!(f.handlers.pending("ajax"), 0);

        // The discarded handler never became a live listener.
        scope.emit("xhr", value(3), None);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_replay_does_not_cross_scopes() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let xhr = scope.get("xhr");
        let events = scope.get("events");
        let log = Arc::new(Mutex::new(Vec::new()));

        xhr.buffer(&["send"], None);
        events.buffer(&["send"], None);
        xhr.emit("send", value(1), None);
        events.emit("send", value(2), None);

        f.handlers.register_handler("send", record_into(&log, "xhr"), None, &xhr);
        f.drains.drain("agent", "feature", false).unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["xhr:1"]);
    }

    #[test]
    fn test_replay_picks_up_events_emitted_during_replay() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["first", "second"], None);
        scope.emit("first", value(1), None);

        let reemit = scope.clone();
        f.handlers.register_handler(
            "first",
            listener(move |_, _| {
                reemit.emit("second", value(2), None);
            }),
            None,
            &scope,
        );
        f.handlers.register_handler("second", record_into(&log, "second"), None, &scope);

        f.drains.drain("agent", "feature", false).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["second:2"]);
    }

    #[test]
    fn test_drain_emits_notification() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let notified = Arc::new(Mutex::new(0));
        let n = notified.clone();
        scope.on("drain-metrics", listener(move |_, _| *n.lock().unwrap() += 1));

        f.drains.drain("agent", "metrics", false).unwrap();
        assert_eq!(*notified.lock().unwrap(), 1);
    }

    #[test]
    fn test_aborted_scope_is_not_replayed() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["err"], None);
        scope.emit("err", value(1), None);
        f.handlers.register_handler("err", record_into(&log, "h"), None, &scope);
        scope.abort();

        f.drains.drain("agent", "feature", false).unwrap();
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drain_keeps_events_emitted_by_concurrent_producer() {
        const EVENTS: usize = 2000;

        for _ in 0..20 {
            let f = fixture(FeaturePriority::default());
            let scope = f.root.get("agent");
            let delivered = Arc::new(AtomicUsize::new(0));
            let counter = delivered.clone();
            f.handlers.register_handler(
                "err",
                listener(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                Some("jserrors"),
                &scope,
            );
            f.drains.register_drain("agent", "jserrors").unwrap();

            let producer = {
                let scope = scope.clone();
                thread::spawn(move || {
                    for i in 0..EVENTS {
                        handle("err", value(i as i64), None, Some("jserrors"), &scope);
                        if i % 64 == 0 {
                            thread::yield_now();
                        }
                    }
                })
            };

            thread::sleep(Duration::from_micros(300));
            f.drains.drain("agent", "jserrors", false).unwrap();
            producer.join().unwrap();

            assert_eq!(delivered.load(Ordering::SeqCst), EVENTS);
            assert_eq!(scope.backlog().state("jserrors"), GroupState::Drained);
        }
    }

    #[test]
    fn test_late_registration_during_replay_goes_live() {
        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        let log = Arc::new(Mutex::new(Vec::new()));

        scope.buffer(&["first", "second"], None);
        scope.emit("first", value(1), None);

        let handlers = f.handlers.clone();
        let target = scope.clone();
        let late = record_into(&log, "late");
        f.handlers.register_handler(
            "first",
            listener(move |_, _| handlers.register_handler("second", late.clone(), None, &target)),
            None,
            &scope,
        );

        f.drains.drain("agent", "feature", false).unwrap();
        assert_eq!(f.handlers.pending("feature"), 0);

        scope.emit("second", value(2), None);
        assert_eq!(*log.lock().unwrap(), vec!["late:2"]);
    }

    #[test]
    fn test_unknown_agent_leaves_no_state_behind() {
        let f = fixture(FeaturePriority::default());

        f.drains.drain("ghost", "jserrors", false).unwrap();
        f.drains.drain("ghost", "ajax", true).unwrap();

        assert!(f.root.child("ghost").is_none());
        assert_eq!(f.drains.agent_count(), 0);
        assert!(f.drains.pending_groups("ghost").is_empty());
    }

    #[test]
    fn test_missing_agent_id_is_an_error() {
        let f = fixture(FeaturePriority::default());
        assert!(matches!(
            f.drains.drain("", "feature", false),
            Err(DrainError::MissingAgentIdentifier { .. })
        ));
        assert!(f.drains.register_drain("", "feature").is_err());
    }

    #[tokio::test]
    async fn test_drain_when_ready() {
        #[derive(Debug)]
        struct LoadFailed;
        impl std::fmt::Display for LoadFailed {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "load failed")
            }
        }
        impl From<DrainError> for LoadFailed {
            fn from(_: DrainError) -> Self {
                LoadFailed
            }
        }

        let f = fixture(FeaturePriority::default());
        let scope = f.root.get("agent");
        f.drains.register_drain("agent", "ajax").unwrap();
        f.drains.register_drain("agent", "spa").unwrap();
        scope.buffer(&["xhr"], Some("ajax"));

        let ok: Result<(), LoadFailed> = f
            .drains
            .drain_when_ready("agent", "ajax", async { Ok::<(), LoadFailed>(()) })
            .await;
        assert!(ok.is_ok());
        assert_eq!(scope.backlog().state("ajax"), GroupState::Buffering(0));

        let failed = f
            .drains
            .drain_when_ready("agent", "spa", async { Err::<(), LoadFailed>(LoadFailed) })
            .await;
        assert!(failed.is_err());
        assert_eq!(scope.backlog().state("ajax"), GroupState::Drained);
        assert!(f.drains.pending_groups("agent").is_empty());
    }
}
