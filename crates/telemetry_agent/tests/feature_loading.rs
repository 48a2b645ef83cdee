use std::sync::{Arc, Mutex};
use telemetry_agent::{endpoints, Agent, AgentConfig, AgentError, Feature, FeatureContext};
use telemetry_event_system::{features, listener, EventArgs, GroupState, HarvestPayload};
use tokio::sync::oneshot;

type Log = Arc<Mutex<Vec<String>>>;

/// Records every event of `event_type` and finishes loading when released.
struct GatedFeature {
    name: &'static str,
    event_type: &'static str,
    release: Mutex<Option<oneshot::Receiver<()>>>,
    fail: bool,
    log: Log,
}

impl GatedFeature {
    fn new(name: &'static str, event_type: &'static str, log: &Log) -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let feature = Arc::new(Self {
            name,
            event_type,
            release: Mutex::new(Some(rx)),
            fail: false,
            log: log.clone(),
        });
        (feature, tx)
    }

    fn failing(name: &'static str, event_type: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            event_type,
            release: Mutex::new(None),
            fail: true,
            log: log.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Feature for GatedFeature {
    fn name(&self) -> &str {
        self.name
    }

    async fn load(&self, ctx: &FeatureContext) -> Result<(), AgentError> {
        let log = self.log.clone();
        let name = self.name;
        ctx.register_handler(
            self.event_type,
            listener(move |_, args| {
                let tag = match args.as_ref() {
                    EventArgs::Custom { name: event, .. } => format!("{name}:{event}"),
                    _ => name.to_string(),
                };
                log.lock().unwrap().push(tag);
            }),
        );

        let release = self.release.lock().unwrap().take();
        if let Some(release) = release {
            let _ = release.await;
        }

        if self.fail {
            Err(AgentError::feature_load(self.name, "module failed to import"))
        } else {
            Ok(())
        }
    }
}

fn custom(name: &str) -> EventArgs {
    EventArgs::Custom {
        name: name.to_string(),
        attributes: Default::default(),
    }
}

#[tokio::test]
async fn test_features_flush_in_priority_order_not_load_order() {
    let agent = Agent::new(AgentConfig::default());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    agent.handle("xhr", custom("first-request"), None, Some(features::AJAX));
    agent.handle("err", custom("first-error"), None, Some(features::JSERRORS));

    let (ajax, release_ajax) = GatedFeature::new(features::AJAX, "xhr", &log);
    let (errors, release_errors) = GatedFeature::new(features::JSERRORS, "err", &log);

    let loader = {
        let agent = agent.clone();
        tokio::spawn(async move {
            agent
                .load_features(vec![ajax as Arc<dyn Feature>, errors as Arc<dyn Feature>])
                .await
        })
    };

    // Ajax finishes first, but the gate still waits for jserrors.
    release_ajax.send(()).unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(log.lock().unwrap().is_empty());
    assert!(agent.scope().backlog().is_buffering(features::AJAX));

    release_errors.send(()).unwrap();
    let results = loader.await.unwrap();
    assert!(results.iter().all(|r| r.is_ok()));

    // jserrors ranks ahead of ajax.
    assert_eq!(
        *log.lock().unwrap(),
        vec!["jserrors:first-error", "ajax:first-request"]
    );
    assert_eq!(agent.scope().backlog().state(features::AJAX), GroupState::Drained);

    // Both handlers are now live.
    agent.handle("xhr", custom("live"), None, Some(features::AJAX));
    assert_eq!(log.lock().unwrap().last().unwrap(), "ajax:live");
}

#[tokio::test]
async fn test_failed_feature_does_not_block_others() {
    let agent = Agent::new(AgentConfig::default());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    agent.handle("err", custom("boom"), None, Some(features::JSERRORS));
    agent.handle("trace", custom("span"), None, Some(features::SESSION_TRACE));

    let (errors, release_errors) = GatedFeature::new(features::JSERRORS, "err", &log);
    let broken = GatedFeature::failing(features::SESSION_TRACE, "trace", &log);
    release_errors.send(()).unwrap();

    let results = agent
        .load_features(vec![errors as Arc<dyn Feature>, broken as Arc<dyn Feature>])
        .await;

    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(AgentError::FeatureLoad { .. })));
    assert_eq!(*log.lock().unwrap(), vec!["jserrors:boom"]);
    assert_eq!(
        agent.scope().backlog().state(features::SESSION_TRACE),
        GroupState::Drained
    );
    assert!(agent.runtime().drains().pending_groups(agent.id()).is_empty());
}

struct ErrorsToHarvest;

#[async_trait::async_trait]
impl Feature for ErrorsToHarvest {
    fn name(&self) -> &str {
        features::JSERRORS
    }

    async fn load(&self, ctx: &FeatureContext) -> Result<(), AgentError> {
        let harvest = ctx.harvest().clone();
        ctx.register_handler(
            "err",
            listener(move |_, args| {
                if let Ok(value) = serde_json::to_value(args.as_ref()) {
                    harvest.add(endpoints::JSERRORS, value);
                }
            }),
        );
        Ok(())
    }
}

#[tokio::test]
async fn test_replayed_events_reach_harvest_buffer() {
    let agent = Agent::new(AgentConfig::default());
    for i in 0..3 {
        agent.handle(
            "err",
            EventArgs::Error {
                message: format!("error {i}"),
                stack: None,
                timestamp: i,
            },
            None,
            Some(features::JSERRORS),
        );
    }

    let handle = agent.load_feature(Arc::new(ErrorsToHarvest)).unwrap();
    handle.await.unwrap().unwrap();

    let payload = agent.harvest().make_harvest_payload(endpoints::JSERRORS, true);
    let Some(HarvestPayload::Events(events)) = payload else {
        panic!("expected buffered events");
    };
    assert_eq!(events.len(), 3);
    assert_eq!(events[0]["kind"], "error");
    assert_eq!(events[2]["message"], "error 2");

    // Failed send: the batch comes back ahead of anything new.
    agent.handle(
        "err",
        EventArgs::Error {
            message: "late".to_string(),
            stack: None,
            timestamp: 9,
        },
        None,
        Some(features::JSERRORS),
    );
    agent.harvest().post_harvest_cleanup(endpoints::JSERRORS, true);

    let chunks = agent
        .harvest()
        .make_chunked_payload(endpoints::JSERRORS, false)
        .unwrap()
        .unwrap();
    let messages: Vec<_> = chunks
        .chunks
        .iter()
        .flat_map(|c| c.events.iter().map(|e| e["message"].clone()))
        .collect();
    assert_eq!(messages, vec!["error 0", "error 1", "error 2", "late"]);
}
