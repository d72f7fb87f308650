use std::sync::Arc;

use crate::broker::Broker;
use crate::core::config::DispatcherConfig;
use crate::core::dispatcher::Dispatcher;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Dispatcher`].
pub struct DispatcherBuilder {
    broker: Arc<dyn Broker>,
    cfg: DispatcherConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DispatcherBuilder {
    /// Creates a builder over `broker` with the default configuration.
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self {
            broker,
            cfg: DispatcherConfig::default(),
            subscribers: Vec::new(),
        }
    }

    pub fn with_config(mut self, cfg: DispatcherConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (submissions, failures, requeues...)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the dispatcher and starts its event listener.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Arc<Dispatcher> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        let dispatcher = Arc::new(Dispatcher::new_internal(self.cfg, self.broker, bus, subs));
        dispatcher.subscriber_listener();
        dispatcher
    }
}
