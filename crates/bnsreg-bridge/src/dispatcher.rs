//! Drives translated requests to a terminal outcome against the bridge.
//!
//! Each accepted call runs as one spawned chain: send, classify, and either finish,
//! wait `register_retry_delay` and send again, or hand over to the missing-entry
//! cascade. The caller hears back only through its [`Callback`]. Every chain,
//! cascades included, is tracked so shutdown can wait for all of them.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bnsreg_core::{
    Action, InFlightKey, InstanceDescriptor, RequestOptions, Translator, Verdict, classify, protocol,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, CascadeCallback};
use crate::transport::BridgeTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Succ,
    Failed,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Succ => "succ",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Completion hook. Fires once per chain; a cascade runs two chains.
pub type Callback = Arc<dyn Fn(Outcome) + Send + Sync>;

enum ChainEnd {
    Done(Outcome),
    Cascade,
}

pub struct Dispatcher {
    config: BridgeConfig,
    translator: Translator,
    transport: Arc<dyn BridgeTransport>,
    in_flight: Mutex<HashSet<InFlightKey>>,
    chains: TaskTracker,
}

impl Dispatcher {
    pub fn new(config: BridgeConfig, transport: Arc<dyn BridgeTransport>) -> Arc<Self> {
        Arc::new(Self {
            translator: Translator::new(config.cluster.clone()),
            config,
            transport,
            in_flight: Mutex::new(HashSet::new()),
            chains: TaskTracker::new(),
        })
    }

    /// Like [`Dispatcher::dispatch`], for actions named on the wire.
    pub fn dispatch_named(
        self: &Arc<Self>,
        instance: &Value,
        action: &str,
        callback: Callback,
    ) -> Option<JoinHandle<()>> {
        match action.parse::<Action>() {
            Ok(action) => self.dispatch(instance, RequestOptions::new(action), callback),
            Err(e) => {
                warn!("{}, skip", e);
                metrics::counter!("bnsreg_dropped_total", "reason" => "unsupported_action").increment(1);
                None
            }
        }
    }

    /// Validates `instance` and starts a dispatch chain for it.
    ///
    /// Returns `None` when the event is dropped: an instance that fails validation is
    /// logged and the callback is never invoked. Otherwise the handle covers the first
    /// chain only; chains started by a cascade outlive it. Use [`Dispatcher::wait`] to
    /// wait for everything. Must be called from within a tokio runtime.
    pub fn dispatch(
        self: &Arc<Self>,
        instance: &Value,
        options: RequestOptions,
        callback: Callback,
    ) -> Option<JoinHandle<()>> {
        let instance = match protocol::validate(instance) {
            Ok(instance) => instance,
            Err(e) => {
                error!("Instance not matched with current protocol version, validate failed: {}", e);
                metrics::counter!("bnsreg_dropped_total", "reason" => "schema_mismatch").increment(1);
                return None;
            }
        };
        Some(self.start(instance, options.action, callback, Duration::ZERO))
    }

    fn start(
        self: &Arc<Self>,
        instance: InstanceDescriptor,
        action: Action,
        callback: Callback,
        delay: Duration,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        self.chains.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            this.run_chain(instance, action, callback).await;
        })
    }

    async fn run_chain(self: Arc<Self>, instance: InstanceDescriptor, action: Action, callback: Callback) {
        let key = InFlightKey::of(&instance);
        let end = {
            let _in_flight = if self.config.dedup_in_flight {
                Some(self.enter(&key).await)
            } else {
                None
            };
            self.deliver(&key, &instance, action).await
        };

        match end {
            ChainEnd::Done(outcome) => {
                metrics::counter!(
                    "bnsreg_requests_total",
                    "action" => action.as_str(),
                    "outcome" => outcome.as_str()
                )
                .increment(1);
                callback(outcome);
            }
            ChainEnd::Cascade => self.cascade(instance, action, callback),
        }
    }

    /// The retry loop of one chain. Retries are linear: a fixed delay between attempts.
    async fn deliver(&self, key: &InFlightKey, instance: &InstanceDescriptor, action: Action) -> ChainEnd {
        let payload = self.translator.translate(instance, action);
        if payload.is_empty() {
            debug!("[{}] no bns port to {}, nothing to send", key, action);
            return ChainEnd::Done(Outcome::Succ);
        }
        let body = match payload.to_body() {
            Ok(body) => body,
            Err(e) => {
                error!("[{}] failed to encode {} payload: {}", key, action, e);
                return ChainEnd::Done(Outcome::Failed);
            }
        };

        let mut retries = 0;
        loop {
            debug!("[{}] Starting {} {} request {}", key, retries, action, body);

            let verdict = match self.transport.send(action, body.clone()).await {
                Ok(reply) => {
                    debug!("[{}] Received response {}", key, reply.body);
                    classify(reply.status, &reply.body, action, &self.config.missing_entry_sentinel)
                }
                Err(e) => Verdict::Rejected(e.to_string()),
            };

            match verdict {
                Verdict::Success => {
                    info!("[{}] {} succeeded, request payload is {}", key, action, body);
                    return ChainEnd::Done(Outcome::Succ);
                }
                Verdict::MissingEntry => {
                    warn!("[{}] No naming entry for {}, creating", key, instance.app_name);
                    return ChainEnd::Cascade;
                }
                Verdict::Malformed(e) => {
                    warn!("[{}] {} got unparseable response ({}), request data is {}", key, action, e, body);
                    return ChainEnd::Done(Outcome::Failed);
                }
                Verdict::Rejected(reason) if retries < self.config.max_request_retry => {
                    debug!("[{}] {} attempt {} failed: {}, retrying", key, action, retries, reason);
                    metrics::counter!("bnsreg_retries_total", "action" => action.as_str()).increment(1);
                    tokio::time::sleep(self.config.register_retry_delay).await;
                    retries += 1;
                }
                Verdict::Rejected(reason) => {
                    warn!(
                        "[{}] {} failed after {} retries: {}, request data is {}",
                        key, action, retries, reason, body
                    );
                    return ChainEnd::Done(Outcome::Failed);
                }
            }
        }
    }

    /// Creates the naming entry now and re-issues `action` after `queue_process_delay`.
    /// Both run as fresh chains starting from zero retries.
    fn cascade(self: &Arc<Self>, instance: InstanceDescriptor, action: Action, callback: Callback) {
        metrics::counter!("bnsreg_cascades_total", "action" => action.as_str()).increment(1);

        let create_callback: Callback = match self.config.cascade_callback {
            CascadeCallback::FanOut => Arc::clone(&callback),
            CascadeCallback::Merged => {
                let key = InFlightKey::of(&instance);
                Arc::new(move |outcome: Outcome| info!("[{}] create for cascade finished: {}", key, outcome))
            }
        };

        self.start(instance.clone(), Action::Create, create_callback, Duration::ZERO);
        self.start(instance, action, callback, self.config.queue_process_delay);
    }

    /// Waits until no other chain holds `key`, then holds it.
    async fn enter(&self, key: &InFlightKey) -> InFlightGuard<'_> {
        loop {
            let acquired = self.lock_in_flight().insert(key.clone());
            if acquired {
                return InFlightGuard { dispatcher: self, key: key.clone() };
            }
            debug!("[{}] instance in queue, delay to process", key);
            tokio::time::sleep(self.config.queue_process_delay).await;
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<InFlightKey>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_in_flight().len()
    }

    /// Number of chains that have not finished yet, delayed re-issues included.
    pub fn pending_chains(&self) -> usize {
        self.chains.len()
    }

    /// Marks the dispatcher as shutting down so [`Dispatcher::wait`] can complete.
    /// Chains already running may still start their cascades.
    pub fn close(&self) {
        self.chains.close();
    }

    /// Resolves once [`Dispatcher::close`] was called and every chain has finished.
    pub async fn wait(&self) {
        self.chains.wait().await;
    }
}

struct InFlightGuard<'a> {
    dispatcher: &'a Dispatcher,
    key: InFlightKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.dispatcher.lock_in_flight().remove(&self.key);
    }
}
