//! Fan-out execution: one inbound request becomes N concurrent upstream
//! calls, joined into an index-ordered outcome collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::task::{Id as TaskId, JoinSet};

use crate::api::{CallOutcome, ChatRequest, ChatResponse};
use crate::dispatch::UpstreamCall;
use crate::dispatch::upstream::UpstreamClient;
use crate::error::ManifoldError;

/// Orchestrates upstream calls for one inbound request.
///
/// Every call is attempted exactly once: no retry, no straggler cutoff, no
/// cross-call cancellation. A fan-out blocks until all of its calls have
/// produced an outcome, then aggregates; result order is always call
/// order, never completion order.
pub struct FanoutExecutor {
    upstream: Arc<UpstreamClient>,
    /// Seed source for the per-call generators handed to the uniquifier.
    rng: Mutex<StdRng>,
    /// Optional soft cap on fan-out width. None leaves the caller in full
    /// control of concurrency.
    max_fanout: Option<usize>,
}

impl FanoutExecutor {
    pub fn new(upstream: UpstreamClient, max_fanout: Option<usize>) -> Self {
        Self {
            upstream: Arc::new(upstream),
            rng: Mutex::new(StdRng::from_os_rng()),
            max_fanout,
        }
    }

    /// Deterministic task ids for tests.
    pub fn with_seed(upstream: UpstreamClient, max_fanout: Option<usize>, seed: u64) -> Self {
        Self {
            upstream: Arc::new(upstream),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            max_fanout,
        }
    }

    /// Validate, normalize, and run the request to completion.
    ///
    /// Err covers validation only; transport, upstream, and parse failures
    /// are embedded per-call in the returned envelope.
    pub async fn execute(&self, req: ChatRequest) -> Result<ChatResponse, ManifoldError> {
        req.validate()?;

        let concurrency = self.clamp_fanout(req.concurrency());
        let call = Arc::new(UpstreamCall::from_request(&req));

        tracing::info!(
            concurrency,
            base_url = %call.base_url,
            user_message_id = req.user_message_id.as_deref().unwrap_or(""),
            "dispatching chat request"
        );

        let response = if concurrency == 1 {
            ChatResponse::single(self.send_single(&call, 0).await)
        } else {
            self.send_concurrent(call, concurrency).await
        };

        Ok(response.with_user_message_id(req.user_message_id))
    }

    fn clamp_fanout(&self, requested: usize) -> usize {
        match self.max_fanout {
            Some(cap) if requested > cap => {
                tracing::warn!(requested, cap, "fan-out width clamped to configured cap");
                cap
            }
            _ => requested,
        }
    }

    /// Fork a per-call generator off the shared seed source; each call owns
    /// its randomness, and a seeded executor replays a whole fan-out
    /// deterministically.
    fn call_rng(&self) -> StdRng {
        let mut source = self.rng.lock().expect("rng seed source poisoned");
        StdRng::from_rng(&mut *source)
    }

    async fn send_single(&self, call: &UpstreamCall, index: usize) -> CallOutcome {
        let rng = self.call_rng();
        match self.upstream.call(call, index, rng).await {
            Ok(reply) => {
                tracing::info!(
                    call = index + 1,
                    chars = reply.content.len(),
                    "upstream call succeeded"
                );
                CallOutcome::success(index, reply.content, reply.usage)
            }
            Err(e) => {
                tracing::warn!(call = index + 1, error = %e, "upstream call failed");
                CallOutcome::failure(index, e.to_string())
            }
        }
    }

    async fn send_concurrent(&self, call: Arc<UpstreamCall>, concurrency: usize) -> ChatResponse {
        let mut set = JoinSet::new();
        let mut task_index: HashMap<TaskId, usize> = HashMap::new();

        for index in 0..concurrency {
            let upstream = self.upstream.clone();
            let call = call.clone();
            let rng = self.call_rng();
            let handle = set.spawn(async move {
                match upstream.call(&call, index, rng).await {
                    Ok(reply) => CallOutcome::success(index, reply.content, reply.usage),
                    Err(e) => {
                        tracing::warn!(call = index + 1, error = %e, "upstream call failed");
                        CallOutcome::failure(index, e.to_string())
                    }
                }
            });
            task_index.insert(handle.id(), index);
        }

        // Join barrier: every call runs to completion (or its own timeout),
        // and each outcome lands in its home slot regardless of completion
        // order. Panics are attributed to their call via the task-id map so
        // the outcome count still matches the requested concurrency.
        let mut slots: Vec<Option<CallOutcome>> = (0..concurrency).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => {
                    let index = outcome.request_index;
                    slots[index] = Some(outcome);
                }
                Err(join_err) if join_err.is_panic() => {
                    tracing::error!("fan-out task panicked: {join_err}");
                    if let Some(&index) = task_index.get(&join_err.id()) {
                        slots[index] = Some(CallOutcome::failure(
                            index,
                            format!("task panicked: {join_err}"),
                        ));
                    }
                }
                // Cancelled; unexpected, since nothing aborts these tasks.
                Err(_) => {}
            }
        }

        let results: Vec<CallOutcome> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    CallOutcome::failure(index, "call produced no outcome".to_string())
                })
            })
            .collect();

        let response = ChatResponse::aggregate(results);
        tracing::info!(
            success = response.success_count.unwrap_or(0),
            total = concurrency,
            "fan-out complete"
        );
        response
    }
}
