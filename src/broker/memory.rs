use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Acknowledgement, BrokerError, DeliveryReceipt, MessageBroker, OutboundMessage};

/// How the in-memory broker answers submitted messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckBehavior {
    Acknowledge,
    Fail,
    /// Accept the message but never acknowledge it.
    Never,
}

/// Broker stand-in used when Kafka is disabled, and by tests.
///
/// Keys are hashed onto a fixed number of partitions and every partition keeps
/// its own offset sequence, so per-key ordering can be observed. Accepted
/// messages are kept for inspection; `with_retention` caps how many.
pub struct InMemoryBroker {
    partitions: u32,
    state: Mutex<State>,
}

struct State {
    behavior: AckBehavior,
    ack_delay: Option<Duration>,
    failing_keys: HashSet<String>,
    rejected_keys: HashSet<String>,
    next_offsets: HashMap<i32, i64>,
    retention: Option<usize>,
    log: VecDeque<(i32, i64, OutboundMessage)>,
}

impl InMemoryBroker {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            state: Mutex::new(State {
                behavior: AckBehavior::Acknowledge,
                ack_delay: None,
                failing_keys: HashSet::new(),
                rejected_keys: HashSet::new(),
                next_offsets: HashMap::new(),
                retention: None,
                log: VecDeque::new(),
            }),
        }
    }

    pub fn with_behavior(self, behavior: AckBehavior) -> Self {
        self.lock().behavior = behavior;
        self
    }

    pub fn with_ack_delay(self, delay: Duration) -> Self {
        self.lock().ack_delay = Some(delay);
        self
    }

    /// Keeps only the most recent `max_messages` accepted messages.
    pub fn with_retention(self, max_messages: usize) -> Self {
        {
            let mut state = self.lock();
            state.retention = Some(max_messages);
            state.trim_log();
        }
        self
    }

    /// Messages with this key are accepted and then fail delivery.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.insert(key.into());
    }

    /// Messages with this key are refused at submission.
    pub fn reject_key(&self, key: impl Into<String>) {
        self.lock().rejected_keys.insert(key.into());
    }

    pub fn partition_for(&self, key: &str) -> i32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions as u64) as i32
    }

    /// Every accepted message in submission order.
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.lock().log.iter().map(|(_, _, m)| m.clone()).collect()
    }

    /// Accepted messages for one partition, with their offsets.
    pub fn partition_log(&self, partition: i32) -> Vec<(i64, OutboundMessage)> {
        self.lock()
            .log
            .iter()
            .filter(|(p, _, _)| *p == partition)
            .map(|(_, offset, m)| (*offset, m.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl State {
    fn trim_log(&mut self) {
        if let Some(max) = self.retention {
            while self.log.len() > max {
                self.log.pop_front();
            }
        }
    }
}

impl MessageBroker for InMemoryBroker {
    fn submit(&self, message: OutboundMessage) -> Result<Acknowledgement, BrokerError> {
        let partition = self.partition_for(&message.key);
        let mut state = self.lock();

        if state.rejected_keys.contains(&message.key) {
            return Err(BrokerError::Rejected(format!(
                "local queue refused key {}",
                message.key
            )));
        }

        let offset = {
            let next = state.next_offsets.entry(partition).or_insert(0);
            let offset = *next;
            *next += 1;
            offset
        };

        let receipt = DeliveryReceipt {
            topic: message.topic.clone(),
            partition,
            offset,
        };
        let outcome = if state.behavior == AckBehavior::Fail
            || state.failing_keys.contains(&message.key)
        {
            Err(BrokerError::Delivery(format!(
                "broker failed to store key {}",
                message.key
            )))
        } else {
            Ok(receipt)
        };
        let behavior = state.behavior;
        let delay = state.ack_delay;
        state.log.push_back((partition, offset, message));
        state.trim_log();

        Ok(Box::pin(async move {
            if behavior == AckBehavior::Never {
                return futures::future::pending().await;
            }
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            outcome
        }))
    }

    fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        Ok(())
    }
}
