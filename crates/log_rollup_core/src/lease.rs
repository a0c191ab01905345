//! Queue delivery model.
//!
//! The task queue redelivers a failed message once its lease (visibility
//! timeout) expires and moves it to a dead-letter queue once its receive
//! budget is spent. This module makes that contract explicit as a three-state
//! machine so the bounded-retry behavior can be reasoned about and tested
//! without a real queue.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One redelivery after the first attempt.
pub const DEFAULT_MAX_RECEIVE_COUNT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
}

impl Default for RedrivePolicy {
    fn default() -> Self {
        Self {
            max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureDisposition {
    Redeliver,
    DeadLetter,
}

impl FailureDisposition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redeliver => "redeliver",
            Self::DeadLetter => "dead_letter",
        }
    }
}

impl RedrivePolicy {
    pub fn new(max_receive_count: u32) -> Self {
        Self {
            max_receive_count: max_receive_count.max(1),
        }
    }

    /// What the queue does with a message whose `receive_count`-th attempt failed.
    pub fn disposition_after_failure(&self, receive_count: u32) -> FailureDisposition {
        if receive_count >= self.max_receive_count {
            FailureDisposition::DeadLetter
        } else {
            FailureDisposition::Redeliver
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Pending {
        receive_count: u32,
    },
    Leased {
        receive_count: u32,
        expires_at: DateTime<Utc>,
    },
    DeadLettered {
        receive_count: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeaseError {
    #[error("message is not available for claiming")]
    NotPending,
    #[error("message is not leased")]
    NotLeased,
    #[error("unknown message {0}")]
    UnknownMessage(u64),
}

impl DeliveryState {
    pub fn new() -> Self {
        Self::Pending { receive_count: 0 }
    }

    pub fn receive_count(&self) -> u32 {
        match *self {
            Self::Pending { receive_count }
            | Self::Leased { receive_count, .. }
            | Self::DeadLettered { receive_count } => receive_count,
        }
    }

    /// Pending -> Leased, or Pending -> DeadLettered when the budget is spent.
    pub fn claim(
        self,
        now: DateTime<Utc>,
        visibility_timeout: Duration,
        policy: &RedrivePolicy,
    ) -> Result<Self, LeaseError> {
        match self {
            Self::Pending { receive_count } if receive_count >= policy.max_receive_count => {
                Ok(Self::DeadLettered { receive_count })
            }
            Self::Pending { receive_count } => Ok(Self::Leased {
                receive_count: receive_count + 1,
                expires_at: now + visibility_timeout,
            }),
            _ => Err(LeaseError::NotPending),
        }
    }

    /// Leased -> Pending once the lease has lapsed; other states are unchanged.
    pub fn expire(self, now: DateTime<Utc>) -> Self {
        match self {
            Self::Leased {
                receive_count,
                expires_at,
            } if now >= expires_at => Self::Pending { receive_count },
            other => other,
        }
    }

    /// Leased -> acknowledged (the message is removed by the caller).
    pub fn complete(self) -> Result<(), LeaseError> {
        match self {
            Self::Leased { .. } => Ok(()),
            _ => Err(LeaseError::NotLeased),
        }
    }
}

impl Default for DeliveryState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeasedMessage {
    pub message_id: u64,
    pub body: String,
    pub receive_count: u32,
}

/// In-memory queue driven by [`DeliveryState`] with caller-supplied time.
#[derive(Debug, Clone)]
pub struct LeaseQueue {
    policy: RedrivePolicy,
    visibility_timeout: Duration,
    next_id: u64,
    messages: BTreeMap<u64, (String, DeliveryState)>,
}

impl LeaseQueue {
    pub fn new(policy: RedrivePolicy, visibility_timeout: Duration) -> Self {
        Self {
            policy,
            visibility_timeout,
            next_id: 0,
            messages: BTreeMap::new(),
        }
    }

    pub fn send(&mut self, body: impl Into<String>) -> u64 {
        let message_id = self.next_id;
        self.next_id += 1;
        self.messages
            .insert(message_id, (body.into(), DeliveryState::new()));
        message_id
    }

    /// Claims the oldest pending message, dead-lettering any whose budget is spent.
    pub fn receive(&mut self, now: DateTime<Utc>) -> Option<LeasedMessage> {
        self.expire_leases(now);

        for (message_id, (body, state)) in self.messages.iter_mut() {
            if !matches!(state, DeliveryState::Pending { .. }) {
                continue;
            }
            let next = state
                .claim(now, self.visibility_timeout, &self.policy)
                .ok()?;
            *state = next;
            if let DeliveryState::Leased { receive_count, .. } = next {
                return Some(LeasedMessage {
                    message_id: *message_id,
                    body: body.clone(),
                    receive_count,
                });
            }
        }

        None
    }

    pub fn ack(&mut self, message_id: u64) -> Result<(), LeaseError> {
        let (_, state) = self
            .messages
            .get(&message_id)
            .ok_or(LeaseError::UnknownMessage(message_id))?;
        state.complete()?;
        self.messages.remove(&message_id);
        Ok(())
    }

    pub fn expire_leases(&mut self, now: DateTime<Utc>) {
        for (_, state) in self.messages.values_mut() {
            *state = state.expire(now);
        }
    }

    pub fn state(&self, message_id: u64) -> Option<DeliveryState> {
        self.messages.get(&message_id).map(|(_, state)| *state)
    }

    pub fn dead_letters(&self) -> Vec<&str> {
        self.messages
            .values()
            .filter(|(_, state)| matches!(state, DeliveryState::DeadLettered { .. }))
            .map(|(body, _)| body.as_str())
            .collect()
    }

    pub fn is_drained(&self) -> bool {
        self.messages
            .values()
            .all(|(_, state)| matches!(state, DeliveryState::DeadLettered { .. }))
    }
}
