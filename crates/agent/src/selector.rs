//! Action selector — one validated action per decision cycle.
//!
//! The selector never lets unvalidated model output through: every answer
//! is parsed against the action grammar, malformed answers are retried
//! with the parse error spelled out, and when retries run out a `clarify`
//! action is synthesized instead.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use voxpilot_core::action::ActionRecord;
use voxpilot_core::error::ProviderError;
use voxpilot_core::event::{DomainEvent, EventBus};
use voxpilot_core::goal::Goal;
use voxpilot_core::memory::MemoryNote;
use voxpilot_core::message::Message;
use voxpilot_core::page::PageSnapshot;
use voxpilot_core::provider::{Provider, ProviderRequest};
use voxpilot_core::stream::EventStream;

use crate::grammar::parse_envelope;
use crate::prompt;

/// Question asked when the model never produced a usable action.
pub const FALLBACK_QUESTION: &str =
    "I'm having trouble deciding what to do next. Could you rephrase what you'd like me to do?";

/// The outcome of one selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub record: ActionRecord,
    pub explanation: String,
    pub note: Option<String>,
    /// Malformed answers seen before this one
    pub parse_failures: u32,
    /// True when the record was synthesized after retries ran out
    pub fallback: bool,
}

/// Everything the selector needs to decide one action.
pub struct SelectionInput<'a> {
    pub goal: &'a Goal,
    pub stream: &'a EventStream,
    pub notes: &'a [MemoryNote],
    pub page: Option<&'a PageSnapshot>,
    pub hint: Option<&'a str>,
}

pub struct ActionSelector {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_retries: u32,
    history_window: usize,
    event_bus: Arc<EventBus>,
}

impl ActionSelector {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, event_bus: Arc<EventBus>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.2,
            max_tokens: None,
            max_retries: 2,
            history_window: 10,
            event_bus,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    /// Extra attempts after a malformed answer.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    /// Choose the next action.
    ///
    /// Transport failures propagate as [`ProviderError`]; grammar failures
    /// never do.
    pub async fn select(&self, input: SelectionInput<'_>) -> Result<Selection, ProviderError> {
        let goal_id = input.goal.id.to_string();
        let mut messages = vec![
            Message::system(prompt::system_prompt()),
            Message::user(prompt::render_cycle(
                input.goal,
                input.stream,
                input.notes,
                input.page,
                input.hint,
                self.history_window,
            )),
        ];

        let attempts = self.max_retries + 1;
        for attempt in 1..=attempts {
            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                json_mode: true,
                stop: vec![],
            };

            let response = self.provider.complete(request).await?;
            let raw = response.message.content;

            match parse_envelope(&raw) {
                Ok(envelope) => {
                    debug!(
                        goal_id = %goal_id,
                        attempt,
                        action = %envelope.record,
                        "Action selected"
                    );
                    return Ok(Selection {
                        record: envelope.record,
                        explanation: envelope.explanation,
                        note: envelope.note,
                        parse_failures: attempt - 1,
                        fallback: false,
                    });
                }
                Err(e) => {
                    warn!(goal_id = %goal_id, attempt, error = %e, "Unparsable model answer");
                    self.event_bus.publish(DomainEvent::ParseFailed {
                        goal_id: goal_id.clone(),
                        attempt,
                        error: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(prompt::retry_prompt(&e)));
                }
            }
        }

        warn!(goal_id = %goal_id, attempts, "Falling back to clarify");
        self.event_bus.publish(DomainEvent::SelectorFallback {
            goal_id,
            attempts,
            timestamp: Utc::now(),
        });

        Ok(Selection {
            record: ActionRecord::clarify(FALLBACK_QUESTION),
            explanation: String::new(),
            note: None,
            parse_failures: attempts,
            fallback: true,
        })
    }
}
