//! Повторы запросов к синтезатору
//!
//! Каждый чанк проходит небольшой автомат состояний
//! `Pending -> Retrying(n) -> Succeeded | Failed`. Автомат не зависит
//! от синтезатора и времени, поэтому политику повторов можно проверять
//! отдельно; асинхронная обертка только исполняет его решения.

use std::time::Duration;
use log::{debug, warn};
use crate::config::RetryPolicy;
use crate::error::SynthesisError;
use crate::tts::{SynthesisResult, Synthesizer};

/// Состояние запроса одного чанка
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Первая попытка еще не сделана
    Pending,
    /// Ожидается повтор номер `n` (начиная с 1)
    Retrying(u32),
    Succeeded,
    Failed,
}

/// Что делать после очередной попытки
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Done,
    RetryAfter(Duration),
    GiveUp,
}

/// Автомат повторов
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    attempts: u32,
}

impl RetryMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, state: RetryState::Pending, attempts: 0 }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Сколько попыток сделано
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Учесть результат попытки
    pub fn record<T>(&mut self, outcome: &Result<T, SynthesisError>) -> RetryDecision {
        self.attempts += 1;
        match outcome {
            Ok(_) => {
                self.state = RetryState::Succeeded;
                RetryDecision::Done
            }
            Err(e) if e.is_retryable() && self.attempts < self.policy.max_attempts => {
                self.state = RetryState::Retrying(self.attempts);
                RetryDecision::RetryAfter(self.policy.backoff(self.attempts))
            }
            Err(_) => {
                self.state = RetryState::Failed;
                RetryDecision::GiveUp
            }
        }
    }
}

/// Синтезировать текст с ограничением времени и повторами по политике
pub async fn synthesize_with_retry<S>(
    synthesizer: &S,
    text: &str,
    language: &str,
    voice: &str,
    policy: &RetryPolicy,
) -> Result<SynthesisResult, SynthesisError>
where
    S: Synthesizer + ?Sized,
{
    let mut machine = RetryMachine::new(*policy);

    loop {
        let outcome = match tokio::time::timeout(
            policy.timeout(),
            synthesizer.synthesize(text, language, voice),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(SynthesisError::Timeout),
        };

        match machine.record(&outcome) {
            RetryDecision::Done => {
                debug!(
                    "Synthesized {} chars in {} attempt(s)",
                    text.chars().count(),
                    machine.attempts()
                );
                return outcome;
            }
            RetryDecision::RetryAfter(delay) => {
                if let Err(e) = &outcome {
                    warn!(
                        "Synthesis attempt {}/{} failed: {}; retrying in {} ms",
                        machine.attempts(),
                        policy.max_attempts,
                        e,
                        delay.as_millis()
                    );
                }
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp => {
                if let Err(e) = &outcome {
                    warn!("Synthesis failed after {} attempt(s): {}", machine.attempts(), e);
                }
                return outcome;
            }
        }
    }
}
