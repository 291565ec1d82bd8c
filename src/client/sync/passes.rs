//! Pass-scoped cancellation
//!
//! Every reconciliation pass gets a fresh id and cancellation token. Starting
//! a pass cancels and clears every token handed out before, so a slow fetch
//! from an older pass can never overwrite the result of a newer one.

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Handle for one in-flight pass
#[derive(Debug, Clone)]
pub struct PassTicket {
    pub id: String,
    pub token: CancellationToken,
}

#[derive(Debug, Default)]
pub struct PassTokens {
    current: Option<String>,
    tokens: Vec<CancellationToken>,
}

impl PassTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every earlier pass and start a new one
    pub fn begin_pass(&mut self) -> PassTicket {
        let cancelled = self.cancel_all();
        let ticket = PassTicket {
            id: Uuid::new_v4().to_string(),
            token: CancellationToken::new(),
        };
        if cancelled > 0 {
            tracing::debug!(pass_id = %ticket.id, cancelled, "superseded earlier passes");
        }
        self.current = Some(ticket.id.clone());
        self.tokens.push(ticket.token.clone());
        ticket
    }

    /// Whether `pass_id` is the newest pass and has not finished
    pub fn is_current(&self, pass_id: &str) -> bool {
        self.current.as_deref() == Some(pass_id)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Mark a pass finished. Stale ids are ignored.
    pub fn finish(&mut self, pass_id: &str) -> bool {
        if !self.is_current(pass_id) {
            return false;
        }
        self.current = None;
        self.tokens.clear();
        true
    }

    /// Cancel and clear every outstanding token. Returns how many were cancelled.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tokens.len();
        for token in self.tokens.drain(..) {
            token.cancel();
        }
        self.current = None;
        count
    }
}
