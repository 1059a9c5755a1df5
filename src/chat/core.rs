//! The session abstraction for the retrieval-augmented chat. One
//! `Chat` owns the transcript for one user session and runs each
//! request/response cycle end to end: retrieve, assemble the prompt,
//! stream the completion, append the response.
//!
//! Use `Chat::builder()` to construct a valid `Chat`.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::openai::completion_stream;
use crate::retrieval::{RetrievalError, TfIdfIndex};

use super::models::{Message, Role, Transcript};
use super::prompt::{ContextStyle, build_prompt};
use super::stream::StreamError;

/// Ways a single request/response cycle can fail. Either way the
/// transcript keeps the user turn and nothing else from the cycle.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub struct Chat {
    api_hostname: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    index: TfIdfIndex,
    policy_text: String,
    framing_text: String,
    context_style: ContextStyle,
    tx: Option<mpsc::UnboundedSender<String>>,
    cancel: CancellationToken,
    transcript: Transcript,
}

impl Chat {
    pub fn builder(api_hostname: &str, api_key: &str, model: &str, index: TfIdfIndex) -> ChatBuilder {
        ChatBuilder::new(api_hostname, api_key, model, index)
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// A token a caller can use to abandon the in-flight cycle. A
    /// cancelled cycle behaves exactly like an interrupted stream:
    /// the partial response is discarded and the transcript keeps
    /// only the user turn.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs one full request/response cycle for a user question and
    /// returns the completed answer. The user turn is appended first
    /// and stays in the transcript even when the stream fails, so the
    /// question can be retried. No assistant turn is appended unless
    /// the stream completes.
    pub async fn next_turn(&mut self, user_text: &str) -> Result<String, ChatError> {
        self.transcript.push(Message::new(Role::User, user_text));

        // Degenerate retrieval (no shared vocabulary) still returns
        // the first document; only an empty corpus fails, and that
        // ends the cycle.
        let retrieved = self.index.query(user_text)?;

        let prompt = build_prompt(
            &self.policy_text,
            &self.framing_text,
            Some(retrieved),
            self.context_style,
            &self.transcript,
        );

        let tx = match &self.tx {
            Some(tx) => tx.clone(),
            None => mpsc::unbounded_channel().0,
        };

        let answer = completion_stream(
            tx,
            &prompt,
            &self.api_hostname,
            &self.api_key,
            &self.model,
            self.temperature,
            &self.cancel,
        )
        .await?;

        self.transcript.push(Message::new(Role::Assistant, &answer));
        Ok(answer)
    }
}

pub struct ChatBuilder {
    api_hostname: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    index: TfIdfIndex,
    policy_text: String,
    framing_text: String,
    context_style: ContextStyle,
    tx: Option<mpsc::UnboundedSender<String>>,
    transcript: Transcript,
}

impl ChatBuilder {
    pub fn new(api_hostname: &str, api_key: &str, model: &str, index: TfIdfIndex) -> Self {
        Self {
            api_hostname: api_hostname.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: None,
            index,
            policy_text: String::new(),
            framing_text: String::new(),
            context_style: ContextStyle::SeparateTurn,
            tx: None,
            transcript: Transcript::new(),
        }
    }

    pub fn build(self) -> Chat {
        Chat {
            api_hostname: self.api_hostname,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            index: self.index,
            policy_text: self.policy_text,
            framing_text: self.framing_text,
            context_style: self.context_style,
            tx: self.tx,
            cancel: CancellationToken::new(),
            transcript: self.transcript,
        }
    }

    pub fn persona(mut self, policy_text: &str, framing_text: &str) -> Self {
        self.policy_text = policy_text.to_string();
        self.framing_text = framing_text.to_string();
        self
    }

    /// Seeds the transcript with the assistant greeting shown before
    /// any user input.
    pub fn greeting(mut self, greeting: &str) -> Self {
        self.transcript.push(Message::new(Role::Assistant, greeting));
        self
    }

    pub fn temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn context_style(mut self, style: ContextStyle) -> Self {
        self.context_style = style;
        self
    }

    /// Enables progressive display by forwarding response fragments
    /// through the transmitter as they arrive.
    pub fn streaming(mut self, transmitter: mpsc::UnboundedSender<String>) -> Self {
        self.tx = Some(transmitter);
        self
    }
}
