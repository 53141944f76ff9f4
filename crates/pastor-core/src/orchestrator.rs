//! Request lifecycle: submit → generate → settle
//!
//! A submission is split in two synchronous halves around the one
//! suspension point so a UI loop can spawn the network call and keep
//! drawing in the meantime:
//!
//! - [`Orchestrator::begin`] validates input, appends the user message,
//!   clears the input field, marks the session busy and builds the prompt.
//! - [`PendingRequest::send`] performs the call and owns everything it needs.
//! - [`Orchestrator::settle`] appends the reply (or logs the failure) and
//!   always clears the busy flag.
//!
//! [`Orchestrator::submit`] runs all three in sequence.

use crate::ai::{GeminiClient, GenerationRequest, GenerationService, RequestFailure};
use crate::config::Config;
use crate::conversation::Conversation;
use crate::prompt::PromptTemplate;
use crate::session::SessionState;
use crate::state::{MessageId, Sender};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Why [`Orchestrator::begin`] did not start a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejected {
    /// Input was empty or whitespace only
    Empty,
    /// A request is already in flight
    Busy,
}

/// Result of a full submit cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Busy,
    Answered(MessageId),
    Failed(RequestFailure),
}

impl From<Rejected> for Outcome {
    fn from(rejected: Rejected) -> Self {
        match rejected {
            Rejected::Empty => Outcome::Ignored,
            Rejected::Busy => Outcome::Busy,
        }
    }
}

/// The in-flight half of a submission. `'static`, so it can be spawned.
pub struct PendingRequest {
    service: Arc<dyn GenerationService>,
    request: GenerationRequest,
}

impl PendingRequest {
    pub fn prompt(&self) -> &str {
        &self.request.prompt
    }

    pub fn model_id(&self) -> &str {
        &self.request.model_id
    }

    pub async fn send(self) -> Result<String, RequestFailure> {
        let start = Instant::now();
        debug!(
            model = %self.request.model_id,
            prompt_chars = self.request.prompt.chars().count(),
            "sending generation request"
        );

        let response = self.service.generate(&self.request).await?;

        info!(
            model = %self.request.model_id,
            duration_ms = %start.elapsed().as_millis(),
            reply_chars = response.text.chars().count(),
            "generation request completed"
        );
        Ok(response.text)
    }
}

pub struct Orchestrator {
    service: Arc<dyn GenerationService>,
    template: PromptTemplate,
    history_turns: usize,
    conversation: Conversation,
    session: SessionState,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        Self {
            service,
            template: PromptTemplate::default(),
            history_turns: 0,
            conversation: Conversation::new(),
            session: SessionState::new(),
        }
    }

    /// Wire up a Gemini client from configuration. The key is taken as-is;
    /// a missing key only shows up as a failed first request.
    pub fn from_config(config: &Config) -> Self {
        let client = GeminiClient::new(config.api_key.as_deref(), &config.model)
            .with_base_url(&config.base_url);
        Self::new(Arc::new(client)).with_history_turns(config.history_turns)
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// The editable input field
    pub fn pending_input_mut(&mut self) -> &mut String {
        &mut self.session.pending_input
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }

    /// Start a request for `raw`. On rejection nothing is changed.
    pub fn begin(&mut self, raw: &str) -> Result<PendingRequest, Rejected> {
        if raw.trim().is_empty() {
            return Err(Rejected::Empty);
        }
        if self.session.is_busy() {
            warn!("submit ignored: a request is already in flight");
            return Err(Rejected::Busy);
        }

        let snapshot = raw.to_string();

        self.conversation.push(Sender::User, snapshot.as_str());
        self.session.pending_input.clear();
        self.session.set_busy(true);

        let prompt = if self.history_turns == 0 {
            self.template.render(&snapshot)
        } else {
            // Everything before the message just pushed
            let earlier = &self.conversation.messages()[..self.conversation.len() - 1];
            let from = earlier.len().saturating_sub(self.history_turns);
            self.template.render_with_history(&earlier[from..], &snapshot)
        };

        Ok(PendingRequest {
            service: Arc::clone(&self.service),
            request: GenerationRequest {
                model_id: self.service.model_id().to_string(),
                prompt,
            },
        })
    }

    /// [`begin`](Self::begin) with the current input field as the raw input.
    pub fn begin_pending(&mut self) -> Result<PendingRequest, Rejected> {
        let raw = self.session.pending_input.clone();
        self.begin(&raw)
    }

    /// Finish the in-flight request. Failures are logged and leave the
    /// conversation untouched.
    pub fn settle(&mut self, result: Result<String, RequestFailure>) -> Outcome {
        if !self.session.is_busy() {
            warn!("settle called with no request in flight");
            return Outcome::Ignored;
        }

        let outcome = match result {
            Ok(text) => Outcome::Answered(self.conversation.push(Sender::Assistant, text)),
            Err(failure) => {
                error!(kind = %failure.kind, error = %failure.message, "generation request failed");
                Outcome::Failed(failure)
            }
        };

        self.session.set_busy(false);
        outcome
    }

    pub async fn submit(&mut self, raw: &str) -> Outcome {
        match self.begin(raw) {
            Ok(pending) => {
                let result = pending.send().await;
                self.settle(result)
            }
            Err(rejected) => rejected.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{FailureKind, GenerationResponse};
    use crate::session::Phase;
    use crate::state::Message;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io;
    use std::sync::Mutex;
    use tracing_subscriber::fmt::MakeWriter;

    /// Replays canned results in order and records every request
    #[derive(Default)]
    struct ScriptedService {
        replies: Mutex<VecDeque<Result<String, RequestFailure>>>,
        calls: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedService {
        fn with_replies(replies: Vec<Result<String, RequestFailure>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn calls(&self) -> Vec<GenerationRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl GenerationService for ScriptedService {
        async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, RequestFailure> {
            self.calls.lock().unwrap().push(request.clone());
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(RequestFailure::unknown("script exhausted")));
            next.map(|text| GenerationResponse { text })
        }

        fn model_id(&self) -> &str {
            "scripted-model"
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().unwrap().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (buffer, guard)
    }

    fn summary(messages: &[Message]) -> Vec<(Sender, &str)> {
        messages.iter().map(|m| (m.sender(), m.text())).collect()
    }

    #[tokio::test]
    async fn test_successful_reply_is_appended() {
        let service = ScriptedService::with_replies(vec![Ok("Consider the parable of...".to_string())]);
        let mut orchestrator = Orchestrator::new(service.clone());

        let outcome = orchestrator.submit("Why do bad things happen?").await;

        assert!(matches!(outcome, Outcome::Answered(_)));
        assert_eq!(
            summary(orchestrator.conversation().messages()),
            vec![
                (Sender::User, "Why do bad things happen?"),
                (Sender::Assistant, "Consider the parable of..."),
            ]
        );
        assert!(!orchestrator.is_busy());

        let calls = service.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model_id, "scripted-model");
        assert!(calls[0].prompt.ends_with("User Query: Why do bad things happen?"));
    }

    #[tokio::test]
    async fn test_whitespace_input_is_a_no_op() {
        let service = ScriptedService::with_replies(vec![Ok("unused".to_string())]);
        let mut orchestrator = Orchestrator::new(service.clone());
        orchestrator.pending_input_mut().push_str("   ");

        assert_eq!(orchestrator.begin_pending().err(), Some(Rejected::Empty));
        assert_eq!(orchestrator.submit("").await, Outcome::Ignored);
        assert_eq!(orchestrator.submit(" \t\n").await, Outcome::Ignored);

        assert!(orchestrator.conversation().is_empty());
        assert_eq!(orchestrator.session().pending_input, "   ");
        assert_eq!(orchestrator.session().phase(), Phase::Idle);
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_is_logged_and_swallowed() {
        let (logs, _guard) = capture_logs();
        let service = ScriptedService::with_replies(vec![Err(RequestFailure::network("connection reset"))]);
        let mut orchestrator = Orchestrator::new(service);

        let outcome = orchestrator.submit("Hello").await;

        assert_eq!(outcome, Outcome::Failed(RequestFailure::network("connection reset")));
        assert_eq!(summary(orchestrator.conversation().messages()), vec![(Sender::User, "Hello")]);
        assert!(!orchestrator.is_busy());

        let errors: Vec<String> = logs.lines().into_iter().filter(|l| l.contains("ERROR")).collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection reset"));
    }

    #[tokio::test]
    async fn test_user_message_lands_before_request_is_sent() {
        let service = ScriptedService::with_replies(vec![Ok("Blessed are the meek".to_string())]);
        let mut orchestrator = Orchestrator::new(service.clone());
        orchestrator.pending_input_mut().push_str("  Who is blessed?  ");

        let pending = orchestrator.begin_pending().unwrap();

        // Snapshot is kept verbatim, field is cleared, nothing sent yet
        assert_eq!(summary(orchestrator.conversation().messages()), vec![(Sender::User, "  Who is blessed?  ")]);
        assert_eq!(orchestrator.session().pending_input, "");
        assert_eq!(orchestrator.session().phase(), Phase::Awaiting);
        assert!(service.calls().is_empty());
        assert!(pending.prompt().ends_with("User Query:   Who is blessed?  "));

        let result = pending.send().await;
        orchestrator.settle(result);
        assert_eq!(orchestrator.session().phase(), Phase::Idle);
        assert_eq!(orchestrator.conversation().len(), 2);
    }

    #[tokio::test]
    async fn test_second_submit_while_busy_is_rejected() {
        let service = ScriptedService::with_replies(vec![Ok("first".to_string()), Ok("second".to_string())]);
        let mut orchestrator = Orchestrator::new(service.clone());

        let pending = orchestrator.begin("one").unwrap();
        assert_eq!(orchestrator.begin("two").err(), Some(Rejected::Busy));
        assert_eq!(orchestrator.submit("three").await, Outcome::Busy);
        assert_eq!(orchestrator.conversation().len(), 1);

        let result = pending.send().await;
        assert!(matches!(orchestrator.settle(result), Outcome::Answered(_)));
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_never_leave_busy_set() {
        let replies = (0..5).map(|i| Err(RequestFailure::server(format!("boom {}", i)))).collect();
        let service = ScriptedService::with_replies(replies);
        let mut orchestrator = Orchestrator::new(service);

        for i in 0..5 {
            let outcome = orchestrator.submit(&format!("question {}", i)).await;
            assert!(matches!(outcome, Outcome::Failed(ref f) if f.kind == FailureKind::Server));
            assert!(!orchestrator.is_busy());
        }
        assert_eq!(orchestrator.conversation().len(), 5);
        assert!(orchestrator.conversation().messages().iter().all(|m| m.sender() == Sender::User));
    }

    #[tokio::test]
    async fn test_sequential_cycles_alternate_in_order() {
        let n = 4;
        let replies = (0..n).map(|i| Ok(format!("answer {}", i))).collect();
        let service = ScriptedService::with_replies(replies);
        let mut orchestrator = Orchestrator::new(service);

        for i in 0..n {
            orchestrator.submit(&format!("question {}", i)).await;
        }

        let messages = orchestrator.conversation().messages();
        assert_eq!(messages.len(), 2 * n);
        for (i, pair) in messages.chunks(2).enumerate() {
            assert_eq!((pair[0].sender(), pair[0].text()), (Sender::User, format!("question {}", i).as_str()));
            assert_eq!((pair[1].sender(), pair[1].text()), (Sender::Assistant, format!("answer {}", i).as_str()));
        }
        assert!(messages.windows(2).all(|w| w[0].id() < w[1].id()));
    }

    #[tokio::test]
    async fn test_reply_text_is_kept_byte_for_byte() {
        let reply = "  **Luke 15:11**\r\n\n> The prodigal son…  \n".to_string();
        let service = ScriptedService::with_replies(vec![Ok(reply.clone())]);
        let mut orchestrator = Orchestrator::new(service);

        orchestrator.submit("Tell me about forgiveness").await;
        assert_eq!(orchestrator.conversation().last().unwrap().text(), reply);
    }

    #[tokio::test]
    async fn test_prompts_are_single_turn_by_default() {
        let service = ScriptedService::with_replies(vec![Ok("a".to_string()), Ok("b".to_string())]);
        let mut orchestrator = Orchestrator::new(service.clone());

        orchestrator.submit("first question").await;
        orchestrator.submit("second question").await;

        let second = &service.calls()[1].prompt;
        assert!(!second.contains("first question"));
        assert!(second.ends_with("User Query: second question"));
    }

    #[tokio::test]
    async fn test_history_window_is_bounded() {
        let replies = (0..3).map(|i| Ok(format!("answer {}", i))).collect();
        let service = ScriptedService::with_replies(replies);
        let mut orchestrator = Orchestrator::new(service.clone())
            .with_template(PromptTemplate::with_preamble("Persona."))
            .with_history_turns(2);

        orchestrator.submit("q0").await;
        orchestrator.submit("q1").await;
        orchestrator.submit("q2").await;

        let calls = service.calls();
        assert_eq!(calls[0].prompt, "Persona.\n\nUser Query: q0");
        assert_eq!(
            calls[2].prompt,
            "Persona.\n\nConversation so far:\nUser: q1\nPastor: answer 1\n\nUser Query: q2"
        );
    }

    #[test]
    fn test_settle_without_request_is_ignored() {
        let service = ScriptedService::with_replies(Vec::new());
        let mut orchestrator = Orchestrator::new(service);

        assert_eq!(orchestrator.settle(Ok("stray".to_string())), Outcome::Ignored);
        assert!(orchestrator.conversation().is_empty());
    }

    #[test]
    fn test_from_config_uses_configured_model() {
        let config = Config {
            model: "gemini-1.5-flash".to_string(),
            ..Config::default()
        };
        let orchestrator = Orchestrator::from_config(&config);
        assert_eq!(orchestrator.model_id(), "gemini-1.5-flash");
        assert!(!orchestrator.is_busy());
    }

    #[tokio::test]
    async fn test_observers_are_notified_per_message() {
        let service = ScriptedService::with_replies(vec![Ok("reply".to_string())]);
        let mut orchestrator = Orchestrator::new(service);
        let rx = orchestrator.conversation().subscribe();

        orchestrator.submit("hi").await;
        assert_eq!(*rx.borrow(), 2);
    }
}
