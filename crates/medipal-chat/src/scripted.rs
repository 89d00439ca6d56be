//! Deterministic endpoint for tests and offline runs.
//!
//! Replies are taken from a queue of [`Script`]s, one per user turn, and
//! every session records the prompts it received so callers can check that
//! a fresh session starts without prior turns.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::endpoint::{ChatEndpoint, ChatSession, ReplyChunk, ReplyStream, SessionConfig};
use crate::error::ChatError;

/// How the endpoint answers one user turn.
pub enum Script {
    /// Stream these chunks, then complete.
    Reply(Vec<String>),
    /// Stream these chunks, then fail with the message.
    FailAfter { chunks: Vec<String>, message: String },
    /// Refuse to open the stream.
    RejectOpen(String),
    /// Relay whatever the paired [`LiveFeed`] sends.
    Live(mpsc::UnboundedReceiver<Result<ReplyChunk, ChatError>>),
    /// Keep the stream from opening until a script arrives on the channel.
    Held(oneshot::Receiver<Script>),
}

impl Script {
    pub fn reply<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::Reply(chunks.into_iter().map(Into::into).collect())
    }

    pub fn fail_after<I, S>(chunks: I, message: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Script::FailAfter {
            chunks: chunks.into_iter().map(Into::into).collect(),
            message: message.into(),
        }
    }

    /// A script fed chunk by chunk from the returned [`LiveFeed`].
    pub fn live() -> (Self, LiveFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Script::Live(rx), LiveFeed { tx })
    }

    /// A script whose stream opens only once the returned sender provides
    /// the script to play.
    pub fn held() -> (Self, oneshot::Sender<Script>) {
        let (tx, rx) = oneshot::channel();
        (Script::Held(rx), tx)
    }
}

/// Sender side of [`Script::Live`]. Dropping it (or calling `finish`)
/// completes the stream.
pub struct LiveFeed {
    tx: mpsc::UnboundedSender<Result<ReplyChunk, ChatError>>,
}

impl LiveFeed {
    /// Emit a chunk. Returns false once the reader has gone away.
    pub fn chunk(&self, text: impl Into<String>) -> bool {
        self.tx.send(Ok(ReplyChunk::new(text))).is_ok()
    }

    /// Emit a stream failure.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(ChatError::Stream(message.into()))).is_ok()
    }

    pub fn finish(self) {}
}

/// Endpoint that answers from a script queue.
#[derive(Default)]
pub struct ScriptedEndpoint {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    sessions: Mutex<Vec<Arc<ScriptedSession>>>,
    refusal: Mutex<Option<String>>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to the next user turn.
    pub fn push(&self, script: Script) {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push_back(script);
        }
    }

    /// Make `create_session` fail with `message` until called with `None`.
    pub fn refuse_sessions(&self, message: Option<&str>) {
        if let Ok(mut refusal) = self.refusal.lock() {
            *refusal = message.map(str::to_string);
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Prompts received by the `index`-th session created.
    pub fn prompts(&self, index: usize) -> Vec<String> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(index).cloned())
            .map(|session| session.prompts())
            .unwrap_or_default()
    }

    /// System instruction the `index`-th session was created with.
    pub fn instruction(&self, index: usize) -> Option<String> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(index).map(|s| s.instruction.clone()))
    }
}

impl ChatEndpoint for ScriptedEndpoint {
    fn create_session(&self, config: &SessionConfig) -> Result<Arc<dyn ChatSession>, ChatError> {
        if let Some(message) = self.refusal.lock().ok().and_then(|r| r.clone()) {
            return Err(ChatError::Init(message));
        }

        let session = Arc::new(ScriptedSession {
            scripts: Arc::clone(&self.scripts),
            instruction: config.system_instruction.clone(),
            prompts: Mutex::new(Vec::new()),
        });
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.push(Arc::clone(&session));
        }
        Ok(session)
    }
}

struct ScriptedSession {
    scripts: Arc<Mutex<VecDeque<Script>>>,
    instruction: String,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedSession {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn stream_reply(&self, text: &str) -> Result<ReplyStream, ChatError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(text.to_string());
        }

        let mut script = self
            .scripts
            .lock()
            .ok()
            .and_then(|mut scripts| scripts.pop_front())
            .ok_or_else(|| ChatError::Stream("no scripted reply queued".to_string()))?;

        while let Script::Held(release) = script {
            script = release
                .await
                .map_err(|_| ChatError::Stream("held reply was abandoned".to_string()))?;
        }

        let stream: ReplyStream = match script {
            Script::Reply(chunks) => {
                Box::pin(stream::iter(chunks.into_iter().map(|c| Ok(ReplyChunk::new(c)))))
            }
            Script::FailAfter { chunks, message } => {
                let items = chunks
                    .into_iter()
                    .map(|c| Ok(ReplyChunk::new(c)))
                    .chain(std::iter::once(Err(ChatError::Stream(message))));
                Box::pin(stream::iter(items))
            }
            Script::RejectOpen(message) => return Err(ChatError::Stream(message)),
            Script::Live(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            Script::Held(_) => return Err(ChatError::Stream("held reply not released".to_string())),
        };
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn config() -> SessionConfig {
        SessionConfig {
            api_key: "k".to_string(),
            system_instruction: "Be kind.".to_string(),
        }
    }

    #[tokio::test]
    async fn test_scripts_are_consumed_in_order() {
        let endpoint = ScriptedEndpoint::new();
        endpoint.push(Script::reply(["a", "b"]));
        endpoint.push(Script::fail_after(["c"], "boom"));

        let session = endpoint.create_session(&config()).unwrap();

        let first: Vec<_> = session.stream_reply("one").await.unwrap().collect().await;
        assert_eq!(first, vec![Ok(ReplyChunk::new("a")), Ok(ReplyChunk::new("b"))]);

        let second: Vec<_> = session.stream_reply("two").await.unwrap().collect().await;
        assert_eq!(second.len(), 2);
        assert_eq!(second[1], Err(ChatError::Stream("boom".to_string())));

        assert!(session.stream_reply("three").await.is_err());
        assert_eq!(endpoint.prompts(0), vec!["one", "two", "three"]);
        assert_eq!(endpoint.instruction(0).as_deref(), Some("Be kind."));
    }

    #[tokio::test]
    async fn test_live_script_relays_feed() {
        let endpoint = ScriptedEndpoint::new();
        let (script, feed) = Script::live();
        endpoint.push(script);

        let session = endpoint.create_session(&config()).unwrap();
        let mut stream = session.stream_reply("hi").await.unwrap();

        assert!(feed.chunk("Hel"));
        assert_eq!(stream.next().await, Some(Ok(ReplyChunk::new("Hel"))));
        feed.finish();
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn test_refused_sessions() {
        let endpoint = ScriptedEndpoint::new();
        endpoint.refuse_sessions(Some("quota exhausted"));
        assert!(matches!(
            endpoint.create_session(&config()),
            Err(ChatError::Init(_))
        ));
        assert_eq!(endpoint.sessions_created(), 0);

        endpoint.refuse_sessions(None);
        assert!(endpoint.create_session(&config()).is_ok());
        assert_eq!(endpoint.sessions_created(), 1);
    }

    #[tokio::test]
    async fn test_held_script_opens_on_release() {
        let endpoint = ScriptedEndpoint::new();
        let (script, release) = Script::held();
        endpoint.push(script);

        let session = endpoint.create_session(&config()).unwrap();
        let opening = tokio::spawn(async move {
            let stream = session.stream_reply("hi").await?;
            Ok::<_, ChatError>(stream.collect::<Vec<_>>().await)
        });

        assert!(release.send(Script::reply(["late"])).is_ok());
        let items = opening.await.unwrap().unwrap();
        assert_eq!(items, vec![Ok(ReplyChunk::new("late"))]);
    }
}
