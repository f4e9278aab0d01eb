//! `convorelay run` — the host loop.
//!
//! Pulls messages off the channel and hands each one to its own task, so a
//! slow backend answer for one user never holds up another. Messages of the
//! same user are answered one after another, in arrival order. Ctrl-C (or
//! the channel closing) stops intake, and replies already in flight are
//! still delivered.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use convorelay_agent::Relay;
use convorelay_channels::{CliChannel, TelegramChannel, TelegramConfig};
use convorelay_core::channel::{Channel, ChannelMessage};
use convorelay_core::error::ChannelError;
use convorelay_core::provider::CompletionClient;
use convorelay_providers::OllamaClient;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Finished chains are swept once this many users are tracked.
const PRUNE_THRESHOLD: usize = 256;

pub async fn run(
    config_path: Option<&Path>,
    channel: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(super::load_config(config_path, channel.as_deref())?);

    let client = Arc::new(OllamaClient::from_config(&config)?);
    match client.health_check().await {
        Ok(true) => info!(url = %config.backend_url, model = %client.model(), "Backend reachable"),
        Ok(false) => warn!(url = %config.backend_url, "Backend answered its health check with an error status"),
        Err(e) => warn!(
            url = %config.backend_url,
            error = %e,
            "Backend not reachable yet; users get an error reply until it is"
        ),
    }

    let store = super::open_store(&config).await?;
    let relay = Arc::new(Relay::new(store, client, config.clone()));

    let channel: Arc<dyn Channel> = match config.channel.as_str() {
        "cli" => Arc::new(CliChannel::new()),
        _ => Arc::new(TelegramChannel::new(TelegramConfig::from(&config.telegram))?),
    };

    println!("🤖 {} is listening on {}", config.bot_name, channel.name());
    println!("   Backend: {} ({})", config.backend_url, config.model);
    println!("   History: {}", config.history_path.display());
    println!("   Press Ctrl-C to stop.\n");

    serve(channel, relay, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    })
    .await?;

    info!("convorelay stopped");
    Ok(())
}

/// Dispatch channel messages until `shutdown` resolves or the channel closes,
/// then wait for in-flight replies.
pub async fn serve<F>(
    channel: Arc<dyn Channel>,
    relay: Arc<Relay>,
    shutdown: F,
) -> Result<(), ChannelError>
where
    F: Future<Output = ()>,
{
    let mut inbound = channel.start().await?;
    let mut in_flight = JoinSet::new();
    let mut order = ArrivalOrder::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            next = inbound.recv() => match next {
                Some(Ok(msg)) => {
                    let (previous, done) = order.enqueue(&msg.sender_id);
                    let (channel, relay) = (channel.clone(), relay.clone());
                    in_flight.spawn(async move {
                        if let Some(previous) = previous {
                            // Err only means the predecessor's task is gone.
                            let _ = previous.await;
                        }
                        dispatch(channel, relay, msg).await;
                        let _ = done.send(());
                    });
                }
                Some(Err(e)) => warn!(channel = channel.name(), error = %e, "Channel error"),
                None => {
                    info!(channel = channel.name(), "Channel closed");
                    break;
                }
            },
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
        }
    }

    channel.stop().await?;
    if !in_flight.is_empty() {
        info!(pending = in_flight.len(), "Waiting for in-flight replies");
    }
    while in_flight.join_next().await.is_some() {}
    Ok(())
}

/// Per-sender chain of completion signals.
///
/// Each message waits for the previous message of the same sender to be
/// answered, so one user's messages are handled in the order they arrived.
#[derive(Default)]
struct ArrivalOrder {
    tails: HashMap<String, oneshot::Receiver<()>>,
}

impl ArrivalOrder {
    /// Returns what to wait for before handling this message, and the
    /// signal to fire once it is answered.
    fn enqueue(&mut self, sender_id: &str) -> (Option<oneshot::Receiver<()>>, oneshot::Sender<()>) {
        if self.tails.len() >= PRUNE_THRESHOLD {
            self.prune();
        }
        let (done, tail) = oneshot::channel();
        (self.tails.insert(sender_id.to_string(), tail), done)
    }

    /// Forget senders whose last message has been answered.
    fn prune(&mut self) {
        self.tails.retain(|_, tail| {
            matches!(tail.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.tails.len()
    }
}

/// Answer one inbound message on the channel it came from.
async fn dispatch(channel: Arc<dyn Channel>, relay: Arc<Relay>, msg: ChannelMessage) {
    if !channel.is_allowed(&msg.sender_id) {
        debug!(sender_id = %msg.sender_id, "Ignoring message from non-allowed user");
        return;
    }

    let reply = if is_start_command(&msg.content) {
        relay.greeting()
    } else {
        if let Err(e) = channel.send_typing(&msg.chat_id).await {
            debug!(chat_id = %msg.chat_id, error = %e, "Typing indicator failed");
        }
        relay.handle(&msg.sender_id, &msg.content).await
    };

    if let Err(e) = channel
        .send(&msg.chat_id, &reply, msg.message_id.as_deref())
        .await
    {
        warn!(
            channel = channel.name(),
            chat_id = %msg.chat_id,
            error = %e,
            "Failed to deliver reply"
        );
    }
}

/// `/start`, `/start@BotName`, and `/start <payload>` all count.
fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    command == "/start" || command.starts_with("/start@")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use convorelay_config::RelayConfig;
    use convorelay_core::channel::ChannelId;
    use convorelay_core::error::CompletionError;
    use convorelay_core::history::HistoryStore;
    use convorelay_core::provider::{ContextWindow, Reply};
    use convorelay_memory::InMemoryHistory;
    use convorelay_core::message::Role;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Replays a fixed inbox and records every reply.
    struct InboxChannel {
        id: ChannelId,
        inbox: Mutex<Vec<ChannelMessage>>,
        sent: Mutex<Vec<(String, String)>>,
        typing: Mutex<usize>,
    }

    impl InboxChannel {
        fn new(inbox: Vec<ChannelMessage>) -> Self {
            Self {
                id: ChannelId("inbox".into()),
                inbox: Mutex::new(inbox),
                sent: Mutex::new(Vec::new()),
                typing: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Channel for InboxChannel {
        fn name(&self) -> &str {
            "inbox"
        }

        fn id(&self) -> &ChannelId {
            &self.id
        }

        async fn start(
            &self,
        ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
            let messages: Vec<_> = self.inbox.lock().unwrap().drain(..).collect();
            let (tx, rx) = mpsc::channel(messages.len().max(1));
            for msg in messages {
                tx.try_send(Ok(msg)).unwrap();
            }
            Ok(rx)
        }

        async fn send(
            &self,
            chat_id: &str,
            content: &str,
            _reply_to: Option<&str>,
        ) -> Result<(), ChannelError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), content.to_string()));
            Ok(())
        }

        async fn send_typing(&self, _chat_id: &str) -> Result<(), ChannelError> {
            *self.typing.lock().unwrap() += 1;
            Ok(())
        }

        fn is_allowed(&self, sender_id: &str) -> bool {
            sender_id != "blocked"
        }
    }

    /// Echoes the newest message after an optional pause.
    struct EchoClient {
        delay: Duration,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, window: &ContextWindow) -> Result<Reply, CompletionError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let last = window
                .messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(Reply::new(format!("echo: {last}")))
        }
    }

    fn message(sender: &str, text: &str) -> ChannelMessage {
        ChannelMessage {
            channel_id: ChannelId("inbox".into()),
            sender_id: sender.into(),
            sender_name: None,
            content: text.into(),
            chat_id: format!("chat-{sender}"),
            message_id: None,
        }
    }

    fn relay_with_delay(store: Arc<InMemoryHistory>, delay: Duration) -> Arc<Relay> {
        let config = RelayConfig {
            channel: "cli".into(),
            bot_name: "Benjamin".into(),
            window_size: 100,
            ..RelayConfig::default()
        };
        Arc::new(Relay::new(store, Arc::new(EchoClient { delay }), Arc::new(config)))
    }

    fn relay(store: Arc<InMemoryHistory>) -> Arc<Relay> {
        relay_with_delay(store, Duration::ZERO)
    }

    #[test]
    fn start_command_variants() {
        assert!(is_start_command("/start"));
        assert!(is_start_command("/start@benjamin_bot"));
        assert!(is_start_command("/start  deep-link"));
        assert!(!is_start_command("/started"));
        assert!(!is_start_command("please /start"));
    }

    #[tokio::test]
    async fn answers_every_message_until_channel_closes() {
        let store = Arc::new(InMemoryHistory::new());
        let channel = Arc::new(InboxChannel::new(vec![
            message("42", "/start"),
            message("42", "hi"),
            message("7", "hello"),
            message("blocked", "let me in"),
        ]));

        serve(channel.clone(), relay(store.clone()), std::future::pending())
            .await
            .unwrap();

        let sent = channel.sent.lock().unwrap().clone();
        let replies_to = |chat: &str| -> Vec<String> {
            sent.iter()
                .filter(|(c, _)| c == chat)
                .map(|(_, text)| text.clone())
                .collect()
        };
        assert_eq!(
            replies_to("chat-42"),
            vec!["Hi, I'm Benjamin! How are you?", "echo: hi"]
        );
        assert_eq!(replies_to("chat-7"), vec!["echo: hello"]);
        assert!(replies_to("chat-blocked").is_empty());
        assert_eq!(*channel.typing.lock().unwrap(), 2);

        // The greeting is not part of the conversation.
        let turns = store.recent("42", 10).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "echo: hi"]);
        assert!(store.recent("blocked", 10).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_user_messages_are_answered_in_arrival_order() {
        let expected: Vec<String> = (0..40).map(|i| format!("m{i}")).collect();

        for _ in 0..5 {
            let store = Arc::new(InMemoryHistory::new());
            let mut inbox: Vec<ChannelMessage> =
                expected.iter().map(|text| message("42", text)).collect();
            // Another user's traffic interleaved with the first one's.
            inbox.extend((0..10).map(|i| message("7", &format!("other {i}"))));
            let channel = Arc::new(InboxChannel::new(inbox));

            serve(
                channel.clone(),
                relay_with_delay(store.clone(), Duration::from_millis(2)),
                std::future::pending(),
            )
            .await
            .unwrap();

            let recorded: Vec<String> = store
                .recent("42", 200)
                .await
                .unwrap()
                .into_iter()
                .filter(|t| t.role == Role::User)
                .map(|t| t.content)
                .collect();
            assert_eq!(recorded, expected);

            let replies: Vec<String> = channel
                .sent
                .lock()
                .unwrap()
                .iter()
                .filter(|(chat, _)| chat == "chat-42")
                .map(|(_, text)| text.clone())
                .collect();
            let echoed: Vec<String> = expected.iter().map(|m| format!("echo: {m}")).collect();
            assert_eq!(replies, echoed);
        }
    }

    #[tokio::test]
    async fn arrival_order_chains_and_prunes() {
        let mut order = ArrivalOrder::default();

        let (first_wait, first_done) = order.enqueue("42");
        assert!(first_wait.is_none());
        let (second_wait, second_done) = order.enqueue("42");
        let mut second_wait = second_wait.unwrap();
        assert!(second_wait.try_recv().is_err());

        first_done.send(()).unwrap();
        second_wait.await.unwrap();

        // "42" still has an unanswered message; "7" is done.
        let (_, seven_done) = order.enqueue("7");
        seven_done.send(()).unwrap();
        order.prune();
        assert_eq!(order.tracked(), 1);

        drop(second_done);
        order.prune();
        assert_eq!(order.tracked(), 0);
    }

    #[tokio::test]
    async fn shutdown_stops_intake() {
        struct SilentChannel(ChannelId, Mutex<Option<mpsc::Sender<Result<ChannelMessage, ChannelError>>>>);

        #[async_trait]
        impl Channel for SilentChannel {
            fn name(&self) -> &str {
                "silent"
            }
            fn id(&self) -> &ChannelId {
                &self.0
            }
            async fn start(
                &self,
            ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
                let (tx, rx) = mpsc::channel(1);
                // Keep the sender alive so the receiver never closes on its own.
                *self.1.lock().unwrap() = Some(tx);
                Ok(rx)
            }
            async fn send(&self, _: &str, _: &str, _: Option<&str>) -> Result<(), ChannelError> {
                Ok(())
            }
            fn is_allowed(&self, _: &str) -> bool {
                true
            }
        }

        let channel = Arc::new(SilentChannel(ChannelId("silent".into()), Mutex::new(None)));
        let store = Arc::new(InMemoryHistory::new());
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            serve(channel, relay(store), async {}),
        )
        .await;
        assert!(matches!(result, Ok(Ok(()))));
    }
}
