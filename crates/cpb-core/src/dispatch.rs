//! Fan-out: send one finished post to many channels.

use std::sync::Arc;

use crate::{
    content::{PostContent, UrlButton},
    domain::{normalize_channel_id, ChatId, MessageRef},
    messaging::port::MessagingPort,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Sent(MessageRef),
    Failed(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchResult {
    pub channel_id: ChatId,
    pub outcome: Outcome,
}

/// Per-destination results of one fan-out, in destination order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    pub fn success_count(&self) -> usize {
        self.sent().count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    /// Messages that made it out.
    pub fn sent(&self) -> impl Iterator<Item = MessageRef> + '_ {
        self.results.iter().filter_map(|r| match r.outcome {
            Outcome::Sent(m) => Some(m),
            Outcome::Failed(_) => None,
        })
    }
}

pub struct FanOutDispatcher {
    messenger: Arc<dyn MessagingPort>,
}

impl FanOutDispatcher {
    pub fn new(messenger: Arc<dyn MessagingPort>) -> Self {
        Self { messenger }
    }

    /// Send `content` to every destination in turn.
    ///
    /// A failing destination is logged and recorded; the rest still get the post
    /// and nothing already sent is rolled back.
    pub async fn dispatch(
        &self,
        content: &PostContent,
        buttons: &[UrlButton],
        destinations: &[ChatId],
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        for raw in destinations {
            let channel_id = normalize_channel_id(raw.0);
            tracing::info!(channel_id = channel_id.0, kind = content.kind().label(), "sending post");

            let outcome = match self.messenger.send_post(channel_id, content, buttons).await {
                Ok(msg) => Outcome::Sent(msg),
                Err(e) => {
                    tracing::warn!(channel_id = channel_id.0, error = %e, "failed to send post");
                    Outcome::Failed(e.to_string())
                }
            };
            report.results.push(DispatchResult {
                channel_id,
                outcome,
            });
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{content::Media, testing::FakeMessenger};

    #[tokio::test]
    async fn failing_destination_does_not_stop_the_rest() {
        let fake = Arc::new(FakeMessenger::default());
        fake.fail_chat(ChatId(-1002222222222));
        let d = FanOutDispatcher::new(fake.clone());

        let report = d
            .dispatch(
                &PostContent::Text("hi".into()),
                &[],
                &[
                    ChatId(-1001111111111),
                    ChatId(-1002222222222),
                    ChatId(-1003333333333),
                ],
            )
            .await;

        assert_eq!(report.success_count(), 2);
        assert_eq!(report.failure_count(), 1);
        assert!(matches!(report.results[1].outcome, Outcome::Failed(_)));

        let sent_to: Vec<ChatId> = fake.posts().into_iter().map(|(c, _, _)| c).collect();
        assert_eq!(sent_to, vec![ChatId(-1001111111111), ChatId(-1003333333333)]);
    }

    #[tokio::test]
    async fn destinations_are_normalized_and_buttons_attached() {
        let fake = Arc::new(FakeMessenger::default());
        let d = FanOutDispatcher::new(fake.clone());
        let buttons = vec![UrlButton {
            label: "Site".into(),
            url: "https://example.com".into(),
        }];

        let content = PostContent::Photo(Media::new("file-1", Some("cap".into())));
        let report = d.dispatch(&content, &buttons, &[ChatId(1234567890)]).await;

        assert_eq!(report.results[0].channel_id, ChatId(-1001234567890));
        let posts = fake.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, ChatId(-1001234567890));
        assert_eq!(posts[0].1, content);
        assert_eq!(posts[0].2, buttons);
    }

    #[tokio::test]
    async fn all_failures_report_zero() {
        let fake = Arc::new(FakeMessenger::default());
        fake.fail_chat(ChatId(-1001111111111));
        let report = FanOutDispatcher::new(fake)
            .dispatch(
                &PostContent::Text("x".into()),
                &[],
                &[ChatId(-1001111111111)],
            )
            .await;
        assert_eq!(report.success_count(), 0);
    }
}
