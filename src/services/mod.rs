//! Monitoring pipeline services.

pub mod monitor;
pub mod notify;
pub mod search;

pub use monitor::{MonitorConfig, MonitorService};
pub use search::{ChangeOutcome, ReliabilityConfig, SearchService};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fakes for the extractor and messenger seams.

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::models::{GiftItem, SearchCriteria, SearchResult};
    use crate::scrapers::{ExtractionError, SearchBackend};
    use crate::telegram::{Messenger, NotifyError};

    /// Build a search result with `items` placeholder gift cards.
    pub fn result_with_items(count: i64, items: usize) -> SearchResult {
        let items = (0..items)
            .map(|i| GiftItem {
                id: format!("item-{}", i),
                name: format!("Gift {}", i),
                image_url: None,
                rarity: None,
            })
            .collect();
        SearchResult::new(count, items, SearchCriteria::new("Plush Pepe"))
    }

    /// Backend that replays a queue of scripted responses.
    pub struct ScriptedBackend {
        responses: Mutex<VecDeque<Result<SearchResult, ExtractionError>>>,
        pub link: Option<String>,
        pub delay: Duration,
    }

    impl ScriptedBackend {
        pub fn new(responses: Vec<Result<SearchResult, ExtractionError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                link: Some("https://t.me/nft/PlushPepe-1".to_string()),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl SearchBackend for ScriptedBackend {
        async fn search(
            &self,
            _criteria: &SearchCriteria,
        ) -> Result<SearchResult, ExtractionError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(ExtractionError::search("scripted responses exhausted")))
        }

        async fn latest_gift_link(
            &self,
            _criteria: &SearchCriteria,
        ) -> Result<Option<String>, ExtractionError> {
            Ok(self.link.clone())
        }
    }

    /// Messenger that records every outbound call.
    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<(i64, String)>>,
        pub edited: Mutex<Vec<(i64, i64, String)>>,
        /// Chat ids whose sends fail with a 409 conflict.
        pub conflict_chats: Vec<i64>,
        /// Chat ids whose edits fail (message deleted, bot blocked).
        pub failing_edit_chats: Vec<i64>,
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, NotifyError> {
            if self.conflict_chats.contains(&chat_id) {
                return Err(NotifyError::Api {
                    code: Some(409),
                    description: "Conflict".to_string(),
                });
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push((chat_id, text.to_string()));
            Ok(sent.len() as i64)
        }

        async fn edit_message(
            &self,
            chat_id: i64,
            message_id: i64,
            text: &str,
        ) -> Result<(), NotifyError> {
            if self.failing_edit_chats.contains(&chat_id) {
                return Err(NotifyError::Api {
                    code: Some(400),
                    description: "message to edit not found".to_string(),
                });
            }
            self.edited
                .lock()
                .unwrap()
                .push((chat_id, message_id, text.to_string()));
            Ok(())
        }
    }
}
