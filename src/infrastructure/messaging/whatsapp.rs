use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::application::services::delivery::MessageGateway;

const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v19.0";

/// WhatsApp Cloud API client. One business phone number per instance.
pub struct WhatsAppClient {
    http: Client,
    base_url: String,
    api_token: String,
    phone_number_id: String,
}

impl WhatsAppClient {
    pub fn new(api_token: String, phone_number_id: String) -> Arc<dyn MessageGateway> {
        Arc::new(Self {
            http: Client::builder()
                .user_agent("outreach/whatsapp")
                .build()
                .expect("failed to build whatsapp client"),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token,
            phone_number_id,
        }) as Arc<dyn MessageGateway>
    }

    /// Points the client at a non-default Graph API host (proxies,
    /// sandbox endpoints).
    pub fn with_base_url(
        api_token: String,
        phone_number_id: String,
        base_url: String,
    ) -> Arc<dyn MessageGateway> {
        Arc::new(Self {
            http: Client::new(),
            base_url,
            api_token,
            phone_number_id,
        }) as Arc<dyn MessageGateway>
    }
}

#[async_trait]
impl MessageGateway for WhatsAppClient {
    async fn send(&self, recipient: &str, body: &str) -> anyhow::Result<String> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": recipient,
            "type": "text",
            "text": { "preview_url": true, "body": body },
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("whatsapp api returned {status}: {detail}");
        }

        let parsed: SendMessageResponse = response.json().await?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| anyhow::anyhow!("whatsapp api response carried no message id"))
    }
}

#[derive(Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Deserialize)]
struct SentMessage {
    id: String,
}
